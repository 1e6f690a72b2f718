//! Ed25519 verification and the message bytes each signing scheme covers.

use std::convert::TryFrom;

use ed25519_dalek::{PublicKey, Signature, SignatureError, Verifier};
use rusty_shared_types::masternode::MessageScheme;
use rusty_shared_types::Hash;

pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), SignatureError> {
    public_key.verify(message, signature)
}

/// Verifies a signature given as raw wire bytes.
///
/// Malformed keys or signatures are reported the same way as a failed
/// verification.
pub fn verify_signature_bytes(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
    let public_key = PublicKey::from_bytes(public_key)?;
    let signature = Signature::try_from(signature)?;
    verify_signature(&public_key, message, &signature)
}

/// Produces the exact bytes a message is signed over.
///
/// `legacy` is the concatenated field string, `signature_hash` the double
/// SHA-256 of the canonical serialization. Which one is used depends only on
/// the scheme carried by the message.
pub fn message_to_sign(scheme: MessageScheme, legacy: &str, signature_hash: &Hash) -> Vec<u8> {
    match scheme {
        MessageScheme::Legacy => legacy.as_bytes().to_vec(),
        MessageScheme::Canonical => signature_hash.to_vec(),
    }
}
