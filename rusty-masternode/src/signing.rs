//! Identity hashes and signatures of masternode messages.

use rusty_crypto::signature::{message_to_sign, verify_signature_bytes};
use rusty_crypto::{HashWriter, RustyKeyPair};
use rusty_shared_types::masternode::{Broadcast, MessageScheme, PaymentVote, Ping};
use rusty_shared_types::{Hash, OutPoint};

use crate::error::{MasternodeError, MessageKind};

/// A gossip message that carries its own signature and signing scheme.
pub trait SignedMessage {
    const KIND: MessageKind;

    /// Collateral outpoint of the masternode the message speaks for.
    fn signer(&self) -> &OutPoint;

    fn scheme(&self) -> MessageScheme;

    fn signature(&self) -> &[u8];

    fn set_signature(&mut self, signature: Vec<u8>);

    /// Identity hash used for deduplication and inventory.
    fn message_hash(&self) -> Hash;

    /// Hash signed under [`MessageScheme::Canonical`].
    fn signature_hash(&self) -> Hash;

    /// Field string signed under [`MessageScheme::Legacy`].
    fn legacy_message(&self) -> String;

    fn message_to_sign(&self) -> Vec<u8> {
        message_to_sign(self.scheme(), &self.legacy_message(), &self.signature_hash())
    }

    fn sign(&mut self, keypair: &RustyKeyPair) {
        let signature = keypair.sign_bytes(&self.message_to_sign());
        self.set_signature(signature);
    }

    fn check_signature(&self, public_key: &[u8]) -> Result<(), MasternodeError> {
        verify_signature_bytes(public_key, &self.message_to_sign(), self.signature())
            .map_err(|_| MasternodeError::BadSignature(Self::KIND, *self.signer()))
    }
}

impl SignedMessage for Broadcast {
    const KIND: MessageKind = MessageKind::Broadcast;

    fn signer(&self) -> &OutPoint {
        &self.outpoint
    }

    fn scheme(&self) -> MessageScheme {
        self.scheme
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn message_hash(&self) -> Hash {
        HashWriter::new()
            .write_i64(self.sig_time)
            .write_bytes(&self.collateral_pubkey)
            .finalize()
    }

    fn signature_hash(&self) -> Hash {
        HashWriter::new()
            .write_u8(self.scheme.as_u8())
            .write_bytes(self.addr.to_string().as_bytes())
            .write_i64(self.sig_time)
            .write_bytes(&self.collateral_pubkey)
            .write_bytes(&self.operator_pubkey)
            .write_u32(self.protocol_version)
            .finalize()
    }

    fn legacy_message(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.addr,
            self.sig_time,
            hex::encode(&self.collateral_pubkey),
            hex::encode(&self.operator_pubkey),
            self.protocol_version
        )
    }
}

impl SignedMessage for Ping {
    const KIND: MessageKind = MessageKind::Ping;

    fn signer(&self) -> &OutPoint {
        &self.outpoint
    }

    fn scheme(&self) -> MessageScheme {
        self.scheme
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn message_hash(&self) -> Hash {
        HashWriter::new()
            .write_raw(&self.outpoint.txid)
            .write_u32(self.outpoint.vout)
            .write_raw(&self.block_hash)
            .write_i64(self.sig_time)
            .finalize()
    }

    fn signature_hash(&self) -> Hash {
        self.message_hash()
    }

    fn legacy_message(&self) -> String {
        format!("{}{}{}", self.outpoint.to_short_string(), hex::encode(self.block_hash), self.sig_time)
    }
}

impl SignedMessage for PaymentVote {
    const KIND: MessageKind = MessageKind::PaymentVote;

    fn signer(&self) -> &OutPoint {
        &self.voter
    }

    fn scheme(&self) -> MessageScheme {
        self.scheme
    }

    fn signature(&self) -> &[u8] {
        &self.signature
    }

    fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = signature;
    }

    fn message_hash(&self) -> Hash {
        HashWriter::new()
            .write_bytes(&self.payee)
            .write_u64(self.height)
            .write_raw(&self.voter.txid)
            .write_u32(self.voter.vout)
            .finalize()
    }

    fn signature_hash(&self) -> Hash {
        self.message_hash()
    }

    fn legacy_message(&self) -> String {
        format!("{}{}{}", self.voter.to_short_string(), self.height, hex::encode(&self.payee))
    }
}
