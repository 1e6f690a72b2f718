//! Keypair generation and management for Rusty Coin.

use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, SignatureError, Signer};
use rand::rngs::OsRng;

/// Represents a cryptographic key pair (public and secret key).
pub struct RustyKeyPair {
    keypair: Keypair,
}

impl RustyKeyPair {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let mut csprng = OsRng {};
        let keypair = Keypair::generate(&mut csprng);
        RustyKeyPair { keypair }
    }

    /// Rebuilds a key pair from a 32-byte secret, e.g. an operator key read from configuration.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, SignatureError> {
        let secret = SecretKey::from_bytes(secret)?;
        let public = PublicKey::from(&secret);
        Ok(RustyKeyPair { keypair: Keypair { secret, public } })
    }

    /// Returns the public key of this key pair.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.keypair.public.to_bytes().to_vec()
    }

    /// Signs the given message with the secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.keypair.sign(message)
    }

    /// Signs the given message and returns the raw 64 signature bytes.
    pub fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        self.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for RustyKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustyKeyPair")
            .field("public", &hex::encode(self.keypair.public.to_bytes()))
            .finish()
    }
}
