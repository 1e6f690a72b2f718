//! Hashing algorithms for Rusty Coin.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Calculate SHA256 hash of input data
pub fn calculate_sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double SHA256, the hash used for message identities and scoring.
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    calculate_sha256(&calculate_sha256(data))
}

/// RIPEMD160(SHA256(data)), used to derive pay-to-public-key-hash scripts.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(calculate_sha256(data));
    hasher.finalize().into()
}

/// BLAKE3 digest used as an integrity checksum for files written to disk.
pub fn checksum(data: &[u8]) -> [u8; 32] {
    blake3::hash(data).into()
}

/// Incremental double-SHA256 writer.
///
/// Integers are written little-endian and byte strings are prefixed with their
/// length, so two different field sequences never produce the same preimage.
#[derive(Clone, Default)]
pub struct HashWriter {
    hasher: Sha256,
}

impl HashWriter {
    pub fn new() -> Self {
        HashWriter { hasher: Sha256::new() }
    }

    pub fn write_raw(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    pub fn write_bytes(self, data: &[u8]) -> Self {
        self.write_u64(data.len() as u64).write_raw(data)
    }

    pub fn write_u8(self, value: u8) -> Self {
        self.write_raw(&[value])
    }

    pub fn write_u32(self, value: u32) -> Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_u64(self, value: u64) -> Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_i64(self, value: i64) -> Self {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn finalize(self) -> [u8; 32] {
        let first: [u8; 32] = self.hasher.finalize().into();
        calculate_sha256(&first)
    }
}
