//! Cryptographic primitives for Rusty Coin

pub mod hash;
pub mod keypair;
pub mod signature;

pub use hash::{hash160, sha256d, HashWriter};
pub use keypair::RustyKeyPair;
