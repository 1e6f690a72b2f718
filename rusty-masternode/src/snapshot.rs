//! On-disk snapshots of the masternode list and the payment votes.
//!
//! Layout: bincode magic string, 4-byte network magic, bincode body, then a
//! BLAKE3 checksum over everything before it.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use rusty_consensus::Network;
use rusty_crypto::hash::checksum;

pub const REGISTRY_MAGIC: &str = "MasternodeCache";
pub const PAYMENTS_MAGIC: &str = "MasternodePayments";

const CHECKSUM_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot file {0} does not exist")]
    Missing(PathBuf),

    #[error("Snapshot file is truncated")]
    Truncated,

    #[error("Snapshot checksum mismatch")]
    ChecksumMismatch,

    #[error("Snapshot magic message {found:?} does not match {expected:?}")]
    WrongMagicMessage { expected: String, found: String },

    #[error("Snapshot belongs to a different network")]
    WrongNetwork,

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] bincode::Error),

    #[error("Snapshot I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A snapshot file bound to a magic message and a network.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    magic: &'static str,
    network: Network,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>, magic: &'static str, network: Network) -> Self {
        SnapshotFile { path: path.into(), magic, network }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encode<T: Serialize>(&self, body: &T) -> Result<Vec<u8>, SnapshotError> {
        let mut data = bincode::serialize(self.magic)?;
        data.extend_from_slice(&self.network.magic());
        data.extend_from_slice(&bincode::serialize(body)?);
        let sum = checksum(&data);
        data.extend_from_slice(&sum);
        Ok(data)
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, SnapshotError> {
        if data.len() < CHECKSUM_LEN {
            return Err(SnapshotError::Truncated);
        }
        let (payload, sum) = data.split_at(data.len() - CHECKSUM_LEN);
        if checksum(payload) != sum {
            return Err(SnapshotError::ChecksumMismatch);
        }

        let mut reader = payload;
        let found: String = bincode::deserialize_from(&mut reader).map_err(|_| SnapshotError::WrongMagicMessage {
            expected: self.magic.to_string(),
            found: String::new(),
        })?;
        if found != self.magic {
            return Err(SnapshotError::WrongMagicMessage { expected: self.magic.to_string(), found });
        }

        if reader.len() < 4 {
            return Err(SnapshotError::Truncated);
        }
        let (network_magic, body) = reader.split_at(4);
        if network_magic != self.network.magic() {
            return Err(SnapshotError::WrongNetwork);
        }
        Ok(bincode::deserialize(body)?)
    }

    /// Writes `body` through a temporary file renamed into place.
    pub fn write<T: Serialize>(&self, body: &T) -> Result<(), SnapshotError> {
        let data = self.encode(body)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!("Wrote {} ({} bytes) to {}", self.magic, data.len(), self.path.display());
        Ok(())
    }

    pub fn read<T: DeserializeOwned>(&self) -> Result<T, SnapshotError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SnapshotError::Missing(self.path.clone())),
            Err(e) => return Err(e.into()),
        };
        debug!("Read {} bytes from {}", data.len(), self.path.display());
        self.decode(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> SnapshotFile {
        SnapshotFile::new("unused.dat", PAYMENTS_MAGIC, Network::Regtest)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let body = vec![(1u64, "a".to_string()), (2, "b".to_string())];
        let data = file().encode(&body).unwrap();
        let decoded: Vec<(u64, String)> = file().decode(&data).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn detects_each_failure() {
        let data = file().encode(&7u32).unwrap();

        assert!(matches!(file().decode::<u32>(&data[..40]), Err(SnapshotError::ChecksumMismatch)));
        assert!(matches!(file().decode::<u32>(&data[..4]), Err(SnapshotError::Truncated)));

        let mut flipped = data.clone();
        flipped[20] ^= 0x01;
        assert!(matches!(file().decode::<u32>(&flipped), Err(SnapshotError::ChecksumMismatch)));

        let other_magic = SnapshotFile::new("unused.dat", REGISTRY_MAGIC, Network::Regtest);
        assert!(matches!(
            other_magic.decode::<u32>(&data),
            Err(SnapshotError::WrongMagicMessage { .. })
        ));

        let other_network = SnapshotFile::new("unused.dat", PAYMENTS_MAGIC, Network::Mainnet);
        assert!(matches!(other_network.decode::<u32>(&data), Err(SnapshotError::WrongNetwork)));

        assert!(matches!(file().decode::<String>(&data), Err(SnapshotError::Malformed(_))));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = SnapshotFile::new(dir.path().join("mncache.dat"), REGISTRY_MAGIC, Network::Regtest);
        assert!(matches!(missing.read::<u32>(), Err(SnapshotError::Missing(_))));

        missing.write(&42u32).unwrap();
        assert_eq!(missing.read::<u32>().unwrap(), 42);
    }
}
