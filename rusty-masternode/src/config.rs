//! Masternode subsystem configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use rusty_consensus::Network;
use rusty_crypto::RustyKeyPair;
use rusty_shared_types::OutPoint;

pub const MIN_CONFIRMATIONS: u64 = 15;
pub const MIN_PING_SECONDS: i64 = 10 * 60;
pub const PING_SECONDS: i64 = 5 * 60;
pub const EXPIRATION_SECONDS: i64 = 120 * 60;
pub const REMOVAL_SECONDS: i64 = 130 * 60;
pub const CHECK_SECONDS: i64 = 5;
pub const MAX_CLOCK_DRIFT_SECONDS: i64 = 60 * 60;
pub const PING_ANCHOR_DEPTH: u64 = 12;
pub const MAX_PING_ANCHOR_DEPTH: u64 = 24;
pub const SIGNATURES_REQUIRED: usize = 6;
pub const SIGNATURES_TOTAL: usize = 10;
pub const VOTE_LOOKAHEAD: u64 = 20;
pub const RANKING_LAG: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid local masternode setting: {0}")]
    InvalidLocalMasternode(String),
}

/// Identity of the masternode this node operates, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalMasternodeConfig {
    /// Collateral transaction id, hex encoded.
    pub collateral_txid: String,
    pub collateral_vout: u32,
    /// 32-byte operator secret key, hex encoded.
    pub operator_secret: String,
}

impl LocalMasternodeConfig {
    pub fn outpoint(&self) -> Result<OutPoint, ConfigError> {
        let bytes = hex::decode(&self.collateral_txid)
            .map_err(|e| ConfigError::InvalidLocalMasternode(format!("collateral_txid: {}", e)))?;
        let txid: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidLocalMasternode("collateral_txid must be 32 bytes".to_string()))?;
        Ok(OutPoint::new(txid, self.collateral_vout))
    }

    pub fn operator_keypair(&self) -> Result<RustyKeyPair, ConfigError> {
        let secret = hex::decode(&self.operator_secret)
            .map_err(|e| ConfigError::InvalidLocalMasternode(format!("operator_secret: {}", e)))?;
        RustyKeyPair::from_secret_bytes(&secret)
            .map_err(|e| ConfigError::InvalidLocalMasternode(format!("operator_secret: {}", e)))
    }
}

/// Tunables of the masternode subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MasternodeConfig {
    pub network: Network,
    /// Directory holding `mncache.dat` and `mnpayments.dat`.
    pub data_dir: PathBuf,
    /// Confirmations the collateral needs before a broadcast is accepted.
    pub min_confirmations: u64,
    /// Minimum spacing between accepted pings (less a one minute grace) and
    /// the warm-up an entry spends in `PreEnabled`.
    pub min_ping_seconds: i64,
    /// How often the local masternode pings.
    pub ping_seconds: i64,
    /// Ping silence after which an entry expires.
    pub expiration_seconds: i64,
    /// Ping silence after which an entry is removed.
    pub removal_seconds: i64,
    /// Minimum spacing between non-forced state checks of one entry.
    pub check_seconds: i64,
    /// Accepted distance of signature times from adjusted time.
    pub max_clock_drift_seconds: i64,
    /// How far behind the tip a freshly created ping is anchored.
    pub ping_anchor_depth: u64,
    /// Deepest anchor a received ping may use.
    pub max_ping_anchor_depth: u64,
    /// Votes a payee needs before blocks are required to pay it.
    pub signatures_required: usize,
    /// Size of the voting quorum.
    pub signatures_total: usize,
    /// Blocks above the tip that may already be voted on.
    pub vote_lookahead: u64,
    /// Blocks between the ranking anchor and the height voted on.
    pub ranking_lag: u64,
    pub maintenance_interval_secs: u64,
    pub checkpoint_interval_secs: u64,
    pub local_masternode: Option<LocalMasternodeConfig>,
}

impl Default for MasternodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            data_dir: PathBuf::from("data"),
            min_confirmations: MIN_CONFIRMATIONS,
            min_ping_seconds: MIN_PING_SECONDS,
            ping_seconds: PING_SECONDS,
            expiration_seconds: EXPIRATION_SECONDS,
            removal_seconds: REMOVAL_SECONDS,
            check_seconds: CHECK_SECONDS,
            max_clock_drift_seconds: MAX_CLOCK_DRIFT_SECONDS,
            ping_anchor_depth: PING_ANCHOR_DEPTH,
            max_ping_anchor_depth: MAX_PING_ANCHOR_DEPTH,
            signatures_required: SIGNATURES_REQUIRED,
            signatures_total: SIGNATURES_TOTAL,
            vote_lookahead: VOTE_LOOKAHEAD,
            ranking_lag: RANKING_LAG,
            maintenance_interval_secs: CHECK_SECONDS as u64,
            checkpoint_interval_secs: 15 * 60,
            local_masternode: None,
        }
    }
}

impl MasternodeConfig {
    pub fn for_network(network: Network) -> Self {
        Self { network, ..Self::default() }
    }

    /// Loads a TOML config file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn registry_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("mncache.dat")
    }

    pub fn payments_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("mnpayments.dat")
    }
}
