pub mod error;
pub mod params;
pub mod upgrades;

pub use error::ConsensusError;
pub use params::{ChainParams, Network, BLOCK_SPACING_SECONDS, COIN};
pub use upgrades::{Activation, NetworkUpgrade, RewardSplit, UpgradeGate, UpgradeIndex, UpgradeState};
