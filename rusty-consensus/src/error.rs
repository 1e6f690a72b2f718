use thiserror::Error;

use crate::upgrades::UpgradeIndex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Upgrade table has {0} entries, expected {1}")]
    UpgradeTableLength(usize, usize),

    #[error("Upgrade {stage:?} activates at height {height}, before the preceding upgrade at {previous}")]
    NonMonotonicActivation {
        stage: UpgradeIndex,
        height: u64,
        previous: u64,
    },

    #[error("Upgrade {0:?} must always be active")]
    BaseNotAlwaysActive(UpgradeIndex),

    #[error("Protocol version of {stage:?} ({version}) is lower than its predecessor ({previous})")]
    ProtocolVersionRegression {
        stage: UpgradeIndex,
        version: u32,
        previous: u32,
    },

    #[error("Reward split of {0:?} exceeds 100%")]
    InvalidRewardSplit(UpgradeIndex),
}
