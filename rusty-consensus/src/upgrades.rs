//! Height-indexed network upgrade table.
//!
//! Every consensus rule that changes over the life of the chain asks the
//! [`UpgradeGate`] whether the upgrade introducing it is active at the height
//! being validated: message signing format, minimum protocol version, reward
//! split, collateral size and collateral time-locking.

use serde::{Deserialize, Serialize};

use rusty_shared_types::masternode::MessageScheme;

use crate::error::ConsensusError;

/// Upgrades in activation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UpgradeIndex {
    /// Rules in force since genesis.
    Base,
    /// Placeholder slot for exercising upgrade machinery; never activates on a real network.
    Reserved,
    /// Shielded transaction support.
    Shielded,
    /// Larger masternode share of the block reward.
    MasternodeRewardIncrease,
    /// Development fund carved out of the block reward.
    DevelopmentFund,
    /// Hash-based message signing becomes mandatory and collateral doubles.
    CanonicalSignatures,
    /// Collateral time-locking: `ReEnabled`/`Unlocking` states and extended expiry.
    CollateralTimelock,
    /// Collateral lock period halved.
    ShortTimelock,
}

impl UpgradeIndex {
    pub const COUNT: usize = 8;

    pub const ALL: [UpgradeIndex; UpgradeIndex::COUNT] = [
        UpgradeIndex::Base,
        UpgradeIndex::Reserved,
        UpgradeIndex::Shielded,
        UpgradeIndex::MasternodeRewardIncrease,
        UpgradeIndex::DevelopmentFund,
        UpgradeIndex::CanonicalSignatures,
        UpgradeIndex::CollateralTimelock,
        UpgradeIndex::ShortTimelock,
    ];

    fn position(self) -> usize {
        self as usize
    }
}

/// When an upgrade takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Always,
    AtHeight(u64),
    Never,
}

impl Activation {
    fn is_active_at(&self, height: u64) -> bool {
        match self {
            Activation::Always => true,
            Activation::AtHeight(h) => height >= *h,
            Activation::Never => false,
        }
    }
}

/// Percentages of the block subsidy paid to masternodes and the development fund.
/// The miner keeps the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSplit {
    pub masternode_pct: u8,
    pub development_pct: u8,
}

impl RewardSplit {
    pub fn miner_pct(&self) -> u8 {
        100u8.saturating_sub(self.masternode_pct).saturating_sub(self.development_pct)
    }

    pub fn masternode_share(&self, subsidy: u64) -> u64 {
        (subsidy as u128 * self.masternode_pct as u128 / 100) as u64
    }

    pub fn development_share(&self, subsidy: u64) -> u64 {
        (subsidy as u128 * self.development_pct as u128 / 100) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkUpgrade {
    /// Protocol version peers must speak once the upgrade is active.
    pub protocol_version: u32,
    pub activation: Activation,
    pub reward_split: RewardSplit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeState {
    Disabled,
    Pending,
    Active,
}

/// Validated upgrade table answering "is rule X in force at height H".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeGate {
    upgrades: Vec<NetworkUpgrade>,
}

impl UpgradeGate {
    /// Builds a gate from one entry per [`UpgradeIndex`], in index order.
    ///
    /// Rejects tables whose activation heights go backwards, whose base entry
    /// is not `Always`, whose protocol versions regress, or whose reward split
    /// exceeds the whole subsidy. `Never` entries are ignored for ordering.
    pub fn new(upgrades: Vec<NetworkUpgrade>) -> Result<Self, ConsensusError> {
        if upgrades.len() != UpgradeIndex::COUNT {
            return Err(ConsensusError::UpgradeTableLength(upgrades.len(), UpgradeIndex::COUNT));
        }
        if upgrades[0].activation != Activation::Always {
            return Err(ConsensusError::BaseNotAlwaysActive(UpgradeIndex::Base));
        }

        let mut previous_height = 0u64;
        let mut previous_version = 0u32;
        for (stage, upgrade) in UpgradeIndex::ALL.iter().zip(upgrades.iter()) {
            let split = upgrade.reward_split;
            if split.masternode_pct as u16 + split.development_pct as u16 > 100 {
                return Err(ConsensusError::InvalidRewardSplit(*stage));
            }
            let height = match upgrade.activation {
                Activation::Never => continue,
                Activation::Always => 0,
                Activation::AtHeight(h) => h,
            };
            if height < previous_height {
                return Err(ConsensusError::NonMonotonicActivation {
                    stage: *stage,
                    height,
                    previous: previous_height,
                });
            }
            if upgrade.protocol_version < previous_version {
                return Err(ConsensusError::ProtocolVersionRegression {
                    stage: *stage,
                    version: upgrade.protocol_version,
                    previous: previous_version,
                });
            }
            previous_height = height;
            previous_version = upgrade.protocol_version;
        }

        Ok(UpgradeGate { upgrades })
    }

    /// Built-in network tables, checked by the params tests.
    pub(crate) fn from_trusted(upgrades: Vec<NetworkUpgrade>) -> Self {
        UpgradeGate { upgrades }
    }

    pub fn upgrades(&self) -> &[NetworkUpgrade] {
        &self.upgrades
    }

    pub fn upgrade(&self, stage: UpgradeIndex) -> &NetworkUpgrade {
        &self.upgrades[stage.position()]
    }

    pub fn is_active(&self, height: u64, stage: UpgradeIndex) -> bool {
        self.upgrade(stage).activation.is_active_at(height)
    }

    pub fn state(&self, height: u64, stage: UpgradeIndex) -> UpgradeState {
        match self.upgrade(stage).activation {
            Activation::Never => UpgradeState::Disabled,
            activation if activation.is_active_at(height) => UpgradeState::Active,
            _ => UpgradeState::Pending,
        }
    }

    /// Highest upgrade in force at `height`.
    pub fn stage_at(&self, height: u64) -> UpgradeIndex {
        UpgradeIndex::ALL
            .iter()
            .rev()
            .copied()
            .find(|stage| self.is_active(height, *stage))
            .unwrap_or(UpgradeIndex::Base)
    }

    /// The first upgrade still pending at `height`, with its activation height.
    pub fn next_activation(&self, height: u64) -> Option<(UpgradeIndex, u64)> {
        UpgradeIndex::ALL.iter().find_map(|stage| match self.upgrade(*stage).activation {
            Activation::AtHeight(h) if h > height => Some((*stage, h)),
            _ => None,
        })
    }

    pub fn is_activation_height(&self, height: u64, stage: UpgradeIndex) -> bool {
        self.upgrade(stage).activation == Activation::AtHeight(height)
    }

    pub fn min_protocol_version(&self, height: u64) -> u32 {
        self.upgrade(self.stage_at(height)).protocol_version
    }

    pub fn reward_split(&self, height: u64) -> RewardSplit {
        self.upgrade(self.stage_at(height)).reward_split
    }

    /// Scheme used for messages created for `height`.
    pub fn preferred_scheme(&self, height: u64) -> MessageScheme {
        if self.is_active(height, UpgradeIndex::CanonicalSignatures) {
            MessageScheme::Canonical
        } else {
            MessageScheme::Legacy
        }
    }

    /// Whether a message signed with `scheme` is acceptable at `height`.
    /// Both schemes are valid until canonical signing becomes mandatory.
    pub fn accepts_scheme(&self, height: u64, scheme: MessageScheme) -> bool {
        scheme == MessageScheme::Canonical || !self.is_active(height, UpgradeIndex::CanonicalSignatures)
    }
}
