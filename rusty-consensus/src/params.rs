//! Per-network chain parameters.

use serde::{Deserialize, Serialize};

use crate::error::ConsensusError;
use crate::upgrades::{Activation, NetworkUpgrade, RewardSplit, UpgradeGate, UpgradeIndex};

/// Number of base units in one coin.
pub const COIN: u64 = 100_000_000;

/// Target block spacing in seconds.
pub const BLOCK_SPACING_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Returns the magic bytes for this network.
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0x24, 0xc8, 0x27, 0x64],
            Network::Testnet => [0xfa, 0x1a, 0xf9, 0xbf],
            Network::Regtest => [0xaa, 0xe8, 0x3f, 0x5f],
        }
    }

    /// Returns the default port for this network. Masternodes must listen on it.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 16113,
            Network::Testnet => 26113,
            Network::Regtest => 26114,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }
}

/// Consensus constants for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: Network,
    pub upgrades: UpgradeGate,
    /// Collateral before canonical signatures activate.
    pub collateral: u64,
    /// Collateral once canonical signatures are active.
    pub upgraded_collateral: u64,
    /// Collateral lock period while time-locking is active.
    pub lock_seconds: i64,
    /// Ping silence after which a time-locked masternode starts unlocking.
    pub start_unlock_seconds: i64,
    pub initial_subsidy: u64,
    pub halving_interval: u64,
}

impl ChainParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    pub fn mainnet() -> Self {
        let upgrades = upgrade_table([
            Activation::Always,
            Activation::Never,
            Activation::AtHeight(520_000),
            Activation::AtHeight(765_000),
            Activation::AtHeight(1_545_000),
            Activation::AtHeight(2_167_200),
            Activation::AtHeight(2_844_000),
            Activation::AtHeight(3_730_000),
        ]);
        ChainParams {
            network: Network::Mainnet,
            upgrades,
            collateral: 10_000 * COIN,
            upgraded_collateral: 20_000 * COIN,
            lock_seconds: 14 * 1440 * BLOCK_SPACING_SECONDS,
            start_unlock_seconds: 2 * 60 * 60,
            initial_subsidy: 50 * COIN,
            halving_interval: 1_051_200,
        }
    }

    pub fn testnet() -> Self {
        let upgrades = upgrade_table([
            Activation::Always,
            Activation::Never,
            Activation::AtHeight(350),
            Activation::AtHeight(500),
            Activation::AtHeight(700),
            Activation::AtHeight(1_000),
            Activation::AtHeight(1_200),
            Activation::AtHeight(1_500),
        ]);
        ChainParams {
            network: Network::Testnet,
            upgrades,
            collateral: 10_000 * COIN,
            upgraded_collateral: 20_000 * COIN,
            lock_seconds: 1440 * BLOCK_SPACING_SECONDS,
            start_unlock_seconds: 2 * 60 * 60,
            initial_subsidy: 50 * COIN,
            halving_interval: 1_051_200,
        }
    }

    pub fn regtest() -> Self {
        let upgrades = upgrade_table([
            Activation::Always,
            Activation::Never,
            Activation::AtHeight(1),
            Activation::AtHeight(2),
            Activation::AtHeight(3),
            Activation::AtHeight(10_000),
            Activation::AtHeight(20_000),
            Activation::AtHeight(30_000),
        ]);
        ChainParams {
            network: Network::Regtest,
            upgrades,
            collateral: 10_000 * COIN,
            upgraded_collateral: 20_000 * COIN,
            lock_seconds: 144 * BLOCK_SPACING_SECONDS,
            start_unlock_seconds: 2 * 60 * 60,
            initial_subsidy: 50 * COIN,
            halving_interval: 150,
        }
    }

    /// Replaces the upgrade table, validating it first.
    pub fn with_upgrades(mut self, upgrades: Vec<NetworkUpgrade>) -> Result<Self, ConsensusError> {
        self.upgrades = UpgradeGate::new(upgrades)?;
        Ok(self)
    }

    /// Exact collateral value a masternode must lock at `height`.
    pub fn collateral_amount(&self, height: u64) -> u64 {
        if self.upgrades.is_active(height, UpgradeIndex::CanonicalSignatures) {
            self.upgraded_collateral
        } else {
            self.collateral
        }
    }

    /// Collateral lock period at `height`, zero before time-locking activates.
    pub fn lock_seconds(&self, height: u64) -> i64 {
        if !self.upgrades.is_active(height, UpgradeIndex::CollateralTimelock) {
            0
        } else if self.upgrades.is_active(height, UpgradeIndex::ShortTimelock) {
            self.lock_seconds / 2
        } else {
            self.lock_seconds
        }
    }

    pub fn start_unlock_seconds(&self) -> i64 {
        self.start_unlock_seconds
    }

    pub fn block_subsidy(&self, height: u64) -> u64 {
        if self.halving_interval == 0 {
            return self.initial_subsidy;
        }
        let halvings = height / self.halving_interval;
        if halvings >= 64 {
            0
        } else {
            self.initial_subsidy >> halvings
        }
    }
}

fn upgrade_table(activations: [Activation; UpgradeIndex::COUNT]) -> UpgradeGate {
    const PROTOCOL_VERSIONS: [u32; UpgradeIndex::COUNT] =
        [170_006, 170_006, 170_007, 170_008, 170_009, 170_010, 170_011, 170_012];
    const SPLITS: [RewardSplit; UpgradeIndex::COUNT] = [
        RewardSplit { masternode_pct: 45, development_pct: 0 },
        RewardSplit { masternode_pct: 45, development_pct: 0 },
        RewardSplit { masternode_pct: 45, development_pct: 0 },
        RewardSplit { masternode_pct: 50, development_pct: 0 },
        RewardSplit { masternode_pct: 50, development_pct: 5 },
        RewardSplit { masternode_pct: 55, development_pct: 5 },
        RewardSplit { masternode_pct: 55, development_pct: 5 },
        RewardSplit { masternode_pct: 60, development_pct: 5 },
    ];

    let upgrades = activations
        .iter()
        .enumerate()
        .map(|(i, activation)| NetworkUpgrade {
            protocol_version: PROTOCOL_VERSIONS[i],
            activation: *activation,
            reward_split: SPLITS[i],
        })
        .collect();

    UpgradeGate::from_trusted(upgrades)
}
