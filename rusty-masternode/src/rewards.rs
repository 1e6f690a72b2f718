//! Block reward amounts the payout rule is checked against.

use std::sync::Arc;

use rusty_consensus::ChainParams;

pub trait RewardResolver: Send + Sync {
    /// Total newly minted value of the block at `height`.
    fn block_subsidy(&self, height: u64) -> u64;

    /// Minimum amount a block at `height` must pay its masternode.
    fn masternode_payment(&self, height: u64) -> u64;
}

/// Halving subsidy split according to the upgrade active at each height.
#[derive(Debug, Clone)]
pub struct StagedRewards {
    params: Arc<ChainParams>,
}

impl StagedRewards {
    pub fn new(params: Arc<ChainParams>) -> Self {
        StagedRewards { params }
    }

    pub fn development_payment(&self, height: u64) -> u64 {
        self.params
            .upgrades
            .reward_split(height)
            .development_share(self.block_subsidy(height))
    }
}

impl RewardResolver for StagedRewards {
    fn block_subsidy(&self, height: u64) -> u64 {
        self.params.block_subsidy(height)
    }

    fn masternode_payment(&self, height: u64) -> u64 {
        self.params
            .upgrades
            .reward_split(height)
            .masternode_share(self.block_subsidy(height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusty_consensus::COIN;

    #[test]
    fn regtest_rewards_follow_stages_and_halvings() {
        let rewards = StagedRewards::new(Arc::new(ChainParams::regtest()));
        assert_eq!(rewards.block_subsidy(0), 50 * COIN);
        assert_eq!(rewards.block_subsidy(150), 25 * COIN);

        // Base split before height 2, increased masternode share from there.
        assert_eq!(rewards.masternode_payment(0), 50 * COIN * 45 / 100);
        assert_eq!(rewards.masternode_payment(2), 50 * COIN / 2);
        assert_eq!(rewards.development_payment(2), 0);
        assert_eq!(rewards.development_payment(3), 50 * COIN * 5 / 100);
        assert_eq!(rewards.masternode_payment(150), 25 * COIN / 2);
    }
}
