//! Read-only view of the chain the masternode subsystem validates against.
//!
//! The chain engine owns block and UTXO state behind its own lock. Every
//! validation call receives a [`ChainView`] and takes its tip reading before
//! touching registry or ledger state, which keeps the lock order fixed:
//! chain first, then masternode structures.

use std::collections::HashMap;
use std::sync::RwLock;

use rusty_crypto::HashWriter;
use rusty_shared_types::{Hash, OutPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash,
}

/// An unspent output as seen by the chain engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub value: u64,
    pub script_pubkey: Vec<u8>,
    /// Height of the block that created the output.
    pub height: u64,
}

pub trait ChainView: Send + Sync {
    /// Current main-chain tip, waiting for the chain lock if needed.
    fn tip(&self) -> Option<ChainTip>;

    /// Best-effort tip read that returns `None` instead of waiting when the
    /// chain lock is held elsewhere.
    fn try_tip(&self) -> Option<ChainTip> {
        self.tip()
    }

    /// Hash of the main-chain block at `height`.
    fn block_hash(&self, height: u64) -> Option<Hash>;

    /// Height of `hash` if it is on the main chain.
    fn block_height(&self, hash: &Hash) -> Option<u64>;

    /// Header timestamp of the main-chain block at `height`.
    fn block_time(&self, height: u64) -> Option<i64>;

    /// Unspent output at `outpoint`, `None` if unknown or spent.
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin>;

    /// Network-adjusted wall clock in seconds.
    fn adjusted_time(&self) -> i64;
}

#[derive(Debug, Default)]
struct MemoryChainState {
    blocks: Vec<(Hash, i64)>,
    index: HashMap<Hash, u64>,
    coins: HashMap<OutPoint, Coin>,
    time: i64,
}

/// In-memory [`ChainView`] used by regtest tooling and tests.
///
/// Block hashes are derived from the height and a seed, so two chains built
/// with different seeds share no blocks.
#[derive(Debug, Default)]
pub struct MemoryChain {
    seed: u64,
    state: RwLock<MemoryChainState>,
}

impl MemoryChain {
    pub fn new(seed: u64) -> Self {
        MemoryChain { seed, state: RwLock::new(MemoryChainState::default()) }
    }

    /// Appends `count` blocks spaced `spacing` seconds apart and moves the
    /// clock to the newest block time.
    pub fn extend(&self, count: u64, spacing: i64) {
        let mut state = self.write();
        for _ in 0..count {
            let height = state.blocks.len() as u64;
            let time = state.blocks.last().map(|(_, t)| t + spacing).unwrap_or(state.time);
            let hash = HashWriter::new().write_u64(self.seed).write_u64(height).finalize();
            state.blocks.push((hash, time));
            state.index.insert(hash, height);
            state.time = state.time.max(time);
        }
    }

    /// Sets the time of the first block; only meaningful on an empty chain.
    pub fn set_genesis_time(&self, time: i64) {
        let mut state = self.write();
        if state.blocks.is_empty() {
            state.time = time;
        }
    }

    pub fn set_time(&self, time: i64) {
        self.write().time = time;
    }

    pub fn advance_time(&self, seconds: i64) {
        self.write().time += seconds;
    }

    pub fn add_coin(&self, outpoint: OutPoint, coin: Coin) {
        self.write().coins.insert(outpoint, coin);
    }

    pub fn spend(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.write().coins.remove(outpoint)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryChainState> {
        match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryChainState> {
        match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChainView for MemoryChain {
    fn tip(&self) -> Option<ChainTip> {
        let state = self.read();
        let height = state.blocks.len().checked_sub(1)?;
        Some(ChainTip { height: height as u64, hash: state.blocks[height].0 })
    }

    fn try_tip(&self) -> Option<ChainTip> {
        let state = self.state.try_read().ok()?;
        let height = state.blocks.len().checked_sub(1)?;
        Some(ChainTip { height: height as u64, hash: state.blocks[height].0 })
    }

    fn block_hash(&self, height: u64) -> Option<Hash> {
        self.read().blocks.get(height as usize).map(|(hash, _)| *hash)
    }

    fn block_height(&self, hash: &Hash) -> Option<u64> {
        self.read().index.get(hash).copied()
    }

    fn block_time(&self, height: u64) -> Option<i64> {
        self.read().blocks.get(height as usize).map(|(_, time)| *time)
    }

    fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.read().coins.get(outpoint).cloned()
    }

    fn adjusted_time(&self) -> i64 {
        self.read().time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_builds_indexed_chain() {
        let chain = MemoryChain::new(1);
        assert!(chain.tip().is_none());

        chain.set_genesis_time(1_000);
        chain.extend(10, 60);
        let tip = chain.tip().unwrap();
        assert_eq!(tip.height, 9);
        assert_eq!(chain.block_hash(9), Some(tip.hash));
        assert_eq!(chain.block_height(&tip.hash), Some(9));
        assert_eq!(chain.block_time(0), Some(1_000));
        assert_eq!(chain.block_time(9), Some(1_540));
        assert_eq!(chain.adjusted_time(), 1_540);
        assert_eq!(chain.block_hash(10), None);
    }

    #[test]
    fn seeds_produce_distinct_chains() {
        let a = MemoryChain::new(1);
        let b = MemoryChain::new(2);
        a.extend(1, 60);
        b.extend(1, 60);
        assert_ne!(a.block_hash(0), b.block_hash(0));
        assert_eq!(a.block_height(&b.block_hash(0).unwrap()), None);
    }

    #[test]
    fn coins_can_be_spent() {
        let chain = MemoryChain::new(1);
        let op = OutPoint::new([5u8; 32], 0);
        chain.add_coin(op, Coin { value: 10, script_pubkey: vec![], height: 0 });
        assert_eq!(chain.coin(&op).map(|c| c.value), Some(10));
        assert!(chain.spend(&op).is_some());
        assert!(chain.coin(&op).is_none());
    }

    #[test]
    fn try_tip_gives_up_while_locked() {
        let chain = MemoryChain::new(1);
        chain.extend(3, 60);
        let guard = chain.state.write().unwrap();
        assert!(chain.try_tip().is_none());
        drop(guard);
        assert_eq!(chain.try_tip().map(|t| t.height), Some(2));
    }
}
