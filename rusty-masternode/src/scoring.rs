//! Deterministic masternode scoring.
//!
//! A score mixes a block hash with a collateral outpoint so that every node
//! derives the same ordering of the masternode set for a given block, while
//! the ordering changes unpredictably from block to block.

use primitive_types::U256;

use rusty_crypto::{sha256d, HashWriter};
use rusty_shared_types::{Hash, OutPoint};

use crate::chain::ChainView;

/// `|H(block_hash) - H(block_hash ‖ (txid + vout))|` as 256-bit integers.
pub fn score(outpoint: &OutPoint, block_hash: &Hash) -> U256 {
    let (aux, _) = U256::from_little_endian(&outpoint.txid).overflowing_add(U256::from(outpoint.vout));
    let mut aux_bytes = [0u8; 32];
    aux.to_little_endian(&mut aux_bytes);

    let block_only = U256::from_little_endian(&sha256d(block_hash));
    let mixed = U256::from_little_endian(
        &HashWriter::new().write_raw(block_hash).write_raw(&aux_bytes).finalize(),
    );

    if mixed > block_only {
        mixed - block_only
    } else {
        block_only - mixed
    }
}

/// Score against the main-chain block at `height`; `None` while that block is unknown.
pub fn compute_score(chain: &dyn ChainView, outpoint: &OutPoint, height: u64) -> Option<U256> {
    chain.block_hash(height).map(|hash| score(outpoint, &hash))
}

/// Orders candidates by ascending score for `block_hash`, ties broken by outpoint.
pub fn rank_candidates<'a, I>(candidates: I, block_hash: &Hash) -> Vec<(OutPoint, U256)>
where
    I: IntoIterator<Item = &'a OutPoint>,
{
    let mut scored: Vec<(OutPoint, U256)> = candidates
        .into_iter()
        .map(|outpoint| (*outpoint, score(outpoint, block_hash)))
        .collect();
    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored
}
