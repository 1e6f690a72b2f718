//! Payment votes and the per-height payee tallies built from them.
//!
//! Every ranked masternode votes for the payee of upcoming blocks. A payee
//! that collects `signatures_required` votes for a height becomes mandatory:
//! a block at that height must pay it at least the masternode reward.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use rusty_consensus::{ChainParams, Network};
use rusty_shared_types::masternode::PaymentVote;
use rusty_shared_types::{Hash, OutPoint, PeerId, TxOutput};

use crate::chain::ChainView;
use crate::config::MasternodeConfig;
use crate::error::{MasternodeError, MessageKind, MISBEHAVIOR_VOTE};
use crate::registry::MasternodeRegistry;
use crate::signing::SignedMessage;

/// Votes never expire sooner than this many blocks.
pub const MIN_VOTE_RETENTION_BLOCKS: u64 = 1000;

/// How many blocks ahead a payee counts as already scheduled.
pub const SCHEDULE_LOOKAHEAD: u64 = 8;

/// Number of blocks covering `count` masternodes with a 25% margin.
pub fn with_margin(count: usize) -> u64 {
    (count as u64 * 5) / 4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayeeVotes {
    pub script: Vec<u8>,
    pub votes: usize,
}

/// Vote counts per payee for one block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayees {
    pub height: u64,
    pub payees: Vec<PayeeVotes>,
}

impl BlockPayees {
    pub fn new(height: u64) -> Self {
        BlockPayees { height, payees: Vec::new() }
    }

    pub fn add_vote(&mut self, script: &[u8]) {
        match self.payees.iter_mut().find(|p| p.script == script) {
            Some(payee) => payee.votes += 1,
            None => self.payees.push(PayeeVotes { script: script.to_vec(), votes: 1 }),
        }
    }

    pub fn max_votes(&self) -> usize {
        self.payees.iter().map(|p| p.votes).max().unwrap_or(0)
    }

    /// Payees with at least `required` votes, most votes first, then by script.
    pub fn winners(&self, required: usize) -> Vec<PayeeVotes> {
        let mut winners: Vec<PayeeVotes> = self.payees.iter().filter(|p| p.votes >= required).cloned().collect();
        winners.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.script.cmp(&b.script)));
        winners
    }

    /// The payee with the most votes; ties go to the lowest script.
    pub fn best_payee(&self) -> Option<Vec<u8>> {
        self.winners(1).into_iter().next().map(|p| p.script)
    }

    pub fn has_payee_with_votes(&self, script: &[u8], votes: usize) -> bool {
        self.payees.iter().any(|p| p.script == script && p.votes >= votes)
    }

    pub fn required_payments_string(&self) -> String {
        let mut payees = self.payees.clone();
        payees.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.script.cmp(&b.script)));
        payees
            .iter()
            .map(|p| format!("{}:{}", hex::encode(&p.script), p.votes))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Quorum decision for one height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayeeTally {
    /// No payee has enough votes; any payout is acceptable.
    Undetermined,
    /// Payees that reached the threshold, most votes first.
    Determined(Vec<PayeeVotes>),
}

/// An accepted vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteAccepted {
    pub hash: Hash,
    pub rank: usize,
    /// Penalty owed by the sender even though the vote was tallied.
    pub misbehavior: i32,
}

#[derive(Debug, Default)]
struct VoteBook {
    votes: HashMap<Hash, PaymentVote>,
    /// First accepted vote of each masternode per height.
    cast: HashMap<(OutPoint, u64), Hash>,
}

/// Serialized form of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub votes: Vec<PaymentVote>,
    pub blocks: Vec<BlockPayees>,
}

/// Lock order: `votes` before `blocks`.
pub struct PaymentVoteLedger {
    params: Arc<ChainParams>,
    config: MasternodeConfig,
    votes: Mutex<VoteBook>,
    blocks: Mutex<BTreeMap<u64, BlockPayees>>,
    sync_requests: Mutex<HashSet<PeerId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PaymentVoteLedger {
    pub fn new(params: Arc<ChainParams>, config: MasternodeConfig) -> Self {
        PaymentVoteLedger {
            params,
            config,
            votes: Mutex::new(VoteBook::default()),
            blocks: Mutex::new(BTreeMap::new()),
            sync_requests: Mutex::new(HashSet::new()),
        }
    }

    /// Heights a vote may target when the tip is at `tip_height`.
    pub fn vote_range(&self, tip_height: u64, enabled: usize) -> (u64, u64) {
        (
            tip_height.saturating_sub(with_margin(enabled)),
            tip_height + self.config.vote_lookahead,
        )
    }

    /// Validates a vote and adds it to the tally of its height.
    ///
    /// Votes from masternodes ranked outside the quorum are still tallied;
    /// only ranks beyond twice the quorum size earn the sender a penalty,
    /// reported through [`VoteAccepted::misbehavior`].
    pub fn add_vote(
        &self,
        chain: &dyn ChainView,
        registry: &MasternodeRegistry,
        vote: &PaymentVote,
    ) -> Result<VoteAccepted, MasternodeError> {
        let hash = vote.message_hash();
        if lock(&self.votes).votes.contains_key(&hash) {
            return Err(MasternodeError::AlreadySeen(MessageKind::PaymentVote, hash));
        }

        let tip = chain.try_tip().ok_or(MasternodeError::ChainBusy)?;
        let minimum = self.params.upgrades.min_protocol_version(tip.height + 1);
        let enabled = registry.count_enabled(minimum);
        let (first, last) = self.vote_range(tip.height, enabled);
        if vote.height < first || vote.height > last {
            return Err(MasternodeError::VoteOutOfRange { height: vote.height, first, last });
        }

        let voter = registry
            .find(&vote.voter)
            .ok_or(MasternodeError::UnknownMasternode(vote.voter))?;
        if voter.protocol_version < minimum {
            return Err(MasternodeError::ObsoleteProtocol {
                outpoint: vote.voter,
                version: voter.protocol_version,
                minimum,
            });
        }
        if !self.params.upgrades.accepts_scheme(vote.height, vote.scheme) {
            return Err(MasternodeError::SchemeNotAccepted {
                kind: MessageKind::PaymentVote,
                outpoint: vote.voter,
                scheme: vote.scheme,
                height: vote.height,
            });
        }

        self.check_can_vote(vote, &voter.operator_pubkey)?;
        vote.check_signature(&voter.operator_pubkey)?;

        let anchor = vote
            .height
            .checked_sub(self.config.ranking_lag)
            .ok_or(MasternodeError::IndeterminateRank(0))?;
        let rank = registry
            .rank(chain, &vote.voter, anchor, minimum)?
            .ok_or(MasternodeError::NotAvailable(vote.voter))?;

        let total = self.config.signatures_total;
        let misbehavior = if rank > 2 * total {
            warn!("Masternode {} voted with rank {}, outside twice the quorum", vote.voter, rank);
            MISBEHAVIOR_VOTE
        } else {
            if rank > total {
                debug!("Masternode {} voted with rank {}, outside the quorum", vote.voter, rank);
            }
            0
        };

        {
            let mut book = lock(&self.votes);
            if book.votes.contains_key(&hash) {
                return Err(MasternodeError::AlreadySeen(MessageKind::PaymentVote, hash));
            }
            if let Some(previous) = book.cast.get(&(vote.voter, vote.height)) {
                let conflicting = book.votes.get(previous).map_or(false, |v| v.payee != vote.payee);
                return Err(MasternodeError::AlreadyVoted { voter: vote.voter, height: vote.height, conflicting });
            }
            book.votes.insert(hash, vote.clone());
            book.cast.insert((vote.voter, vote.height), hash);

            let mut blocks = lock(&self.blocks);
            blocks
                .entry(vote.height)
                .or_insert_with(|| BlockPayees::new(vote.height))
                .add_vote(&vote.payee);
        }

        debug!("Accepted payment vote from {} for height {}", vote.voter, vote.height);
        Ok(VoteAccepted { hash, rank, misbehavior })
    }

    /// One vote per masternode and height.
    ///
    /// A second vote only counts as conflicting once its signature proves the
    /// voter cast it; unverified ones are dropped as plain duplicates.
    fn check_can_vote(&self, vote: &PaymentVote, operator_pubkey: &[u8]) -> Result<(), MasternodeError> {
        let conflicting = {
            let book = lock(&self.votes);
            match book.cast.get(&(vote.voter, vote.height)) {
                Some(previous) => book.votes.get(previous).map_or(false, |v| v.payee != vote.payee),
                None => return Ok(()),
            }
        };
        let conflicting = conflicting && vote.check_signature(operator_pubkey).is_ok();
        Err(MasternodeError::AlreadyVoted { voter: vote.voter, height: vote.height, conflicting })
    }

    pub fn has_vote(&self, hash: &Hash) -> bool {
        lock(&self.votes).votes.contains_key(hash)
    }

    pub fn get_vote(&self, hash: &Hash) -> Option<PaymentVote> {
        lock(&self.votes).votes.get(hash).cloned()
    }

    pub fn vote_count(&self) -> usize {
        lock(&self.votes).votes.len()
    }

    pub fn block_count(&self) -> usize {
        lock(&self.blocks).len()
    }

    pub fn block_payees(&self, height: u64) -> Option<BlockPayees> {
        lock(&self.blocks).get(&height).cloned()
    }

    pub fn tally(&self, height: u64) -> PayeeTally {
        let required = self.config.signatures_required;
        match lock(&self.blocks).get(&height) {
            Some(payees) if payees.max_votes() >= required => PayeeTally::Determined(payees.winners(required)),
            _ => PayeeTally::Undetermined,
        }
    }

    /// Whether a coinbase paying `outputs` satisfies the quorum for `height`.
    pub fn is_transaction_valid(&self, height: u64, outputs: &[TxOutput], required_amount: u64) -> bool {
        match self.tally(height) {
            PayeeTally::Undetermined => true,
            PayeeTally::Determined(winners) => {
                let paid = outputs.iter().any(|output| {
                    output.value >= required_amount && winners.iter().any(|w| w.script == output.script_pubkey)
                });
                if !paid {
                    warn!(
                        "Missing required masternode payment at height {}, expected one of {}",
                        height,
                        self.required_payments_string(height)
                    );
                }
                paid
            }
        }
    }

    /// The payee with the most votes at `height`, regardless of the threshold.
    pub fn block_payee(&self, height: u64) -> Option<Vec<u8>> {
        lock(&self.blocks).get(&height).and_then(|p| p.best_payee())
    }

    pub fn has_payee_with_votes(&self, height: u64, script: &[u8], votes: usize) -> bool {
        lock(&self.blocks)
            .get(&height)
            .map_or(false, |p| p.has_payee_with_votes(script, votes))
    }

    /// Whether `script` is the leading payee of any block in the next
    /// [`SCHEDULE_LOOKAHEAD`] heights, ignoring `not_height`.
    pub fn is_scheduled(&self, script: &[u8], tip_height: u64, not_height: u64) -> bool {
        let blocks = lock(&self.blocks);
        (tip_height..=tip_height + SCHEDULE_LOOKAHEAD)
            .filter(|h| *h != not_height)
            .any(|h| blocks.get(&h).and_then(|p| p.best_payee()).map_or(false, |p| p == script))
    }

    pub fn required_payments_string(&self, height: u64) -> String {
        match lock(&self.blocks).get(&height) {
            Some(payees) if !payees.payees.is_empty() => payees.required_payments_string(),
            _ => "Unknown".to_string(),
        }
    }

    /// Answers a peer's request for recent votes with their hashes.
    ///
    /// On mainnet each peer may ask once; repeats are reported.
    pub fn handle_sync_request(
        &self,
        chain: &dyn ChainView,
        registry: &MasternodeRegistry,
        peer: PeerId,
        count_needed: u32,
    ) -> Result<Vec<Hash>, MasternodeError> {
        if self.params.network == Network::Mainnet && !lock(&self.sync_requests).insert(peer) {
            return Err(MasternodeError::RepeatedSyncRequest(peer));
        }

        let tip = chain.tip().ok_or(MasternodeError::ChainBusy)?;
        let minimum = self.params.upgrades.min_protocol_version(tip.height + 1);
        let needed = (count_needed as u64).min(with_margin(registry.count_enabled(minimum)));
        let first = tip.height.saturating_sub(needed);
        let last = tip.height + self.config.vote_lookahead;

        let mut selected: Vec<(u64, Hash)> = lock(&self.votes)
            .votes
            .iter()
            .filter(|(_, v)| v.height >= first && v.height <= last)
            .map(|(hash, v)| (v.height, *hash))
            .collect();
        selected.sort();
        debug!("Sending {} payment votes to peer {}", selected.len(), peer);
        Ok(selected.into_iter().map(|(_, hash)| hash).collect())
    }

    /// Forgets that `peer` asked for a sync, e.g. after it disconnected.
    pub fn forget_peer(&self, peer: PeerId) {
        lock(&self.sync_requests).remove(&peer);
    }

    /// Drops votes and tallies too far below the tip to matter.
    pub fn clean(&self, chain: &dyn ChainView, enabled: usize) -> usize {
        let tip = match chain.tip() {
            Some(tip) => tip,
            None => return 0,
        };
        let limit = with_margin(enabled).max(MIN_VOTE_RETENTION_BLOCKS);
        let oldest = tip.height.saturating_sub(limit);

        let mut book = lock(&self.votes);
        let before = book.votes.len();
        book.votes.retain(|_, v| v.height >= oldest);
        book.cast.retain(|(_, height), _| *height >= oldest);
        let removed = before - book.votes.len();

        let mut blocks = lock(&self.blocks);
        *blocks = blocks.split_off(&oldest);

        if removed > 0 {
            info!("Removed {} payment votes below height {}", removed, oldest);
        }
        removed
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let book = lock(&self.votes);
        let blocks = lock(&self.blocks);
        let mut votes: Vec<PaymentVote> = book.votes.values().cloned().collect();
        votes.sort_by(|a, b| a.height.cmp(&b.height).then_with(|| a.voter.cmp(&b.voter)));
        LedgerSnapshot { votes, blocks: blocks.values().cloned().collect() }
    }

    pub fn restore(&self, snapshot: LedgerSnapshot) {
        let mut book = lock(&self.votes);
        let mut blocks = lock(&self.blocks);
        book.votes.clear();
        book.cast.clear();
        for vote in snapshot.votes {
            let hash = vote.message_hash();
            book.cast.insert((vote.voter, vote.height), hash);
            book.votes.insert(hash, vote);
        }
        *blocks = snapshot.blocks.into_iter().map(|b| (b.height, b)).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(n: u8) -> Vec<u8> {
        vec![n; 25]
    }

    #[test]
    fn block_payees_counts_and_orders() {
        let mut payees = BlockPayees::new(10);
        for _ in 0..3 {
            payees.add_vote(&script(2));
        }
        for _ in 0..3 {
            payees.add_vote(&script(1));
        }
        payees.add_vote(&script(3));

        assert_eq!(payees.max_votes(), 3);
        let winners = payees.winners(3);
        assert_eq!(winners.len(), 2);
        assert_eq!(winners[0].script, script(1));
        assert_eq!(payees.best_payee(), Some(script(1)));
        assert!(payees.has_payee_with_votes(&script(3), 1));
        assert!(!payees.has_payee_with_votes(&script(3), 2));
    }

    #[test]
    fn payments_string_lists_payees() {
        let mut payees = BlockPayees::new(10);
        payees.add_vote(&[0xab]);
        payees.add_vote(&[0xab]);
        payees.add_vote(&[0xcd]);
        assert_eq!(payees.required_payments_string(), "ab:2, cd:1");
    }

    #[test]
    fn margin() {
        assert_eq!(with_margin(0), 0);
        assert_eq!(with_margin(10), 12);
        assert_eq!(with_margin(100), 125);
    }

    #[test]
    fn tally_threshold_and_payout_rule() {
        let ledger = PaymentVoteLedger::new(Arc::new(ChainParams::regtest()), MasternodeConfig::default());
        let mut payees = BlockPayees::new(50);
        for _ in 0..5 {
            payees.add_vote(&script(1));
        }
        ledger.restore(LedgerSnapshot { votes: Vec::new(), blocks: vec![payees.clone()] });

        assert_eq!(ledger.tally(50), PayeeTally::Undetermined);
        assert_eq!(ledger.tally(51), PayeeTally::Undetermined);
        assert!(ledger.is_transaction_valid(50, &[], 100));

        payees.add_vote(&script(1));
        ledger.restore(LedgerSnapshot { votes: Vec::new(), blocks: vec![payees] });
        assert!(matches!(ledger.tally(50), PayeeTally::Determined(ref w) if w.len() == 1));
        assert!(!ledger.is_transaction_valid(50, &[TxOutput::new(100, script(2))], 100));
        assert!(!ledger.is_transaction_valid(50, &[TxOutput::new(99, script(1))], 100));
        assert!(ledger.is_transaction_valid(50, &[TxOutput::new(100, script(1))], 100));
        assert_eq!(ledger.required_payments_string(50), format!("{}:6", hex::encode(script(1))));
        assert_eq!(ledger.required_payments_string(51), "Unknown");
    }

    #[test]
    fn scheduled_lookahead() {
        let ledger = PaymentVoteLedger::new(Arc::new(ChainParams::regtest()), MasternodeConfig::default());
        let mut payees = BlockPayees::new(105);
        payees.add_vote(&script(4));
        ledger.restore(LedgerSnapshot { votes: Vec::new(), blocks: vec![payees] });

        assert!(ledger.is_scheduled(&script(4), 100, 0));
        assert!(!ledger.is_scheduled(&script(4), 100, 105));
        assert!(!ledger.is_scheduled(&script(4), 90, 0));
        assert!(!ledger.is_scheduled(&script(5), 100, 0));
        assert_eq!(ledger.block_payee(105), Some(script(4)));
    }
}
