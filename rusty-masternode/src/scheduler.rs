//! Payee selection: voting for upcoming blocks and checking their payouts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use rusty_consensus::ChainParams;
use rusty_crypto::{HashWriter, RustyKeyPair};
use rusty_shared_types::masternode::{PaymentVote, Ping};
use rusty_shared_types::{OutPoint, TxOutput};

use crate::chain::ChainView;
use crate::config::{ConfigError, LocalMasternodeConfig, MasternodeConfig};
use crate::entry::MasternodeEntry;
use crate::error::MasternodeError;
use crate::payments::{with_margin, PaymentVoteLedger};
use crate::registry::MasternodeRegistry;
use crate::rewards::RewardResolver;
use crate::signing::SignedMessage;

const MONTH_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Seconds per enabled masternode a fresh registration waits before it is
/// considered for payment.
const REGISTRATION_DELAY_PER_NODE: i64 = 156;

/// Votes a past block needs before it counts as having paid a payee.
const PAID_VOTES: usize = 2;

/// Identity of the masternode operated by this node.
#[derive(Debug)]
pub struct ActiveMasternode {
    pub outpoint: OutPoint,
    keypair: RustyKeyPair,
}

impl ActiveMasternode {
    pub fn new(outpoint: OutPoint, keypair: RustyKeyPair) -> Self {
        ActiveMasternode { outpoint, keypair }
    }

    pub fn from_config(local: &LocalMasternodeConfig) -> Result<Self, ConfigError> {
        Ok(ActiveMasternode::new(local.outpoint()?, local.operator_keypair()?))
    }

    pub fn operator_pubkey(&self) -> Vec<u8> {
        self.keypair.public_key_bytes()
    }

    /// Signs a ping anchored `ping_anchor_depth` blocks behind the tip.
    pub fn create_ping(&self, chain: &dyn ChainView, params: &ChainParams, config: &MasternodeConfig) -> Option<Ping> {
        let tip = chain.tip()?;
        let anchor = chain.block_hash(tip.height.saturating_sub(config.ping_anchor_depth))?;
        let scheme = params.upgrades.preferred_scheme(tip.height + 1);
        let mut ping = Ping::new(self.outpoint, anchor, chain.adjusted_time(), scheme);
        ping.sign(&self.keypair);
        Some(ping)
    }

    pub fn create_vote(&self, params: &ChainParams, height: u64, payee: Vec<u8>, now: i64) -> PaymentVote {
        let mut vote = PaymentVote::new(self.outpoint, height, payee, now, params.upgrades.preferred_scheme(height));
        vote.sign(&self.keypair);
        vote
    }
}

/// Number below `modulus` taken from the hash of what `writer` holds.
fn hash_offset(writer: HashWriter, modulus: u64) -> u64 {
    let hash = writer.finalize();
    let mut low = [0u8; 8];
    low.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(low) % modulus
}

pub struct PaymentScheduler {
    params: Arc<ChainParams>,
    config: MasternodeConfig,
    rewards: Arc<dyn RewardResolver>,
    active: Option<ActiveMasternode>,
    last_block_height: AtomicU64,
}

impl PaymentScheduler {
    pub fn new(
        params: Arc<ChainParams>,
        config: MasternodeConfig,
        rewards: Arc<dyn RewardResolver>,
        active: Option<ActiveMasternode>,
    ) -> Self {
        PaymentScheduler { params, config, rewards, active, last_block_height: AtomicU64::new(0) }
    }

    pub fn active(&self) -> Option<&ActiveMasternode> {
        self.active.as_ref()
    }

    pub fn last_block_height(&self) -> u64 {
        self.last_block_height.load(Ordering::SeqCst)
    }

    /// Votes for the payee of `height` if the local masternode is in the quorum.
    ///
    /// Returns the vote to relay, or `None` when this node has nothing to say
    /// for `height`.
    pub fn process_block(
        &self,
        chain: &dyn ChainView,
        registry: &MasternodeRegistry,
        ledger: &PaymentVoteLedger,
        height: u64,
    ) -> Result<Option<PaymentVote>, MasternodeError> {
        let Some(active) = self.active.as_ref() else { return Ok(None) };
        if height <= self.last_block_height() {
            return Ok(None);
        }
        if !registry.contains(&active.outpoint) {
            debug!("Local masternode {} is not registered yet", active.outpoint);
            return Ok(None);
        }

        let tip = chain.tip().ok_or(MasternodeError::ChainBusy)?;
        let minimum = self.params.upgrades.min_protocol_version(tip.height + 1);
        let anchor = height
            .checked_sub(self.config.ranking_lag)
            .ok_or(MasternodeError::IndeterminateRank(0))?;
        match registry.rank(chain, &active.outpoint, anchor, minimum)? {
            Some(rank) if rank <= self.config.signatures_total => {
                debug!("Local masternode ranked {} for height {}", rank, height)
            }
            rank => {
                debug!("Local masternode not in the payment quorum for height {} (rank {:?})", height, rank);
                return Ok(None);
            }
        }

        let payee = self
            .next_in_queue(chain, registry, ledger, height)
            .ok_or(MasternodeError::PayeeUndetermined(height))?;
        info!("Voting for masternode {} as payee of height {}", payee.outpoint, height);

        let vote = active.create_vote(&self.params, height, payee.payee_script(), chain.adjusted_time());
        ledger.add_vote(chain, registry, &vote)?;
        self.last_block_height.fetch_max(height, Ordering::SeqCst);
        Ok(Some(vote))
    }

    /// The entry that has waited longest for a payment and is eligible at `height`.
    pub fn next_in_queue(
        &self,
        chain: &dyn ChainView,
        registry: &MasternodeRegistry,
        ledger: &PaymentVoteLedger,
        height: u64,
    ) -> Option<MasternodeEntry> {
        let tip = chain.tip()?;
        let minimum = self.params.upgrades.min_protocol_version(tip.height + 1);
        let enabled = registry.count_enabled(minimum);
        let now = chain.adjusted_time();

        let eligible: Vec<MasternodeEntry> = registry
            .entries()
            .into_iter()
            .filter(|e| e.is_available() && e.protocol_version >= minimum)
            .filter(|e| !ledger.is_scheduled(&e.payee_script(), tip.height, height))
            .filter(|e| {
                chain
                    .coin(&e.outpoint)
                    .map_or(false, |coin| tip.height.saturating_sub(coin.height) >= enabled as u64)
            })
            .collect();

        let settled: Vec<&MasternodeEntry> = eligible
            .iter()
            .filter(|e| e.sig_time + enabled as i64 * REGISTRATION_DELAY_PER_NODE <= now)
            .collect();
        let candidates: Vec<&MasternodeEntry> = if settled.len() < enabled / 3 {
            debug!("Too few settled masternodes for height {}, ignoring registration times", height);
            eligible.iter().collect()
        } else {
            settled
        };

        candidates
            .into_iter()
            .map(|e| (self.seconds_since_payment(chain, ledger, e, enabled), e))
            .max_by(|(a_secs, a), (b_secs, b)| a_secs.cmp(b_secs).then_with(|| b.outpoint.cmp(&a.outpoint)))
            .map(|(_, e)| e.clone())
    }

    /// Time of the last block within `1.25 × enabled` blocks that paid `entry`,
    /// shifted by a per-node offset below 150 seconds.
    pub fn last_paid(
        &self,
        chain: &dyn ChainView,
        ledger: &PaymentVoteLedger,
        entry: &MasternodeEntry,
        enabled: usize,
    ) -> Option<(u64, i64)> {
        let tip = chain.tip()?;
        let script = entry.payee_script();
        let oldest = tip.height.saturating_sub(with_margin(enabled));
        let paid_height = (oldest..=tip.height)
            .rev()
            .find(|h| ledger.has_payee_with_votes(*h, &script, PAID_VOTES))?;
        let offset = hash_offset(
            HashWriter::new().write_raw(&entry.outpoint.txid).write_u32(entry.outpoint.vout),
            150,
        );
        chain
            .block_time(paid_height)
            .map(|time| (paid_height, time + offset as i64))
    }

    pub fn seconds_since_payment(
        &self,
        chain: &dyn ChainView,
        ledger: &PaymentVoteLedger,
        entry: &MasternodeEntry,
        enabled: usize,
    ) -> i64 {
        match self.last_paid(chain, ledger, entry, enabled) {
            Some((_, paid_at)) => chain.adjusted_time() - paid_at,
            None => {
                let spread = hash_offset(
                    HashWriter::new()
                        .write_raw(&entry.outpoint.txid)
                        .write_u32(entry.outpoint.vout)
                        .write_i64(entry.sig_time),
                    MONTH_SECONDS as u64,
                );
                MONTH_SECONDS + spread as i64
            }
        }
    }

    /// Whether a coinbase paying `outputs` at `height` satisfies the payee quorum.
    pub fn validate_payout(&self, ledger: &PaymentVoteLedger, height: u64, outputs: &[TxOutput]) -> bool {
        ledger.is_transaction_valid(height, outputs, self.rewards.masternode_payment(height))
    }

    /// Masternode output a block producer should include at `height`.
    ///
    /// Falls back to the best-scored entry when nobody voted for `height`.
    pub fn block_payee(
        &self,
        chain: &dyn ChainView,
        registry: &MasternodeRegistry,
        ledger: &PaymentVoteLedger,
        height: u64,
    ) -> Option<TxOutput> {
        let script = match ledger.block_payee(height) {
            Some(script) => script,
            None => {
                let minimum = self.params.upgrades.min_protocol_version(height);
                let anchor = height.checked_sub(self.config.ranking_lag)?;
                let ranking = match registry.ranking(chain, anchor, minimum) {
                    Ok(ranking) => ranking,
                    Err(e) => {
                        warn!("No masternode payee for height {}: {}", height, e);
                        return None;
                    }
                };
                let (outpoint, _) = ranking.first()?;
                registry.find(outpoint)?.payee_script()
            }
        };
        Some(TxOutput::new(self.rewards.masternode_payment(height), script))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_bounded_and_stable() {
        let writer = HashWriter::new().write_u64(42);
        let offset = hash_offset(writer.clone(), 150);
        assert!(offset < 150);
        assert_eq!(offset, hash_offset(writer, 150));
    }

    #[test]
    fn votes_use_the_preferred_scheme() {
        let params = ChainParams::regtest();
        let keypair = RustyKeyPair::from_secret_bytes(&[3u8; 32]).unwrap();
        let active = ActiveMasternode::new(OutPoint::new([1u8; 32], 0), keypair);

        let early = active.create_vote(&params, 100, vec![1, 2, 3], 1_000);
        assert_eq!(early.scheme, params.upgrades.preferred_scheme(100));
        assert!(early.check_signature(&active.operator_pubkey()).is_ok());

        let late = active.create_vote(&params, 10_000, vec![1, 2, 3], 1_000);
        assert_eq!(late.scheme, params.upgrades.preferred_scheme(10_000));
        assert_ne!(early.scheme, late.scheme);
    }
}
