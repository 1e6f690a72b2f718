//! Entry point the node uses to drive the masternode subsystem.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use rusty_consensus::ChainParams;
use rusty_shared_types::masternode::{MasternodeMessage, PaymentVote, Ping};
use rusty_shared_types::{OutPoint, PeerId, TxOutput};

use crate::chain::ChainView;
use crate::config::{ConfigError, MasternodeConfig};
use crate::error::MasternodeError;
use crate::gossip::{PeerReputation, Relay};
use crate::payments::{LedgerSnapshot, PaymentVoteLedger};
use crate::registry::{MasternodeRegistry, RegistrySnapshot};
use crate::rewards::RewardResolver;
use crate::scheduler::{ActiveMasternode, PaymentScheduler};
use crate::snapshot::{SnapshotError, SnapshotFile, PAYMENTS_MAGIC, REGISTRY_MAGIC};

/// Blocks ahead of the new tip the local masternode votes for.
pub const VOTE_AHEAD_BLOCKS: u64 = 10;

pub struct MasternodeManager {
    params: Arc<ChainParams>,
    config: MasternodeConfig,
    chain: Arc<dyn ChainView>,
    relay: Arc<dyn Relay>,
    reputation: Arc<dyn PeerReputation>,
    registry: MasternodeRegistry,
    ledger: PaymentVoteLedger,
    scheduler: PaymentScheduler,
    last_local_ping: AtomicI64,
    last_checkpoint: AtomicI64,
}

impl MasternodeManager {
    pub fn new(
        params: Arc<ChainParams>,
        config: MasternodeConfig,
        chain: Arc<dyn ChainView>,
        relay: Arc<dyn Relay>,
        reputation: Arc<dyn PeerReputation>,
        rewards: Arc<dyn RewardResolver>,
    ) -> Result<Self, ConfigError> {
        let active = config
            .local_masternode
            .as_ref()
            .map(ActiveMasternode::from_config)
            .transpose()?;
        if let Some(active) = active.as_ref() {
            info!("Running as masternode {}", active.outpoint);
        }

        let now = chain.adjusted_time();
        Ok(MasternodeManager {
            registry: MasternodeRegistry::new(params.clone(), config.clone()),
            ledger: PaymentVoteLedger::new(params.clone(), config.clone()),
            scheduler: PaymentScheduler::new(params.clone(), config.clone(), rewards, active),
            params,
            config,
            chain,
            relay,
            reputation,
            last_local_ping: AtomicI64::new(0),
            last_checkpoint: AtomicI64::new(now),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn config(&self) -> &MasternodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &MasternodeRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &PaymentVoteLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &PaymentScheduler {
        &self.scheduler
    }

    /// Handles a message from `peer`, relaying it when accepted and
    /// reporting the peer when it misbehaved.
    pub fn process_message(&self, peer: PeerId, message: MasternodeMessage) -> Result<(), MasternodeError> {
        let chain = self.chain.as_ref();
        let result = match message {
            MasternodeMessage::Broadcast(broadcast) => {
                self.registry.process_broadcast(chain, &broadcast).map(|outcome| {
                    if outcome.should_relay() {
                        self.relay.relay_broadcast(&broadcast);
                    }
                })
            }
            MasternodeMessage::Ping(ping) => {
                let result = self.registry.process_ping(chain, &ping, true).map(|outcome| {
                    if outcome.relay {
                        self.relay.relay_ping(&ping);
                    }
                });
                self.ask_if_unknown(peer, &ping.outpoint, &result);
                result
            }
            MasternodeMessage::PaymentVote(vote) => {
                let result = self.ledger.add_vote(chain, &self.registry, &vote).map(|accepted| {
                    if accepted.misbehavior > 0 {
                        self.reputation.misbehaving(peer, accepted.misbehavior);
                    }
                    self.relay.relay_vote(&vote);
                });
                self.ask_if_unknown(peer, &vote.voter, &result);
                result
            }
            MasternodeMessage::PaymentSync { count_needed } => self
                .ledger
                .handle_sync_request(chain, &self.registry, peer, count_needed)
                .map(|hashes| self.relay.push_vote_inventory(peer, hashes)),
        };

        if let Err(e) = &result {
            let delta = e.misbehavior();
            if delta > 0 {
                warn!("Peer {} misbehaved ({}): {}", peer, delta, e);
                self.reputation.misbehaving(peer, delta);
            }
        }
        result
    }

    fn ask_if_unknown(&self, peer: PeerId, outpoint: &OutPoint, result: &Result<(), MasternodeError>) {
        if let Err(MasternodeError::UnknownMasternode(_)) = result {
            if self.registry.should_ask_for(outpoint, self.chain.adjusted_time()) {
                debug!("Asking peer {} for masternode {}", peer, outpoint);
                self.relay.ask_for_masternode(peer, outpoint);
            }
        }
    }

    pub fn peer_disconnected(&self, peer: PeerId) {
        self.ledger.forget_peer(peer);
    }

    /// Votes for the payee a few blocks ahead of the new tip.
    pub fn on_new_tip(&self, height: u64) -> Option<PaymentVote> {
        let target = height + VOTE_AHEAD_BLOCKS;
        match self
            .scheduler
            .process_block(self.chain.as_ref(), &self.registry, &self.ledger, target)
        {
            Ok(Some(vote)) => {
                self.relay.relay_vote(&vote);
                Some(vote)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("No payment vote for height {}: {}", target, e);
                None
            }
        }
    }

    pub fn validate_block_payout(&self, height: u64, outputs: &[TxOutput]) -> bool {
        self.scheduler.validate_payout(&self.ledger, height, outputs)
    }

    pub fn block_payee(&self, height: u64) -> Option<TxOutput> {
        self.scheduler
            .block_payee(self.chain.as_ref(), &self.registry, &self.ledger, height)
    }

    /// Pings for the local masternode once every `ping_seconds`.
    pub fn ping_local(&self) -> Option<Ping> {
        let active = self.scheduler.active()?;
        let now = self.chain.adjusted_time();
        if now - self.last_local_ping.load(Ordering::SeqCst) < self.config.ping_seconds {
            return None;
        }
        if !self.registry.contains(&active.outpoint) {
            return None;
        }

        let ping = active.create_ping(self.chain.as_ref(), &self.params, &self.config)?;
        match self.registry.process_ping(self.chain.as_ref(), &ping, false) {
            Ok(_) => {
                self.last_local_ping.store(now, Ordering::SeqCst);
                self.relay.relay_ping(&ping);
                Some(ping)
            }
            Err(e) => {
                warn!("Local masternode ping rejected: {}", e);
                None
            }
        }
    }

    fn registry_file(&self) -> SnapshotFile {
        SnapshotFile::new(self.config.registry_snapshot_path(), REGISTRY_MAGIC, self.params.network)
    }

    fn payments_file(&self) -> SnapshotFile {
        SnapshotFile::new(self.config.payments_snapshot_path(), PAYMENTS_MAGIC, self.params.network)
    }

    /// Restores both snapshots. A file that cannot be used is logged and its
    /// structure starts empty.
    pub fn load_snapshots(&self) {
        match self.registry_file().read::<RegistrySnapshot>() {
            Ok(snapshot) => {
                info!("Loaded {} masternodes from cache", snapshot.entries.len());
                self.registry.restore(snapshot);
            }
            Err(SnapshotError::Missing(path)) => info!("No masternode cache at {}", path.display()),
            Err(e) => warn!("Ignoring masternode cache: {}", e),
        }

        match self.payments_file().read::<LedgerSnapshot>() {
            Ok(snapshot) => {
                info!("Loaded {} payment votes from cache", snapshot.votes.len());
                self.ledger.restore(snapshot);
            }
            Err(SnapshotError::Missing(path)) => info!("No payment vote cache at {}", path.display()),
            Err(e) => warn!("Ignoring payment vote cache: {}", e),
        }
        self.ledger.clean(self.chain.as_ref(), self.enabled_count());
    }

    pub fn flush_snapshots(&self) -> Result<(), SnapshotError> {
        self.registry_file().write(&self.registry.snapshot())?;
        self.payments_file().write(&self.ledger.snapshot())?;
        Ok(())
    }

    fn enabled_count(&self) -> usize {
        let height = self.chain.tip().map_or(0, |tip| tip.height + 1);
        self.registry
            .count_enabled(self.params.upgrades.min_protocol_version(height))
    }

    /// One maintenance round: lifecycle sweep, vote expiry, local ping and a
    /// periodic checkpoint.
    pub fn run_maintenance(&self) {
        let chain = self.chain.as_ref();
        self.registry.check_and_remove(chain);
        self.ledger.clean(chain, self.enabled_count());
        self.ping_local();

        let now = chain.adjusted_time();
        let last = self.last_checkpoint.load(Ordering::SeqCst);
        if now - last >= self.config.checkpoint_interval_secs as i64 {
            self.last_checkpoint.store(now, Ordering::SeqCst);
            if let Err(e) = self.flush_snapshots() {
                error!("Failed to write masternode checkpoint: {}", e);
            }
        }
    }
}

/// Runs [`MasternodeManager::run_maintenance`] every maintenance interval
/// until `shutdown` fires, then writes the snapshots one last time.
pub fn spawn_maintenance(manager: Arc<MasternodeManager>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(manager.config.maintenance_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => manager.run_maintenance(),
                _ = shutdown.recv() => {
                    info!("Masternode maintenance shutting down.");
                    break;
                }
            }
        }
        if let Err(e) = manager.flush_snapshots() {
            error!("Failed to write masternode snapshots on shutdown: {}", e);
        }
    })
}
