//! The masternode list: admission of broadcasts and pings, lifecycle upkeep
//! and deterministic ranking.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use rusty_consensus::{ChainParams, Network, UpgradeIndex};
use rusty_shared_types::masternode::{Broadcast, MasternodeState, Ping};
use rusty_shared_types::{Hash, OutPoint};

use crate::chain::{ChainTip, ChainView};
use crate::config::MasternodeConfig;
use crate::entry::{payee_script, CheckContext, MasternodeEntry};
use crate::error::{MasternodeError, MessageKind};
use crate::scoring::rank_candidates;
use crate::signing::SignedMessage;

/// Result of an accepted broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// A new entry was created.
    Added { relay: bool },
    /// An existing entry took the newer fields.
    Updated { relay: bool },
}

impl BroadcastOutcome {
    pub fn should_relay(&self) -> bool {
        match self {
            BroadcastOutcome::Added { relay } | BroadcastOutcome::Updated { relay } => *relay,
        }
    }
}

/// Result of an accepted ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingOutcome {
    pub state: MasternodeState,
    pub relay: bool,
}

enum UpdateResult {
    /// No live entry; continue with collateral checks.
    Fresh,
    Updated { relay: bool },
}

/// Serialized form of the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub entries: Vec<MasternodeEntry>,
}

/// Whether an address may be announced to the wider network.
pub fn is_routable(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => {
            !(ip.is_private()
                || ip.is_loopback()
                || ip.is_link_local()
                || ip.is_unspecified()
                || ip.is_broadcast()
                || ip.is_documentation())
        }
        IpAddr::V6(ip) => {
            let unique_local = (ip.segments()[0] & 0xfe00) == 0xfc00;
            !(ip.is_loopback() || ip.is_unspecified() || unique_local)
        }
    }
}

pub struct MasternodeRegistry {
    params: Arc<ChainParams>,
    config: MasternodeConfig,
    entries: RwLock<HashMap<OutPoint, MasternodeEntry>>,
    seen_broadcasts: Mutex<HashMap<Hash, Broadcast>>,
    seen_pings: Mutex<HashMap<Hash, Ping>>,
    asked_for: Mutex<HashMap<OutPoint, i64>>,
}

impl MasternodeRegistry {
    pub fn new(params: Arc<ChainParams>, config: MasternodeConfig) -> Self {
        MasternodeRegistry {
            params,
            config,
            entries: RwLock::new(HashMap::new()),
            seen_broadcasts: Mutex::new(HashMap::new()),
            seen_pings: Mutex::new(HashMap::new()),
            asked_for: Mutex::new(HashMap::new()),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn config(&self) -> &MasternodeConfig {
        &self.config
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, HashMap<OutPoint, MasternodeEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, HashMap<OutPoint, MasternodeEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        match mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Gathers everything `MasternodeEntry::check` needs from the chain.
    fn check_context(&self, chain: &dyn ChainView, outpoint: &OutPoint) -> CheckContext {
        let tip = chain.tip();
        let next_height = tip.map(|t| t.height + 1);
        let collateral_unspent = next_height.map(|height| {
            chain
                .coin(outpoint)
                .map_or(false, |coin| coin.value == self.params.collateral_amount(height))
        });
        CheckContext {
            now: chain.adjusted_time(),
            collateral_unspent,
            timelock_active: next_height
                .map_or(false, |h| self.params.upgrades.is_active(h, UpgradeIndex::CollateralTimelock)),
            lock_seconds: next_height.map_or(0, |h| self.params.lock_seconds(h)),
            start_unlock_seconds: self.params.start_unlock_seconds(),
        }
    }

    /// Handles a broadcast received from the network.
    ///
    /// Broadcasts already seen are ignored. When validation is deferred for
    /// missing chain data the broadcast is forgotten again, so a later copy is
    /// re-evaluated.
    pub fn process_broadcast(
        &self,
        chain: &dyn ChainView,
        broadcast: &Broadcast,
    ) -> Result<BroadcastOutcome, MasternodeError> {
        let hash = broadcast.message_hash();
        {
            let mut seen = Self::lock(&self.seen_broadcasts);
            if seen.contains_key(&hash) {
                return Err(MasternodeError::AlreadySeen(MessageKind::Broadcast, hash));
            }
            seen.insert(hash, broadcast.clone());
        }

        let result = match self.check_and_update(chain, broadcast) {
            Ok(UpdateResult::Updated { relay }) => Ok(BroadcastOutcome::Updated { relay }),
            Ok(UpdateResult::Fresh) => self.check_inputs_and_add(chain, broadcast),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            if e.is_deferred() {
                Self::lock(&self.seen_broadcasts).remove(&hash);
            }
            debug!("Broadcast for {} not accepted: {}", broadcast.outpoint, e);
        }
        result
    }

    /// Stateless checks of a broadcast, then an in-place update of a live entry.
    fn check_and_update(&self, chain: &dyn ChainView, broadcast: &Broadcast) -> Result<UpdateResult, MasternodeError> {
        let now = chain.adjusted_time();
        if broadcast.sig_time > now + self.config.max_clock_drift_seconds {
            warn!("Broadcast for {} signed too far in the future", broadcast.outpoint);
            return Err(MasternodeError::FutureTimestamp(MessageKind::Broadcast, broadcast.sig_time));
        }

        let tip = chain.tip().ok_or(MasternodeError::ChainBusy)?;
        let height = tip.height + 1;
        let minimum = self.params.upgrades.min_protocol_version(height);
        if broadcast.protocol_version < minimum {
            return Err(MasternodeError::ObsoleteProtocol {
                outpoint: broadcast.outpoint,
                version: broadcast.protocol_version,
                minimum,
            });
        }
        if !self.params.upgrades.accepts_scheme(height, broadcast.scheme) {
            return Err(MasternodeError::SchemeNotAccepted {
                kind: MessageKind::Broadcast,
                outpoint: broadcast.outpoint,
                scheme: broadcast.scheme,
                height,
            });
        }

        broadcast.check_signature(&broadcast.collateral_pubkey)?;

        let expected = self.params.network.default_port();
        if broadcast.addr.port() != expected {
            return Err(MasternodeError::WrongPort {
                outpoint: broadcast.outpoint,
                port: broadcast.addr.port(),
                expected,
            });
        }

        let ctx = self.check_context(chain, &broadcast.outpoint);
        let embedded_ping_ok = broadcast
            .ping
            .as_ref()
            .map_or(false, |ping| self.check_ping_chain_rules(chain, ping, tip).is_ok());

        let mut entries = self.write_entries();
        let entry = match entries.get_mut(&broadcast.outpoint) {
            None => return Ok(UpdateResult::Fresh),
            Some(entry) => entry,
        };

        if broadcast.sig_time <= entry.sig_time {
            return Err(MasternodeError::NotNewer {
                outpoint: broadcast.outpoint,
                sig_time: broadcast.sig_time,
                current: entry.sig_time,
            });
        }
        if entry.collateral_pubkey != broadcast.collateral_pubkey {
            return Err(MasternodeError::CollateralKeyMismatch(broadcast.outpoint));
        }
        if !entry.state.is_active() {
            // Inactive entries are rebuilt from scratch by the collateral path.
            return Ok(UpdateResult::Fresh);
        }

        entry.update_from_broadcast(broadcast, ctx.timelock_active);
        if let Some(ping) = broadcast.ping.as_ref() {
            if embedded_ping_ok && ping.check_signature(&entry.operator_pubkey).is_ok() {
                entry.last_ping = Some(ping.clone());
            }
        }
        let state = entry.check(&ctx, &self.config, true);
        info!("Updated masternode {} from newer broadcast, state {}", broadcast.outpoint, state);
        Ok(UpdateResult::Updated { relay: state.is_available() || state == MasternodeState::ReEnabled })
    }

    /// Collateral checks for a broadcast without a live entry, then insertion.
    fn check_inputs_and_add(&self, chain: &dyn ChainView, broadcast: &Broadcast) -> Result<BroadcastOutcome, MasternodeError> {
        let outpoint = broadcast.outpoint;
        let tip = chain.tip().ok_or(MasternodeError::ChainBusy)?;
        let coin = chain.coin(&outpoint).ok_or(MasternodeError::CollateralNotFound(outpoint))?;

        if coin.value != self.params.collateral_amount(tip.height + 1)
            || coin.script_pubkey != payee_script(&broadcast.collateral_pubkey)
        {
            return Err(MasternodeError::InvalidCollateral(outpoint));
        }

        let confirmations = (tip.height + 1).saturating_sub(coin.height);
        if confirmations < self.config.min_confirmations {
            return Err(MasternodeError::InsufficientConfirmations {
                outpoint,
                confirmations,
                required: self.config.min_confirmations,
            });
        }

        // The broadcast must not predate the block that gave the collateral
        // its required confirmations.
        let confirmed_height = coin.height + self.config.min_confirmations.saturating_sub(1);
        let confirmed_at = chain.block_time(confirmed_height).ok_or(MasternodeError::ChainBusy)?;
        if broadcast.sig_time < confirmed_at {
            return Err(MasternodeError::SignedBeforeConfirmation {
                outpoint,
                sig_time: broadcast.sig_time,
                confirmed_at,
            });
        }

        let ctx = self.check_context(chain, &outpoint);
        let ping = broadcast.ping.as_ref().filter(|ping| {
            self.check_ping_chain_rules(chain, ping, tip).is_ok()
                && ping.check_signature(&broadcast.operator_pubkey).is_ok()
        });

        let mut entry = MasternodeEntry::from_broadcast(broadcast);
        entry.last_ping = ping.cloned();
        let state = entry.check(&ctx, &self.config, true);
        {
            let mut entries = self.write_entries();
            if let Some(existing) = entries.get(&outpoint) {
                if existing.sig_time >= broadcast.sig_time {
                    return Err(MasternodeError::NotNewer {
                        outpoint,
                        sig_time: broadcast.sig_time,
                        current: existing.sig_time,
                    });
                }
                debug!("Replacing inactive masternode entry {}", outpoint);
            }
            entries.insert(outpoint, entry);
        }
        if let Some(ping) = ping {
            Self::lock(&self.seen_pings).insert(ping.message_hash(), ping.clone());
        }

        let relay = self.params.network == Network::Regtest || is_routable(&broadcast.addr);
        info!("Added masternode {} at {}, state {}", outpoint, broadcast.addr, state);
        Ok(BroadcastOutcome::Added { relay })
    }

    /// Ping checks that depend only on the chain: signature time window and anchor depth.
    fn check_ping_chain_rules(&self, chain: &dyn ChainView, ping: &Ping, tip: ChainTip) -> Result<(), MasternodeError> {
        let now = chain.adjusted_time();
        let drift = self.config.max_clock_drift_seconds;
        if ping.sig_time > now + drift {
            return Err(MasternodeError::FutureTimestamp(MessageKind::Ping, ping.sig_time));
        }
        if ping.sig_time <= now - drift {
            return Err(MasternodeError::ExpiredTimestamp(MessageKind::Ping, ping.sig_time));
        }

        let anchor = chain
            .block_height(&ping.block_hash)
            .ok_or(MasternodeError::UnknownBlock(ping.block_hash))?;
        let depth = tip.height.saturating_sub(anchor);
        if anchor > tip.height || depth > self.config.max_ping_anchor_depth {
            return Err(MasternodeError::StaleAnchor {
                outpoint: ping.outpoint,
                depth,
                limit: self.config.max_ping_anchor_depth,
            });
        }
        Ok(())
    }

    /// Handles a ping received from the network or produced locally.
    ///
    /// With `require_available` the target entry must be `PreEnabled` or
    /// `Enabled`.
    pub fn process_ping(
        &self,
        chain: &dyn ChainView,
        ping: &Ping,
        require_available: bool,
    ) -> Result<PingOutcome, MasternodeError> {
        let hash = ping.message_hash();
        if Self::lock(&self.seen_pings).contains_key(&hash) {
            return Err(MasternodeError::AlreadySeen(MessageKind::Ping, hash));
        }

        let tip = chain.tip().ok_or(MasternodeError::ChainBusy)?;
        self.check_ping_chain_rules(chain, ping, tip)?;
        let height = tip.height + 1;
        let minimum = self.params.upgrades.min_protocol_version(height);
        let ctx = self.check_context(chain, &ping.outpoint);

        let (outcome, broadcast_hash) = {
            let mut entries = self.write_entries();
            let entry = entries
                .get_mut(&ping.outpoint)
                .ok_or(MasternodeError::UnknownMasternode(ping.outpoint))?;

            if entry.protocol_version < minimum {
                return Err(MasternodeError::ObsoleteProtocol {
                    outpoint: ping.outpoint,
                    version: entry.protocol_version,
                    minimum,
                });
            }
            if require_available && !entry.is_available() {
                return Err(MasternodeError::NotAvailable(ping.outpoint));
            }
            if !self.params.upgrades.accepts_scheme(height, ping.scheme) {
                return Err(MasternodeError::SchemeNotAccepted {
                    kind: MessageKind::Ping,
                    outpoint: ping.outpoint,
                    scheme: ping.scheme,
                    height,
                });
            }
            if entry.last_ping.is_some()
                && (ping.sig_time <= entry.last_ping_time()
                    || entry.is_pinged_within(self.config.min_ping_seconds - 60, ping.sig_time))
            {
                return Err(MasternodeError::PingTooEarly {
                    outpoint: ping.outpoint,
                    last: entry.last_ping_time(),
                });
            }
            ping.check_signature(&entry.operator_pubkey)?;

            entry.last_ping = Some(ping.clone());
            let state = entry.check(&ctx, &self.config, true);
            let broadcast_hash = entry.to_broadcast().message_hash();
            (PingOutcome { state, relay: state.is_available() }, broadcast_hash)
        };

        if let Some(seen) = Self::lock(&self.seen_broadcasts).get_mut(&broadcast_hash) {
            seen.ping = Some(ping.clone());
        }
        Self::lock(&self.seen_pings).insert(hash, ping.clone());
        debug!("Accepted ping for {}, state {}", ping.outpoint, outcome.state);
        Ok(outcome)
    }

    /// Records that `outpoint` is about to be requested from a peer.
    ///
    /// Returns false if it was already requested within the ping interval.
    pub fn should_ask_for(&self, outpoint: &OutPoint, now: i64) -> bool {
        let mut asked = Self::lock(&self.asked_for);
        match asked.get(outpoint) {
            Some(at) if now - at < self.config.min_ping_seconds => false,
            _ => {
                asked.insert(*outpoint, now);
                true
            }
        }
    }

    /// Runs a state check on every entry and drops removed or spent ones.
    pub fn check_and_remove(&self, chain: &dyn ChainView) -> Vec<OutPoint> {
        let outpoints: Vec<OutPoint> = self.read_entries().keys().copied().collect();
        let contexts: Vec<(OutPoint, CheckContext)> = outpoints
            .into_iter()
            .map(|outpoint| (outpoint, self.check_context(chain, &outpoint)))
            .collect();

        let mut removed = Vec::new();
        {
            let mut entries = self.write_entries();
            for (outpoint, ctx) in contexts.iter() {
                let Some(entry) = entries.get_mut(outpoint) else { continue };
                let state = entry.check(ctx, &self.config, false);
                if matches!(state, MasternodeState::Remove | MasternodeState::VinSpent) {
                    entries.remove(outpoint);
                    removed.push(*outpoint);
                }
            }
        }

        if !removed.is_empty() {
            Self::lock(&self.seen_broadcasts).retain(|_, b| !removed.contains(&b.outpoint));
            Self::lock(&self.seen_pings).retain(|_, p| !removed.contains(&p.outpoint));
            info!("Removed {} inactive masternodes", removed.len());
        }
        removed
    }

    /// Ranks the available entries meeting `min_protocol` for the block at
    /// `anchor_height`, lowest score first.
    pub fn ranking(
        &self,
        chain: &dyn ChainView,
        anchor_height: u64,
        min_protocol: u32,
    ) -> Result<Vec<(OutPoint, U256)>, MasternodeError> {
        let block_hash = chain
            .block_hash(anchor_height)
            .ok_or(MasternodeError::IndeterminateRank(anchor_height))?;
        let candidates: Vec<OutPoint> = self
            .read_entries()
            .values()
            .filter(|e| e.is_available() && e.protocol_version >= min_protocol)
            .map(|e| e.outpoint)
            .collect();
        Ok(rank_candidates(&candidates, &block_hash))
    }

    /// 1-based rank of `outpoint` at `anchor_height`, `None` if it is not ranked.
    pub fn rank(
        &self,
        chain: &dyn ChainView,
        outpoint: &OutPoint,
        anchor_height: u64,
        min_protocol: u32,
    ) -> Result<Option<usize>, MasternodeError> {
        let ranking = self.ranking(chain, anchor_height, min_protocol)?;
        Ok(ranking.iter().position(|(op, _)| op == outpoint).map(|p| p + 1))
    }

    pub fn find(&self, outpoint: &OutPoint) -> Option<MasternodeEntry> {
        self.read_entries().get(outpoint).cloned()
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.read_entries().contains_key(outpoint)
    }

    pub fn entries(&self) -> Vec<MasternodeEntry> {
        let mut entries: Vec<MasternodeEntry> = self.read_entries().values().cloned().collect();
        entries.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        entries
    }

    pub fn count_all(&self) -> usize {
        self.read_entries().len()
    }

    /// Number of `Enabled` entries at or above `min_protocol`.
    pub fn count_enabled(&self, min_protocol: u32) -> usize {
        self.read_entries()
            .values()
            .filter(|e| e.state == MasternodeState::Enabled && e.protocol_version >= min_protocol)
            .count()
    }

    pub fn remove(&self, outpoint: &OutPoint) -> Option<MasternodeEntry> {
        self.write_entries().remove(outpoint)
    }

    pub fn seen_broadcast(&self, hash: &Hash) -> Option<Broadcast> {
        Self::lock(&self.seen_broadcasts).get(hash).cloned()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot { entries: self.entries() }
    }

    /// Replaces the list with a snapshot. Seen caches start empty.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        let mut entries = self.write_entries();
        entries.clear();
        for entry in snapshot.entries {
            entries.insert(entry.outpoint, entry);
        }
        Self::lock(&self.seen_broadcasts).clear();
        Self::lock(&self.seen_pings).clear();
    }
}
