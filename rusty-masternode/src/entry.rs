//! Registered masternode record and its lifecycle state machine.

use std::net::SocketAddr;

use log::debug;
use serde::{Deserialize, Serialize};

use rusty_crypto::hash160;
use rusty_shared_types::masternode::{Broadcast, MasternodeState, MessageScheme, Ping};
use rusty_shared_types::{OutPoint, TxOutput};

use crate::config::MasternodeConfig;

/// Locking script that pays the owner of `collateral_pubkey`.
pub fn payee_script(collateral_pubkey: &[u8]) -> Vec<u8> {
    TxOutput::p2pkh_script(&hash160(collateral_pubkey))
}

/// Chain-derived inputs of a state check, gathered before the registry lock is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckContext {
    pub now: i64,
    /// `Some(false)` once the collateral is spent or no longer matches the
    /// required amount, `None` when the chain could not be consulted.
    pub collateral_unspent: Option<bool>,
    pub timelock_active: bool,
    pub lock_seconds: i64,
    pub start_unlock_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasternodeEntry {
    pub outpoint: OutPoint,
    pub addr: SocketAddr,
    pub collateral_pubkey: Vec<u8>,
    pub operator_pubkey: Vec<u8>,
    pub signature: Vec<u8>,
    pub sig_time: i64,
    pub protocol_version: u32,
    pub scheme: MessageScheme,
    pub state: MasternodeState,
    pub last_ping: Option<Ping>,
    #[serde(skip)]
    last_checked: i64,
}

impl MasternodeEntry {
    pub fn from_broadcast(broadcast: &Broadcast) -> Self {
        MasternodeEntry {
            outpoint: broadcast.outpoint,
            addr: broadcast.addr,
            collateral_pubkey: broadcast.collateral_pubkey.clone(),
            operator_pubkey: broadcast.operator_pubkey.clone(),
            signature: broadcast.signature.clone(),
            sig_time: broadcast.sig_time,
            protocol_version: broadcast.protocol_version,
            scheme: broadcast.scheme,
            state: MasternodeState::PreEnabled,
            last_ping: broadcast.ping.clone(),
            last_checked: 0,
        }
    }

    /// Overwrites the announced fields with those of a newer broadcast.
    ///
    /// The caller has already verified that `broadcast` is strictly newer and
    /// signed by the same collateral key. The embedded ping is handled
    /// separately because it needs its own validation.
    pub fn update_from_broadcast(&mut self, broadcast: &Broadcast, timelock_active: bool) {
        self.addr = broadcast.addr;
        self.operator_pubkey = broadcast.operator_pubkey.clone();
        self.signature = broadcast.signature.clone();
        self.sig_time = broadcast.sig_time;
        self.protocol_version = broadcast.protocol_version;
        self.scheme = broadcast.scheme;
        if timelock_active && self.state.is_active() {
            self.state = MasternodeState::ReEnabled;
        }
        self.last_checked = 0;
    }

    /// Rebuilds the broadcast that produced the current fields.
    pub fn to_broadcast(&self) -> Broadcast {
        Broadcast {
            outpoint: self.outpoint,
            addr: self.addr,
            collateral_pubkey: self.collateral_pubkey.clone(),
            operator_pubkey: self.operator_pubkey.clone(),
            signature: self.signature.clone(),
            sig_time: self.sig_time,
            protocol_version: self.protocol_version,
            ping: self.last_ping.clone(),
            scheme: self.scheme,
        }
    }

    pub fn payee_script(&self) -> Vec<u8> {
        payee_script(&self.collateral_pubkey)
    }

    /// Time of the latest ping, falling back to the registration time.
    pub fn last_ping_time(&self) -> i64 {
        self.last_ping.as_ref().map(|p| p.sig_time).unwrap_or(self.sig_time)
    }

    pub fn is_pinged_within(&self, seconds: i64, now: i64) -> bool {
        now - self.last_ping_time() < seconds
    }

    pub fn is_available(&self) -> bool {
        self.state.is_available()
    }

    /// Re-evaluates the lifecycle state.
    ///
    /// Rules apply in order and the first match wins: a spent collateral is
    /// terminal; a long ping silence removes, a shorter one expires; a young
    /// registration stays in warm-up; a time-locked node that stopped pinging
    /// starts unlocking and stays so; everything else is enabled. Non-forced checks are
    /// throttled to one per `check_seconds`.
    pub fn check(&mut self, ctx: &CheckContext, config: &MasternodeConfig, force: bool) -> MasternodeState {
        if !force && ctx.now - self.last_checked < config.check_seconds {
            return self.state;
        }
        self.last_checked = ctx.now;

        let previous = self.state;
        self.state = self.next_state(ctx, config);
        if self.state != previous {
            debug!("Masternode {} state {} -> {}", self.outpoint, previous, self.state);
        }
        self.state
    }

    fn next_state(&self, ctx: &CheckContext, config: &MasternodeConfig) -> MasternodeState {
        if self.state == MasternodeState::VinSpent || ctx.collateral_unspent == Some(false) {
            return MasternodeState::VinSpent;
        }

        let lock_extension = if ctx.timelock_active { ctx.lock_seconds } else { 0 };
        if !self.is_pinged_within(config.removal_seconds + lock_extension, ctx.now) {
            return MasternodeState::Remove;
        }
        if !self.is_pinged_within(config.expiration_seconds + lock_extension, ctx.now) {
            return MasternodeState::Expired;
        }

        if ctx.now - self.sig_time < config.min_ping_seconds {
            if ctx.timelock_active && self.state == MasternodeState::ReEnabled {
                return MasternodeState::ReEnabled;
            }
            return MasternodeState::PreEnabled;
        }

        // Unlocking only ends through expiry or a newer broadcast.
        if ctx.timelock_active && self.state == MasternodeState::Unlocking {
            return MasternodeState::Unlocking;
        }
        if ctx.timelock_active && !self.is_pinged_within(ctx.start_unlock_seconds, ctx.now) {
            return MasternodeState::Unlocking;
        }

        MasternodeState::Enabled
    }
}
