//! Shared fixtures for the masternode integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use rusty_consensus::{Activation, ChainParams, UpgradeIndex};
use rusty_crypto::RustyKeyPair;
use rusty_masternode::{
    payee_script, ChainView, Coin, MasternodeConfig, MasternodeRegistry, MemoryChain, PaymentVoteLedger, PeerReputation, Relay,
    SignedMessage,
};
use rusty_shared_types::masternode::{Broadcast, MessageScheme, PaymentVote, Ping};
use rusty_shared_types::{Hash, OutPoint, PeerId};

pub const GENESIS_TIME: i64 = 1_600_000_000;
pub const SPACING: i64 = 60;
pub const COLLATERAL_HEIGHT: u64 = 10;
pub const PROTOCOL_VERSION: u32 = 170_012;

/// A masternode with deterministic keys derived from `id`.
pub struct TestNode {
    pub id: u8,
    pub outpoint: OutPoint,
    pub collateral: RustyKeyPair,
    pub operator: RustyKeyPair,
}

pub fn node(id: u8) -> TestNode {
    TestNode {
        id,
        outpoint: OutPoint::new([id; 32], 0),
        collateral: RustyKeyPair::from_secret_bytes(&[id; 32]).unwrap(),
        operator: RustyKeyPair::from_secret_bytes(&[id ^ 0x80; 32]).unwrap(),
    }
}

pub fn nodes(count: u8) -> Vec<TestNode> {
    (1..=count).map(node).collect()
}

impl TestNode {
    pub fn payee_script(&self) -> Vec<u8> {
        payee_script(&self.collateral.public_key_bytes())
    }

    pub fn addr(&self, params: &ChainParams) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, self.id], params.network.default_port()))
    }

    /// Ping anchored 12 blocks behind the tip.
    pub fn ping(&self, chain: &MemoryChain, sig_time: i64) -> Ping {
        let tip = chain.tip().unwrap();
        self.ping_at(chain.block_hash(tip.height - 12).unwrap(), sig_time)
    }

    pub fn ping_at(&self, anchor: Hash, sig_time: i64) -> Ping {
        let mut ping = Ping::new(self.outpoint, anchor, sig_time, MessageScheme::Legacy);
        ping.sign(&self.operator);
        ping
    }

    pub fn broadcast(&self, params: &ChainParams, chain: &MemoryChain, sig_time: i64) -> Broadcast {
        let mut broadcast = Broadcast {
            outpoint: self.outpoint,
            addr: self.addr(params),
            collateral_pubkey: self.collateral.public_key_bytes(),
            operator_pubkey: self.operator.public_key_bytes(),
            signature: Vec::new(),
            sig_time,
            protocol_version: PROTOCOL_VERSION,
            ping: Some(self.ping(chain, sig_time)),
            scheme: MessageScheme::Legacy,
        };
        broadcast.sign(&self.collateral);
        broadcast
    }

    pub fn vote(&self, height: u64, payee: Vec<u8>, timestamp: i64) -> PaymentVote {
        let mut vote = PaymentVote::new(self.outpoint, height, payee, timestamp, MessageScheme::Legacy);
        vote.sign(&self.operator);
        vote
    }

    /// Locks the collateral in a block at [`COLLATERAL_HEIGHT`].
    pub fn fund(&self, params: &ChainParams, chain: &MemoryChain) {
        chain.add_coin(
            self.outpoint,
            Coin {
                value: params.collateral,
                script_pubkey: self.payee_script(),
                height: COLLATERAL_HEIGHT,
            },
        );
    }
}

/// Regtest chain of `blocks` blocks, one minute apart.
pub fn chain(blocks: u64) -> MemoryChain {
    let chain = MemoryChain::new(1);
    chain.set_genesis_time(GENESIS_TIME);
    chain.extend(blocks, SPACING);
    chain
}

pub fn params() -> Arc<ChainParams> {
    Arc::new(ChainParams::regtest())
}

/// Regtest with collateral time-locking from height 100 and legacy signing kept.
pub fn timelock_params() -> Arc<ChainParams> {
    let mut upgrades = ChainParams::regtest().upgrades.upgrades().to_vec();
    upgrades[UpgradeIndex::CanonicalSignatures as usize].activation = Activation::Never;
    upgrades[UpgradeIndex::CollateralTimelock as usize].activation = Activation::AtHeight(100);
    Arc::new(ChainParams::regtest().with_upgrades(upgrades).unwrap())
}

pub fn config() -> MasternodeConfig {
    MasternodeConfig::for_network(rusty_consensus::Network::Regtest)
}

/// Registry holding `nodes`, all registered early enough to be `ENABLED`.
pub fn enabled_registry(params: &Arc<ChainParams>, chain: &MemoryChain, nodes: &[TestNode]) -> MasternodeRegistry {
    let registry = MasternodeRegistry::new(params.clone(), config());
    let now = chain.adjusted_time();
    for node in nodes {
        node.fund(params, chain);
        registry
            .process_broadcast(chain, &node.broadcast(params, chain, now - 700))
            .unwrap();
    }
    registry
}

pub fn ledger(params: &Arc<ChainParams>) -> PaymentVoteLedger {
    PaymentVoteLedger::new(params.clone(), config())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relayed {
    Broadcast(OutPoint),
    Ping(OutPoint),
    Vote(OutPoint, u64),
    AskFor(PeerId, OutPoint),
    Inventory(PeerId, Vec<Hash>),
}

#[derive(Debug, Default)]
pub struct RecordingRelay {
    pub events: Mutex<Vec<Relayed>>,
}

impl RecordingRelay {
    pub fn events(&self) -> Vec<Relayed> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Relayed) {
        self.events.lock().unwrap().push(event);
    }
}

impl Relay for RecordingRelay {
    fn relay_broadcast(&self, broadcast: &Broadcast) {
        self.push(Relayed::Broadcast(broadcast.outpoint));
    }

    fn relay_ping(&self, ping: &Ping) {
        self.push(Relayed::Ping(ping.outpoint));
    }

    fn relay_vote(&self, vote: &PaymentVote) {
        self.push(Relayed::Vote(vote.voter, vote.height));
    }

    fn ask_for_masternode(&self, peer: PeerId, outpoint: &OutPoint) {
        self.push(Relayed::AskFor(peer, *outpoint));
    }

    fn push_vote_inventory(&self, peer: PeerId, hashes: Vec<Hash>) {
        self.push(Relayed::Inventory(peer, hashes));
    }
}

#[derive(Debug, Default)]
pub struct RecordingReputation {
    pub reports: Mutex<Vec<(PeerId, i32)>>,
}

impl RecordingReputation {
    pub fn reports(&self) -> Vec<(PeerId, i32)> {
        self.reports.lock().unwrap().clone()
    }
}

impl PeerReputation for RecordingReputation {
    fn misbehaving(&self, peer: PeerId, delta: i32) {
        self.reports.lock().unwrap().push((peer, delta));
    }
}
