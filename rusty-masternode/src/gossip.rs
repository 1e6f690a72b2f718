//! Outbound side of the masternode gossip: relaying accepted messages,
//! requesting missing entries and reporting misbehaving peers.

use rusty_shared_types::masternode::{Broadcast, PaymentVote, Ping};
use rusty_shared_types::{Hash, OutPoint, PeerId};

/// Transport used to announce messages to the rest of the network.
pub trait Relay: Send + Sync {
    fn relay_broadcast(&self, broadcast: &Broadcast);

    fn relay_ping(&self, ping: &Ping);

    fn relay_vote(&self, vote: &PaymentVote);

    /// Asks `peer` for the broadcast of a masternode we have no entry for.
    fn ask_for_masternode(&self, peer: PeerId, outpoint: &OutPoint);

    /// Announces payment votes to a peer that requested a sync.
    fn push_vote_inventory(&self, peer: PeerId, hashes: Vec<Hash>);
}

/// Peer scoring owned by the connection manager. The masternode subsystem only
/// reports; banning and disconnecting happen elsewhere.
pub trait PeerReputation: Send + Sync {
    fn misbehaving(&self, peer: PeerId, delta: i32);
}

/// Relay that drops everything, for nodes that do not gossip.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRelay;

impl Relay for NoopRelay {
    fn relay_broadcast(&self, _broadcast: &Broadcast) {}

    fn relay_ping(&self, _ping: &Ping) {}

    fn relay_vote(&self, _vote: &PaymentVote) {}

    fn ask_for_masternode(&self, _peer: PeerId, _outpoint: &OutPoint) {}

    fn push_vote_inventory(&self, _peer: PeerId, _hashes: Vec<Hash>) {}
}
