//! Masternode wire messages and lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::{Hash, OutPoint};

/// Selects how a signed message is turned into the bytes that get signed.
///
/// The scheme is chosen when the message is created and travels with it, so a
/// verifier never has to guess which format the signer used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageScheme {
    /// Concatenated string of the message fields.
    Legacy,
    /// Double SHA-256 over the canonical field serialization.
    Canonical,
}

impl MessageScheme {
    pub fn as_u8(&self) -> u8 {
        match self {
            MessageScheme::Legacy => 1,
            MessageScheme::Canonical => 2,
        }
    }
}

impl Default for MessageScheme {
    fn default() -> Self {
        MessageScheme::Legacy
    }
}

/// Lifecycle state of a registered masternode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasternodeState {
    PreEnabled,
    Enabled,
    Expired,
    Remove,
    VinSpent,
    ReEnabled,
    Unlocking,
}

impl MasternodeState {
    /// States in which the masternode takes part in ranking and payment.
    pub fn is_available(&self) -> bool {
        matches!(self, MasternodeState::PreEnabled | MasternodeState::Enabled)
    }

    /// States that a newer broadcast carries forward as `ReEnabled` once
    /// collateral time-locking is in force.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MasternodeState::Enabled | MasternodeState::Unlocking | MasternodeState::ReEnabled
        )
    }
}

impl fmt::Display for MasternodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MasternodeState::PreEnabled => "PRE_ENABLED",
            MasternodeState::Enabled => "ENABLED",
            MasternodeState::Expired => "EXPIRED",
            MasternodeState::Remove => "REMOVE",
            MasternodeState::VinSpent => "VIN_SPENT",
            MasternodeState::ReEnabled => "RE_ENABLED",
            MasternodeState::Unlocking => "UNLOCKING",
        };
        write!(f, "{}", s)
    }
}

/// Periodic liveness proof signed with the operator key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub outpoint: OutPoint,
    /// Hash of a recent main-chain block the ping is anchored to.
    pub block_hash: Hash,
    pub sig_time: i64,
    pub signature: Vec<u8>,
    pub scheme: MessageScheme,
}

impl Ping {
    /// Creates an unsigned ping.
    pub fn new(outpoint: OutPoint, block_hash: Hash, sig_time: i64, scheme: MessageScheme) -> Self {
        Ping { outpoint, block_hash, sig_time, signature: Vec::new(), scheme }
    }
}

/// Signed announcement of a masternode, authenticated by the collateral key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub outpoint: OutPoint,
    pub addr: SocketAddr,
    /// Key that owns the collateral output.
    pub collateral_pubkey: Vec<u8>,
    /// Hot key the running node signs pings and votes with.
    pub operator_pubkey: Vec<u8>,
    pub signature: Vec<u8>,
    pub sig_time: i64,
    pub protocol_version: u32,
    pub ping: Option<Ping>,
    pub scheme: MessageScheme,
}

/// A masternode's vote for who should be paid at `height`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVote {
    pub voter: OutPoint,
    pub height: u64,
    /// Locking script of the proposed payee.
    pub payee: Vec<u8>,
    pub signature: Vec<u8>,
    pub timestamp: i64,
    pub scheme: MessageScheme,
}

impl PaymentVote {
    /// Creates an unsigned vote.
    pub fn new(voter: OutPoint, height: u64, payee: Vec<u8>, timestamp: i64, scheme: MessageScheme) -> Self {
        PaymentVote { voter, height, payee, signature: Vec::new(), timestamp, scheme }
    }
}

/// Gossip messages handled by the masternode subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasternodeMessage {
    Broadcast(Box<Broadcast>),
    Ping(Ping),
    PaymentVote(PaymentVote),
    /// Request for the payment votes around the tip.
    PaymentSync { count_needed: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(MasternodeState::PreEnabled.to_string(), "PRE_ENABLED");
        assert_eq!(MasternodeState::VinSpent.to_string(), "VIN_SPENT");
        assert_eq!(MasternodeState::ReEnabled.to_string(), "RE_ENABLED");
    }

    #[test]
    fn available_and_active_sets() {
        assert!(MasternodeState::PreEnabled.is_available());
        assert!(MasternodeState::Enabled.is_available());
        assert!(!MasternodeState::ReEnabled.is_available());
        assert!(!MasternodeState::Expired.is_available());

        assert!(MasternodeState::Unlocking.is_active());
        assert!(MasternodeState::ReEnabled.is_active());
        assert!(!MasternodeState::PreEnabled.is_active());
    }

    #[test]
    fn message_survives_bincode() {
        let vote = PaymentVote::new(OutPoint::new([3u8; 32], 1), 42, vec![1, 2, 3], 1_000, MessageScheme::Canonical);
        let msg = MasternodeMessage::PaymentVote(vote);
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: MasternodeMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }
}
