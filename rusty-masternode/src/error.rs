use thiserror::Error;

use rusty_shared_types::masternode::MessageScheme;
use rusty_shared_types::{Hash, OutPoint, PeerId};

/// Reputation penalty for a broadcast whose collateral signature does not verify.
pub const MISBEHAVIOR_BAD_BROADCAST_SIGNATURE: i32 = 100;
/// Reputation penalty for a ping whose operator signature does not verify.
pub const MISBEHAVIOR_BAD_PING_SIGNATURE: i32 = 33;
/// Reputation penalty for a message signed too far in the future.
pub const MISBEHAVIOR_FUTURE_TIMESTAMP: i32 = 30;
/// Reputation penalty for bad votes and repeated sync requests.
pub const MISBEHAVIOR_VOTE: i32 = 20;

/// Kind of signed message an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Broadcast,
    Ping,
    PaymentVote,
}

/// How the caller should treat a rejected message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or provably wrong; drop it and possibly penalise the sender.
    Invalid,
    /// Depends on chain data or entries we do not have yet; may succeed later.
    Deferred,
    /// Already known, superseded or arriving too often; silently ignore.
    Duplicate,
    /// The quorum has not reached a decision.
    Undetermined,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MasternodeError {
    #[error("{0:?} signature time {1} is too far in the future")]
    FutureTimestamp(MessageKind, i64),

    #[error("{0:?} signature time {1} is too far in the past")]
    ExpiredTimestamp(MessageKind, i64),

    #[error("Invalid {0:?} signature for masternode {1}")]
    BadSignature(MessageKind, OutPoint),

    #[error("{kind:?} for {outpoint} uses the {scheme:?} signing scheme, not accepted at height {height}")]
    SchemeNotAccepted {
        kind: MessageKind,
        outpoint: OutPoint,
        scheme: MessageScheme,
        height: u64,
    },

    #[error("Invalid port {port} for masternode {outpoint}, only {expected} is supported")]
    WrongPort {
        outpoint: OutPoint,
        port: u16,
        expected: u16,
    },

    #[error("Masternode {outpoint} protocol version {version} is below the minimum {minimum}")]
    ObsoleteProtocol {
        outpoint: OutPoint,
        version: u32,
        minimum: u32,
    },

    #[error("Ping for {outpoint} is anchored to block at depth {depth}, limit is {limit}")]
    StaleAnchor {
        outpoint: OutPoint,
        depth: u64,
        limit: u64,
    },

    #[error("Broadcast for {0} tries to change the collateral key")]
    CollateralKeyMismatch(OutPoint),

    #[error("Collateral {0} has the wrong value or pays to a different key")]
    InvalidCollateral(OutPoint),

    #[error("Broadcast for {outpoint} signed at {sig_time}, before its collateral confirmed at {confirmed_at}")]
    SignedBeforeConfirmation {
        outpoint: OutPoint,
        sig_time: i64,
        confirmed_at: i64,
    },

    #[error("Masternode {0} is not in an available state")]
    NotAvailable(OutPoint),

    #[error("Unknown block {}", hex::encode(.0))]
    UnknownBlock(Hash),

    #[error("Unknown masternode {0}")]
    UnknownMasternode(OutPoint),

    #[error("Collateral {0} not found in the UTXO set")]
    CollateralNotFound(OutPoint),

    #[error("Collateral {outpoint} has {confirmations} confirmations, {required} required")]
    InsufficientConfirmations {
        outpoint: OutPoint,
        confirmations: u64,
        required: u64,
    },

    #[error("Chain state is busy")]
    ChainBusy,

    #[error("Cannot rank masternodes for height {0}: anchor block unknown")]
    IndeterminateRank(u64),

    #[error("{0:?} {} already seen", hex::encode(.1))]
    AlreadySeen(MessageKind, Hash),

    #[error("Broadcast for {outpoint} at {sig_time} is not newer than {current}")]
    NotNewer {
        outpoint: OutPoint,
        sig_time: i64,
        current: i64,
    },

    #[error("Ping for {outpoint} arrived too early, last ping at {last}")]
    PingTooEarly { outpoint: OutPoint, last: i64 },

    #[error("Masternode {voter} already voted for height {height}")]
    AlreadyVoted {
        voter: OutPoint,
        height: u64,
        /// The earlier vote named a different payee.
        conflicting: bool,
    },

    #[error("Vote height {height} outside the accepted range [{first}, {last}]")]
    VoteOutOfRange { height: u64, first: u64, last: u64 },

    #[error("Peer {0} already requested the payment votes")]
    RepeatedSyncRequest(PeerId),

    #[error("No masternode payee decided for height {0}")]
    PayeeUndetermined(u64),
}

impl MasternodeError {
    pub fn class(&self) -> ErrorClass {
        use MasternodeError::*;
        match self {
            FutureTimestamp(..)
            | ExpiredTimestamp(..)
            | BadSignature(..)
            | SchemeNotAccepted { .. }
            | WrongPort { .. }
            | ObsoleteProtocol { .. }
            | StaleAnchor { .. }
            | CollateralKeyMismatch(_)
            | InvalidCollateral(_)
            | SignedBeforeConfirmation { .. }
            | NotAvailable(_)
            | VoteOutOfRange { .. } => ErrorClass::Invalid,
            UnknownBlock(_)
            | UnknownMasternode(_)
            | CollateralNotFound(_)
            | InsufficientConfirmations { .. }
            | ChainBusy
            | IndeterminateRank(_) => ErrorClass::Deferred,
            AlreadySeen(..)
            | NotNewer { .. }
            | PingTooEarly { .. }
            | AlreadyVoted { .. }
            | RepeatedSyncRequest(_) => ErrorClass::Duplicate,
            PayeeUndetermined(_) => ErrorClass::Undetermined,
        }
    }

    /// Reputation penalty the sending peer earns for this error, zero if none.
    pub fn misbehavior(&self) -> i32 {
        match self {
            MasternodeError::BadSignature(MessageKind::Broadcast, _) => MISBEHAVIOR_BAD_BROADCAST_SIGNATURE,
            MasternodeError::BadSignature(MessageKind::Ping, _) => MISBEHAVIOR_BAD_PING_SIGNATURE,
            MasternodeError::BadSignature(MessageKind::PaymentVote, _) => MISBEHAVIOR_VOTE,
            MasternodeError::FutureTimestamp(..) => MISBEHAVIOR_FUTURE_TIMESTAMP,
            MasternodeError::AlreadyVoted { conflicting: true, .. } => MISBEHAVIOR_VOTE,
            MasternodeError::RepeatedSyncRequest(_) => MISBEHAVIOR_VOTE,
            _ => 0,
        }
    }

    pub fn is_deferred(&self) -> bool {
        self.class() == ErrorClass::Deferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn penalties_follow_message_kind() {
        let op = OutPoint::new([1u8; 32], 0);
        assert_eq!(MasternodeError::BadSignature(MessageKind::Broadcast, op).misbehavior(), 100);
        assert_eq!(MasternodeError::BadSignature(MessageKind::Ping, op).misbehavior(), 33);
        assert_eq!(MasternodeError::BadSignature(MessageKind::PaymentVote, op).misbehavior(), 20);
        assert_eq!(MasternodeError::FutureTimestamp(MessageKind::Broadcast, 0).misbehavior(), 30);
        assert_eq!(
            MasternodeError::AlreadyVoted { voter: op, height: 1, conflicting: false }.misbehavior(),
            0
        );
    }

    #[test]
    fn deferred_errors_never_penalise() {
        let op = OutPoint::new([1u8; 32], 0);
        let deferred = [
            MasternodeError::UnknownBlock([0u8; 32]),
            MasternodeError::UnknownMasternode(op),
            MasternodeError::CollateralNotFound(op),
            MasternodeError::InsufficientConfirmations { outpoint: op, confirmations: 3, required: 15 },
            MasternodeError::ChainBusy,
            MasternodeError::IndeterminateRank(10),
        ];
        for err in deferred.iter() {
            assert!(err.is_deferred(), "{}", err);
            assert_eq!(err.misbehavior(), 0);
        }
    }
}
