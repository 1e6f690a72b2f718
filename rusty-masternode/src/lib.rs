//! Masternode list, payment votes and payee scheduling for Rusty Coin.

pub mod chain; // Read-only chain access
pub mod config;
pub mod entry;
pub mod error;
pub mod gossip; // Relay and peer reputation hooks
pub mod manager;
pub mod payments; // Payment vote ledger
pub mod registry;
pub mod rewards;
pub mod scheduler;
pub mod scoring; // Deterministic masternode ranking
pub mod signing;
pub mod snapshot;

pub use chain::{ChainTip, ChainView, Coin, MemoryChain};
pub use config::{ConfigError, LocalMasternodeConfig, MasternodeConfig};
pub use entry::{payee_script, MasternodeEntry};
pub use error::{ErrorClass, MasternodeError, MessageKind};
pub use gossip::{NoopRelay, PeerReputation, Relay};
pub use manager::{spawn_maintenance, MasternodeManager};
pub use payments::{BlockPayees, PayeeTally, PaymentVoteLedger, VoteAccepted};
pub use registry::{BroadcastOutcome, MasternodeRegistry, PingOutcome};
pub use rewards::{RewardResolver, StagedRewards};
pub use scheduler::{ActiveMasternode, PaymentScheduler};
pub use signing::SignedMessage;
pub use snapshot::{SnapshotError, SnapshotFile};
