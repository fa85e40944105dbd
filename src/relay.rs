//! The replication core: job registry, history pager, message transcoder,
//! identity pool, and the engine that drives them against a [`ChatHost`].
//!
//! [`ChatHost`]: crate::host::ChatHost

pub mod engine;
pub mod identity;
pub mod pager;
pub mod registry;
pub mod transcode;

#[cfg(test)]
pub mod testhost;

pub use engine::{CopyOptions, CopyOutcome, Replicator};
pub use identity::IdentityPool;
pub use registry::{CopyRegistry, CopyTicket};
