//! Regent Leader - lock-based leader election
//!
//! This crate provides:
//! - `LockRegistryLeaderInitiator`: runs one election loop per role on top of a
//!   [`regent_lock::LockRegistry`] and drives a [`Candidate`]
//! - `Context`: leadership query and voluntary resignation handle
//! - Leader events and publishers for observing leadership changes
//!
//! With a global, expiring lock there is never more than one leader, though
//! there may be short leaderless periods after a holder dies.

pub mod candidate;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod initiator;
mod selector;

pub use candidate::{Candidate, DEFAULT_ROLE, DefaultCandidate};
pub use config::LeaderConfig;
pub use context::{Context, LockContext, NullContext};
pub use error::{LeaderError, Result};
pub use event::{
    DefaultLeaderEventPublisher, LeaderEvent, LeaderEventKind, LeaderEventPublisher,
    LoggingLeaderEventPublisher,
};
pub use initiator::LockRegistryLeaderInitiator;
