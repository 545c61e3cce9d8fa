//! Regent Lock - distributed lock registry contract
//!
//! This crate provides:
//! - `LockRegistry` / `DistributedLock`: the contract the leader elector consumes
//! - `LockError`: infrastructure and interruption failures
//! - `MemoryLockRegistry`: an in-process registry with leases, FIFO handoff and
//!   optional background expiry

pub mod error;
pub mod memory;
pub mod model;
pub mod registry;

pub use error::{LockError, Result};
pub use memory::{MemoryLock, MemoryLockRegistry};
pub use model::{LockHolder, LockStats, MemoryLockConfig};
pub use registry::{DistributedLock, LockRegistry};
