//! Lock registry contract consumed by the leader elector

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Provider of named, mutually exclusive, expiring locks
///
/// Locks should be global for whatever "global" means to the deployment and
/// carry a lease, so a holder that dies without releasing is eventually replaced.
pub trait LockRegistry: Send + Sync {
    /// Obtain a handle to the lock named `key`
    ///
    /// Every call returns a handle with its own owner identity. Two handles for
    /// the same key compete with each other even inside one process.
    fn obtain(&self, key: &str) -> Arc<dyn DistributedLock>;
}

/// Handle to one distributed lock, bound to one owner
///
/// Handles are re-entrant: `try_acquire` on a handle that already holds the lock
/// succeeds, adds a hold and renews the lease. `release` drops one hold and frees
/// the lock when none remain.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Lock key (the leadership role)
    fn key(&self) -> &str;

    /// Owner identity of this handle
    fn owner(&self) -> &str;

    /// Try to acquire the lock, waiting at most `timeout`
    ///
    /// Returns `Ok(false)` when another owner holds it. Errors are reserved for
    /// infrastructure failure or interruption.
    async fn try_acquire(&self, timeout: Duration) -> Result<bool>;

    /// Release one hold. Releasing a lock this handle does not hold is a no-op.
    async fn release(&self) -> Result<()>;
}
