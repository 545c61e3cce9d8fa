//! In-memory lock registry
//!
//! Provides:
//! - Re-entrant lock handles with per-handle owner identity
//! - Lease expiry (lazy on access, plus an optional background scanner)
//! - FIFO handoff from a releasing holder to the first live waiter

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{LockHolder, LockStats, MemoryLockConfig};
use crate::registry::{DistributedLock, LockRegistry};

struct LockWaiter {
    owner: String,
    tx: oneshot::Sender<()>,
}

/// Outcome of an acquisition attempt against a slot
#[derive(Debug, PartialEq, Eq)]
enum Take {
    Granted,
    Reentered,
    Busy,
}

/// Outcome of a release against a slot
#[derive(Debug, PartialEq, Eq)]
enum Release {
    Freed,
    StillHeld,
    NotOwner,
}

#[derive(Default)]
struct LockSlot {
    owner: Option<String>,
    holds: u32,
    fence_token: u64,
    expires_at: Option<Instant>,
    waiters: VecDeque<LockWaiter>,
}

impl LockSlot {
    fn is_held(&self, now: Instant) -> bool {
        self.owner.is_some() && !self.expires_at.is_some_and(|at| now >= at)
    }

    /// Drop an expired lease. Returns `true` when one was dropped.
    fn expire(&mut self, now: Instant) -> bool {
        if self.owner.is_some() && !self.is_held(now) {
            self.clear();
            return true;
        }
        false
    }

    fn clear(&mut self) {
        self.owner = None;
        self.holds = 0;
        self.expires_at = None;
    }

    fn grant(&mut self, owner: &str, ttl: Duration, now: Instant) {
        self.owner = Some(owner.to_string());
        self.holds = 1;
        self.fence_token += 1;
        self.expires_at = Some(now + ttl);
    }

    fn try_take(&mut self, owner: &str, ttl: Duration, now: Instant) -> Take {
        match self.owner.as_deref() {
            Some(current) if current == owner => {
                self.holds += 1;
                self.expires_at = Some(now + ttl);
                Take::Reentered
            }
            Some(_) => Take::Busy,
            None => {
                self.grant(owner, ttl, now);
                Take::Granted
            }
        }
    }

    fn release(&mut self, owner: &str) -> Release {
        if self.owner.as_deref() != Some(owner) {
            return Release::NotOwner;
        }
        self.holds = self.holds.saturating_sub(1);
        if self.holds > 0 {
            return Release::StillHeld;
        }
        self.clear();
        Release::Freed
    }

    /// Give a free lock to the first waiter that is still listening
    ///
    /// The handoff is counted here only; the woken waiter does not count it again.
    fn hand_off(&mut self, ttl: Duration, now: Instant, stats: &LockStatsCollector) -> Option<String> {
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                self.grant(&waiter.owner, ttl, now);
                LockStatsCollector::incr(&stats.total_acquisitions);
                LockStatsCollector::incr(&stats.total_handoffs);
                return Some(waiter.owner);
            }
        }
        None
    }
}

struct LockStatsCollector {
    total_locks: AtomicU64,
    total_acquisitions: AtomicU64,
    total_renewals: AtomicU64,
    total_releases: AtomicU64,
    total_handoffs: AtomicU64,
    expired_locks: AtomicU64,
    failed_acquisitions: AtomicU64,
}

impl Default for LockStatsCollector {
    fn default() -> Self {
        Self {
            total_locks: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            total_renewals: AtomicU64::new(0),
            total_releases: AtomicU64::new(0),
            total_handoffs: AtomicU64::new(0),
            expired_locks: AtomicU64::new(0),
            failed_acquisitions: AtomicU64::new(0),
        }
    }
}

impl LockStatsCollector {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory lock registry
///
/// Suitable for tests and for electing a leader among tasks of one process.
/// A networked registry implements the same [`LockRegistry`] contract.
pub struct MemoryLockRegistry {
    slots: Arc<DashMap<String, Arc<Mutex<LockSlot>>>>,
    stats: Arc<LockStatsCollector>,
    config: MemoryLockConfig,
    cleanup_handle: Option<JoinHandle<()>>,
}

impl MemoryLockRegistry {
    pub fn new(config: MemoryLockConfig) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            stats: Arc::new(LockStatsCollector::default()),
            config,
            cleanup_handle: None,
        }
    }

    /// Start the background expiry scanner. Must be called inside a tokio runtime.
    pub fn with_cleanup(mut self) -> Self {
        let slots = self.slots.clone();
        let stats = self.stats.clone();
        let ttl = self.config.ttl();
        let period = self.config.cleanup_interval();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                Self::cleanup_expired_locks(&slots, &stats, ttl);
            }
        });

        info!(
            interval_ms = period.as_millis() as u64,
            "MemoryLockRegistry started background expiry task"
        );
        self.cleanup_handle = Some(handle);
        self
    }

    fn cleanup_expired_locks(
        slots: &DashMap<String, Arc<Mutex<LockSlot>>>,
        stats: &LockStatsCollector,
        ttl: Duration,
    ) {
        let now = Instant::now();
        let mut expired = 0usize;

        for entry in slots.iter() {
            let mut slot = entry.value().lock();
            if slot.expire(now) {
                expired += 1;
                LockStatsCollector::incr(&stats.expired_locks);
                if let Some(next) = slot.hand_off(ttl, now, stats) {
                    debug!(key = %entry.key(), owner = %next, "Expired lock handed to waiter");
                }
            }
        }

        if expired > 0 {
            debug!(count = expired, "Expired stale lock leases");
        }
    }

    fn slot(&self, key: &str) -> Arc<Mutex<LockSlot>> {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| {
                LockStatsCollector::incr(&self.stats.total_locks);
                Arc::new(Mutex::new(LockSlot::default()))
            })
            .clone()
    }

    /// Current holder of `key`, if its lease is still valid
    pub fn holder(&self, key: &str) -> Option<LockHolder> {
        let slot = self.slots.get(key)?;
        let slot = slot.lock();
        let now = Instant::now();
        if !slot.is_held(now) {
            return None;
        }
        Some(LockHolder {
            owner: slot.owner.clone()?,
            fence_token: slot.fence_token,
            holds: slot.holds,
            remaining_ttl_ms: slot
                .expires_at
                .map(|at| at.saturating_duration_since(now).as_millis() as u64)
                .unwrap_or(0),
        })
    }

    /// Break a lock regardless of its owner (admin operation)
    ///
    /// The previous holder only notices when it next tries to renew.
    pub fn force_release(&self, key: &str) -> bool {
        let Some(slot) = self.slots.get(key) else {
            return false;
        };
        let mut slot = slot.lock();
        if slot.owner.is_none() {
            return false;
        }
        let now = Instant::now();
        slot.clear();
        LockStatsCollector::incr(&self.stats.total_releases);
        if let Some(next) = slot.hand_off(self.config.ttl(), now, &self.stats) {
            debug!(key = %key, owner = %next, "Force released lock handed to waiter");
        }
        info!(key = %key, "Lock force released");
        true
    }

    pub fn stats(&self) -> LockStats {
        let now = Instant::now();
        let active_locks = self
            .slots
            .iter()
            .filter(|entry| entry.value().lock().is_held(now))
            .count() as u32;

        LockStats {
            total_locks: self.stats.total_locks.load(Ordering::Relaxed),
            active_locks,
            total_acquisitions: self.stats.total_acquisitions.load(Ordering::Relaxed),
            total_renewals: self.stats.total_renewals.load(Ordering::Relaxed),
            total_releases: self.stats.total_releases.load(Ordering::Relaxed),
            total_handoffs: self.stats.total_handoffs.load(Ordering::Relaxed),
            expired_locks: self.stats.expired_locks.load(Ordering::Relaxed),
            failed_acquisitions: self.stats.failed_acquisitions.load(Ordering::Relaxed),
        }
    }
}

impl Default for MemoryLockRegistry {
    fn default() -> Self {
        Self::new(MemoryLockConfig::default())
    }
}

impl Drop for MemoryLockRegistry {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

impl LockRegistry for MemoryLockRegistry {
    fn obtain(&self, key: &str) -> Arc<dyn DistributedLock> {
        Arc::new(MemoryLock {
            key: key.to_string(),
            owner: uuid::Uuid::new_v4().to_string(),
            slot: self.slot(key),
            stats: self.stats.clone(),
            ttl: self.config.ttl(),
        })
    }
}

/// Handle to one lock of a [`MemoryLockRegistry`]
pub struct MemoryLock {
    key: String,
    owner: String,
    slot: Arc<Mutex<LockSlot>>,
    stats: Arc<LockStatsCollector>,
    ttl: Duration,
}

#[async_trait]
impl DistributedLock for MemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    async fn try_acquire(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;

        loop {
            let (rx, wake_at) = {
                let mut slot = self.slot.lock();
                let now = Instant::now();

                if slot.expire(now) {
                    LockStatsCollector::incr(&self.stats.expired_locks);
                }

                match slot.try_take(&self.owner, self.ttl, now) {
                    Take::Granted => {
                        LockStatsCollector::incr(&self.stats.total_acquisitions);
                        debug!(key = %self.key, owner = %self.owner, fence_token = slot.fence_token, "Lock acquired");
                        return Ok(true);
                    }
                    Take::Reentered => {
                        LockStatsCollector::incr(&self.stats.total_renewals);
                        return Ok(true);
                    }
                    Take::Busy => {}
                }

                if now >= deadline {
                    LockStatsCollector::incr(&self.stats.failed_acquisitions);
                    return Ok(false);
                }

                let (tx, rx) = oneshot::channel();
                slot.waiters.push_back(LockWaiter {
                    owner: self.owner.clone(),
                    tx,
                });
                // Wake up early when the holder's lease runs out
                let wake_at = slot.expires_at.map_or(deadline, |at| at.min(deadline));
                (rx, wake_at)
            };

            if let Ok(Ok(())) = tokio::time::timeout_at(wake_at, rx).await {
                debug!(key = %self.key, owner = %self.owner, "Lock handed off");
                return Ok(true);
            }

            let mut slot = self.slot.lock();
            slot.waiters.retain(|w| w.owner != self.owner);
            // A handoff may have landed between the timeout and the removal
            if slot.owner.as_deref() == Some(self.owner.as_str()) {
                return Ok(true);
            }
        }
    }

    async fn release(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        let now = Instant::now();

        if slot.expire(now) {
            LockStatsCollector::incr(&self.stats.expired_locks);
        }

        match slot.release(&self.owner) {
            Release::Freed => {
                LockStatsCollector::incr(&self.stats.total_releases);
                debug!(key = %self.key, owner = %self.owner, "Lock released");
                if let Some(next) = slot.hand_off(self.ttl, now, &self.stats) {
                    debug!(key = %self.key, owner = %next, "Lock handed to waiter");
                }
            }
            Release::StillHeld => {
                debug!(key = %self.key, owner = %self.owner, holds = slot.holds, "Lock hold dropped");
            }
            Release::NotOwner => {
                debug!(key = %self.key, owner = %self.owner, "Release ignored, lock not held by this owner");
            }
        }
        Ok(())
    }
}
