// Shared fixtures for leader election tests
// Recording candidates and lock registries with counters and injectable faults

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use regent_leader::{Candidate, Context, LeaderConfig, LockRegistryLeaderInitiator};
use regent_lock::{DistributedLock, LockError, LockRegistry, MemoryLockConfig, MemoryLockRegistry};

pub const ROLE: &str = "leader";

pub fn fast_config() -> LeaderConfig {
    LeaderConfig::new(Duration::from_millis(50), Duration::from_millis(10))
}

pub fn memory_registry(ttl_ms: u64) -> Arc<MemoryLockRegistry> {
    Arc::new(MemoryLockRegistry::new(MemoryLockConfig {
        ttl_ms,
        ..Default::default()
    }))
}

pub fn initiator(
    registry: Arc<dyn LockRegistry>,
    candidate: Arc<RecordingCandidate>,
) -> LockRegistryLeaderInitiator {
    LockRegistryLeaderInitiator::new(registry, candidate)
        .with_config(fast_config())
        .unwrap()
}

/// Poll `condition` every few milliseconds until it holds or `timeout` elapses
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Granted,
    Revoked,
}

/// Candidate recording every callback, optionally failing or calling back into its initiator
pub struct RecordingCandidate {
    id: String,
    role: String,
    transitions: Mutex<Vec<Transition>>,
    fail_callbacks: AtomicBool,
    panic_on_granted: AtomicBool,
    stop_on_granted: AtomicBool,
    revoke_delay_ms: AtomicU64,
    initiator: OnceLock<Weak<LockRegistryLeaderInitiator>>,
}

impl RecordingCandidate {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            role: ROLE.to_string(),
            transitions: Mutex::new(Vec::new()),
            fail_callbacks: AtomicBool::new(false),
            panic_on_granted: AtomicBool::new(false),
            stop_on_granted: AtomicBool::new(false),
            revoke_delay_ms: AtomicU64::new(0),
            initiator: OnceLock::new(),
        })
    }

    pub fn failing(self: Arc<Self>) -> Arc<Self> {
        self.fail_callbacks.store(true, Ordering::SeqCst);
        self
    }

    pub fn panicking(self: Arc<Self>) -> Arc<Self> {
        self.panic_on_granted.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep in the revoked callback before recording it
    pub fn slow_revoke(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.revoke_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        self
    }

    /// Stop the bound initiator from inside the granted callback
    pub fn stop_on_granted(&self, initiator: &Arc<LockRegistryLeaderInitiator>) {
        let _ = self.initiator.set(Arc::downgrade(initiator));
        self.stop_on_granted.store(true, Ordering::SeqCst);
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn granted(&self) -> usize {
        self.count(Transition::Granted)
    }

    pub fn revoked(&self) -> usize {
        self.count(Transition::Revoked)
    }

    fn count(&self, kind: Transition) -> usize {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| **t == kind)
            .count()
    }

    /// Granted and revoked strictly alternate, starting with granted
    pub fn assert_alternating(&self) {
        for (i, transition) in self.transitions().iter().enumerate() {
            let expected = if i % 2 == 0 {
                Transition::Granted
            } else {
                Transition::Revoked
            };
            assert_eq!(
                *transition, expected,
                "candidate {} transition #{} out of order: {:?}",
                self.id,
                i,
                self.transitions()
            );
        }
    }

    fn record(&self, transition: Transition) {
        self.transitions.lock().unwrap().push(transition);
    }
}

#[async_trait]
impl Candidate for RecordingCandidate {
    fn role(&self) -> &str {
        &self.role
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn on_granted(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()> {
        assert!(ctx.is_leader());
        self.record(Transition::Granted);
        if self.stop_on_granted.load(Ordering::SeqCst)
            && let Some(initiator) = self.initiator.get().and_then(Weak::upgrade)
        {
            initiator.stop();
        }
        if self.panic_on_granted.load(Ordering::SeqCst) {
            panic!("intentional panic in on_granted");
        }
        if self.fail_callbacks.load(Ordering::SeqCst) {
            anyhow::bail!("intentional failure in on_granted");
        }
        Ok(())
    }

    async fn on_revoked(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()> {
        assert!(!ctx.is_leader());
        let delay = self.revoke_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.record(Transition::Revoked);
        if self.fail_callbacks.load(Ordering::SeqCst) {
            anyhow::bail!("intentional failure in on_revoked");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub enum Fault {
    Backend,
    Interrupted,
}

#[derive(Default)]
pub struct LockCounters {
    pub obtained: AtomicUsize,
    pub acquire_calls: AtomicUsize,
    pub acquired: AtomicUsize,
    pub releases: AtomicUsize,
}

impl LockCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Wraps a shared memory registry, counting calls and failing on demand
pub struct FaultyRegistry {
    inner: Arc<MemoryLockRegistry>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
    pub counters: Arc<LockCounters>,
}

impl FaultyRegistry {
    pub fn new(inner: Arc<MemoryLockRegistry>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            faults: Arc::new(Mutex::new(VecDeque::new())),
            counters: Arc::new(LockCounters::default()),
        })
    }

    /// Fail the next acquisition attempt made through this registry
    pub fn inject(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    pub fn pending_faults(&self) -> usize {
        self.faults.lock().unwrap().len()
    }
}

impl LockRegistry for FaultyRegistry {
    fn obtain(&self, key: &str) -> Arc<dyn DistributedLock> {
        self.counters.obtained.fetch_add(1, Ordering::SeqCst);
        Arc::new(FaultyLock {
            inner: self.inner.obtain(key),
            faults: self.faults.clone(),
            counters: self.counters.clone(),
        })
    }
}

struct FaultyLock {
    inner: Arc<dyn DistributedLock>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
    counters: Arc<LockCounters>,
}

#[async_trait]
impl DistributedLock for FaultyLock {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn owner(&self) -> &str {
        self.inner.owner()
    }

    async fn try_acquire(&self, timeout: Duration) -> regent_lock::Result<bool> {
        self.counters.acquire_calls.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults.lock().unwrap().pop_front();
        match fault {
            Some(Fault::Backend) => {
                return Err(LockError::Backend("injected backend failure".to_string()));
            }
            Some(Fault::Interrupted) => {
                return Err(LockError::Interrupted("injected interruption".to_string()));
            }
            None => {}
        }
        let acquired = self.inner.try_acquire(timeout).await?;
        if acquired {
            self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        }
        Ok(acquired)
    }

    async fn release(&self) -> regent_lock::Result<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release().await
    }
}

/// Registry whose locks grant every acquisition, like a per-session re-entrant lock
#[derive(Default)]
pub struct AlwaysGrantRegistry {
    pub counters: Arc<LockCounters>,
}

impl LockRegistry for AlwaysGrantRegistry {
    fn obtain(&self, key: &str) -> Arc<dyn DistributedLock> {
        self.counters.obtained.fetch_add(1, Ordering::SeqCst);
        Arc::new(AlwaysGrantLock {
            key: key.to_string(),
            counters: self.counters.clone(),
        })
    }
}

struct AlwaysGrantLock {
    key: String,
    counters: Arc<LockCounters>,
}

#[async_trait]
impl DistributedLock for AlwaysGrantLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn owner(&self) -> &str {
        "always"
    }

    async fn try_acquire(&self, _timeout: Duration) -> regent_lock::Result<bool> {
        self.counters.acquire_calls.fetch_add(1, Ordering::SeqCst);
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn release(&self) -> regent_lock::Result<()> {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
