//! Leadership context handed to candidates and callers

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use tokio::sync::Notify;
use tracing::debug;

/// Current leadership state of one candidate for its role
pub trait Context: Send + Sync + fmt::Display {
    /// Whether the candidate currently holds the role's lock
    fn is_leader(&self) -> bool;

    /// The contested role
    fn role(&self) -> &str;

    /// Ask to give up leadership
    ///
    /// Non-blocking. The lock is released by the election loop on its next
    /// iteration, after which the candidate competes again.
    fn yield_leadership(&self);
}

/// Flags shared between one election loop and its context
///
/// Written by the loop only (apart from `yielding`), read from anywhere.
#[derive(Default)]
pub(crate) struct ElectionState {
    locked: AtomicBool,
    yielding: AtomicBool,
    wake: Notify,
}

impl ElectionState {
    pub(crate) fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    /// Consume the one-shot yield request
    ///
    /// Also drops the wake permit the request left behind when the loop was not
    /// parked, so it cannot cut short a pause of a later term.
    pub(crate) fn take_yield(&self) -> bool {
        if !self.yielding.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _ = self.wake.notified().now_or_never();
        true
    }

    pub(crate) fn request_yield(&self) {
        self.yielding.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) async fn woken(&self) {
        self.wake.notified().await;
    }
}

/// Context of one running election, backed by the loop's lock state
pub struct LockContext {
    role: String,
    id: String,
    state: Arc<ElectionState>,
}

impl LockContext {
    pub(crate) fn new(role: impl Into<String>, id: impl Into<String>, state: Arc<ElectionState>) -> Self {
        Self {
            role: role.into(),
            id: id.into(),
            state,
        }
    }

    /// Id of the candidate this context belongs to
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Context for LockContext {
    fn is_leader(&self) -> bool {
        self.state.is_locked()
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn yield_leadership(&self) {
        // A follower has nothing to give up
        if !self.is_leader() {
            return;
        }
        debug!(role = %self.role, id = %self.id, "Leadership yield requested");
        self.state.request_yield();
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LockContext{{role={}, id={}, isLeader={}}}",
            self.role,
            self.id,
            self.is_leader()
        )
    }
}

/// Context returned before the elector has ever started
pub struct NullContext {
    role: String,
}

impl NullContext {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Context for NullContext {
    fn is_leader(&self) -> bool {
        false
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn yield_leadership(&self) {}
}

impl fmt::Display for NullContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullContext{{role={}}}", self.role)
    }
}
