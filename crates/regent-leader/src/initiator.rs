//! Lock registry leader initiator
//!
//! Initiates leader election for one candidate based on holding a lock. If
//! the lock is global and expiring there is never more than one leader, but
//! there may be short leaderless periods. The election ties up one task for
//! as long as it runs, so a native election primitive is usually cheaper when
//! one is available.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use regent_lock::LockRegistry;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::candidate::{Candidate, DefaultCandidate};
use crate::config::LeaderConfig;
use crate::context::{Context, ElectionState, LockContext, NullContext};
use crate::error::{LeaderError, Result};
use crate::event::LeaderEventPublisher;
use crate::selector::LeaderSelector;

/// Handles of the current (or last) election run
#[derive(Default)]
struct Lifecycle {
    context: Option<Arc<LockContext>>,
    cancel: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

/// Leader elector driving one [`Candidate`] through a [`LockRegistry`]
///
/// `start`/`stop` are serialized by an internal mutex that is never held while
/// the election loop runs, so `stop` stays prompt and may be called from any
/// thread, including from inside a leadership callback.
pub struct LockRegistryLeaderInitiator {
    registry: Arc<dyn LockRegistry>,
    candidate: Arc<dyn Candidate>,
    config: LeaderConfig,
    publisher: Option<Arc<dyn LeaderEventPublisher>>,
    runtime: Option<Handle>,
    running: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    null_context: Arc<NullContext>,
}

impl LockRegistryLeaderInitiator {
    /// Create an initiator for `candidate`, competing for the lock named by its role
    pub fn new(registry: Arc<dyn LockRegistry>, candidate: Arc<dyn Candidate>) -> Self {
        let null_context = Arc::new(NullContext::new(candidate.role()));
        Self {
            registry,
            candidate,
            config: LeaderConfig::default(),
            publisher: None,
            runtime: None,
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle::default()),
            null_context,
        }
    }

    /// Create an initiator with a [`DefaultCandidate`] that only logs
    pub fn with_default_candidate(registry: Arc<dyn LockRegistry>) -> Self {
        Self::new(registry, Arc::new(DefaultCandidate::new()))
    }

    pub fn with_config(mut self, config: LeaderConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn LeaderEventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Run the election loop on `runtime` instead of the caller's runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn candidate(&self) -> &Arc<dyn Candidate> {
        &self.candidate
    }

    pub fn config(&self) -> &LeaderConfig {
        &self.config
    }

    /// Start competing for leadership. No-op when already running.
    ///
    /// Leadership callbacks fire asynchronously from the election task from now on.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if self.running.load(Ordering::Acquire) {
            return Ok(());
        }

        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| LeaderError::NoRuntime)?,
        };

        let role = self.candidate.role().to_string();
        let lock = self.registry.obtain(&role);
        let state = Arc::new(ElectionState::default());
        let context = Arc::new(LockContext::new(
            role.clone(),
            self.candidate.id(),
            state.clone(),
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let selector = LeaderSelector::new(
            self.candidate.clone(),
            lock,
            state,
            context.clone(),
            self.publisher.clone(),
            self.config.clone(),
            cancel_rx,
        );

        // A previous run may still be unwinding: the new one starts only after
        // it has released the lock and revoked leadership
        let previous = lifecycle.task.take();
        let run_role = role.clone();
        let run = async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
                && e.is_panic()
            {
                error!(role = %run_role, "Previous leader election task panicked");
            }
            selector.run().await
        };

        self.running.store(true, Ordering::Release);
        lifecycle.task = Some(runtime.spawn(run));
        lifecycle.cancel = Some(cancel_tx);
        lifecycle.context = Some(context);

        debug!(role = %role, id = %self.candidate.id(), "Started LeaderInitiator");
        Ok(())
    }

    /// Stop competing. If currently leader, leadership is revoked by the loop.
    ///
    /// Returns without waiting for the loop to release the lock; use
    /// [`destroy`](Self::destroy) to wait for the teardown.
    pub fn stop(&self) {
        let lifecycle = self.lifecycle.lock();
        if self.running.swap(false, Ordering::AcqRel) {
            if let Some(cancel) = &lifecycle.cancel {
                cancel.send_replace(true);
            }
            debug!(role = %self.candidate.role(), id = %self.candidate.id(), "Stopped LeaderInitiator");
        }
    }

    /// Stop and wait until the election loop has released the lock
    ///
    /// Must not be awaited from inside a leadership callback of this initiator.
    pub async fn destroy(&self) {
        self.stop();
        let task = self.lifecycle.lock().task.take();
        if let Some(task) = task
            && let Err(e) = task.await
            && e.is_panic()
        {
            error!(role = %self.candidate.role(), "Leader election task panicked");
        }
    }

    /// Whether `start` was called without a later `stop`
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Leadership context of the current run
    ///
    /// Before the first `start` this is a context that is never leader.
    pub fn context(&self) -> Arc<dyn Context> {
        match &self.lifecycle.lock().context {
            Some(context) => context.clone() as Arc<dyn Context>,
            None => self.null_context.clone() as Arc<dyn Context>,
        }
    }
}

impl Drop for LockRegistryLeaderInitiator {
    fn drop(&mut self) {
        self.stop();
    }
}
