//! Election loop
//!
//! One `LeaderSelector` runs per `start()` of an initiator. It keeps trying to
//! acquire the role's lock, even while leader, so an expired or stolen lock is
//! noticed on the next heartbeat:
//!
//! | locked | acquired | action                                                   |
//! |--------|----------|----------------------------------------------------------|
//! | false  | true     | become leader, notify granted                            |
//! | false  | false    | stay follower, optionally publish failed-to-acquire      |
//! | true   | true     | lease renewed; drop the extra hold, sleep one heartbeat  |
//! | true   | false    | lock lost, notify revoked, retry after the busy wait     |
//!
//! Interruptions from the lock backend restart the round after a busy wait.
//! Any other error is a transient loss of leadership followed by a busy wait.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, gauge};
use regent_lock::{DistributedLock, LockError};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::candidate::Candidate;
use crate::config::LeaderConfig;
use crate::context::{Context, ElectionState, LockContext};
use crate::event::LeaderEventPublisher;

pub(crate) struct LeaderSelector {
    role: String,
    candidate: Arc<dyn Candidate>,
    lock: Arc<dyn DistributedLock>,
    state: Arc<ElectionState>,
    context: Arc<LockContext>,
    publisher: Option<Arc<dyn LeaderEventPublisher>>,
    config: LeaderConfig,
    cancel: watch::Receiver<bool>,
}

impl LeaderSelector {
    pub(crate) fn new(
        candidate: Arc<dyn Candidate>,
        lock: Arc<dyn DistributedLock>,
        state: Arc<ElectionState>,
        context: Arc<LockContext>,
        publisher: Option<Arc<dyn LeaderEventPublisher>>,
        config: LeaderConfig,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            role: candidate.role().to_string(),
            candidate,
            lock,
            state,
            context,
            publisher,
            config,
            cancel,
        }
    }

    /// Run rounds until cancelled, then give up the lock
    pub(crate) async fn run(mut self) {
        debug!(role = %self.role, owner = %self.lock.owner(), "Leader election loop started");
        let mut restarts: u64 = 0;

        while let Err(e) = self.elect().await {
            restarts += 1;
            counter!("leader_election_restarts_total", "role" => self.role.clone()).increment(1);
            warn!(
                role = %self.role,
                restarts,
                error = %e,
                "Leader election interrupted, restarting after {}ms",
                self.config.busy_wait_ms
            );
            if !self.pause(self.config.busy_wait()).await {
                break;
            }
        }

        self.unwind().await;
        debug!(role = %self.role, "Leader election loop finished");
    }

    /// One election round. Returns `Err` only for an interruption while still running.
    async fn elect(&mut self) -> Result<(), LockError> {
        while !self.is_cancelled() {
            if self.state.take_yield() {
                if self.state.is_locked() {
                    info!(role = %self.role, "Yielding leadership");
                    self.relinquish().await;
                    // Give a rival waiting on the lock the chance to take it
                    self.pause(self.config.busy_wait()).await;
                }
                continue;
            }

            let heartbeat = self.config.heartbeat();
            let attempt = tokio::select! {
                biased;
                _ = Self::cancelled(&mut self.cancel) => break,
                result = self.lock.try_acquire(heartbeat) => result,
            };

            let outcome = match attempt {
                Ok(acquired) => self.on_attempt(acquired).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {}
                Err(e) if e.is_interruption() => {
                    if self.state.is_locked() {
                        self.relinquish().await;
                    }
                    if self.is_cancelled() {
                        return Ok(());
                    }
                    return Err(e);
                }
                Err(e) => {
                    counter!("leader_election_errors_total", "role" => self.role.clone()).increment(1);
                    let was_leader = self.state.is_locked();
                    if was_leader {
                        self.relinquish().await;
                    }
                    warn!(
                        role = %self.role,
                        error = %e,
                        was_leader,
                        "Error acquiring the lock for {}, retrying",
                        self.context
                    );
                    self.pause(self.config.busy_wait()).await;
                }
            }

            // Stay cooperative even if a backend answers without awaiting
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn on_attempt(&mut self, acquired: bool) -> Result<(), LockError> {
        match (self.state.is_locked(), acquired) {
            (false, true) => {
                self.state.set_locked(true);
                self.granted().await;
            }
            (false, false) => {
                trace!(role = %self.role, "Lock held elsewhere, still a follower");
                if self.config.publish_failed_events {
                    self.publish_failed_to_acquire().await;
                }
            }
            (true, true) => {
                // Re-entrant acquire renewed our lease; drop the extra hold
                self.lock.release().await?;
                self.heartbeat_pause().await;
            }
            (true, false) => {
                warn!(role = %self.role, "Lock lost, revoking leadership");
                self.state.set_locked(false);
                self.revoked().await;
                self.pause(self.config.busy_wait()).await;
            }
        }
        Ok(())
    }

    /// Stop being leader: flip the flag first so no observer sees two leaders
    async fn relinquish(&mut self) {
        self.state.set_locked(false);
        if let Err(e) = self.lock.release().await {
            warn!(
                role = %self.role,
                error = %e,
                "Could not unlock - treat as broken {}",
                self.context
            );
        }
        self.revoked().await;
    }

    async fn unwind(&mut self) {
        if self.state.is_locked() {
            self.relinquish().await;
        } else if let Err(e) = self.lock.release().await {
            // Drops a hold handed to us while an acquisition was being cancelled
            debug!(role = %self.role, error = %e, "Final unlock failed");
        }
    }

    async fn granted(&self) {
        info!(role = %self.role, id = %self.candidate.id(), "Leadership granted");
        gauge!("leader_elected", "role" => self.role.clone()).set(1.0);
        counter!("leader_granted_total", "role" => self.role.clone()).increment(1);

        let ctx = self.context();
        self.guarded("on_granted callback", self.candidate.on_granted(ctx.clone()))
            .await;
        if let Some(publisher) = &self.publisher {
            self.guarded(
                "OnGranted event",
                publisher.publish_on_granted(self.candidate.id(), ctx, &self.role),
            )
            .await;
        }
    }

    async fn revoked(&self) {
        info!(role = %self.role, id = %self.candidate.id(), "Leadership revoked");
        gauge!("leader_elected", "role" => self.role.clone()).set(0.0);
        counter!("leader_revoked_total", "role" => self.role.clone()).increment(1);

        let ctx = self.context();
        self.guarded("on_revoked callback", self.candidate.on_revoked(ctx.clone()))
            .await;
        if let Some(publisher) = &self.publisher {
            self.guarded(
                "OnRevoked event",
                publisher.publish_on_revoked(self.candidate.id(), ctx, &self.role),
            )
            .await;
        }
    }

    async fn publish_failed_to_acquire(&self) {
        if let Some(publisher) = &self.publisher {
            self.guarded(
                "OnFailedToAcquire event",
                publisher.publish_on_failed_to_acquire(self.candidate.id(), self.context(), &self.role),
            )
            .await;
        }
    }

    /// Await a callback, logging its error or panic instead of propagating it
    async fn guarded<F>(&self, what: &'static str, fut: F)
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(role = %self.role, error = %e, "Error in {}", what),
            Err(_) => error!(role = %self.role, "Panic in {}", what),
        }
    }

    fn context(&self) -> Arc<dyn Context> {
        self.context.clone()
    }

    fn is_cancelled(&self) -> bool {
        // A dropped sender means the initiator itself is gone
        self.cancel.has_changed().is_err() || *self.cancel.borrow()
    }

    async fn cancelled(cancel: &mut watch::Receiver<bool>) {
        while !*cancel.borrow_and_update() {
            if cancel.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` when cancelled.
    async fn pause(&mut self, period: Duration) -> bool {
        tokio::select! {
            biased;
            _ = Self::cancelled(&mut self.cancel) => false,
            _ = tokio::time::sleep(period) => true,
        }
    }

    /// Leader's pacing sleep, cut short by a yield request
    async fn heartbeat_pause(&mut self) {
        let state = self.state.clone();
        tokio::select! {
            biased;
            _ = Self::cancelled(&mut self.cancel) => {}
            _ = state.woken() => {}
            _ = tokio::time::sleep(self.config.heartbeat()) => {}
        }
    }
}
