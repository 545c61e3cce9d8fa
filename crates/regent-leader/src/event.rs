// Leader event publishing
// Broadcasts leadership changes to the rest of an application

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::context::Context;

/// Type of leadership change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderEventKind {
    /// The candidate became leader
    Granted,
    /// The candidate stopped being leader
    Revoked,
    /// An acquisition attempt lost to another holder
    FailedToAcquire,
}

impl fmt::Display for LeaderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderEventKind::Granted => write!(f, "ON_GRANTED"),
            LeaderEventKind::Revoked => write!(f, "ON_REVOKED"),
            LeaderEventKind::FailedToAcquire => write!(f, "ON_FAILED_TO_ACQUIRE"),
        }
    }
}

/// Leadership change event
#[derive(Clone)]
pub struct LeaderEvent {
    pub kind: LeaderEventKind,
    /// Id of the candidate whose elector published the event
    pub source: String,
    pub role: String,
    pub context: Arc<dyn Context>,
    /// Unix millis
    pub timestamp: i64,
}

impl LeaderEvent {
    pub fn new(
        kind: LeaderEventKind,
        source: impl Into<String>,
        context: Arc<dyn Context>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: source.into(),
            role: role.into(),
            context,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl fmt::Debug for LeaderEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderEvent")
            .field("kind", &self.kind)
            .field("source", &self.source)
            .field("role", &self.role)
            .field("context", &self.context.to_string())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Receiver of leadership notifications from an elector
///
/// Publishing is best-effort: the elector logs returned errors and carries on.
#[async_trait]
pub trait LeaderEventPublisher: Send + Sync {
    async fn publish_on_granted(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()>;

    async fn publish_on_revoked(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()>;

    async fn publish_on_failed_to_acquire(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()>;
}

/// Publisher that fans events out over a tokio broadcast channel
pub struct DefaultLeaderEventPublisher {
    broadcast_tx: broadcast::Sender<LeaderEvent>,
}

impl DefaultLeaderEventPublisher {
    pub fn new(queue_size: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(queue_size.max(1));
        Self { broadcast_tx }
    }

    /// Subscribe to leader events
    pub fn subscribe(&self) -> broadcast::Receiver<LeaderEvent> {
        self.broadcast_tx.subscribe()
    }

    fn publish(&self, event: LeaderEvent) {
        debug!(kind = %event.kind, role = %event.role, source = %event.source, "Publishing leader event");
        // No subscribers is not an error
        let _ = self.broadcast_tx.send(event);
    }
}

impl Default for DefaultLeaderEventPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl LeaderEventPublisher for DefaultLeaderEventPublisher {
    async fn publish_on_granted(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        self.publish(LeaderEvent::new(LeaderEventKind::Granted, source, context, role));
        Ok(())
    }

    async fn publish_on_revoked(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        self.publish(LeaderEvent::new(LeaderEventKind::Revoked, source, context, role));
        Ok(())
    }

    async fn publish_on_failed_to_acquire(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        self.publish(LeaderEvent::new(
            LeaderEventKind::FailedToAcquire,
            source,
            context,
            role,
        ));
        Ok(())
    }
}

/// A simple logging publisher for debugging
pub struct LoggingLeaderEventPublisher;

#[async_trait]
impl LeaderEventPublisher for LoggingLeaderEventPublisher {
    async fn publish_on_granted(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        info!("[LeaderEvent] {} granted role '{}': {}", source, role, context);
        Ok(())
    }

    async fn publish_on_revoked(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        info!("[LeaderEvent] {} revoked from role '{}': {}", source, role, context);
        Ok(())
    }

    async fn publish_on_failed_to_acquire(
        &self,
        source: &str,
        context: Arc<dyn Context>,
        role: &str,
    ) -> anyhow::Result<()> {
        debug!("[LeaderEvent] {} failed to acquire role '{}': {}", source, role, context);
        Ok(())
    }
}
