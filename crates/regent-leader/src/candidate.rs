//! Leadership candidates

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::context::Context;

/// Role used when a candidate does not name one
pub const DEFAULT_ROLE: &str = "leader";

/// Business logic bound to one leadership role
///
/// Errors and panics raised by the callbacks are caught and logged by the
/// elector; they never stop the election.
#[async_trait]
pub trait Candidate: Send + Sync {
    /// The contested role, also used as the lock key
    fn role(&self) -> &str;

    /// Unique id of this participant
    fn id(&self) -> &str;

    /// Leadership was granted
    async fn on_granted(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()>;

    /// Leadership was revoked, yielded or dropped on shutdown
    async fn on_revoked(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()>;
}

/// Candidate that only logs its leadership changes
#[derive(Clone, Debug)]
pub struct DefaultCandidate {
    id: String,
    role: String,
}

impl DefaultCandidate {
    pub fn new() -> Self {
        Self::with_role(DEFAULT_ROLE)
    }

    pub fn with_role(role: impl Into<String>) -> Self {
        Self::with_id_and_role(uuid::Uuid::new_v4().to_string(), role)
    }

    pub fn with_id_and_role(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

impl Default for DefaultCandidate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Candidate for DefaultCandidate {
    fn role(&self) -> &str {
        &self.role
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn on_granted(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()> {
        info!(role = %self.role, id = %self.id, "{} has been granted leadership; context: {}", self.id, ctx);
        Ok(())
    }

    async fn on_revoked(&self, ctx: Arc<dyn Context>) -> anyhow::Result<()> {
        info!(role = %self.role, id = %self.id, "{} leadership has been revoked; context: {}", self.id, ctx);
        Ok(())
    }
}
