//! Lock error types

/// Errors raised by a lock backend
///
/// Ordinary contention is never an error: `try_acquire` reports it as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The backing session or worker was torn down while the call was in flight
    #[error("lock operation interrupted: {0}")]
    Interrupted(String),

    #[error("lock backend error: {0}")]
    Backend(String),

    #[error("lock backend timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl LockError {
    /// Whether this error is a cancellation-class signal rather than a generic failure
    pub fn is_interruption(&self) -> bool {
        matches!(self, LockError::Interrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
