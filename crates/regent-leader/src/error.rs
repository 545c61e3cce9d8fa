//! Leader election error types

use regent_lock::LockError;

/// Errors surfaced synchronously by the elector's lifecycle surface
///
/// Failures inside the election loop are never propagated; they are logged and
/// handled as a transient loss of leadership.
#[derive(Debug, thiserror::Error)]
pub enum LeaderError {
    #[error("invalid leader configuration: {0}")]
    InvalidConfig(String),

    #[error("no tokio runtime available to run the election loop")]
    NoRuntime,

    #[error(transparent)]
    Lock(#[from] LockError),
}

pub type Result<T> = std::result::Result<T, LeaderError>;
