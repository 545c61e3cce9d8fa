//! Lock registry data model

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_ttl_ms() -> u64 {
    30000 // 30 seconds
}

fn default_cleanup_interval_ms() -> u64 {
    5000
}

/// Configuration of the in-memory lock registry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryLockConfig {
    /// Lease length granted on every acquisition or renewal (default: 30000ms)
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Interval of the background expiry scanner (default: 5000ms)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for MemoryLockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
        }
    }
}

impl MemoryLockConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

/// Snapshot of the current holder of a lock
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Owner identity of the holding handle
    pub owner: String,
    /// Fence token, bumped every time the lock changes hands
    pub fence_token: u64,
    /// Re-entrant hold count
    pub holds: u32,
    /// Remaining lease in milliseconds
    pub remaining_ttl_ms: u64,
}

/// Lock registry statistics
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    pub total_locks: u64,
    pub active_locks: u32,
    pub total_acquisitions: u64,
    pub total_renewals: u64,
    pub total_releases: u64,
    pub total_handoffs: u64,
    pub expired_locks: u64,
    pub failed_acquisitions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MemoryLockConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(30));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: MemoryLockConfig = serde_yaml::from_str("ttl_ms: 200").unwrap();
        assert_eq!(config.ttl_ms, 200);
        assert_eq!(config.cleanup_interval_ms, 5000);
    }

    #[test]
    fn test_with_ttl() {
        let config = MemoryLockConfig::with_ttl(Duration::from_millis(250));
        assert_eq!(config.ttl_ms, 250);
    }
}
