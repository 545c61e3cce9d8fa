//! Leader election configuration
//!
//! Timing rules of thumb:
//! - `heartbeat_ms` bounds every acquisition attempt and paces lease renewal
//!   while leader. It has to stay below the lock's expiry, otherwise other
//!   nodes can steal the lock while the leader sleeps.
//! - `busy_wait_ms` is the pause before competing again after losing the lock
//!   or hitting an error. The longer it is, the longer the cluster can stay
//!   leaderless after a leader dies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LeaderError, Result};

/// Key of the leader section in application configuration
pub const CONFIG_PREFIX: &str = "regent.leader";

fn default_heartbeat_ms() -> u64 {
    500
}

fn default_busy_wait_ms() -> u64 {
    50
}

/// Election loop timing and event policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderConfig {
    /// Bound on each acquisition attempt and pause after a redundant acquire (default: 500ms)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Pause before retrying after losing leadership or an error (default: 50ms)
    #[serde(default = "default_busy_wait_ms")]
    pub busy_wait_ms: u64,

    /// Publish an event for every failed acquisition attempt (default: false)
    ///
    /// Off by default: under sustained contention every follower would emit
    /// one event per heartbeat.
    #[serde(default)]
    pub publish_failed_events: bool,
}

impl Default for LeaderConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: default_heartbeat_ms(),
            busy_wait_ms: default_busy_wait_ms(),
            publish_failed_events: false,
        }
    }
}

impl LeaderConfig {
    pub fn new(heartbeat: Duration, busy_wait: Duration) -> Self {
        Self {
            heartbeat_ms: heartbeat.as_millis() as u64,
            busy_wait_ms: busy_wait.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn with_publish_failed_events(mut self, enabled: bool) -> Self {
        self.publish_failed_events = enabled;
        self
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn busy_wait(&self) -> Duration {
        Duration::from_millis(self.busy_wait_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_ms == 0 {
            return Err(LeaderError::InvalidConfig(
                "heartbeat_ms must be positive".to_string(),
            ));
        }
        if self.busy_wait_ms > self.heartbeat_ms {
            return Err(LeaderError::InvalidConfig(format!(
                "busy_wait_ms ({}) must not exceed heartbeat_ms ({})",
                self.busy_wait_ms, self.heartbeat_ms
            )));
        }
        Ok(())
    }

    /// Read the `regent.leader` section, falling back to defaults when absent
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let leader = match config.get::<LeaderConfig>(CONFIG_PREFIX) {
            Ok(leader) => leader,
            Err(config::ConfigError::NotFound(_)) => Self::default(),
            Err(e) => return Err(LeaderError::InvalidConfig(e.to_string())),
        };
        leader.validate()?;
        Ok(leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LeaderConfig::default();
        assert_eq!(config.heartbeat(), Duration::from_millis(500));
        assert_eq!(config.busy_wait(), Duration::from_millis(50));
        assert!(!config.publish_failed_events);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_heartbeat() {
        let config = LeaderConfig::new(Duration::ZERO, Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(LeaderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_busy_wait_above_heartbeat() {
        let config = LeaderConfig::new(Duration::from_millis(100), Duration::from_millis(200));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml() {
        let config: LeaderConfig = serde_yaml::from_str("heartbeat_ms: 200").unwrap();
        assert_eq!(config.heartbeat_ms, 200);
        assert_eq!(config.busy_wait_ms, 50);
        assert!(!config.publish_failed_events);
    }

    #[test]
    fn test_from_config() {
        let source = config::Config::builder()
            .set_override("regent.leader.heartbeat_ms", 200)
            .unwrap()
            .set_override("regent.leader.publish_failed_events", true)
            .unwrap()
            .build()
            .unwrap();

        let config = LeaderConfig::from_config(&source).unwrap();
        assert_eq!(config.heartbeat_ms, 200);
        assert_eq!(config.busy_wait_ms, 50);
        assert!(config.publish_failed_events);
    }

    #[test]
    fn test_from_config_missing_section() {
        let source = config::Config::builder().build().unwrap();
        assert_eq!(
            LeaderConfig::from_config(&source).unwrap(),
            LeaderConfig::default()
        );
    }

    #[test]
    fn test_from_config_invalid_values() {
        let source = config::Config::builder()
            .set_override("regent.leader.heartbeat_ms", 10)
            .unwrap()
            .set_override("regent.leader.busy_wait_ms", 20)
            .unwrap()
            .build()
            .unwrap();
        assert!(LeaderConfig::from_config(&source).is_err());
    }
}
