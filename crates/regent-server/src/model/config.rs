//! Configuration management for the election node
//!
//! Sources, later ones winning: `conf/application.yml` (or `--config`),
//! `REGENT__`-prefixed environment variables with `__` as the key separator
//! (e.g. `REGENT__LEADER__HEARTBEAT_MS=200`), then command line flags.

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment};
use regent_leader::{DEFAULT_ROLE, LeaderConfig};
use regent_lock::MemoryLockConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

const NODE_SECTION: &str = "regent.node";
const LOCK_SECTION: &str = "regent.lock";

/// Command line arguments for the server
#[derive(Debug, Parser)]
#[command(name = "regent-server", version, about = "Lock-based leader election node")]
struct Cli {
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
    config: String,
    #[arg(short = 'n', long = "candidates")]
    candidates: Option<u32>,
    #[arg(short = 'r', long = "role")]
    role: Option<String>,
    #[arg(long = "heartbeat-ms")]
    heartbeat_ms: Option<u64>,
    #[arg(long = "busy-wait-ms")]
    busy_wait_ms: Option<u64>,
    #[arg(long = "yield-interval-ms")]
    yield_interval_ms: Option<u64>,
    #[arg(long = "log-dir", env = "REGENT_LOG_DIR")]
    log_dir: Option<String>,
}

fn default_candidates() -> u32 {
    1
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

fn default_event_queue_size() -> usize {
    64
}

/// Candidates run by this node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Number of candidates competing for the role (default: 1)
    #[serde(default = "default_candidates")]
    pub candidates: u32,

    /// Role, which is also the lock key (default: "leader")
    #[serde(default = "default_role")]
    pub role: String,

    /// Make the current leader yield on this interval, 0 disables (default: 0)
    #[serde(default)]
    pub yield_interval_ms: u64,

    /// Capacity of the leader event broadcast channel (default: 64)
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            role: default_role(),
            yield_interval_ms: 0,
            event_queue_size: default_event_queue_size(),
        }
    }
}

impl NodeConfig {
    pub fn yield_interval(&self) -> Option<Duration> {
        (self.yield_interval_ms > 0).then(|| Duration::from_millis(self.yield_interval_ms))
    }
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration for the process' command line
    pub fn new() -> anyhow::Result<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(args: Cli) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .add_source(
                config::File::with_name(&args.config).required(args.config != DEFAULT_CONFIG_FILE),
            )
            .add_source(
                Environment::with_prefix("regent")
                    .prefix_separator("__")
                    .separator("__")
                    .keep_prefix(true)
                    .try_parsing(true),
            );

        if let Some(v) = args.candidates {
            builder = builder.set_override("regent.node.candidates", v as i64)?;
        }
        if let Some(v) = args.role {
            builder = builder.set_override("regent.node.role", v)?;
        }
        if let Some(v) = args.yield_interval_ms {
            builder = builder.set_override("regent.node.yield_interval_ms", v as i64)?;
        }
        if let Some(v) = args.heartbeat_ms {
            builder = builder.set_override("regent.leader.heartbeat_ms", v as i64)?;
        }
        if let Some(v) = args.busy_wait_ms {
            builder = builder.set_override("regent.leader.busy_wait_ms", v as i64)?;
        }
        if let Some(v) = args.log_dir {
            builder = builder.set_override("regent.logs.path", v)?;
        }

        let config = builder.build().map_err(|e| {
            anyhow::anyhow!("Failed to build configuration - check {}: {}", args.config, e)
        })?;
        Ok(Configuration { config })
    }

    /// Deserialize a section, using its defaults when absent
    fn section<T: DeserializeOwned + Default>(&self, key: &str) -> anyhow::Result<T> {
        match self.config.get::<T>(key) {
            Ok(value) => Ok(value),
            Err(ConfigError::NotFound(_)) => Ok(T::default()),
            Err(e) => Err(anyhow::anyhow!("Invalid `{}` configuration: {}", key, e)),
        }
    }

    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let node: NodeConfig = self.section(NODE_SECTION)?;
        if node.candidates == 0 {
            anyhow::bail!("regent.node.candidates must be at least 1");
        }
        if node.role.is_empty() {
            anyhow::bail!("regent.node.role must not be empty");
        }
        Ok(node)
    }

    pub fn leader_config(&self) -> anyhow::Result<LeaderConfig> {
        Ok(LeaderConfig::from_config(&self.config)?)
    }

    pub fn lock_config(&self) -> anyhow::Result<MemoryLockConfig> {
        self.section(LOCK_SECTION)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("regent.logs.path").ok(),
            self.config.get_bool("regent.logs.console").unwrap_or(true),
            self.config.get_bool("regent.logs.file").unwrap_or(false),
            self.config
                .get_string("regent.logs.level")
                .unwrap_or("info".to_string()),
            self.config.get_string("regent.logs.rotation").ok(),
        )
    }
}
