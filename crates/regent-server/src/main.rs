//! Main entry point for the Regent election node.

use std::sync::Arc;

use regent_lock::MemoryLockRegistry;
use regent_server::{model::Configuration, node::ElectionNode, startup};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;
    let _logging_guard = startup::init_logging(&configuration.logging_config())?;
    regent_server::metrics::init_metrics();

    let node_config = configuration.node_config()?;
    let leader_config = configuration.leader_config()?;
    let lock_config = configuration.lock_config()?;

    if leader_config.heartbeat_ms >= lock_config.ttl_ms {
        warn!(
            heartbeat_ms = leader_config.heartbeat_ms,
            ttl_ms = lock_config.ttl_ms,
            "Heartbeat is not shorter than the lock lease, leadership may flap"
        );
    }

    info!(
        role = %node_config.role,
        candidates = node_config.candidates,
        heartbeat_ms = leader_config.heartbeat_ms,
        busy_wait_ms = leader_config.busy_wait_ms,
        ttl_ms = lock_config.ttl_ms,
        "Starting regent node"
    );

    let registry = Arc::new(MemoryLockRegistry::new(lock_config).with_cleanup());
    let mut node = ElectionNode::new(node_config, leader_config, registry)?;
    node.start()?;

    startup::wait_for_shutdown_signal().await;
    node.shutdown().await;

    Ok(())
}
