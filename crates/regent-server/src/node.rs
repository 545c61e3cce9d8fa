//! Election node
//!
//! Runs a group of candidates competing for one role on a shared in-memory
//! lock registry and logs every leadership change. With a yield interval the
//! node periodically asks the current leader to step down, which exercises
//! failover without killing anything.

use std::sync::Arc;
use std::time::Duration;

use regent_leader::{
    Context, DefaultCandidate, DefaultLeaderEventPublisher, LeaderConfig, LeaderEvent,
    LockRegistryLeaderInitiator,
};
use regent_lock::MemoryLockRegistry;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::NodeConfig;

pub struct ElectionNode {
    config: NodeConfig,
    registry: Arc<MemoryLockRegistry>,
    publisher: Arc<DefaultLeaderEventPublisher>,
    initiators: Vec<Arc<LockRegistryLeaderInitiator>>,
    tasks: Vec<JoinHandle<()>>,
}

impl ElectionNode {
    pub fn new(
        config: NodeConfig,
        leader: LeaderConfig,
        registry: Arc<MemoryLockRegistry>,
    ) -> regent_leader::Result<Self> {
        let publisher = Arc::new(DefaultLeaderEventPublisher::new(config.event_queue_size));

        let initiators = (1..=config.candidates)
            .map(|i| {
                let candidate = DefaultCandidate::with_id_and_role(
                    format!("{}-{}", config.role, i),
                    config.role.clone(),
                );
                LockRegistryLeaderInitiator::new(registry.clone(), Arc::new(candidate))
                    .with_config(leader.clone())
                    .map(|initiator| Arc::new(initiator.with_event_publisher(publisher.clone())))
            })
            .collect::<regent_leader::Result<Vec<_>>>()?;

        Ok(Self {
            config,
            registry,
            publisher,
            initiators,
            tasks: Vec::new(),
        })
    }

    /// Start every candidate, the event logger and the optional yield timer
    pub fn start(&mut self) -> regent_leader::Result<()> {
        self.tasks
            .push(tokio::spawn(log_events(self.publisher.subscribe())));

        for initiator in &self.initiators {
            initiator.start()?;
        }

        if let Some(period) = self.config.yield_interval() {
            self.tasks
                .push(tokio::spawn(rotate_leadership(self.initiators.clone(), period)));
        }

        info!(
            role = %self.config.role,
            candidates = self.initiators.len(),
            "Election node started"
        );
        Ok(())
    }

    /// Id of the candidate currently holding leadership, if any
    pub fn leader(&self) -> Option<String> {
        self.initiators
            .iter()
            .find(|initiator| initiator.context().is_leader())
            .map(|initiator| initiator.candidate().id().to_string())
    }

    pub fn initiators(&self) -> &[Arc<LockRegistryLeaderInitiator>] {
        &self.initiators
    }

    pub fn registry(&self) -> &Arc<MemoryLockRegistry> {
        &self.registry
    }

    /// Stop every candidate and wait until the role's lock is released
    pub async fn shutdown(&mut self) {
        for initiator in &self.initiators {
            initiator.destroy().await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let stats = self.registry.stats();
        info!(
            role = %self.config.role,
            acquisitions = stats.total_acquisitions,
            handoffs = stats.total_handoffs,
            expired = stats.expired_locks,
            "Election node stopped"
        );
    }
}

async fn log_events(mut events: broadcast::Receiver<LeaderEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => info!(
                kind = %event.kind,
                role = %event.role,
                source = %event.source,
                "{}",
                event.context
            ),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Leader event logger lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn rotate_leadership(initiators: Vec<Arc<LockRegistryLeaderInitiator>>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        match initiators.iter().map(|i| i.context()).find(|c| c.is_leader()) {
            Some(leader) => {
                info!("Asking {} to yield", leader);
                leader.yield_leadership();
            }
            None => debug!("No leader to rotate"),
        }
    }
}
