//! Periodic sync controller.
//!
//! Ticks on a fixed interval and, while this instance holds leadership, runs one pass
//! per configured target. Targets run concurrently and fail independently; retrying a
//! failed target is simply the next tick.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::engine::{CancelSignal, Reconciler};
use crate::error::SyncError;
use crate::model::{SyncRequest, SyncResult};

/// Whether this instance may run syncs.
pub trait LeaderCheck: Send + Sync {
    fn is_leader(&self) -> bool;
}

/// Single-instance deployments are always leader.
pub struct AlwaysLeader;

impl LeaderCheck for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Leadership published on a watch channel by an election component.
pub struct WatchLeader {
    rx: watch::Receiver<bool>,
}

impl WatchLeader {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}

impl LeaderCheck for WatchLeader {
    fn is_leader(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Result of one target within a tick.
#[derive(Debug)]
pub struct TargetOutcome {
    pub request: SyncRequest,
    pub result: Result<SyncResult, SyncError>,
}

pub struct SyncController {
    reconciler: Arc<Reconciler>,
    leader: Arc<dyn LeaderCheck>,
    targets: Vec<SyncRequest>,
    interval: Duration,
}

impl SyncController {
    pub fn new(
        reconciler: Arc<Reconciler>,
        leader: Arc<dyn LeaderCheck>,
        targets: Vec<SyncRequest>,
        interval: Duration,
    ) -> Self {
        Self {
            reconciler,
            leader,
            targets,
            interval,
        }
    }

    /// One tick. Returns nothing when this instance is not leader.
    pub async fn run_once(&self, cancel: &CancelSignal) -> Vec<TargetOutcome> {
        if !self.leader.is_leader() {
            debug!("Not leader, skipping sync tick");
            return Vec::new();
        }

        let runs = self.targets.iter().map(|target| async move {
            let result = self.reconciler.sync(target, cancel).await;
            if let Err(e) = &result {
                warn!(
                    vendor = %target.vendor,
                    account_id = %target.account_id,
                    scope = %target.scope,
                    error = %e,
                    "Sync target failed"
                );
            }
            TargetOutcome {
                request: target.clone(),
                result,
            }
        });
        join_all(runs).await
    }

    /// Tick until `shutdown` flips to true. The same signal cancels running passes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let cancel = CancelSignal::new(shutdown.clone());
        let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "Sync controller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let outcomes = self.run_once(&cancel).await;
                    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                    if !outcomes.is_empty() {
                        info!(targets = outcomes.len(), failed, "Sync tick finished");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Sync controller stopped");
    }
}
