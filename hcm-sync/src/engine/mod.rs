//! Reconciliation engine: fetch → diff → converge.
//!
//! [`Reconciler::sync`] is the entry point. One call is one pass over a
//! (vendor, account, scope) tuple; every page is converged before the next is
//! requested, so a failed or cancelled pass leaves committed pages in place.

mod association;
mod diff;
mod index;
mod reconciler;
mod routes;
mod sweeper;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

pub use association::AssociationMap;
pub use diff::{Diff, diff, missing};
pub use reconciler::Reconciler;

/// Local inventory page size used by the deletion sweep.
pub const DEFAULT_STORE_PAGE_SIZE: usize = 500;

/// When routes of an already-known route table are re-diffed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSyncPolicy {
    /// Every existing parent, changed or not.
    #[default]
    Always,
    /// Only parents whose own fields changed.
    ParentChanged,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub store_page_size: usize,
    pub route_policy: RouteSyncPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_page_size: DEFAULT_STORE_PAGE_SIZE,
            route_policy: RouteSyncPolicy::default(),
        }
    }
}

/// Counters for one pass, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassStats {
    pub pages: usize,
    pub tables_created: usize,
    pub tables_updated: usize,
    pub tables_deleted: usize,
    pub routes_created: usize,
    pub routes_updated: usize,
    pub routes_deleted: usize,
    pub route_failures: usize,
    pub subnets_relinked: usize,
    /// Subnets pointing at a route table the inventory does not hold.
    pub subnets_unresolved: usize,
    pub subnets_detached: usize,
}

impl fmt::Display for PassStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pages={} tables +{} ~{} -{} routes +{} ~{} -{} (failed parents {}) subnets relinked={} unresolved={} detached={}",
            self.pages,
            self.tables_created,
            self.tables_updated,
            self.tables_deleted,
            self.routes_created,
            self.routes_updated,
            self.routes_deleted,
            self.route_failures,
            self.subnets_relinked,
            self.subnets_unresolved,
            self.subnets_detached,
        )
    }
}

/// State owned by exactly one pass.
#[derive(Debug, Default)]
pub(crate) struct PassState {
    /// Every cloud ID observed while listing.
    pub seen: HashSet<String>,
    pub stats: PassStats,
}

/// Cancellation signal for a pass, backed by the shutdown channel.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Batch size for a store call; never zero.
pub(crate) fn batch_size(max: usize) -> usize {
    max.max(1)
}
