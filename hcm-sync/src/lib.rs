//! hcm-sync - keeps the local cloud-resource inventory converged with public-cloud
//! vendor APIs.
//!
//! Route tables and their routes are reconciled per (vendor, account, scope): the
//! vendor listing is paged, diffed against the inventory and converged page by page,
//! subnet back-references are repaired, and unscoped passes finish with a
//! re-validated deletion sweep.

pub mod cloud;
pub mod config;
pub mod controller;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod fixture;
pub mod model;
pub mod store;
pub mod vendor;

pub use cloud::{CloudAdaptor, CloudError, ListLimits, RouteTablePage, VendorAdapter};
pub use config::{ConfigError, SyncConfig};
pub use controller::{AlwaysLeader, LeaderCheck, SyncController, TargetOutcome, WatchLeader};
pub use cursor::Cursor;
pub use engine::{CancelSignal, EngineConfig, PassStats, Reconciler, RouteSyncPolicy};
pub use error::SyncError;
pub use fixture::{CloudSnapshot, FixtureCloud};
pub use model::{SyncRequest, SyncResult, SyncScope, Vendor};
pub use store::{DataStore, MemoryStore, SqliteStore, StoreError};
