//! Local inventory storage.

mod error;
mod memory;
mod sqlite;
mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, Mutation};
pub use sqlite::SqliteStore;
pub use traits::{
    CreateRouteRequest, CreateRouteTableRequest, CreateSubnetRequest, DEFAULT_MAX_BATCH,
    DataStore, RouteStore, RouteTableFilter, RouteTableStore, SubnetStore, UpdateRouteRequest,
    UpdateRouteTableRequest, UpdateSubnetLinkRequest,
};

/// RFC 3339 timestamp for `created_at`/`updated_at`.
pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Fresh local ID.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
