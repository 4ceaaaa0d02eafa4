//! Engine error types.

use thiserror::Error;

use crate::cloud::CloudError;
use crate::model::Vendor;
use crate::store::StoreError;

/// Errors surfaced by a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Request rejected before any network call.
    #[error("invalid sync request: {0}")]
    InvalidRequest(String),

    /// Vendor listing failed or returned malformed data.
    #[error("{vendor} cloud api error: {source}")]
    Cloud {
        vendor: Vendor,
        #[source]
        source: CloudError,
    },

    /// Data store call failed.
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    /// Subnet back-reference repair failed. Logged, never returned from a pass.
    #[error("association repair failed: {0}")]
    AssociationRepair(String),

    /// Route reconciliation failed for one parent. Logged, never returned from a pass.
    #[error("route reconciliation failed for route table {route_table_id}: {reason}")]
    SubResource {
        route_table_id: String,
        reason: String,
    },

    /// The pass was cancelled; committed pages stay committed.
    #[error("sync cancelled after {pages} page(s)")]
    Cancelled { pages: usize },
}

impl SyncError {
    pub fn cloud(vendor: Vendor, source: CloudError) -> Self {
        SyncError::Cloud { vendor, source }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
