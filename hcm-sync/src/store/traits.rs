//! DataStore trait definitions.
//!
//! The engine only ever talks to the inventory through these traits, so the
//! in-memory and SQLite backends are interchangeable.

use async_trait::async_trait;

use crate::model::{
    RouteSpec, RouteTable, RouteTableExtension, RouteTableLink, Route, Subnet, SyncScope, Vendor,
};

use super::error::Result;

/// Batch limit applied by the bundled stores.
pub const DEFAULT_MAX_BATCH: usize = 500;

// =============================================================================
// Route Table Request DTOs
// =============================================================================

/// Request to create a route table discovered in the cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteTableRequest {
    pub vendor: Vendor,
    pub account_id: String,
    pub cloud_id: String,
    pub name: String,
    pub region: String,
    pub resource_group: Option<String>,
    pub cloud_vpc_id: String,
    pub memo: Option<String>,
    pub bk_biz_id: i64,
    pub extension: RouteTableExtension,
}

/// Partial update. Only user-mutable fields; never the business assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRouteTableRequest {
    pub id: String,
    pub name: String,
    pub memo: Option<String>,
}

/// Filter for paging the local inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTableFilter {
    pub vendor: Vendor,
    pub account_id: String,
    pub scope: SyncScope,
}

// =============================================================================
// Route Request DTOs
// =============================================================================

/// Request to create a route under an existing route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRouteRequest {
    pub cloud_route_table_id: String,
    pub natural_key: String,
    pub spec: RouteSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRouteRequest {
    pub id: String,
    pub spec: RouteSpec,
}

// =============================================================================
// Subnet Request DTOs
// =============================================================================

/// Request to create a subnet record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubnetRequest {
    pub vendor: Vendor,
    pub account_id: String,
    pub cloud_id: String,
    pub name: String,
    pub cloud_route_table_id: Option<String>,
    pub bk_biz_id: i64,
}

/// Rewrite (or clear, with `None`) a subnet's route table back-reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSubnetLinkRequest {
    pub id: String,
    pub link: Option<RouteTableLink>,
}

// =============================================================================
// Store Traits
// =============================================================================

/// Store trait for route table operations.
#[async_trait]
pub trait RouteTableStore: Send + Sync {
    /// Route tables of `vendor` whose cloud ID is in `cloud_ids`.
    async fn list_route_tables_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<RouteTable>>;

    /// One page of the inventory matching `filter`, in stable insertion order.
    async fn list_route_tables(
        &self,
        filter: &RouteTableFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RouteTable>>;

    /// Create route tables. Returns local IDs in request order.
    async fn batch_create_route_tables(
        &self,
        reqs: Vec<CreateRouteTableRequest>,
    ) -> Result<Vec<String>>;

    /// Apply partial updates.
    async fn batch_update_route_tables(&self, reqs: Vec<UpdateRouteTableRequest>) -> Result<()>;

    /// Delete route tables and their routes. Returns the number of tables removed.
    async fn batch_delete_route_tables(&self, ids: &[String]) -> Result<u64>;
}

/// Store trait for route operations, always scoped to one route table.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn list_routes(&self, route_table_id: &str) -> Result<Vec<Route>>;

    /// Create routes under `route_table_id`. Returns local IDs in request order.
    async fn batch_create_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<CreateRouteRequest>,
    ) -> Result<Vec<String>>;

    async fn batch_update_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<UpdateRouteRequest>,
    ) -> Result<()>;

    async fn batch_delete_routes(&self, route_table_id: &str, ids: &[String]) -> Result<u64>;
}

/// Store trait for the subnet side of the subnet → route table link.
#[async_trait]
pub trait SubnetStore: Send + Sync {
    async fn list_subnets_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<Subnet>>;

    /// Subnets whose local back-reference points at one of `route_table_ids`.
    async fn list_subnets_by_route_table_ids(
        &self,
        vendor: Vendor,
        route_table_ids: &[String],
    ) -> Result<Vec<Subnet>>;

    async fn batch_create_subnets(&self, reqs: Vec<CreateSubnetRequest>) -> Result<Vec<String>>;

    async fn batch_update_subnet_links(&self, reqs: Vec<UpdateSubnetLinkRequest>) -> Result<()>;
}

// =============================================================================
// Composite DataStore Trait
// =============================================================================

/// Composite data store trait combining all inventory stores.
///
/// Every batch call must carry at most [`DataStore::max_batch_size`] entries;
/// callers chunk.
pub trait DataStore: RouteTableStore + RouteStore + SubnetStore + Send + Sync {
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }
}

/// Reject batches above `max`.
pub(crate) fn check_batch(size: usize, max: usize) -> Result<()> {
    if size > max {
        return Err(super::StoreError::BatchTooLarge { size, max });
    }
    Ok(())
}
