//! Vendor-facing seams: the capability trait every adapter implements and the
//! per-account adapter factory.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cursor::Cursor;
use crate::model::{CloudRouteTable, RouteSpec, RouteTable, SyncScope, Vendor};

/// Errors raised by vendor API clients and adapters.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The vendor call itself failed.
    #[error("api call failed: {0}")]
    Api(String),

    /// The vendor answered with data the adapter cannot use.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Caller asked for more IDs than one query accepts.
    #[error("{size} ids exceed the per-query limit of {max}")]
    TooManyIds { size: usize, max: usize },

    /// Listing scope does not fit the vendor.
    #[error("unsupported scope: {0}")]
    UnsupportedScope(SyncScope),

    /// No client configured for the account.
    #[error("no {vendor} client for account {account_id}")]
    NoClient { vendor: Vendor, account_id: String },
}

/// Listing limits of one vendor API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    /// Items requested per page. `None` when the server decides.
    pub page_size: Option<usize>,
    /// Cloud IDs accepted by one filtered query.
    pub max_ids_per_query: usize,
}

/// One page of a vendor listing.
#[derive(Debug, Clone, Default)]
pub struct RouteTablePage {
    pub items: Vec<CloudRouteTable>,
    /// Cloud IDs the vendor listed without a usable detail. They still exist and
    /// must not be swept.
    pub listed_ids: Vec<String>,
    /// `None` ends the listing.
    pub next: Option<Cursor>,
}

/// What the engine needs from a vendor.
#[async_trait]
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    fn limits(&self) -> ListLimits;

    /// List one page of route tables under `scope`.
    ///
    /// A non-empty `cloud_ids` restricts the listing to those IDs; callers keep it
    /// within [`ListLimits::max_ids_per_query`].
    async fn list_route_tables(
        &self,
        scope: &SyncScope,
        cursor: Option<&Cursor>,
        cloud_ids: &[String],
    ) -> Result<RouteTablePage, CloudError>;

    /// Cloud IDs among `cloud_ids` the vendor still reports.
    ///
    /// `cloud_ids` stays within [`ListLimits::max_ids_per_query`]. The default walks
    /// a filtered listing; vendors with a cheaper existence check override it.
    async fn revalidate(
        &self,
        scope: &SyncScope,
        cloud_ids: &[String],
    ) -> Result<HashSet<String>, CloudError> {
        let mut present = HashSet::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = self
                .list_route_tables(scope, cursor.as_ref(), cloud_ids)
                .await?;
            present.extend(page.items.into_iter().map(|t| t.cloud_id));
            present.extend(page.listed_ids);
            match page.next {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(CloudError::Malformed(
                        "listing repeated its continuation".to_string(),
                    ));
                }
                Some(next) => cursor = Some(next),
                None => return Ok(present),
            }
        }
    }

    /// Natural key identifying `route` under its parent.
    fn route_key(&self, cloud_route_table_id: &str, route: &RouteSpec) -> String;

    /// Whether the local record needs a partial update.
    fn is_route_table_updated(&self, cloud: &CloudRouteTable, local: &RouteTable) -> bool {
        cloud.name != local.name || cloud.memo != local.memo
    }

    /// Whether any non-key field of a route differs.
    fn is_route_updated(&self, cloud: &RouteSpec, local: &RouteSpec) -> bool {
        cloud != local
    }
}

/// Builds an adapter for one (vendor, account).
#[async_trait]
pub trait CloudAdaptor: Send + Sync {
    async fn adapter(
        &self,
        vendor: Vendor,
        account_id: &str,
    ) -> Result<Arc<dyn VendorAdapter>, CloudError>;
}

/// Reject an ID filter larger than the vendor accepts.
pub(crate) fn check_ids(cloud_ids: &[String], limits: ListLimits) -> Result<(), CloudError> {
    if cloud_ids.len() > limits.max_ids_per_query {
        return Err(CloudError::TooManyIds {
            size: cloud_ids.len(),
            max: limits.max_ids_per_query,
        });
    }
    Ok(())
}
