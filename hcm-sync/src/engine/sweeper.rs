//! Deletion sweep for unscoped passes.
//!
//! Pages the local inventory, takes the records the listing never saw, asks the cloud
//! once more by ID, and only deletes what the cloud still does not report. Subnets are
//! detached before their route table goes away.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::cloud::{CloudError, VendorAdapter};
use crate::error::{Result, SyncError};
use crate::model::{RouteTable, SyncRequest, SyncScope};
use crate::store::{DataStore, RouteTableFilter, UpdateSubnetLinkRequest};

use super::{CancelSignal, PassStats, batch_size};

#[allow(clippy::too_many_arguments)]
pub(crate) async fn sweep(
    store: &dyn DataStore,
    adapter: &dyn VendorAdapter,
    request: &SyncRequest,
    seen: &HashSet<String>,
    page_size: usize,
    cancel: &CancelSignal,
    stats: &mut PassStats,
) -> Result<()> {
    let page_size = batch_size(page_size.min(store.max_batch_size()));
    let filter = RouteTableFilter {
        vendor: request.vendor,
        account_id: request.account_id.clone(),
        scope: request.scope.clone(),
    };

    let mut offset = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled { pages: stats.pages });
        }

        let page = store.list_route_tables(&filter, offset, page_size).await?;
        let candidates: Vec<&RouteTable> = page
            .iter()
            .filter(|rt| !seen.contains(&rt.cloud_id))
            .collect();

        let mut removed = 0;
        if !candidates.is_empty() {
            let present = revalidate(adapter, &request.scope, &candidates)
                .await
                .map_err(|e| SyncError::cloud(request.vendor, e))?;
            let doomed: Vec<String> = candidates
                .iter()
                .filter(|rt| !present.contains(&rt.cloud_id))
                .map(|rt| rt.id.clone())
                .collect();

            debug!(
                candidates = candidates.len(),
                still_present = present.len(),
                "Re-validated deletion candidates"
            );
            if !doomed.is_empty() {
                stats.subnets_detached += detach_subnets(store, request, &doomed).await?;
                for batch in doomed.chunks(batch_size(store.max_batch_size())) {
                    stats.tables_deleted += store.batch_delete_route_tables(batch).await? as usize;
                }
                info!(count = doomed.len(), "Deleted route tables gone from the cloud");
                removed = doomed.len();
            }
        }

        if page.len() < page_size {
            return Ok(());
        }
        // Deleted rows shift later rows down.
        offset += page.len() - removed;
    }
}

/// Cloud IDs among `candidates` that the cloud still reports.
async fn revalidate(
    adapter: &dyn VendorAdapter,
    scope: &SyncScope,
    candidates: &[&RouteTable],
) -> std::result::Result<HashSet<String>, CloudError> {
    let ids: Vec<String> = candidates.iter().map(|rt| rt.cloud_id.clone()).collect();
    let mut present = HashSet::new();
    for chunk in ids.chunks(batch_size(adapter.limits().max_ids_per_query)) {
        present.extend(adapter.revalidate(scope, chunk).await?);
    }
    Ok(present)
}

/// Clear the back-reference of every subnet pointing at `route_table_ids`.
async fn detach_subnets(
    store: &dyn DataStore,
    request: &SyncRequest,
    route_table_ids: &[String],
) -> Result<usize> {
    let chunk = batch_size(store.max_batch_size());
    let mut updates = Vec::new();
    for batch in route_table_ids.chunks(chunk) {
        for subnet in store
            .list_subnets_by_route_table_ids(request.vendor, batch)
            .await?
        {
            updates.push(UpdateSubnetLinkRequest {
                id: subnet.id,
                link: None,
            });
        }
    }

    for batch in updates.chunks(chunk) {
        store.batch_update_subnet_links(batch.to_vec()).await?;
    }
    Ok(updates.len())
}
