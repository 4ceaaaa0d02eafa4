use std::sync::Arc;

use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cloud::{CloudAdaptor, CloudError, VendorAdapter};
use crate::cursor::Cursor;
use crate::error::{Result, SyncError};
use crate::model::{CloudRouteTable, SyncRequest, SyncResult, UNASSIGNED_BIZ};
use crate::store::{
    CreateRouteTableRequest, DataStore, StoreError, UpdateRouteTableRequest,
};

use super::association::{AssociationMap, repair};
use super::diff::diff;
use super::index::route_table_index;
use super::routes::{RouteChanges, seed_routes, sync_routes};
use super::sweeper::sweep;
use super::{CancelSignal, EngineConfig, PassState, RouteSyncPolicy, batch_size};

/// Drives one reconciliation pass per request.
///
/// Holds no state between passes; concurrent passes over different tuples share
/// nothing but the store and the adaptor.
pub struct Reconciler {
    store: Arc<dyn DataStore>,
    cloud: Arc<dyn CloudAdaptor>,
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DataStore>, cloud: Arc<dyn CloudAdaptor>, config: EngineConfig) -> Self {
        Self {
            store,
            cloud,
            config,
        }
    }

    /// Run one pass: list, diff and converge every page, then sweep deletions when
    /// the request is unscoped.
    pub async fn sync(&self, request: &SyncRequest, cancel: &CancelSignal) -> Result<SyncResult> {
        request.validate()?;

        let task_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "sync",
            task_id = %task_id,
            vendor = %request.vendor,
            account_id = %request.account_id,
            scope = %request.scope,
        );

        async {
            let mut state = PassState::default();
            match self.run_pass(request, cancel, &mut state).await {
                Ok(()) => {
                    info!(stats = %state.stats, "Sync pass complete");
                    Ok(SyncResult {
                        task_id: task_id.clone(),
                        stats: state.stats,
                    })
                }
                Err(e @ SyncError::Cancelled { .. }) => {
                    warn!(stats = %state.stats, "Sync pass cancelled");
                    Err(e)
                }
                Err(e) => {
                    error!(error = %e, stats = %state.stats, "Sync pass failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_pass(
        &self,
        request: &SyncRequest,
        cancel: &CancelSignal,
        state: &mut PassState,
    ) -> Result<()> {
        let adapter = self
            .cloud
            .adapter(request.vendor, &request.account_id)
            .await
            .map_err(|e| SyncError::cloud(request.vendor, e))?;
        if adapter.vendor() != request.vendor {
            return Err(SyncError::InvalidRequest(format!(
                "adaptor returned a {} adapter for a {} request",
                adapter.vendor(),
                request.vendor
            )));
        }

        if request.is_scoped() {
            let max_ids = batch_size(adapter.limits().max_ids_per_query);
            for chunk in request.cloud_ids.chunks(max_ids) {
                self.list_and_converge(adapter.as_ref(), request, chunk, cancel, state)
                    .await?;
            }
            return Ok(());
        }

        self.list_and_converge(adapter.as_ref(), request, &[], cancel, state)
            .await?;
        sweep(
            self.store.as_ref(),
            adapter.as_ref(),
            request,
            &state.seen,
            self.config.store_page_size,
            cancel,
            &mut state.stats,
        )
        .await
    }

    /// Page through one listing, converging each page before requesting the next.
    async fn list_and_converge(
        &self,
        adapter: &dyn VendorAdapter,
        request: &SyncRequest,
        cloud_ids: &[String],
        cancel: &CancelSignal,
        state: &mut PassState,
    ) -> Result<()> {
        let mut cursor: Option<Cursor> = None;
        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled {
                    pages: state.stats.pages,
                });
            }

            let page = adapter
                .list_route_tables(&request.scope, cursor.as_ref(), cloud_ids)
                .await
                .map_err(|e| SyncError::cloud(request.vendor, e))?;
            debug!(
                items = page.items.len(),
                listed_only = page.listed_ids.len(),
                cursor = ?cursor,
                "Listed page"
            );
            state.seen.extend(page.listed_ids.iter().cloned());

            self.converge_page(adapter, request, &page.items, state)
                .await?;
            state.stats.pages += 1;

            match page.next {
                Some(next) if Some(&next) == cursor.as_ref() => {
                    return Err(SyncError::cloud(
                        request.vendor,
                        CloudError::Malformed("listing repeated its continuation".to_string()),
                    ));
                }
                Some(next) => cursor = Some(next),
                None => return Ok(()),
            }
        }
    }

    /// Converge one listed page on the store.
    async fn converge_page(
        &self,
        adapter: &dyn VendorAdapter,
        request: &SyncRequest,
        items: &[CloudRouteTable],
        state: &mut PassState,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let store = self.store.as_ref();
        let chunk = batch_size(store.max_batch_size());

        let cloud_ids: Vec<String> = items.iter().map(|t| t.cloud_id.clone()).collect();
        state.seen.extend(cloud_ids.iter().cloned());

        let index = route_table_index(store, request.vendor, &cloud_ids).await?;
        let d = diff(
            items,
            &index,
            |t| t.cloud_id.clone(),
            |t, rt| adapter.is_route_table_updated(t, rt),
        );
        let hints = AssociationMap::from_items(items);

        // Existing parents: partial updates, then their routes.
        let updates: Vec<UpdateRouteTableRequest> = d
            .update
            .iter()
            .map(|(t, rt)| UpdateRouteTableRequest {
                id: rt.id.clone(),
                name: t.name.clone(),
                memo: t.memo.clone(),
            })
            .collect();
        for batch in updates.chunks(chunk) {
            store.batch_update_route_tables(batch.to_vec()).await?;
            state.stats.tables_updated += batch.len();
        }

        let mut existing = d.update.clone();
        if self.config.route_policy == RouteSyncPolicy::Always {
            existing.extend(d.unchanged.iter().copied());
        }
        for (table, record) in existing {
            let outcome = sync_routes(store, adapter, record, table).await;
            self.record_routes(&record.id, outcome, state);
        }

        // New parents: create, claim the minted IDs, then seed their routes.
        for batch in d.create.chunks(chunk) {
            let reqs: Vec<CreateRouteTableRequest> = batch
                .iter()
                .map(|t| create_request(request, t))
                .collect();
            let ids = store.batch_create_route_tables(reqs).await?;
            let created = claim(ids, batch)?;
            state.stats.tables_created += created.len();

            for (route_table_id, table) in created {
                let outcome = seed_routes(store, adapter, &route_table_id, table).await;
                self.record_routes(&route_table_id, outcome, state);
            }
        }

        match repair(store, request.vendor, &hints).await {
            Ok(outcome) => {
                state.stats.subnets_relinked += outcome.relinked;
                state.stats.subnets_unresolved += outcome.unresolved;
            }
            Err(e) => {
                let e = SyncError::AssociationRepair(e.to_string());
                warn!(error = %e, "Subnet links left stale");
            }
        }
        Ok(())
    }

    fn record_routes(
        &self,
        route_table_id: &str,
        outcome: std::result::Result<RouteChanges, StoreError>,
        state: &mut PassState,
    ) {
        match outcome {
            Ok(changes) => {
                state.stats.routes_created += changes.created;
                state.stats.routes_updated += changes.updated;
                state.stats.routes_deleted += changes.deleted;
            }
            Err(e) => {
                let e = SyncError::SubResource {
                    route_table_id: route_table_id.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %e, "Skipping routes of route table");
                state.stats.route_failures += 1;
            }
        }
    }
}

fn create_request(request: &SyncRequest, table: &CloudRouteTable) -> CreateRouteTableRequest {
    CreateRouteTableRequest {
        vendor: request.vendor,
        account_id: request.account_id.clone(),
        cloud_id: table.cloud_id.clone(),
        name: table.name.clone(),
        region: table.region.clone(),
        resource_group: table.extension.resource_group().map(str::to_string),
        cloud_vpc_id: table.cloud_vpc_id.clone(),
        memo: table.memo.clone(),
        bk_biz_id: UNASSIGNED_BIZ,
        extension: table.extension.clone(),
    }
}

/// Pair minted local IDs with the cloud tables they were created for.
///
/// IDs come back in request order; each cloud ID is claimed once so one table's
/// routes can never land under a sibling.
fn claim<'a>(
    ids: Vec<String>,
    requested: &[&'a CloudRouteTable],
) -> Result<Vec<(String, &'a CloudRouteTable)>> {
    if ids.len() != requested.len() {
        return Err(SyncError::Store(StoreError::Internal(format!(
            "batch create returned {} ids for {} route tables",
            ids.len(),
            requested.len()
        ))));
    }

    let mut claimed = std::collections::HashSet::with_capacity(ids.len());
    Ok(ids
        .into_iter()
        .zip(requested.iter().copied())
        .filter(|(_, table)| claimed.insert(table.cloud_id.as_str()))
        .collect())
}
