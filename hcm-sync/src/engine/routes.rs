//! Route reconciliation, scoped to one parent route table.

use std::collections::HashSet;

use tracing::debug;

use crate::cloud::VendorAdapter;
use crate::model::{CloudRouteTable, RouteSpec, RouteTable};
use crate::store::{CreateRouteRequest, DataStore, Result, UpdateRouteRequest};

use super::batch_size;
use super::diff::{diff, missing};
use super::index::route_index;

/// Route writes issued for one parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RouteChanges {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Create every cloud route under a route table that was just created.
pub(crate) async fn seed_routes(
    store: &dyn DataStore,
    adapter: &dyn VendorAdapter,
    route_table_id: &str,
    table: &CloudRouteTable,
) -> Result<RouteChanges> {
    let mut keys = HashSet::with_capacity(table.routes.len());
    let reqs: Vec<CreateRouteRequest> = table
        .routes
        .iter()
        .filter_map(|spec| {
            let natural_key = adapter.route_key(&table.cloud_id, spec);
            keys.insert(natural_key.clone()).then(|| CreateRouteRequest {
                cloud_route_table_id: table.cloud_id.clone(),
                natural_key,
                spec: spec.clone(),
            })
        })
        .collect();

    let created = create_routes(store, route_table_id, reqs).await?;
    Ok(RouteChanges {
        created,
        ..Default::default()
    })
}

/// Converge the routes of an existing route table on the fresh cloud listing.
///
/// Writes go out as creates, then updates, then deletes.
pub(crate) async fn sync_routes(
    store: &dyn DataStore,
    adapter: &dyn VendorAdapter,
    parent: &RouteTable,
    table: &CloudRouteTable,
) -> Result<RouteChanges> {
    let index = route_index(store, &parent.id).await?;
    let key = |spec: &RouteSpec| adapter.route_key(&table.cloud_id, spec);

    let d = diff(&table.routes, &index, key, |spec, route| {
        adapter.is_route_updated(spec, &route.spec)
    });
    let observed: HashSet<String> = table.routes.iter().map(key).collect();
    let doomed: Vec<String> = missing(&index, &observed)
        .into_iter()
        .map(|r| r.id.clone())
        .collect();

    let creates: Vec<CreateRouteRequest> = d
        .create
        .iter()
        .map(|spec| CreateRouteRequest {
            cloud_route_table_id: table.cloud_id.clone(),
            natural_key: key(*spec),
            spec: (*spec).clone(),
        })
        .collect();
    let updates: Vec<UpdateRouteRequest> = d
        .update
        .iter()
        .map(|(spec, route)| UpdateRouteRequest {
            id: route.id.clone(),
            spec: (*spec).clone(),
        })
        .collect();

    let mut changes = RouteChanges {
        created: create_routes(store, &parent.id, creates).await?,
        ..Default::default()
    };

    let chunk = batch_size(store.max_batch_size());
    for batch in updates.chunks(chunk) {
        store.batch_update_routes(&parent.id, batch.to_vec()).await?;
        changes.updated += batch.len();
    }
    for batch in doomed.chunks(chunk) {
        changes.deleted += store.batch_delete_routes(&parent.id, batch).await? as usize;
    }

    if changes != RouteChanges::default() {
        debug!(
            route_table_id = %parent.id,
            cloud_id = %table.cloud_id,
            created = changes.created,
            updated = changes.updated,
            deleted = changes.deleted,
            "Routes converged"
        );
    }
    Ok(changes)
}

async fn create_routes(
    store: &dyn DataStore,
    route_table_id: &str,
    reqs: Vec<CreateRouteRequest>,
) -> Result<usize> {
    let mut created = 0;
    for batch in reqs.chunks(batch_size(store.max_batch_size())) {
        created += store
            .batch_create_routes(route_table_id, batch.to_vec())
            .await?
            .len();
    }
    Ok(created)
}
