//! Lookup maps over the local inventory.

use std::collections::HashMap;

use crate::model::{Route, RouteTable, Vendor};
use crate::store::{DataStore, Result};

use super::batch_size;

/// Local route tables for exactly `cloud_ids`, keyed by cloud ID.
pub(crate) async fn route_table_index(
    store: &dyn DataStore,
    vendor: Vendor,
    cloud_ids: &[String],
) -> Result<HashMap<String, RouteTable>> {
    let mut index = HashMap::with_capacity(cloud_ids.len());
    for chunk in cloud_ids.chunks(batch_size(store.max_batch_size())) {
        for rt in store.list_route_tables_by_cloud_ids(vendor, chunk).await? {
            index.insert(rt.cloud_id.clone(), rt);
        }
    }
    Ok(index)
}

/// Routes of one route table, keyed by natural key.
pub(crate) async fn route_index(
    store: &dyn DataStore,
    route_table_id: &str,
) -> Result<HashMap<String, Route>> {
    Ok(store
        .list_routes(route_table_id)
        .await?
        .into_iter()
        .map(|r| (r.natural_key.clone(), r))
        .collect())
}
