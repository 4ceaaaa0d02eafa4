//! Subnet → route table back-reference repair.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::model::{CloudRouteTable, RouteTableLink, Vendor};
use crate::store::{DataStore, Result, UpdateSubnetLinkRequest};

use super::batch_size;

/// Subnet cloud ID → route table cloud ID, as reported by the cloud.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssociationMap {
    links: BTreeMap<String, String>,
}

impl AssociationMap {
    pub fn from_items(items: &[CloudRouteTable]) -> Self {
        let mut map = Self::default();
        for item in items {
            map.collect(item);
        }
        map
    }

    /// Record the subnets `table` claims. A later claim for the same subnet wins.
    pub fn collect(&mut self, table: &CloudRouteTable) {
        for subnet in &table.cloud_subnet_ids {
            if subnet.is_empty() {
                continue;
            }
            self.links.insert(subnet.clone(), table.cloud_id.clone());
        }
    }

    pub fn get(&self, cloud_subnet_id: &str) -> Option<&str> {
        self.links.get(cloud_subnet_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// What a repair run did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RepairOutcome {
    pub relinked: usize,
    /// Subnets whose route table is not in the inventory.
    pub unresolved: usize,
}

/// Point every known subnet in `hints` at its route table's local record.
pub(crate) async fn repair(
    store: &dyn DataStore,
    vendor: Vendor,
    hints: &AssociationMap,
) -> Result<RepairOutcome> {
    let mut outcome = RepairOutcome::default();
    if hints.is_empty() {
        return Ok(outcome);
    }
    let chunk = batch_size(store.max_batch_size());

    let subnet_ids: Vec<String> = hints.links.keys().cloned().collect();
    let mut subnets = Vec::new();
    for batch in subnet_ids.chunks(chunk) {
        subnets.extend(store.list_subnets_by_cloud_ids(vendor, batch).await?);
    }
    if subnets.is_empty() {
        return Ok(outcome);
    }

    let parent_ids: Vec<String> = subnets
        .iter()
        .filter_map(|s| hints.get(&s.cloud_id).map(str::to_string))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut parents: HashMap<String, String> = HashMap::with_capacity(parent_ids.len());
    for batch in parent_ids.chunks(chunk) {
        for rt in store.list_route_tables_by_cloud_ids(vendor, batch).await? {
            parents.insert(rt.cloud_id, rt.id);
        }
    }

    let mut updates = Vec::new();
    for subnet in &subnets {
        let Some(cloud_route_table_id) = hints.get(&subnet.cloud_id) else {
            continue;
        };
        let Some(route_table_id) = parents.get(cloud_route_table_id) else {
            warn!(
                subnet = %subnet.cloud_id,
                route_table = %cloud_route_table_id,
                "Route table of subnet not in inventory, link left as is"
            );
            outcome.unresolved += 1;
            continue;
        };

        let link = RouteTableLink {
            cloud_route_table_id: cloud_route_table_id.to_string(),
            route_table_id: route_table_id.clone(),
        };
        if subnet.link().as_ref() == Some(&link) {
            continue;
        }
        updates.push(UpdateSubnetLinkRequest {
            id: subnet.id.clone(),
            link: Some(link),
        });
    }

    for batch in updates.chunks(chunk) {
        store.batch_update_subnet_links(batch.to_vec()).await?;
        outcome.relinked += batch.len();
    }
    if outcome.relinked > 0 {
        debug!(relinked = outcome.relinked, "Subnet links repaired");
    }
    Ok(outcome)
}
