//! In-process DataStore.
//!
//! Enforces the same uniqueness rules as the SQLite schema and keeps a log of every
//! successful mutating call, which tests use to assert on write behaviour.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Route, RouteTable, Subnet, SyncScope, Vendor};

use super::error::{Result, StoreError};
use super::traits::{
    CreateRouteRequest, CreateRouteTableRequest, CreateSubnetRequest, DEFAULT_MAX_BATCH,
    DataStore, RouteStore, RouteTableFilter, RouteTableStore, SubnetStore, UpdateRouteRequest,
    UpdateRouteTableRequest, UpdateSubnetLinkRequest, check_batch,
};
use super::{new_id, now};

/// A successful mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateRouteTables { cloud_ids: Vec<String> },
    UpdateRouteTables { updates: Vec<UpdateRouteTableRequest> },
    DeleteRouteTables { ids: Vec<String> },
    CreateRoutes { route_table_id: String, count: usize },
    UpdateRoutes { route_table_id: String, count: usize },
    DeleteRoutes { route_table_id: String, count: usize },
    CreateSubnets { cloud_ids: Vec<String> },
    UpdateSubnetLinks { updates: Vec<UpdateSubnetLinkRequest> },
}

impl Mutation {
    /// True for writes against route tables or routes.
    pub fn touches_route_tables(&self) -> bool {
        !matches!(
            self,
            Mutation::CreateSubnets { .. } | Mutation::UpdateSubnetLinks { .. }
        )
    }
}

#[derive(Default)]
struct Inner {
    route_tables: Vec<RouteTable>,
    routes: Vec<Route>,
    subnets: Vec<Subnet>,
    mutations: Vec<Mutation>,
    failing_route_parents: HashSet<String>,
}

impl Inner {
    fn check_route_parent(&self, route_table_id: &str) -> Result<()> {
        let parent = self
            .route_tables
            .iter()
            .find(|rt| rt.id == route_table_id)
            .ok_or_else(|| StoreError::NotFound(format!("route table {}", route_table_id)))?;
        if self.failing_route_parents.contains(&parent.cloud_id) {
            return Err(StoreError::Internal(format!(
                "injected route failure for {}",
                parent.cloud_id
            )));
        }
        Ok(())
    }
}

/// DataStore kept entirely in memory.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_batch: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_max_batch(DEFAULT_MAX_BATCH)
    }

    pub fn with_max_batch(max_batch: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_batch: max_batch.max(1),
        }
    }

    pub async fn route_tables(&self) -> Vec<RouteTable> {
        self.inner.read().await.route_tables.clone()
    }

    pub async fn routes(&self) -> Vec<Route> {
        self.inner.read().await.routes.clone()
    }

    pub async fn subnets(&self) -> Vec<Subnet> {
        self.inner.read().await.subnets.clone()
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.inner.read().await.mutations.clone()
    }

    pub async fn clear_mutations(&self) {
        self.inner.write().await.mutations.clear();
    }

    /// Make every route write under the route table with this cloud ID fail.
    pub async fn fail_routes_for(&self, cloud_route_table_id: &str) {
        self.inner
            .write()
            .await
            .failing_route_parents
            .insert(cloud_route_table_id.to_string());
    }

    /// Overwrite the business assignment, as another service would.
    pub async fn assign_biz(&self, id: &str, bk_biz_id: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let rt = inner
            .route_tables
            .iter_mut()
            .find(|rt| rt.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("route table {}", id)))?;
        rt.bk_biz_id = bk_biz_id;
        Ok(())
    }
}

fn in_scope(filter: &RouteTableFilter, rt: &RouteTable) -> bool {
    if rt.vendor != filter.vendor || rt.account_id != filter.account_id {
        return false;
    }
    match &filter.scope {
        SyncScope::Region(region) => &rt.region == region,
        SyncScope::ResourceGroup(group) => rt.resource_group.as_deref() == Some(group.as_str()),
    }
}

#[async_trait]
impl RouteTableStore for MemoryStore {
    async fn list_route_tables_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<RouteTable>> {
        check_batch(cloud_ids.len(), self.max_batch)?;
        let wanted: HashSet<&str> = cloud_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .route_tables
            .iter()
            .filter(|rt| rt.vendor == vendor && wanted.contains(rt.cloud_id.as_str()))
            .cloned()
            .collect())
    }

    async fn list_route_tables(
        &self,
        filter: &RouteTableFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RouteTable>> {
        check_batch(limit, self.max_batch)?;
        let inner = self.inner.read().await;
        Ok(inner
            .route_tables
            .iter()
            .filter(|rt| in_scope(filter, rt))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn batch_create_route_tables(
        &self,
        reqs: Vec<CreateRouteTableRequest>,
    ) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;

        let mut keys: HashSet<(Vendor, &str)> = inner
            .route_tables
            .iter()
            .map(|rt| (rt.vendor, rt.cloud_id.as_str()))
            .collect();
        for req in &reqs {
            if !keys.insert((req.vendor, req.cloud_id.as_str())) {
                return Err(StoreError::Conflict(format!(
                    "route table {}/{} already exists",
                    req.vendor, req.cloud_id
                )));
            }
        }

        let ts = now();
        let mut ids = Vec::with_capacity(reqs.len());
        let mut cloud_ids = Vec::with_capacity(reqs.len());
        for req in reqs {
            let id = new_id();
            cloud_ids.push(req.cloud_id.clone());
            inner.route_tables.push(RouteTable {
                id: id.clone(),
                vendor: req.vendor,
                account_id: req.account_id,
                cloud_id: req.cloud_id,
                name: req.name,
                region: req.region,
                resource_group: req.resource_group,
                cloud_vpc_id: req.cloud_vpc_id,
                memo: req.memo,
                bk_biz_id: req.bk_biz_id,
                extension: req.extension,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            });
            ids.push(id);
        }
        inner.mutations.push(Mutation::CreateRouteTables { cloud_ids });
        Ok(ids)
    }

    async fn batch_update_route_tables(&self, reqs: Vec<UpdateRouteTableRequest>) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;
        if let Some(missing) = reqs
            .iter()
            .find(|req| !inner.route_tables.iter().any(|rt| rt.id == req.id))
        {
            return Err(StoreError::NotFound(format!("route table {}", missing.id)));
        }

        let ts = now();
        for req in &reqs {
            if let Some(rt) = inner.route_tables.iter_mut().find(|rt| rt.id == req.id) {
                rt.name = req.name.clone();
                rt.memo = req.memo.clone();
                rt.updated_at = ts.clone();
            }
        }
        inner.mutations.push(Mutation::UpdateRouteTables { updates: reqs });
        Ok(())
    }

    async fn batch_delete_route_tables(&self, ids: &[String]) -> Result<u64> {
        check_batch(ids.len(), self.max_batch)?;
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut inner = self.inner.write().await;
        let before = inner.route_tables.len();
        inner
            .route_tables
            .retain(|rt| !doomed.contains(rt.id.as_str()));
        let removed = (before - inner.route_tables.len()) as u64;
        inner
            .routes
            .retain(|r| !doomed.contains(r.route_table_id.as_str()));
        inner.mutations.push(Mutation::DeleteRouteTables { ids: ids.to_vec() });
        Ok(removed)
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn list_routes(&self, route_table_id: &str) -> Result<Vec<Route>> {
        let inner = self.inner.read().await;
        Ok(inner
            .routes
            .iter()
            .filter(|r| r.route_table_id == route_table_id)
            .cloned()
            .collect())
    }

    async fn batch_create_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<CreateRouteRequest>,
    ) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;
        inner.check_route_parent(route_table_id)?;

        let mut keys: HashSet<&str> = inner
            .routes
            .iter()
            .filter(|r| r.route_table_id == route_table_id)
            .map(|r| r.natural_key.as_str())
            .collect();
        for req in &reqs {
            if !keys.insert(req.natural_key.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "route {} already exists under {}",
                    req.natural_key, route_table_id
                )));
            }
        }

        let ts = now();
        let count = reqs.len();
        let mut ids = Vec::with_capacity(count);
        for req in reqs {
            let id = new_id();
            inner.routes.push(Route {
                id: id.clone(),
                vendor: req.spec.vendor(),
                route_table_id: route_table_id.to_string(),
                cloud_route_table_id: req.cloud_route_table_id,
                natural_key: req.natural_key,
                spec: req.spec,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            });
            ids.push(id);
        }
        inner.mutations.push(Mutation::CreateRoutes {
            route_table_id: route_table_id.to_string(),
            count,
        });
        Ok(ids)
    }

    async fn batch_update_routes(
        &self,
        route_table_id: &str,
        reqs: Vec<UpdateRouteRequest>,
    ) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;
        inner.check_route_parent(route_table_id)?;

        let ts = now();
        for req in &reqs {
            let route = inner
                .routes
                .iter_mut()
                .find(|r| r.id == req.id && r.route_table_id == route_table_id)
                .ok_or_else(|| StoreError::NotFound(format!("route {}", req.id)))?;
            route.spec = req.spec.clone();
            route.updated_at = ts.clone();
        }
        inner.mutations.push(Mutation::UpdateRoutes {
            route_table_id: route_table_id.to_string(),
            count: reqs.len(),
        });
        Ok(())
    }

    async fn batch_delete_routes(&self, route_table_id: &str, ids: &[String]) -> Result<u64> {
        check_batch(ids.len(), self.max_batch)?;
        let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut inner = self.inner.write().await;
        inner.check_route_parent(route_table_id)?;

        let before = inner.routes.len();
        inner
            .routes
            .retain(|r| !(r.route_table_id == route_table_id && doomed.contains(r.id.as_str())));
        let removed = before - inner.routes.len();
        inner.mutations.push(Mutation::DeleteRoutes {
            route_table_id: route_table_id.to_string(),
            count: removed,
        });
        Ok(removed as u64)
    }
}

#[async_trait]
impl SubnetStore for MemoryStore {
    async fn list_subnets_by_cloud_ids(
        &self,
        vendor: Vendor,
        cloud_ids: &[String],
    ) -> Result<Vec<Subnet>> {
        check_batch(cloud_ids.len(), self.max_batch)?;
        let wanted: HashSet<&str> = cloud_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .subnets
            .iter()
            .filter(|s| s.vendor == vendor && wanted.contains(s.cloud_id.as_str()))
            .cloned()
            .collect())
    }

    async fn list_subnets_by_route_table_ids(
        &self,
        vendor: Vendor,
        route_table_ids: &[String],
    ) -> Result<Vec<Subnet>> {
        check_batch(route_table_ids.len(), self.max_batch)?;
        let wanted: HashSet<&str> = route_table_ids.iter().map(String::as_str).collect();
        let inner = self.inner.read().await;
        Ok(inner
            .subnets
            .iter()
            .filter(|s| {
                s.vendor == vendor
                    && s
                        .route_table_id
                        .as_deref()
                        .is_some_and(|id| wanted.contains(id))
            })
            .cloned()
            .collect())
    }

    async fn batch_create_subnets(&self, reqs: Vec<CreateSubnetRequest>) -> Result<Vec<String>> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;

        let mut keys: HashSet<(Vendor, &str)> = inner
            .subnets
            .iter()
            .map(|s| (s.vendor, s.cloud_id.as_str()))
            .collect();
        for req in &reqs {
            if !keys.insert((req.vendor, req.cloud_id.as_str())) {
                return Err(StoreError::Conflict(format!(
                    "subnet {}/{} already exists",
                    req.vendor, req.cloud_id
                )));
            }
        }

        let ts = now();
        let mut ids = Vec::with_capacity(reqs.len());
        let mut cloud_ids = Vec::with_capacity(reqs.len());
        for req in reqs {
            let id = new_id();
            cloud_ids.push(req.cloud_id.clone());
            inner.subnets.push(Subnet {
                id: id.clone(),
                vendor: req.vendor,
                account_id: req.account_id,
                cloud_id: req.cloud_id,
                name: req.name,
                cloud_route_table_id: req.cloud_route_table_id,
                route_table_id: None,
                bk_biz_id: req.bk_biz_id,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            });
            ids.push(id);
        }
        inner.mutations.push(Mutation::CreateSubnets { cloud_ids });
        Ok(ids)
    }

    async fn batch_update_subnet_links(&self, reqs: Vec<UpdateSubnetLinkRequest>) -> Result<()> {
        check_batch(reqs.len(), self.max_batch)?;
        let mut inner = self.inner.write().await;
        if let Some(missing) = reqs
            .iter()
            .find(|req| !inner.subnets.iter().any(|s| s.id == req.id))
        {
            return Err(StoreError::NotFound(format!("subnet {}", missing.id)));
        }

        let ts = now();
        for req in &reqs {
            if let Some(subnet) = inner.subnets.iter_mut().find(|s| s.id == req.id) {
                match &req.link {
                    Some(link) => {
                        subnet.cloud_route_table_id = Some(link.cloud_route_table_id.clone());
                        subnet.route_table_id = Some(link.route_table_id.clone());
                    }
                    None => {
                        subnet.cloud_route_table_id = None;
                        subnet.route_table_id = None;
                    }
                }
                subnet.updated_at = ts.clone();
            }
        }
        inner.mutations.push(Mutation::UpdateSubnetLinks { updates: reqs });
        Ok(())
    }
}

impl DataStore for MemoryStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch
    }
}
