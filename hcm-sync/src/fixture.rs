//! Snapshot-backed cloud.
//!
//! `FixtureCloud` serves all five vendor APIs from a JSON snapshot, paging each one the
//! way the real vendor does. It powers `--fixture` runs and the integration tests,
//! which mutate it between passes to simulate cloud drift.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cloud::{CloudAdaptor, CloudError, VendorAdapter};
use crate::model::{GcpRoute, UNASSIGNED_BIZ, Vendor};
use crate::store::CreateSubnetRequest;
use crate::vendor::aws::{
    AwsApi, AwsRouteTable, DescribeRouteTablesInput, DescribeRouteTablesOutput,
};
use crate::vendor::azure::{AzureApi, AzureRouteTable, AzureRouteTablePage};
use crate::vendor::gcp::{GcpApi, ListRoutesRequest, ListRoutesResponse};
use crate::vendor::huawei::{HuaWeiApi, HuaWeiRouteTable, ListRouteTablesRequest};
use crate::vendor::tcloud::{
    DescribeRouteTablesRequest, DescribeRouteTablesResponse, TCloudApi, TCloudRouteTable,
};
use crate::vendor::{AwsAdapter, AzureAdapter, GcpAdapter, HuaWeiAdapter, TCloudAdapter};

/// Azure decides its own page size; the fixture uses this one.
const AZURE_PAGE_SIZE: usize = 50;
const AWS_DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSnapshot {
    pub vendor: Vendor,
    pub cloud_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cloud_route_table_id: Option<String>,
}

/// Everything one account owns, in each vendor's native shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub tcloud: Vec<TCloudRouteTable>,
    pub aws: Vec<AwsRouteTable>,
    pub huawei: Vec<HuaWeiRouteTable>,
    pub azure: Vec<AzureRouteTable>,
    pub gcp: Vec<GcpRoute>,
    pub subnets: Vec<SubnetSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSnapshot {
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
}

impl CloudSnapshot {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json(&raw).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// One API call served by the fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureCall {
    pub vendor: Vendor,
    pub account_id: String,
    /// Size of the ID filter, 0 for plain listings.
    pub ids: usize,
}

#[derive(Default)]
struct FixtureState {
    accounts: HashMap<String, AccountSnapshot>,
    hidden: HashSet<String>,
    without_detail: HashSet<String>,
    failing: HashSet<Vendor>,
    calls: Vec<FixtureCall>,
}

impl FixtureState {
    fn begin(&mut self, vendor: Vendor, account_id: &str, ids: usize) -> Result<(), CloudError> {
        self.calls.push(FixtureCall {
            vendor,
            account_id: account_id.to_string(),
            ids,
        });
        if self.failing.contains(&vendor) {
            return Err(CloudError::Api(format!("{} api unavailable", vendor)));
        }
        Ok(())
    }

    fn account(&self, vendor: Vendor, account_id: &str) -> Result<&AccountSnapshot, CloudError> {
        self.accounts.get(account_id).ok_or_else(|| CloudError::NoClient {
            vendor,
            account_id: account_id.to_string(),
        })
    }

    /// Unfiltered listings skip hidden tables; ID queries still see them.
    fn visible(&self, cloud_id: &str, ids: &[String]) -> bool {
        if ids.is_empty() {
            !self.hidden.contains(cloud_id)
        } else {
            ids.iter().any(|id| id == cloud_id)
        }
    }
}

/// In-memory multi-vendor cloud.
#[derive(Default)]
pub struct FixtureCloud {
    state: Arc<RwLock<FixtureState>>,
}

impl FixtureCloud {
    pub fn new(snapshot: CloudSnapshot) -> Self {
        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|a| (a.account_id.clone(), a))
            .collect();
        Self {
            state: Arc::new(RwLock::new(FixtureState {
                accounts,
                ..Default::default()
            })),
        }
    }

    /// Mutate (or create) one account's snapshot.
    pub async fn update<F>(&self, account_id: &str, f: F)
    where
        F: FnOnce(&mut AccountSnapshot),
    {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .entry(account_id.to_string())
            .or_insert_with(|| AccountSnapshot {
                account_id: account_id.to_string(),
                ..Default::default()
            });
        f(account);
    }

    /// Keep a table out of plain listings while ID queries still report it.
    pub async fn hide_from_listing(&self, cloud_id: &str) {
        self.state.write().await.hidden.insert(cloud_id.to_string());
    }

    /// Keep listing a HuaWei table while its detail call answers "not found".
    pub async fn drop_detail(&self, cloud_id: &str) {
        self.state
            .write()
            .await
            .without_detail
            .insert(cloud_id.to_string());
    }

    pub async fn set_failing(&self, vendor: Vendor, failing: bool) {
        let mut state = self.state.write().await;
        if failing {
            state.failing.insert(vendor);
        } else {
            state.failing.remove(&vendor);
        }
    }

    pub async fn calls(&self) -> Vec<FixtureCall> {
        self.state.read().await.calls.clone()
    }

    /// Subnets of every account, ready to seed an inventory.
    pub async fn subnet_requests(&self) -> Vec<CreateSubnetRequest> {
        let state = self.state.read().await;
        let mut accounts: Vec<&AccountSnapshot> = state.accounts.values().collect();
        accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        accounts
            .into_iter()
            .flat_map(|a| {
                a.subnets.iter().map(move |s| CreateSubnetRequest {
                    vendor: s.vendor,
                    account_id: a.account_id.clone(),
                    cloud_id: s.cloud_id.clone(),
                    name: s.name.clone(),
                    cloud_route_table_id: s.cloud_route_table_id.clone(),
                    bk_biz_id: UNASSIGNED_BIZ,
                })
            })
            .collect()
    }
}

#[async_trait]
impl CloudAdaptor for FixtureCloud {
    async fn adapter(
        &self,
        vendor: Vendor,
        account_id: &str,
    ) -> Result<Arc<dyn VendorAdapter>, CloudError> {
        self.state.read().await.account(vendor, account_id)?;
        let client = Arc::new(FixtureClient {
            state: self.state.clone(),
            account_id: account_id.to_string(),
        });
        let adapter: Arc<dyn VendorAdapter> = match vendor {
            Vendor::TCloud => Arc::new(TCloudAdapter::new(client)),
            Vendor::Aws => Arc::new(AwsAdapter::new(client)),
            Vendor::HuaWei => Arc::new(HuaWeiAdapter::new(client)),
            Vendor::Azure => Arc::new(AzureAdapter::new(client)),
            Vendor::Gcp => Arc::new(GcpAdapter::new(client)),
        };
        Ok(adapter)
    }
}

/// Vendor API client bound to one fixture account.
struct FixtureClient {
    state: Arc<RwLock<FixtureState>>,
    account_id: String,
}

fn parse_token(token: Option<&str>) -> Result<usize, CloudError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| CloudError::Api(format!("invalid page token: {}", t))),
    }
}

#[async_trait]
impl AwsApi for FixtureClient {
    async fn describe_route_tables(
        &self,
        input: DescribeRouteTablesInput,
    ) -> Result<DescribeRouteTablesOutput, CloudError> {
        let mut state = self.state.write().await;
        state.begin(Vendor::Aws, &self.account_id, input.route_table_ids.len())?;
        let account = state.account(Vendor::Aws, &self.account_id)?;

        let matching: Vec<&AwsRouteTable> = account
            .aws
            .iter()
            .filter(|t| t.region == input.region && state.visible(&t.cloud_id, &input.route_table_ids))
            .collect();

        let start = parse_token(input.next_token.as_deref())?;
        let size = input.max_results.unwrap_or(AWS_DEFAULT_PAGE_SIZE);
        let route_tables: Vec<AwsRouteTable> =
            matching.iter().skip(start).take(size).map(|t| (*t).clone()).collect();
        let end = start + route_tables.len();
        Ok(DescribeRouteTablesOutput {
            route_tables,
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl TCloudApi for FixtureClient {
    async fn describe_route_tables(
        &self,
        req: DescribeRouteTablesRequest,
    ) -> Result<DescribeRouteTablesResponse, CloudError> {
        let mut state = self.state.write().await;
        state.begin(Vendor::TCloud, &self.account_id, req.route_table_ids.len())?;
        let account = state.account(Vendor::TCloud, &self.account_id)?;

        let matching: Vec<&TCloudRouteTable> = account
            .tcloud
            .iter()
            .filter(|t| t.region == req.region && state.visible(&t.cloud_id, &req.route_table_ids))
            .collect();
        Ok(DescribeRouteTablesResponse {
            total_count: matching.len(),
            route_tables: matching
                .into_iter()
                .skip(req.offset)
                .take(req.limit)
                .cloned()
                .collect(),
        })
    }
}

#[async_trait]
impl HuaWeiApi for FixtureClient {
    async fn list_route_table_ids(
        &self,
        req: ListRouteTablesRequest,
    ) -> Result<Vec<String>, CloudError> {
        let mut state = self.state.write().await;
        let filter: Vec<String> = req.id.iter().cloned().collect();
        state.begin(Vendor::HuaWei, &self.account_id, filter.len())?;
        let account = state.account(Vendor::HuaWei, &self.account_id)?;

        let matching: Vec<&HuaWeiRouteTable> = account
            .huawei
            .iter()
            .filter(|t| t.region == req.region && state.visible(&t.cloud_id, &filter))
            .collect();
        let start = match &req.marker {
            Some(marker) => matching
                .iter()
                .position(|t| &t.cloud_id == marker)
                .map_or(matching.len(), |p| p + 1),
            None => 0,
        };
        Ok(matching
            .into_iter()
            .skip(start)
            .take(req.limit)
            .map(|t| t.cloud_id.clone())
            .collect())
    }

    async fn get_route_table(
        &self,
        region: &str,
        id: &str,
    ) -> Result<Option<HuaWeiRouteTable>, CloudError> {
        let mut state = self.state.write().await;
        state.begin(Vendor::HuaWei, &self.account_id, 1)?;
        if state.without_detail.contains(id) {
            return Ok(None);
        }
        let account = state.account(Vendor::HuaWei, &self.account_id)?;
        Ok(account
            .huawei
            .iter()
            .find(|t| t.region == region && t.cloud_id == id)
            .cloned())
    }
}

#[async_trait]
impl AzureApi for FixtureClient {
    async fn list_route_tables(
        &self,
        resource_group: &str,
        next_link: Option<&str>,
    ) -> Result<AzureRouteTablePage, CloudError> {
        let mut state = self.state.write().await;
        state.begin(Vendor::Azure, &self.account_id, 0)?;
        let account = state.account(Vendor::Azure, &self.account_id)?;

        let matching: Vec<&AzureRouteTable> = account
            .azure
            .iter()
            .filter(|t| t.resource_group_name == resource_group && state.visible(&t.cloud_id, &[]))
            .collect();
        let start = parse_token(next_link)?;
        let value: Vec<AzureRouteTable> = matching
            .iter()
            .skip(start)
            .take(AZURE_PAGE_SIZE)
            .map(|t| (*t).clone())
            .collect();
        let end = start + value.len();
        Ok(AzureRouteTablePage {
            value,
            next_link: (end < matching.len()).then(|| end.to_string()),
        })
    }
}

#[async_trait]
impl GcpApi for FixtureClient {
    async fn list_routes(&self, req: ListRoutesRequest) -> Result<ListRoutesResponse, CloudError> {
        let mut state = self.state.write().await;
        state.begin(Vendor::Gcp, &self.account_id, req.networks.len())?;
        let account = state.account(Vendor::Gcp, &self.account_id)?;

        let matching: Vec<&GcpRoute> = account
            .gcp
            .iter()
            .filter(|r| state.visible(&r.network, &req.networks))
            .collect();
        let start = parse_token(req.page_token.as_deref())?;
        let routes: Vec<GcpRoute> = matching
            .iter()
            .skip(start)
            .take(req.page_size.max(1))
            .map(|r| (*r).clone())
            .collect();
        let end = start + routes.len();
        Ok(ListRoutesResponse {
            routes,
            next_page_token: (end < matching.len()).then(|| end.to_string()),
        })
    }
}
