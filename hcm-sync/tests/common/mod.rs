//! Shared test utilities for hcm-sync integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use hcm_sync::fixture::SubnetSnapshot;
use hcm_sync::model::{
    AwsRoute, GCP_REGION, GcpRoute, RouteTableExtension, SyncRequest, SyncResult, SyncScope,
    TCloudRoute, UNASSIGNED_BIZ, Vendor,
};
use hcm_sync::store::{
    CreateRouteTableRequest, CreateSubnetRequest, MemoryStore, Mutation, RouteTableStore,
    SubnetStore,
};
use hcm_sync::vendor::aws::AwsRouteTable;
use hcm_sync::vendor::huawei::HuaWeiRouteTable;
use hcm_sync::vendor::tcloud::{TCloudAssociation, TCloudRouteTable};
use hcm_sync::{CancelSignal, EngineConfig, FixtureCloud, Reconciler, SyncError};

pub const ACCOUNT: &str = "acc-1";
pub const REGION: &str = "ap-guangzhou";
pub const AWS_REGION: &str = "us-east-1";
pub const HUAWEI_REGION: &str = "cn-north-4";
pub const GCP_NETWORK_PREFIX: &str = "https://www.googleapis.com/compute/v1/projects/p/global/networks/";

/// Memory store + fixture cloud + reconciler wired together.
pub struct TestEnv {
    pub store: Arc<MemoryStore>,
    pub cloud: Arc<FixtureCloud>,
    pub reconciler: Reconciler,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::build(MemoryStore::new(), EngineConfig::default())
    }

    pub fn with_max_batch(max_batch: usize) -> Self {
        Self::build(MemoryStore::with_max_batch(max_batch), EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(MemoryStore::new(), config)
    }

    fn build(store: MemoryStore, config: EngineConfig) -> Self {
        let store = Arc::new(store);
        let cloud = Arc::new(FixtureCloud::default());
        let reconciler = Reconciler::new(store.clone(), cloud.clone(), config);
        Self {
            store,
            cloud,
            reconciler,
        }
    }

    pub async fn sync(&self, request: &SyncRequest) -> Result<SyncResult, SyncError> {
        self.reconciler.sync(request, &CancelSignal::never()).await
    }

    /// Set the TCloud route tables the cloud reports for the test account.
    pub async fn set_tcloud(&self, tables: Vec<TCloudRouteTable>) {
        self.cloud.update(ACCOUNT, |a| a.tcloud = tables).await;
    }

    pub async fn set_aws(&self, tables: Vec<AwsRouteTable>) {
        self.cloud.update(ACCOUNT, |a| a.aws = tables).await;
    }

    pub async fn set_huawei(&self, tables: Vec<HuaWeiRouteTable>) {
        self.cloud.update(ACCOUNT, |a| a.huawei = tables).await;
    }

    pub async fn set_gcp(&self, routes: Vec<GcpRoute>) {
        self.cloud.update(ACCOUNT, |a| a.gcp = routes).await;
    }

    /// Cloud IDs of every route table in the inventory, sorted.
    pub async fn cloud_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .store
            .route_tables()
            .await
            .into_iter()
            .map(|rt| rt.cloud_id)
            .collect();
        ids.sort();
        ids
    }

    /// Plain (unfiltered) listing calls made to `vendor` so far.
    pub async fn listing_calls(&self, vendor: Vendor) -> usize {
        self.cloud
            .calls()
            .await
            .iter()
            .filter(|c| c.vendor == vendor && c.ids == 0)
            .count()
    }

    /// Insert a TCloud route table straight into the inventory. Returns its local ID.
    pub async fn seed_tcloud(&self, cloud_id: &str, name: &str) -> String {
        let ids = self
            .store
            .batch_create_route_tables(vec![CreateRouteTableRequest {
                vendor: Vendor::TCloud,
                account_id: ACCOUNT.into(),
                cloud_id: cloud_id.into(),
                name: name.into(),
                region: REGION.into(),
                resource_group: None,
                cloud_vpc_id: "vpc-1".into(),
                memo: None,
                bk_biz_id: UNASSIGNED_BIZ,
                extension: RouteTableExtension::TCloud { main: false },
            }])
            .await
            .unwrap();
        ids[0].clone()
    }

    /// Insert a subnet, optionally already linked to a local route table.
    pub async fn seed_subnet(&self, vendor: Vendor, cloud_id: &str, link: Option<(&str, &str)>) -> String {
        let ids = self
            .store
            .batch_create_subnets(vec![CreateSubnetRequest {
                vendor,
                account_id: ACCOUNT.into(),
                cloud_id: cloud_id.into(),
                name: cloud_id.into(),
                cloud_route_table_id: None,
                bk_biz_id: UNASSIGNED_BIZ,
            }])
            .await
            .unwrap();
        if let Some((cloud_route_table_id, route_table_id)) = link {
            self.store
                .batch_update_subnet_links(vec![hcm_sync::store::UpdateSubnetLinkRequest {
                    id: ids[0].clone(),
                    link: Some(hcm_sync::model::RouteTableLink {
                        cloud_route_table_id: cloud_route_table_id.into(),
                        route_table_id: route_table_id.into(),
                    }),
                }])
                .await
                .unwrap();
        }
        ids[0].clone()
    }

    /// Mutations that touched route tables or routes.
    pub async fn table_mutations(&self) -> Vec<Mutation> {
        self.store
            .mutations()
            .await
            .into_iter()
            .filter(Mutation::touches_route_tables)
            .collect()
    }

    pub async fn local_id(&self, cloud_id: &str) -> Option<String> {
        self.store
            .route_tables()
            .await
            .into_iter()
            .find(|rt| rt.cloud_id == cloud_id)
            .map(|rt| rt.id)
    }
}

pub fn tcloud_request() -> SyncRequest {
    SyncRequest::new(Vendor::TCloud, ACCOUNT, SyncScope::Region(REGION.into()))
}

pub fn aws_request() -> SyncRequest {
    SyncRequest::new(Vendor::Aws, ACCOUNT, SyncScope::Region(AWS_REGION.into()))
}

pub fn huawei_request() -> SyncRequest {
    SyncRequest::new(Vendor::HuaWei, ACCOUNT, SyncScope::Region(HUAWEI_REGION.into()))
}

pub fn gcp_request() -> SyncRequest {
    SyncRequest::new(Vendor::Gcp, ACCOUNT, SyncScope::Region(GCP_REGION.into()))
}

pub fn tcloud_table(cloud_id: &str, name: &str, routes: Vec<TCloudRoute>) -> TCloudRouteTable {
    TCloudRouteTable {
        cloud_id: cloud_id.into(),
        name: name.into(),
        cloud_vpc_id: "vpc-1".into(),
        region: REGION.into(),
        memo: None,
        main: false,
        associations: Vec::new(),
        routes,
    }
}

pub fn with_subnets(mut table: TCloudRouteTable, subnets: &[&str]) -> TCloudRouteTable {
    table.associations = subnets
        .iter()
        .map(|s| TCloudAssociation {
            cloud_subnet_id: s.to_string(),
        })
        .collect();
    table
}

pub fn tcloud_route(cloud_id: &str, cidr: &str) -> TCloudRoute {
    TCloudRoute {
        cloud_id: cloud_id.into(),
        destination_cidr_block: cidr.into(),
        destination_ipv6_cidr_block: None,
        gateway_type: "NAT".into(),
        cloud_gateway_id: "nat-1".into(),
        enabled: true,
        route_type: "USER".into(),
        published_to_vbc: false,
        memo: None,
    }
}

pub fn aws_table(cloud_id: &str, cidrs: &[&str]) -> AwsRouteTable {
    AwsRouteTable {
        cloud_id: cloud_id.into(),
        name: cloud_id.into(),
        cloud_vpc_id: "vpc-1".into(),
        region: AWS_REGION.into(),
        memo: None,
        associations: Vec::new(),
        routes: cidrs
            .iter()
            .map(|c| AwsRoute {
                destination_cidr_block: Some(c.to_string()),
                cloud_gateway_id: Some("igw-1".into()),
                state: "active".into(),
                ..Default::default()
            })
            .collect(),
    }
}

pub fn huawei_table(cloud_id: &str) -> HuaWeiRouteTable {
    HuaWeiRouteTable {
        cloud_id: cloud_id.into(),
        name: cloud_id.into(),
        cloud_vpc_id: "vpc-1".into(),
        region: HUAWEI_REGION.into(),
        ..Default::default()
    }
}

/// Self link of a test network.
pub fn gcp_network(name: &str) -> String {
    format!("{}{}", GCP_NETWORK_PREFIX, name)
}

pub fn gcp_route(cloud_id: &str, network: &str) -> GcpRoute {
    GcpRoute {
        cloud_id: cloud_id.into(),
        self_link: format!("projects/p/global/routes/r-{}", cloud_id),
        network: gcp_network(network),
        name: format!("r-{}", cloud_id),
        dest_range: "10.0.0.0/8".into(),
        next_hop_gateway: Some("default-internet-gateway".into()),
        priority: 1000,
        route_type: "static".into(),
        ..Default::default()
    }
}

pub fn subnet_snapshot(vendor: Vendor, cloud_id: &str) -> SubnetSnapshot {
    SubnetSnapshot {
        vendor,
        cloud_id: cloud_id.into(),
        name: cloud_id.into(),
        cloud_route_table_id: None,
    }
}
