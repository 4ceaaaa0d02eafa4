//! Reconciliation pass integration tests.
//!
//! Each test wires a memory store to the fixture cloud and asserts on the resulting
//! inventory and on the store mutations the pass issued.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{
    ACCOUNT, TestEnv, aws_request, aws_table, gcp_network, gcp_request, gcp_route,
    huawei_request, huawei_table, tcloud_request, tcloud_route, tcloud_table, with_subnets,
};
use hcm_sync::cloud::{CloudAdaptor, CloudError, ListLimits, RouteTablePage, VendorAdapter};
use hcm_sync::engine::RouteSyncPolicy;
use hcm_sync::model::{GCP_REGION, RouteSpec, SyncScope, Vendor};
use hcm_sync::store::{Mutation, RouteStore};
use hcm_sync::vendor::azure::AzureRouteTable;
use hcm_sync::vendor::huawei::HuaWeiRouteTable;
use hcm_sync::{
    CancelSignal, Cursor, EngineConfig, FixtureCloud, MemoryStore, Reconciler, SyncError,
    SyncRequest,
};
use tokio::sync::watch;

/// Adapter wrapper that raises the cancel flag once its first page is listed.
struct CancelAfterFirstPage {
    inner: Arc<dyn VendorAdapter>,
    cancel: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl VendorAdapter for CancelAfterFirstPage {
    fn vendor(&self) -> Vendor {
        self.inner.vendor()
    }

    fn limits(&self) -> ListLimits {
        self.inner.limits()
    }

    async fn list_route_tables(
        &self,
        scope: &SyncScope,
        cursor: Option<&Cursor>,
        cloud_ids: &[String],
    ) -> Result<RouteTablePage, CloudError> {
        let page = self.inner.list_route_tables(scope, cursor, cloud_ids).await?;
        self.cancel.send_replace(true);
        Ok(page)
    }

    fn route_key(&self, cloud_route_table_id: &str, route: &RouteSpec) -> String {
        self.inner.route_key(cloud_route_table_id, route)
    }
}

struct CancellingCloud {
    inner: Arc<FixtureCloud>,
    cancel: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl CloudAdaptor for CancellingCloud {
    async fn adapter(
        &self,
        vendor: Vendor,
        account_id: &str,
    ) -> Result<Arc<dyn VendorAdapter>, CloudError> {
        let inner = self.inner.adapter(vendor, account_id).await?;
        Ok(Arc::new(CancelAfterFirstPage {
            inner,
            cancel: self.cancel.clone(),
        }))
    }
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A repeat pass over an unchanged cloud writes nothing and keeps every table.
async fn assert_repeat_pass_is_quiet(env: &TestEnv, request: &SyncRequest, tables: usize) {
    env.store.clear_mutations().await;
    let result = env.sync(request).await.unwrap();
    assert_eq!(result.stats.tables_deleted, 0);
    assert!(env.table_mutations().await.is_empty());
    assert_eq!(env.store.route_tables().await.len(), tables);
}

// =============================================================================
// Diff and convergence
// =============================================================================

#[tokio::test]
async fn test_sample_scenario() {
    let env = TestEnv::new();
    let l1 = env.seed_tcloud("RT1", "a").await;
    let l2 = env.seed_tcloud("RT2", "b").await;
    env.set_tcloud(vec![
        tcloud_table("RT1", "a", vec![]),
        tcloud_table("RT2", "b2", vec![]),
        tcloud_table(
            "RT3",
            "c",
            vec![tcloud_route("r-1", "10.0.0.0/16"), tcloud_route("r-2", "10.1.0.0/16")],
        ),
    ])
    .await;
    env.store.clear_mutations().await;

    let result = env.sync(&tcloud_request()).await.unwrap();
    assert!(!result.task_id.is_empty());
    assert_eq!(result.stats.pages, 1);
    assert_eq!(result.stats.tables_created, 1);
    assert_eq!(result.stats.tables_updated, 1);
    assert_eq!(result.stats.routes_created, 2);
    assert_eq!(result.stats.tables_deleted, 0);

    let mutations = env.table_mutations().await;
    let creates: Vec<_> = mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::CreateRouteTables { cloud_ids } => Some(cloud_ids.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec![vec!["RT3".to_string()]]);

    let updates: Vec<_> = mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::UpdateRouteTables { updates } => Some(updates.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].len(), 1);
    assert_eq!(updates[0][0].id, l2);
    assert_eq!(updates[0][0].name, "b2");
    assert!(updates[0].iter().all(|u| u.id != l1));

    assert!(
        !mutations
            .iter()
            .any(|m| matches!(m, Mutation::DeleteRouteTables { .. }))
    );

    let rt3 = env.local_id("RT3").await.unwrap();
    let routes = env.store.list_routes(&rt3).await.unwrap();
    assert_eq!(routes.len(), 2);
    assert!(routes.iter().all(|r| r.route_table_id == rt3));
}

#[tokio::test]
async fn test_completeness_after_first_pass() {
    let env = TestEnv::new();
    env.set_tcloud(
        (0..5)
            .map(|i| tcloud_table(&format!("rtb-{}", i), &format!("t{}", i), vec![]))
            .collect(),
    )
    .await;

    env.sync(&tcloud_request()).await.unwrap();

    let tables = env.store.route_tables().await;
    assert_eq!(tables.len(), 5);
    for i in 0..5 {
        let rt = tables
            .iter()
            .find(|rt| rt.cloud_id == format!("rtb-{}", i))
            .unwrap();
        assert_eq!(rt.name, format!("t{}", i));
        assert_eq!(rt.region, common::REGION);
        assert_eq!(rt.bk_biz_id, hcm_sync::model::UNASSIGNED_BIZ);
    }
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let env = TestEnv::new();
    env.seed_subnet(Vendor::TCloud, "subnet-1", None).await;
    env.set_tcloud(vec![
        with_subnets(
            tcloud_table("RT1", "a", vec![tcloud_route("r-1", "10.0.0.0/16")]),
            &["subnet-1"],
        ),
        tcloud_table("RT2", "b", vec![tcloud_route("r-2", "10.1.0.0/16")]),
    ])
    .await;

    env.sync(&tcloud_request()).await.unwrap();
    env.store.clear_mutations().await;

    env.sync(&tcloud_request()).await.unwrap();
    assert_eq!(env.store.mutations().await, Vec::<Mutation>::new());
}

#[tokio::test]
async fn test_name_change_leaves_business_assignment() {
    let env = TestEnv::new();
    let id = env.seed_tcloud("RT1", "old").await;
    env.store.assign_biz(&id, 42).await.unwrap();
    env.set_tcloud(vec![tcloud_table("RT1", "new", vec![])]).await;

    env.sync(&tcloud_request()).await.unwrap();

    let rt = env
        .store
        .route_tables()
        .await
        .into_iter()
        .find(|rt| rt.id == id)
        .unwrap();
    assert_eq!(rt.name, "new");
    assert_eq!(rt.bk_biz_id, 42);
}

#[tokio::test]
async fn test_store_batch_limit_is_respected() {
    let env = TestEnv::with_max_batch(7);
    env.set_aws((0..25).map(|i| aws_table(&format!("rtb-{:02}", i), &[])).collect())
        .await;

    env.sync(&aws_request()).await.unwrap();
    assert_eq!(env.store.route_tables().await.len(), 25);

    // Drop ten tables from the cloud; the sweep pages across store pages of seven.
    env.set_aws((0..15).map(|i| aws_table(&format!("rtb-{:02}", i), &[])).collect())
        .await;
    env.sync(&aws_request()).await.unwrap();

    let mut left: Vec<String> = env
        .store
        .route_tables()
        .await
        .into_iter()
        .map(|rt| rt.cloud_id)
        .collect();
    left.sort();
    let expected: Vec<String> = (0..15).map(|i| format!("rtb-{:02}", i)).collect();
    assert_eq!(left, expected);
}

// =============================================================================
// Multi-page listings
// =============================================================================

#[tokio::test]
async fn test_tcloud_offset_paging_covers_every_page() {
    let env = TestEnv::new();
    env.set_tcloud(
        (0..250)
            .map(|i| tcloud_table(&format!("rtb-{:03}", i), "t", vec![]))
            .collect(),
    )
    .await;

    let result = env.sync(&tcloud_request()).await.unwrap();

    assert_eq!(result.stats.pages, 3);
    assert_eq!(env.listing_calls(Vendor::TCloud).await, 3);
    assert_eq!(env.store.route_tables().await.len(), 250);
    assert_repeat_pass_is_quiet(&env, &tcloud_request(), 250).await;
}

#[tokio::test]
async fn test_aws_token_paging_covers_every_page() {
    let env = TestEnv::new();
    env.set_aws((0..150).map(|i| aws_table(&format!("rtb-{:03}", i), &[])).collect())
        .await;

    let result = env.sync(&aws_request()).await.unwrap();

    assert_eq!(result.stats.pages, 2);
    assert_eq!(env.listing_calls(Vendor::Aws).await, 2);
    assert_eq!(env.store.route_tables().await.len(), 150);
    assert_repeat_pass_is_quiet(&env, &aws_request(), 150).await;
}

#[tokio::test]
async fn test_azure_next_link_paging_covers_every_page() {
    let env = TestEnv::new();
    env.cloud
        .update(ACCOUNT, |a| {
            a.azure = (0..120)
                .map(|i| AzureRouteTable {
                    cloud_id: format!("/rt/{:03}", i),
                    name: format!("rt-{}", i),
                    location: "eastus".into(),
                    resource_group_name: "rg-1".into(),
                    cloud_subscription_id: "sub-1".into(),
                    ..Default::default()
                })
                .collect();
        })
        .await;
    let request = SyncRequest::new(Vendor::Azure, ACCOUNT, SyncScope::ResourceGroup("rg-1".into()));

    let result = env.sync(&request).await.unwrap();

    assert_eq!(result.stats.pages, 3);
    assert_eq!(env.listing_calls(Vendor::Azure).await, 3);
    assert_eq!(env.store.route_tables().await.len(), 120);
    assert_repeat_pass_is_quiet(&env, &request, 120).await;
}

#[tokio::test]
async fn test_huawei_marker_paging_covers_every_page() {
    let env = TestEnv::new();
    env.set_huawei((0..1001).map(|i| huawei_table(&format!("rt-{:04}", i))).collect())
        .await;

    let result = env.sync(&huawei_request()).await.unwrap();

    assert_eq!(result.stats.pages, 2);
    assert_eq!(env.listing_calls(Vendor::HuaWei).await, 2);
    assert_eq!(env.store.route_tables().await.len(), 1001);
    assert_repeat_pass_is_quiet(&env, &huawei_request(), 1001).await;
}

#[tokio::test]
async fn test_cancel_between_pages_keeps_converged_page() {
    let store = Arc::new(MemoryStore::new());
    let fixture = Arc::new(FixtureCloud::default());
    let (tx, rx) = watch::channel(false);
    let cloud = Arc::new(CancellingCloud {
        inner: fixture.clone(),
        cancel: Arc::new(tx),
    });
    let reconciler = Reconciler::new(store.clone(), cloud, EngineConfig::default());
    fixture
        .update(ACCOUNT, |a| {
            a.tcloud = (0..150)
                .map(|i| tcloud_table(&format!("rtb-{:03}", i), "t", vec![]))
                .collect();
        })
        .await;

    let err = reconciler
        .sync(&tcloud_request(), &CancelSignal::new(rx))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled { pages: 1 }));
    let tables = store.route_tables().await;
    assert_eq!(tables.len(), 100);
    assert!(tables.iter().all(|rt| rt.cloud_id.as_str() < "rtb-100"));
    assert_eq!(fixture.calls().await.len(), 1);
}

// =============================================================================
// Routes
// =============================================================================

#[tokio::test]
async fn test_routes_attach_to_their_own_parent() {
    let env = TestEnv::new();
    // Same VPC for both tables.
    env.set_aws(vec![
        aws_table("rtb-a", &["10.0.0.0/16", "0.0.0.0/0"]),
        aws_table("rtb-b", &["10.9.0.0/16"]),
    ])
    .await;

    env.sync(&aws_request()).await.unwrap();

    let a = env.local_id("rtb-a").await.unwrap();
    let b = env.local_id("rtb-b").await.unwrap();
    let routes_a = env.store.list_routes(&a).await.unwrap();
    let routes_b = env.store.list_routes(&b).await.unwrap();
    assert_eq!(routes_a.len(), 2);
    assert_eq!(routes_b.len(), 1);
    assert!(routes_a.iter().all(|r| r.cloud_route_table_id == "rtb-a"));
    assert_eq!(routes_b[0].natural_key, "rtb-b|10.9.0.0/16");
}

#[tokio::test]
async fn test_route_drift_on_unchanged_parent() {
    let env = TestEnv::new();
    env.set_tcloud(vec![tcloud_table(
        "RT1",
        "a",
        vec![tcloud_route("r-1", "10.0.0.0/16"), tcloud_route("r-2", "10.1.0.0/16")],
    )])
    .await;
    env.sync(&tcloud_request()).await.unwrap();
    env.store.clear_mutations().await;

    let mut changed = tcloud_route("r-1", "10.0.0.0/16");
    changed.cloud_gateway_id = "nat-2".into();
    env.set_tcloud(vec![tcloud_table(
        "RT1",
        "a",
        vec![changed, tcloud_route("r-3", "10.3.0.0/16")],
    )])
    .await;
    env.sync(&tcloud_request()).await.unwrap();

    let rt1 = env.local_id("RT1").await.unwrap();
    let mutations = env.table_mutations().await;
    assert_eq!(
        mutations,
        vec![
            Mutation::CreateRoutes {
                route_table_id: rt1.clone(),
                count: 1
            },
            Mutation::UpdateRoutes {
                route_table_id: rt1.clone(),
                count: 1
            },
            Mutation::DeleteRoutes {
                route_table_id: rt1.clone(),
                count: 1
            },
        ]
    );

    let routes = env.store.list_routes(&rt1).await.unwrap();
    let mut keys: Vec<&str> = routes.iter().map(|r| r.natural_key.as_str()).collect();
    keys.sort();
    assert_eq!(keys, vec!["r-1", "r-3"]);
    let r1 = routes.iter().find(|r| r.natural_key == "r-1").unwrap();
    match &r1.spec {
        RouteSpec::TCloud(r) => assert_eq!(r.cloud_gateway_id, "nat-2"),
        other => panic!("unexpected route spec {:?}", other),
    }
}

#[tokio::test]
async fn test_parent_changed_policy_skips_unchanged_parents() {
    let env = TestEnv::with_config(EngineConfig {
        route_policy: RouteSyncPolicy::ParentChanged,
        ..Default::default()
    });
    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![tcloud_route("r-1", "10.0.0.0/16")])])
        .await;
    env.sync(&tcloud_request()).await.unwrap();
    env.store.clear_mutations().await;

    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![tcloud_route("r-9", "10.9.0.0/16")])])
        .await;
    env.sync(&tcloud_request()).await.unwrap();
    assert!(env.table_mutations().await.is_empty());

    // A parent change pulls its routes along.
    env.set_tcloud(vec![tcloud_table("RT1", "b", vec![tcloud_route("r-9", "10.9.0.0/16")])])
        .await;
    env.sync(&tcloud_request()).await.unwrap();
    let rt1 = env.local_id("RT1").await.unwrap();
    let keys: Vec<String> = env
        .store
        .list_routes(&rt1)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.natural_key)
        .collect();
    assert_eq!(keys, vec!["r-9".to_string()]);
}

#[tokio::test]
async fn test_route_failure_does_not_abort_siblings() {
    let env = TestEnv::new();
    env.store.fail_routes_for("rtb-b").await;
    env.set_aws(vec![
        aws_table("rtb-a", &["10.0.0.0/16"]),
        aws_table("rtb-b", &["10.1.0.0/16"]),
        aws_table("rtb-c", &["10.2.0.0/16"]),
    ])
    .await;

    env.sync(&aws_request()).await.unwrap();

    assert_eq!(env.store.route_tables().await.len(), 3);
    for (cloud_id, expected) in [("rtb-a", 1), ("rtb-b", 0), ("rtb-c", 1)] {
        let id = env.local_id(cloud_id).await.unwrap();
        assert_eq!(env.store.list_routes(&id).await.unwrap().len(), expected);
    }
}

// =============================================================================
// Subnet association repair
// =============================================================================

#[tokio::test]
async fn test_new_route_table_claims_its_subnets() {
    let env = TestEnv::new();
    let subnet = env.seed_subnet(Vendor::TCloud, "subnet-1", None).await;
    env.seed_subnet(Vendor::TCloud, "subnet-other", None).await;
    env.set_tcloud(vec![with_subnets(
        tcloud_table("RT3", "c", vec![]),
        &["subnet-1", "subnet-unknown"],
    )])
    .await;

    env.sync(&tcloud_request()).await.unwrap();

    let rt3 = env.local_id("RT3").await.unwrap();
    let subnets = env.store.subnets().await;
    let linked = subnets.iter().find(|s| s.id == subnet).unwrap();
    assert_eq!(linked.route_table_id.as_deref(), Some(rt3.as_str()));
    assert_eq!(linked.cloud_route_table_id.as_deref(), Some("RT3"));

    let other = subnets.iter().find(|s| s.cloud_id == "subnet-other").unwrap();
    assert!(other.link().is_none());
}

#[tokio::test]
async fn test_subnet_moves_between_route_tables() {
    let env = TestEnv::new();
    env.seed_subnet(Vendor::TCloud, "subnet-1", None).await;
    env.set_tcloud(vec![
        with_subnets(tcloud_table("RT1", "a", vec![]), &["subnet-1"]),
        tcloud_table("RT2", "b", vec![]),
    ])
    .await;
    env.sync(&tcloud_request()).await.unwrap();

    env.set_tcloud(vec![
        tcloud_table("RT1", "a", vec![]),
        with_subnets(tcloud_table("RT2", "b", vec![]), &["subnet-1"]),
    ])
    .await;
    env.sync(&tcloud_request()).await.unwrap();

    let rt2 = env.local_id("RT2").await.unwrap();
    let subnet = &env.store.subnets().await[0];
    assert_eq!(subnet.route_table_id.as_deref(), Some(rt2.as_str()));
}

// =============================================================================
// Scoped passes
// =============================================================================

#[tokio::test]
async fn test_scoped_sync_never_deletes() {
    let env = TestEnv::new();
    env.seed_tcloud("RT4", "gone").await;
    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![])]).await;
    env.store.clear_mutations().await;

    env.sync(&tcloud_request().with_cloud_ids(vec!["RT1".into()]))
        .await
        .unwrap();

    assert!(
        !env.store
            .mutations()
            .await
            .iter()
            .any(|m| matches!(m, Mutation::DeleteRouteTables { .. }))
    );
    assert!(env.local_id("RT4").await.is_some());
    assert!(env.local_id("RT1").await.is_some());
}

#[tokio::test]
async fn test_scoped_huawei_sync_queries_one_id_at_a_time() {
    let env = TestEnv::new();
    env.cloud
        .update(ACCOUNT, |a| {
            a.huawei = (0..3)
                .map(|i| HuaWeiRouteTable {
                    cloud_id: format!("hw-{}", i),
                    name: format!("hw-{}", i),
                    cloud_vpc_id: "vpc-1".into(),
                    region: "cn-north-4".into(),
                    ..Default::default()
                })
                .collect();
        })
        .await;

    let request = SyncRequest::new(Vendor::HuaWei, ACCOUNT, SyncScope::Region("cn-north-4".into()))
        .with_cloud_ids(vec!["hw-0".into(), "hw-2".into()]);
    env.sync(&request).await.unwrap();

    assert!(env.cloud.calls().await.iter().all(|c| c.ids <= 1));
    let mut ids: Vec<String> = env
        .store
        .route_tables()
        .await
        .into_iter()
        .map(|rt| rt.cloud_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["hw-0".to_string(), "hw-2".to_string()]);
}

#[tokio::test]
async fn test_azure_sync_by_resource_group() {
    let env = TestEnv::new();
    env.cloud
        .update(ACCOUNT, |a| {
            a.azure = ["/rt/a", "/rt/b"]
                .iter()
                .map(|id| AzureRouteTable {
                    cloud_id: id.to_string(),
                    name: id.to_string(),
                    location: "eastus".into(),
                    resource_group_name: "rg-1".into(),
                    cloud_subscription_id: "sub-1".into(),
                    ..Default::default()
                })
                .collect();
        })
        .await;

    let request = SyncRequest::new(Vendor::Azure, ACCOUNT, SyncScope::ResourceGroup("rg-1".into()))
        .with_cloud_ids(vec!["/rt/b".into()]);
    env.sync(&request).await.unwrap();

    let tables = env.store.route_tables().await;
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].cloud_id, "/rt/b");
    assert_eq!(tables[0].resource_group.as_deref(), Some("rg-1"));
    assert_eq!(tables[0].region, "eastus");
}

// =============================================================================
// GCP
// =============================================================================

#[tokio::test]
async fn test_gcp_routes_group_into_one_table_per_network() {
    let env = TestEnv::new();
    env.set_gcp(
        (0..120)
            .map(|i| gcp_route(&i.to_string(), if i < 70 { "net-a" } else { "net-b" }))
            .collect(),
    )
    .await;

    let result = env.sync(&gcp_request()).await.unwrap();

    assert_eq!(result.stats.tables_created, 2);
    assert_eq!(result.stats.routes_created, 120);
    assert_eq!(env.listing_calls(Vendor::Gcp).await, 3);
    assert_eq!(
        env.cloud_ids().await,
        vec![gcp_network("net-a"), gcp_network("net-b")]
    );

    let net_a = env.local_id(&gcp_network("net-a")).await.unwrap();
    let routes = env.store.list_routes(&net_a).await.unwrap();
    assert_eq!(routes.len(), 70);
    let table = env
        .store
        .route_tables()
        .await
        .into_iter()
        .find(|rt| rt.id == net_a)
        .unwrap();
    assert_eq!(table.name, "net-a");
    assert_eq!(table.region, GCP_REGION);
    assert_repeat_pass_is_quiet(&env, &gcp_request(), 2).await;
}

#[tokio::test]
async fn test_gcp_route_changes_converge_under_their_network() {
    let env = TestEnv::new();
    env.set_gcp(vec![gcp_route("1", "net-a"), gcp_route("2", "net-a")])
        .await;
    env.sync(&gcp_request()).await.unwrap();

    let mut moved = gcp_route("1", "net-a");
    moved.priority = 900;
    env.set_gcp(vec![moved, gcp_route("3", "net-a")]).await;
    let result = env.sync(&gcp_request()).await.unwrap();

    assert_eq!(result.stats.routes_created, 1);
    assert_eq!(result.stats.routes_updated, 1);
    assert_eq!(result.stats.routes_deleted, 1);
    let net_a = env.local_id(&gcp_network("net-a")).await.unwrap();
    let mut keys: Vec<String> = env
        .store
        .list_routes(&net_a)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.natural_key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["1", "3"]);
}

// =============================================================================
// Logging
// =============================================================================

#[tokio::test]
async fn test_pass_logs_are_sentence_case() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let env = TestEnv::new();
    env.seed_tcloud("RT4", "gone").await;
    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![tcloud_route("r-1", "10.0.0.0/16")])])
        .await;
    env.sync(&tcloud_request()).await.unwrap();

    let out = logs.contents();
    for message in [
        "Listed page",
        "Re-validated deletion candidates",
        "Deleted route tables gone from the cloud",
        "Sync pass complete",
    ] {
        assert!(out.contains(message), "missing {:?} in:\n{}", message, out);
    }
    assert!(!out.contains("sync pass complete"));
    assert!(!out.contains("listed page"));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_invalid_request_fails_before_any_call() {
    let env = TestEnv::new();
    let request = SyncRequest::new(Vendor::Azure, ACCOUNT, SyncScope::Region("eastus".into()));

    let err = env.sync(&request).await.unwrap_err();
    assert!(matches!(err, SyncError::InvalidRequest(_)));
    assert!(env.cloud.calls().await.is_empty());
}

#[tokio::test]
async fn test_cloud_failure_aborts_pass() {
    let env = TestEnv::new();
    env.seed_tcloud("RT4", "kept").await;
    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![])]).await;
    env.cloud.set_failing(Vendor::TCloud, true).await;

    let err = env.sync(&tcloud_request()).await.unwrap_err();
    assert!(matches!(
        err,
        SyncError::Cloud {
            vendor: Vendor::TCloud,
            ..
        }
    ));
    assert!(env.local_id("RT4").await.is_some());
    assert!(env.local_id("RT1").await.is_none());
}

#[tokio::test]
async fn test_unknown_account_is_a_cloud_error() {
    let env = TestEnv::new();
    let request = SyncRequest::new(Vendor::Aws, "nobody", SyncScope::Region("us-east-1".into()));
    let err = env.sync(&request).await.unwrap_err();
    assert!(matches!(err, SyncError::Cloud { .. }));
}

#[tokio::test]
async fn test_cancelled_pass_reports_progress() {
    let env = TestEnv::new();
    env.seed_tcloud("RT4", "kept").await;
    env.set_tcloud(vec![tcloud_table("RT1", "a", vec![])]).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let err = env
        .reconciler
        .sync(&tcloud_request(), &CancelSignal::new(rx))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled { pages: 0 }));
    assert!(env.local_id("RT4").await.is_some());
}
