//! Inventory data model shared by the engine, the vendor adapters and the stores.
//!
//! Cloud-side shapes (`CloudRouteTable`) are what adapters hand to the engine after
//! translating a vendor response. Local shapes (`RouteTable`, `Route`, `Subnet`) are
//! what the data store persists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::PassStats;
use crate::error::SyncError;

/// Business unit assigned to resources discovered by a sync pass.
pub const UNASSIGNED_BIZ: i64 = -1;

/// Region of GCP route tables; GCP routes belong to a global network.
pub const GCP_REGION: &str = "global";

// =============================================================================
// Vendors and requests
// =============================================================================

/// Public-cloud vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    TCloud,
    Aws,
    HuaWei,
    Azure,
    Gcp,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::TCloud => "tcloud",
            Vendor::Aws => "aws",
            Vendor::HuaWei => "huawei",
            Vendor::Azure => "azure",
            Vendor::Gcp => "gcp",
        }
    }

    /// Azure lists by resource group; everybody else lists by region.
    pub fn uses_resource_group(&self) -> bool {
        matches!(self, Vendor::Azure)
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcloud" => Ok(Vendor::TCloud),
            "aws" => Ok(Vendor::Aws),
            "huawei" => Ok(Vendor::HuaWei),
            "azure" => Ok(Vendor::Azure),
            "gcp" => Ok(Vendor::Gcp),
            other => Err(format!("unknown vendor: {}", other)),
        }
    }
}

/// Where a listing is rooted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    Region(String),
    ResourceGroup(String),
}

impl SyncScope {
    pub fn value(&self) -> &str {
        match self {
            SyncScope::Region(v) | SyncScope::ResourceGroup(v) => v,
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncScope::Region(r) => write!(f, "region={}", r),
            SyncScope::ResourceGroup(g) => write!(f, "resource_group={}", g),
        }
    }
}

/// One reconciliation pass over a (vendor, account, scope) tuple.
///
/// A non-empty `cloud_ids` list makes the pass *scoped*: only those resources are
/// listed and the deletion sweep never runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub vendor: Vendor,
    pub account_id: String,
    pub scope: SyncScope,
    #[serde(default)]
    pub cloud_ids: Vec<String>,
}

impl SyncRequest {
    pub fn new(vendor: Vendor, account_id: impl Into<String>, scope: SyncScope) -> Self {
        Self {
            vendor,
            account_id: account_id.into(),
            scope,
            cloud_ids: Vec::new(),
        }
    }

    pub fn with_cloud_ids(mut self, cloud_ids: Vec<String>) -> Self {
        self.cloud_ids = cloud_ids;
        self
    }

    pub fn is_scoped(&self) -> bool {
        !self.cloud_ids.is_empty()
    }

    /// Reject requests that cannot be served before touching any API.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.account_id.trim().is_empty() {
            return Err(SyncError::InvalidRequest("account_id is required".to_string()));
        }

        match (&self.scope, self.vendor.uses_resource_group()) {
            (SyncScope::Region(r), false) if r.trim().is_empty() => Err(
                SyncError::InvalidRequest(format!("{} sync requires a region", self.vendor)),
            ),
            (SyncScope::ResourceGroup(g), true) if g.trim().is_empty() => {
                Err(SyncError::InvalidRequest(
                    "azure sync requires a resource group name".to_string(),
                ))
            }
            (SyncScope::Region(_), true) => Err(SyncError::InvalidRequest(
                "azure sync is scoped by resource group, not region".to_string(),
            )),
            (SyncScope::ResourceGroup(_), false) => Err(SyncError::InvalidRequest(format!(
                "{} sync is scoped by region, not resource group",
                self.vendor
            ))),
            (SyncScope::Region(r), false) if self.vendor == Vendor::Gcp && r != GCP_REGION => {
                Err(SyncError::InvalidRequest(format!(
                    "gcp routes are global, sync with region {}",
                    GCP_REGION
                )))
            }
            _ => {
                if self.cloud_ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(SyncError::InvalidRequest(
                        "cloud_ids must not contain empty ids".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Outcome of a successful pass. Per-resource outcomes only go to the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub task_id: String,
    pub stats: PassStats,
}

// =============================================================================
// Vendor variant data
// =============================================================================

/// Vendor-specific route table attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "vendor", rename_all = "lowercase")]
pub enum RouteTableExtension {
    TCloud {
        main: bool,
    },
    Aws {
        main: bool,
    },
    HuaWei {
        default: bool,
        tenant_id: String,
    },
    Azure {
        cloud_subscription_id: String,
        resource_group_name: String,
    },
    /// Virtual table grouping the routes of one network.
    Gcp {
        self_link: String,
    },
}

impl RouteTableExtension {
    pub fn vendor(&self) -> Vendor {
        match self {
            RouteTableExtension::TCloud { .. } => Vendor::TCloud,
            RouteTableExtension::Aws { .. } => Vendor::Aws,
            RouteTableExtension::HuaWei { .. } => Vendor::HuaWei,
            RouteTableExtension::Azure { .. } => Vendor::Azure,
            RouteTableExtension::Gcp { .. } => Vendor::Gcp,
        }
    }

    pub fn resource_group(&self) -> Option<&str> {
        match self {
            RouteTableExtension::Azure {
                resource_group_name,
                ..
            } => Some(resource_group_name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TCloudRoute {
    pub cloud_id: String,
    pub destination_cidr_block: String,
    #[serde(default)]
    pub destination_ipv6_cidr_block: Option<String>,
    pub gateway_type: String,
    pub cloud_gateway_id: String,
    pub enabled: bool,
    pub route_type: String,
    #[serde(default)]
    pub published_to_vbc: bool,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsRoute {
    pub destination_cidr_block: Option<String>,
    pub destination_ipv6_cidr_block: Option<String>,
    pub cloud_destination_prefix_list_id: Option<String>,
    pub cloud_carrier_gateway_id: Option<String>,
    pub core_network_arn: Option<String>,
    pub cloud_egress_only_internet_gateway_id: Option<String>,
    pub cloud_gateway_id: Option<String>,
    pub cloud_instance_id: Option<String>,
    pub cloud_instance_owner_id: Option<String>,
    pub cloud_local_gateway_id: Option<String>,
    pub cloud_nat_gateway_id: Option<String>,
    pub cloud_network_interface_id: Option<String>,
    pub cloud_transit_gateway_id: Option<String>,
    pub cloud_vpc_peering_connection_id: Option<String>,
    pub state: String,
    pub propagated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HuaWeiRoute {
    #[serde(rename = "type")]
    pub route_type: String,
    pub destination: String,
    pub next_hop: String,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureRoute {
    pub cloud_id: String,
    pub name: String,
    pub address_prefix: String,
    pub next_hop_type: String,
    #[serde(default)]
    pub next_hop_ip_address: Option<String>,
    pub provisioning_state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpRoute {
    pub cloud_id: String,
    pub self_link: String,
    /// Self link of the network the route belongs to.
    pub network: String,
    pub name: String,
    pub dest_range: String,
    pub next_hop_gateway: Option<String>,
    pub next_hop_ilb: Option<String>,
    pub next_hop_instance: Option<String>,
    pub next_hop_ip: Option<String>,
    pub next_hop_network: Option<String>,
    pub next_hop_peering: Option<String>,
    pub next_hop_vpn_tunnel: Option<String>,
    pub priority: i64,
    pub route_status: String,
    pub route_type: String,
    pub tags: Vec<String>,
    pub memo: Option<String>,
}

/// A route as observed in the cloud, tagged by vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "vendor", rename_all = "lowercase")]
pub enum RouteSpec {
    TCloud(TCloudRoute),
    Aws(AwsRoute),
    HuaWei(HuaWeiRoute),
    Azure(AzureRoute),
    Gcp(GcpRoute),
}

impl RouteSpec {
    pub fn vendor(&self) -> Vendor {
        match self {
            RouteSpec::TCloud(_) => Vendor::TCloud,
            RouteSpec::Aws(_) => Vendor::Aws,
            RouteSpec::HuaWei(_) => Vendor::HuaWei,
            RouteSpec::Azure(_) => Vendor::Azure,
            RouteSpec::Gcp(_) => Vendor::Gcp,
        }
    }

    /// Vendor-issued route ID, for vendors that issue one.
    pub fn cloud_id(&self) -> Option<&str> {
        match self {
            RouteSpec::TCloud(r) => Some(&r.cloud_id),
            RouteSpec::Azure(r) => Some(&r.cloud_id),
            RouteSpec::Gcp(r) => Some(&r.cloud_id),
            RouteSpec::Aws(_) | RouteSpec::HuaWei(_) => None,
        }
    }

    /// Destination the route matches.
    pub fn destination(&self) -> &str {
        match self {
            RouteSpec::TCloud(r) => &r.destination_cidr_block,
            RouteSpec::Aws(r) => r
                .destination_cidr_block
                .as_deref()
                .or(r.destination_ipv6_cidr_block.as_deref())
                .or(r.cloud_destination_prefix_list_id.as_deref())
                .unwrap_or_default(),
            RouteSpec::HuaWei(r) => &r.destination,
            RouteSpec::Azure(r) => &r.address_prefix,
            RouteSpec::Gcp(r) => &r.dest_range,
        }
    }
}

// =============================================================================
// Cloud-side shapes
// =============================================================================

/// A route table as listed by a vendor, normalised by its adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudRouteTable {
    pub cloud_id: String,
    pub name: String,
    pub cloud_vpc_id: String,
    pub region: String,
    pub memo: Option<String>,
    pub extension: RouteTableExtension,
    pub routes: Vec<RouteSpec>,
    /// Subnets the cloud reports as associated with this table.
    pub cloud_subnet_ids: Vec<String>,
}

// =============================================================================
// Local records
// =============================================================================

/// Route table as persisted in the local inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub id: String,
    pub vendor: Vendor,
    pub account_id: String,
    pub cloud_id: String,
    pub name: String,
    pub region: String,
    pub resource_group: Option<String>,
    pub cloud_vpc_id: String,
    pub memo: Option<String>,
    pub bk_biz_id: i64,
    pub extension: RouteTableExtension,
    pub created_at: String,
    pub updated_at: String,
}

/// Route as persisted; always owned by exactly one route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub vendor: Vendor,
    pub route_table_id: String,
    pub cloud_route_table_id: String,
    pub natural_key: String,
    pub spec: RouteSpec,
    pub created_at: String,
    pub updated_at: String,
}

/// Resolved subnet → route table reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableLink {
    pub cloud_route_table_id: String,
    pub route_table_id: String,
}

/// Subnet as persisted. Only the route table back-reference is touched here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub vendor: Vendor,
    pub account_id: String,
    pub cloud_id: String,
    pub name: String,
    pub cloud_route_table_id: Option<String>,
    pub route_table_id: Option<String>,
    pub bk_biz_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Subnet {
    pub fn link(&self) -> Option<RouteTableLink> {
        match (&self.cloud_route_table_id, &self.route_table_id) {
            (Some(cloud_route_table_id), Some(route_table_id)) => Some(RouteTableLink {
                cloud_route_table_id: cloud_route_table_id.clone(),
                route_table_id: route_table_id.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_requires_account() {
        let req = SyncRequest::new(Vendor::Aws, " ", SyncScope::Region("us-east-1".into()));
        assert!(matches!(req.validate(), Err(SyncError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_scope_kind_matches_vendor() {
        let azure_by_region =
            SyncRequest::new(Vendor::Azure, "acc-1", SyncScope::Region("eastus".into()));
        assert!(azure_by_region.validate().is_err());

        let aws_by_group =
            SyncRequest::new(Vendor::Aws, "acc-1", SyncScope::ResourceGroup("rg".into()));
        assert!(aws_by_group.validate().is_err());

        let azure = SyncRequest::new(Vendor::Azure, "acc-1", SyncScope::ResourceGroup("rg".into()));
        assert!(azure.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_region_and_ids() {
        let req = SyncRequest::new(Vendor::TCloud, "acc-1", SyncScope::Region(String::new()));
        assert!(req.validate().is_err());

        let req = SyncRequest::new(Vendor::TCloud, "acc-1", SyncScope::Region("ap-guangzhou".into()))
            .with_cloud_ids(vec!["rtb-1".into(), "".into()]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_vendor_round_trips_through_str() {
        for vendor in [
            Vendor::TCloud,
            Vendor::Aws,
            Vendor::HuaWei,
            Vendor::Azure,
            Vendor::Gcp,
        ] {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
        assert!("aliyun".parse::<Vendor>().is_err());
    }

    #[test]
    fn test_gcp_syncs_the_global_region_only() {
        let global = SyncRequest::new(Vendor::Gcp, "acc-1", SyncScope::Region(GCP_REGION.into()));
        assert!(global.validate().is_ok());

        let regional =
            SyncRequest::new(Vendor::Gcp, "acc-1", SyncScope::Region("us-central1".into()));
        assert!(matches!(regional.validate(), Err(SyncError::InvalidRequest(_))));
    }

    #[test]
    fn test_route_spec_json_is_vendor_tagged() {
        let spec = RouteSpec::HuaWei(HuaWeiRoute {
            route_type: "peering".into(),
            destination: "10.1.0.0/16".into(),
            next_hop: "peer-1".into(),
            memo: None,
        });
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["vendor"], "huawei");
        assert_eq!(json["type"], "peering");
    }

    #[test]
    fn test_subnet_link_requires_both_ids() {
        let mut subnet = Subnet {
            id: "s-1".into(),
            vendor: Vendor::Aws,
            account_id: "acc-1".into(),
            cloud_id: "subnet-1".into(),
            name: "a".into(),
            cloud_route_table_id: Some("rtb-1".into()),
            route_table_id: None,
            bk_biz_id: UNASSIGNED_BIZ,
            created_at: String::new(),
            updated_at: String::new(),
        };
        assert!(subnet.link().is_none());
        subnet.route_table_id = Some("L1".into());
        assert_eq!(subnet.link().unwrap().route_table_id, "L1");
    }
}
