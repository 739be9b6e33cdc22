//! VPC and subnet operations (service `vpc`, API 2017-03-12).

use crate::endpoint::Service;
use crate::error::QcloudResult;
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use serde::{Deserialize, Serialize};

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vpc {
    #[serde(rename = "VpcId")]
    pub vpc_id: String,
    #[serde(rename = "VpcName", default)]
    pub vpc_name: String,
    #[serde(rename = "CidrBlock", default)]
    pub cidr_block: String,
    #[serde(rename = "IsDefault", default)]
    pub is_default: bool,
    #[serde(rename = "EnableMulticast", default)]
    pub enable_multicast: bool,
    #[serde(rename = "DnsServerSet", default)]
    pub dns_servers: Vec<String>,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for Vpc {
    fn id(&self) -> String {
        self.vpc_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.vpc_name, &self.vpc_id)
    }

    fn status(&self) -> String {
        "available".to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for Vpc {
    const TAG_TARGET: TagTarget = TagTarget::new("vpc", "vpc");
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subnet {
    #[serde(rename = "SubnetId")]
    pub subnet_id: String,
    #[serde(rename = "SubnetName", default)]
    pub subnet_name: String,
    #[serde(rename = "VpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "CidrBlock", default)]
    pub cidr_block: String,
    #[serde(rename = "Zone", default)]
    pub zone: String,
    #[serde(rename = "IsDefault", default)]
    pub is_default: bool,
    #[serde(rename = "AvailableIpAddressCount", default)]
    pub available_ip_count: u64,
    #[serde(rename = "TotalIpAddressCount", default)]
    pub total_ip_count: u64,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for Subnet {
    fn id(&self) -> String {
        self.subnet_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.subnet_name, &self.subnet_id)
    }

    fn status(&self) -> String {
        "available".to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for Subnet {
    const TAG_TARGET: TagTarget = TagTarget::new("vpc", "subnet");
}

// ── Client ──────────────────────────────────────────────────────────────

pub struct VpcClient {
    region: QcloudRegion,
}

impl VpcClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn vpc_spec() -> PageSpec {
        PageSpec::new(Service::Vpc, "DescribeVpcs", "VpcSet").limit(100)
    }

    /// DescribeVpcs - one page, optionally restricted to `vpc_ids`.
    pub async fn describe_vpcs(&self, vpc_ids: &[String], offset: usize) -> QcloudResult<(Vec<Vpc>, usize)> {
        let mut params = Params::new();
        params.set_list("VpcIds", vpc_ids);
        self.region
            .client()
            .list_page(&Self::vpc_spec(), params, Some(self.region.id()), offset)
            .await
    }

    pub async fn describe_all_vpcs(&self) -> QcloudResult<Vec<Vpc>> {
        self.region
            .client()
            .list_all(&Self::vpc_spec(), Params::new(), Some(self.region.id()))
            .await
    }

    pub async fn get_vpc(&self, vpc_id: &str) -> QcloudResult<Vpc> {
        let (vpcs, _) = self.describe_vpcs(&[vpc_id.to_string()], 0).await?;
        expect_single(vpcs, "vpc", vpc_id)
    }

    /// CreateVpc - returns the new VPC record.
    pub async fn create_vpc(&self, name: &str, cidr: &str) -> QcloudResult<Vpc> {
        let params = Params::new().with("VpcName", name).with("CidrBlock", cidr);
        let payload = self.region.vpc_request("CreateVpc", params).await?;
        payload.unmarshal("Vpc")
    }

    /// DeleteVpc - deleting an absent VPC succeeds.
    pub async fn delete_vpc(&self, vpc_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("VpcId", vpc_id);
        match self.region.vpc_request("DeleteVpc", params).await {
            Err(e) if e.is_not_found() || e.is_code(&["ResourceNotFound", "InvalidVpcId.NotFound"]) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// DescribeSubnets - every subnet, optionally of one VPC.
    pub async fn describe_subnets(&self, subnet_ids: &[String], vpc_id: Option<&str>) -> QcloudResult<Vec<Subnet>> {
        let mut params = Params::new();
        params.set_list("SubnetIds", subnet_ids);
        if let Some(vpc_id) = vpc_id.filter(|v| !v.is_empty()) {
            params.add_filter("vpc-id", &[vpc_id]);
        }
        let spec = PageSpec::new(Service::Vpc, "DescribeSubnets", "SubnetSet").limit(100);
        self.region
            .client()
            .list_all(&spec, params, Some(self.region.id()))
            .await
    }

    pub async fn get_subnet(&self, subnet_id: &str) -> QcloudResult<Subnet> {
        let subnets = self.describe_subnets(&[subnet_id.to_string()], None).await?;
        expect_single(subnets, "subnet", subnet_id)
    }
}

impl QcloudRegion {
    pub fn vpc(&self) -> VpcClient {
        VpcClient::new(self.clone())
    }
}
