//! CLB load balancer operations (service `clb`, API 2018-03-17).

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::payload::Payload;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use crate::waiter::{wait_task, ClbTask};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadBalancer {
    #[serde(rename = "LoadBalancerId")]
    pub load_balancer_id: String,
    #[serde(rename = "LoadBalancerName", default)]
    pub load_balancer_name: String,
    /// `OPEN` (public) or `INTERNAL`.
    #[serde(rename = "LoadBalancerType", default)]
    pub load_balancer_type: String,
    /// 1 for application load balancers, 0 for classic.
    #[serde(rename = "Forward", default)]
    pub forward: i64,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(rename = "LoadBalancerVips", default)]
    pub vips: Option<Vec<String>>,
    #[serde(rename = "Status", default)]
    pub status_code: i64,
    #[serde(rename = "VpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "SubnetId", default)]
    pub subnet_id: String,
    #[serde(rename = "ProjectId", default)]
    pub project_id: i64,
    #[serde(rename = "AddressIPVersion", default)]
    pub address_ip_version: String,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl LoadBalancer {
    pub fn is_public(&self) -> bool {
        self.load_balancer_type == "OPEN"
    }
}

impl Resource for LoadBalancer {
    fn id(&self) -> String {
        self.load_balancer_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.load_balancer_name, &self.load_balancer_id)
    }

    fn status(&self) -> String {
        match self.status_code {
            0 => "creating",
            1 => "enabled",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for LoadBalancer {
    const TAG_TARGET: TagTarget = TagTarget::new("clb", "clb");
}

pub struct ClbClient {
    pub(crate) region: QcloudRegion,
}

impl ClbClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn lb_spec() -> PageSpec {
        PageSpec::new(Service::Clb, "DescribeLoadBalancers", "LoadBalancerSet").limit(100)
    }

    pub async fn describe_load_balancers(
        &self,
        lb_ids: &[String],
        offset: usize,
    ) -> QcloudResult<(Vec<LoadBalancer>, usize)> {
        let mut params = Params::new();
        params.set_list("LoadBalancerIds", lb_ids);
        self.region
            .client()
            .list_page(&Self::lb_spec(), params, Some(self.region.id()), offset)
            .await
    }

    pub async fn describe_all_load_balancers(&self) -> QcloudResult<Vec<LoadBalancer>> {
        self.region
            .client()
            .list_all(&Self::lb_spec(), Params::new(), Some(self.region.id()))
            .await
    }

    pub async fn get_load_balancer(&self, lb_id: &str) -> QcloudResult<LoadBalancer> {
        let (lbs, _) = self.describe_load_balancers(&[lb_id.to_string()], 0).await?;
        expect_single(lbs, "load balancer", lb_id)
    }

    /// DeleteLoadBalancerListeners, then wait on the returned request id.
    pub async fn delete_listeners(&self, lb_id: &str, listener_ids: &[String]) -> QcloudResult<()> {
        if lb_id.is_empty() {
            return Err(QcloudError::invalid_arg("load balancer id must not be empty"));
        }
        let mut params = Params::new().with("LoadBalancerId", lb_id);
        params.set_list("ListenerIds", listener_ids);
        let payload = self
            .region
            .clb_request("DeleteLoadBalancerListeners", params)
            .await?;
        self.wait_request(&payload, "DeleteLoadBalancerListeners").await
    }

    /// Mutating CLB actions are tracked by their RequestId.
    pub(crate) async fn wait_request(&self, payload: &Payload, action: &str) -> QcloudResult<()> {
        let task_id = payload
            .request_id()
            .map(str::to_string)
            .ok_or_else(|| QcloudError::decode(format!("{} returned no RequestId", action)))?;
        let client = self.region.client();
        let task = ClbTask::new(client, self.region.id(), &task_id);
        wait_task(&task, ClbTask::WAIT, client.cancellation_token()).await
    }
}

impl QcloudRegion {
    pub fn clb(&self) -> ClbClient {
        ClbClient::new(self.clone())
    }
}
