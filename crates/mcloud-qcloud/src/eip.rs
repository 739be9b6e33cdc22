//! Elastic IP operations (service `vpc`).

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use crate::waiter::{wait_task, VpcTask};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Eip {
    #[serde(rename = "AddressId")]
    pub address_id: String,
    #[serde(rename = "AddressName", default)]
    pub address_name: Option<String>,
    /// Public IPv4 address.
    #[serde(rename = "AddressIp", default)]
    pub address_ip: String,
    /// `CREATING`, `BINDING`, `BIND`, `UNBINDING`, `UNBIND`, `OFFLINING` ...
    #[serde(rename = "AddressStatus", default)]
    pub address_status: String,
    /// `EIP`, `AnycastEIP` or `WanIP` (an instance's own public IP).
    #[serde(rename = "AddressType", default)]
    pub address_type: String,
    /// Bound instance, if any.
    #[serde(rename = "InstanceId", default)]
    pub instance_id: Option<String>,
    #[serde(rename = "InstanceType", default)]
    pub instance_type: Option<String>,
    /// Mbps.
    #[serde(rename = "Bandwidth", default)]
    pub bandwidth: Option<u64>,
    /// e.g. `TRAFFIC_POSTPAID_BY_HOUR`.
    #[serde(rename = "InternetChargeType", default)]
    pub charge_type: Option<String>,
    /// `YYYY-MM-DDTHH:MM:SSZ`.
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for Eip {
    fn id(&self) -> String {
        self.address_id.clone()
    }

    fn name(&self) -> String {
        display_name(self.address_name.as_deref().unwrap_or_default(), &self.address_ip)
    }

    fn status(&self) -> String {
        match self.address_status.as_str() {
            "CREATING" => "allocate",
            "BINDING" => "associate",
            "UNBINDING" => "dissociate",
            "OFFLINING" => "deallocate",
            "BIND" | "UNBIND" | "BIND_ENI" => "ready",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for Eip {
    const TAG_TARGET: TagTarget = TagTarget::new("cvm", "eip");
}

pub struct EipClient {
    region: QcloudRegion,
}

impl EipClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn address_spec() -> PageSpec {
        PageSpec::new(Service::Vpc, "DescribeAddresses", "AddressSet").limit(100)
    }

    pub async fn describe_addresses(
        &self,
        address_ids: &[String],
        offset: usize,
    ) -> QcloudResult<(Vec<Eip>, usize)> {
        let mut params = Params::new();
        params.set_list("AddressIds", address_ids);
        self.region
            .client()
            .list_page(&Self::address_spec(), params, Some(self.region.id()), offset)
            .await
    }

    pub async fn describe_all_addresses(&self) -> QcloudResult<Vec<Eip>> {
        self.region
            .client()
            .list_all(&Self::address_spec(), Params::new(), Some(self.region.id()))
            .await
    }

    pub async fn get_address(&self, address_id: &str) -> QcloudResult<Eip> {
        let (eips, _) = self.describe_addresses(&[address_id.to_string()], 0).await?;
        expect_single(eips, "eip", address_id)
    }

    async fn wait_vpc_task(&self, payload: &crate::payload::Payload) -> QcloudResult<()> {
        let task_id = payload
            .string("TaskId")
            .ok_or_else(|| QcloudError::decode("response carries no TaskId"))?;
        let client = self.region.client();
        let task = VpcTask::new(client, self.region.id(), &task_id);
        wait_task(&task, VpcTask::WAIT, client.cancellation_token()).await
    }

    /// AllocateAddresses - one pay-by-traffic address, returned once the
    /// allocation task settles.
    pub async fn allocate_address(&self, name: &str, bandwidth_mbps: u32) -> QcloudResult<Eip> {
        let mut params = Params::new();
        params
            .set("AddressCount", 1)
            .set("InternetChargeType", "TRAFFIC_POSTPAID_BY_HOUR")
            .set("InternetMaxBandwidthOut", bandwidth_mbps);
        params.set_opt("AddressName", Some(name));
        let payload = self.region.vpc_request("AllocateAddresses", params).await?;
        let ids: Vec<String> = payload.list("AddressSet")?;
        let address_id = ids
            .into_iter()
            .next()
            .ok_or_else(|| QcloudError::decode("AllocateAddresses returned no address id"))?;
        self.wait_vpc_task(&payload).await?;
        self.get_address(&address_id).await
    }

    /// ReleaseAddresses, waiting for the release task.
    pub async fn release_address(&self, address_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("AddressIds.0", address_id);
        let payload = match self.region.vpc_request("ReleaseAddresses", params).await {
            Err(e) if e.is_not_found() || e.is_code(&["InvalidAddressId.NotFound"]) => return Ok(()),
            other => other?,
        };
        self.wait_vpc_task(&payload).await
    }
}

impl QcloudRegion {
    pub fn eip(&self) -> EipClient {
        EipClient::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{region_of, scripted_client};
    use crate::error::ErrorKind;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn allocate_waits_for_task() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"AddressSet": ["eip-1"], "TaskId": "77"})).await;
        wire.push_json(json!({"Result": "RUNNING"})).await;
        wire.push_json(json!({"Result": "SUCCESS"})).await;
        wire.push_json(json!({
            "AddressSet": [{"AddressId": "eip-1", "AddressIp": "1.2.3.4", "AddressStatus": "UNBIND"}],
            "TotalCount": 1
        }))
        .await;
        let eip = region_of(client, "ap-shanghai")
            .eip()
            .allocate_address("", 5)
            .await
            .unwrap();
        assert_eq!(eip.name(), "1.2.3.4");
        assert_eq!(eip.status(), "ready");
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].param("AddressName"), None);
        assert_eq!(reqs[1].action(), Some("DescribeTaskResult"));
        assert_eq!(reqs[1].param("TaskId").as_deref(), Some("77"));
    }

    #[tokio::test]
    async fn release_failure_surfaces() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"TaskId": "78"})).await;
        wire.push_json(json!({"Result": "FAILED"})).await;
        let err = region_of(client, "ap-shanghai")
            .eip()
            .release_address("eip-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.code, "TaskFailed");
    }
}
