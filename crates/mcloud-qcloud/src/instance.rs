//! CVM instance operations (service `cvm`, API 2017-03-12).

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use serde::{Deserialize, Serialize};

/// Launch failures linger in listings but never become usable.
const LAUNCH_FAILED: &str = "LAUNCH_FAILED";

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Placement {
    #[serde(rename = "Zone", default)]
    pub zone: String,
    #[serde(rename = "ProjectId", default)]
    pub project_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualPrivateCloud {
    #[serde(rename = "VpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "SubnetId", default)]
    pub subnet_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "InstanceName", default)]
    pub instance_name: String,
    #[serde(rename = "InstanceType", default)]
    pub instance_type: String,
    #[serde(rename = "InstanceState", default)]
    pub instance_state: String,
    #[serde(rename = "CPU", default)]
    pub cpu: u32,
    #[serde(rename = "Memory", default)]
    pub memory_gb: u32,
    #[serde(rename = "Placement", default)]
    pub placement: Placement,
    #[serde(rename = "VirtualPrivateCloud", default)]
    pub vpc: VirtualPrivateCloud,
    #[serde(rename = "PrivateIpAddresses", default)]
    pub private_ips: Option<Vec<String>>,
    #[serde(rename = "PublicIpAddresses", default)]
    pub public_ips: Option<Vec<String>>,
    #[serde(rename = "SecurityGroupIds", default)]
    pub security_group_ids: Option<Vec<String>>,
    #[serde(rename = "ImageId", default)]
    pub image_id: String,
    #[serde(rename = "OsName", default)]
    pub os_name: String,
    #[serde(rename = "InstanceChargeType", default)]
    pub charge_type: String,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(rename = "ExpiredTime", default)]
    pub expired_time: Option<String>,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Instance {
    pub fn is_launch_failed(&self) -> bool {
        self.instance_state == LAUNCH_FAILED
    }
}

impl Resource for Instance {
    fn id(&self) -> String {
        self.instance_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.instance_name, &self.instance_id)
    }

    fn status(&self) -> String {
        match self.instance_state.as_str() {
            "PENDING" => "init",
            "RUNNING" => "running",
            "STOPPED" | "SHUTDOWN" => "ready",
            "STARTING" => "starting",
            "STOPPING" => "stopping",
            "REBOOTING" => "rebooting",
            "TERMINATING" => "deleting",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for Instance {
    const TAG_TARGET: TagTarget = TagTarget::new("cvm", "instance");
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatus {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "InstanceState", default)]
    pub instance_state: String,
}

/// `StopType` of StopInstances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopType {
    Soft,
    Hard,
    SoftFirst,
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::Soft => "SOFT",
            StopType::Hard => "HARD",
            StopType::SoftFirst => "SOFT_FIRST",
        }
    }
}

/// `StoppedMode`: whether a stopped pay-as-you-go instance keeps billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoppedMode {
    KeepCharging,
    StopCharging,
}

impl StoppedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoppedMode::KeepCharging => "KEEP_CHARGING",
            StoppedMode::StopCharging => "STOP_CHARGING",
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────────

pub struct CvmClient {
    region: QcloudRegion,
}

impl CvmClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn instance_spec() -> PageSpec {
        PageSpec::new(Service::Cvm, "DescribeInstances", "InstanceSet").limit(100)
    }

    fn instance_params(zone: Option<&str>, instance_ids: &[String]) -> Params {
        let mut params = Params::new();
        params.set_list("InstanceIds", instance_ids);
        if let Some(zone) = zone.filter(|z| !z.is_empty()) {
            params.add_filter("zone", &[zone]);
        }
        params
    }

    /// DescribeInstances - one page.
    pub async fn describe_instances(
        &self,
        zone: Option<&str>,
        instance_ids: &[String],
        offset: usize,
    ) -> QcloudResult<(Vec<Instance>, usize)> {
        self.region
            .client()
            .list_page(
                &Self::instance_spec(),
                Self::instance_params(zone, instance_ids),
                Some(self.region.id()),
                offset,
            )
            .await
    }

    /// DescribeInstances - every instance, optionally of one zone.
    pub async fn describe_all_instances(&self, zone: Option<&str>) -> QcloudResult<Vec<Instance>> {
        self.region
            .client()
            .list_all(
                &Self::instance_spec(),
                Self::instance_params(zone, &[]),
                Some(self.region.id()),
            )
            .await
    }

    pub async fn get_instance(&self, instance_id: &str) -> QcloudResult<Instance> {
        let (instances, _) = self
            .describe_instances(None, &[instance_id.to_string()], 0)
            .await?;
        let instances: Vec<Instance> = instances.into_iter().filter(|i| !i.is_launch_failed()).collect();
        expect_single(instances, "instance", instance_id)
    }

    pub async fn start_instances(&self, instance_ids: &[String]) -> QcloudResult<()> {
        let mut params = Params::new();
        params.set_list("InstanceIds", instance_ids);
        self.region.cvm_request("StartInstances", params).await?;
        Ok(())
    }

    pub async fn stop_instances(
        &self,
        instance_ids: &[String],
        stop_type: StopType,
        stopped_mode: Option<StoppedMode>,
    ) -> QcloudResult<()> {
        let mut params = Params::new();
        params.set_list("InstanceIds", instance_ids);
        params.set("StopType", stop_type.as_str());
        params.set_opt("StoppedMode", stopped_mode.map(|m| m.as_str()));
        self.region.cvm_request("StopInstances", params).await?;
        Ok(())
    }

    /// TerminateInstances - terminating an absent instance succeeds.
    pub async fn terminate_instance(&self, instance_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("InstanceIds.0", instance_id);
        match self.region.cvm_request("TerminateInstances", params).await {
            Err(e) if e.is_not_found() || e.is_code(&["InvalidInstanceId.NotFound"]) => {
                log::debug!("instance {} already gone", instance_id);
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    /// DescribeInstancesStatus - lightweight state poll.
    pub async fn describe_instances_status(&self, instance_ids: &[String]) -> QcloudResult<Vec<InstanceStatus>> {
        let mut params = Params::new();
        params.set_list("InstanceIds", instance_ids);
        let spec = PageSpec::new(Service::Cvm, "DescribeInstancesStatus", "InstanceStatusSet").limit(100);
        self.region
            .client()
            .list_all(&spec, params, Some(self.region.id()))
            .await
    }

    pub async fn instance_state(&self, instance_id: &str) -> QcloudResult<String> {
        let statuses = self.describe_instances_status(&[instance_id.to_string()]).await?;
        statuses
            .into_iter()
            .find(|s| s.instance_id == instance_id)
            .map(|s| s.instance_state)
            .ok_or_else(|| QcloudError::not_found(format!("instance {}", instance_id)))
    }
}

impl QcloudRegion {
    pub fn cvm(&self) -> CvmClient {
        CvmClient::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{region_of, scripted_client};
    use crate::error::ErrorKind;
    use serde_json::json;

    fn instance(id: &str, state: &str) -> serde_json::Value {
        json!({
            "InstanceId": id,
            "InstanceName": "未命名",
            "InstanceState": state,
            "CPU": 2,
            "Memory": 4,
            "Placement": {"Zone": "ap-guangzhou-3", "ProjectId": 0},
            "PrivateIpAddresses": ["10.0.0.2"],
            "PublicIpAddresses": null,
            "Tags": [{"Key": "env", "Value": "prod"}]
        })
    }

    #[test]
    fn instance_serde() {
        let ins: Instance = serde_json::from_value(instance("ins-1", "RUNNING")).unwrap();
        assert_eq!(ins.name(), "ins-1");
        assert_eq!(ins.status(), "running");
        assert_eq!(ins.placement.zone, "ap-guangzhou-3");
        assert!(ins.public_ips.is_none());
        assert_eq!(ins.tags()["env"], "prod");
    }

    #[tokio::test]
    async fn paged_describe_two_pages() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"InstanceSet": [instance("a", "RUNNING"), instance("b", "RUNNING")], "TotalCount": 3}))
            .await;
        wire.push_json(json!({"InstanceSet": [instance("c", "STOPPED")], "TotalCount": 3}))
            .await;
        let all = region_of(client, "ap-guangzhou")
            .cvm()
            .describe_all_instances(Some("ap-guangzhou-3"))
            .await
            .unwrap();
        let ids: Vec<String> = all.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].param("Filters.0.Name").as_deref(), Some("zone"));
        assert_eq!(reqs[0].param("Offset").as_deref(), Some("0"));
        assert_eq!(reqs[1].param("Offset").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn launch_failed_counts_as_absent() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"InstanceSet": [instance("ins-1", "LAUNCH_FAILED")], "TotalCount": 1}))
            .await;
        let err = region_of(client, "ap-guangzhou")
            .cvm()
            .get_instance("ins-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn stop_params() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({})).await;
        region_of(client, "ap-guangzhou")
            .cvm()
            .stop_instances(&["ins-1".to_string()], StopType::Hard, Some(StoppedMode::StopCharging))
            .await
            .unwrap();
        let req = &wire.requests().await[0];
        assert_eq!(req.action(), Some("StopInstances"));
        assert_eq!(req.param("StopType").as_deref(), Some("HARD"));
        assert_eq!(req.param("StoppedMode").as_deref(), Some("STOP_CHARGING"));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let (client, wire, _) = scripted_client(false);
        wire.push_api_error("InvalidInstanceId.NotFound", "gone").await;
        region_of(client, "ap-guangzhou")
            .cvm()
            .terminate_instance("ins-1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_poll() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({
            "InstanceStatusSet": [{"InstanceId": "ins-1", "InstanceState": "STOPPED"}],
            "TotalCount": 1
        }))
        .await;
        let state = region_of(client, "ap-guangzhou")
            .cvm()
            .instance_state("ins-1")
            .await
            .unwrap();
        assert_eq!(state, "STOPPED");
    }
}
