//! CBS cloud disk operations (service `cbs`, API 2017-03-12).

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::instance::Placement;
use crate::pagination::{expect_single, PageSpec};
use crate::params::{client_token, Params};
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use crate::waiter::{wait_until, WaitSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Disk {
    #[serde(rename = "DiskId")]
    pub disk_id: String,
    #[serde(rename = "DiskName", default)]
    pub disk_name: String,
    #[serde(rename = "DiskType", default)]
    pub disk_type: String,
    #[serde(rename = "DiskUsage", default)]
    pub disk_usage: String,
    #[serde(rename = "DiskSize", default)]
    pub disk_size_gb: u64,
    #[serde(rename = "DiskState", default)]
    pub disk_state: String,
    #[serde(rename = "DiskChargeType", default)]
    pub charge_type: String,
    #[serde(rename = "Placement", default)]
    pub placement: Placement,
    #[serde(rename = "InstanceId", default)]
    pub instance_id: String,
    #[serde(rename = "Attached", default)]
    pub attached: bool,
    #[serde(rename = "Portable", default)]
    pub portable: bool,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Disk {
    pub fn is_system_disk(&self) -> bool {
        self.disk_usage == "SYSTEM_DISK"
    }
}

impl Resource for Disk {
    fn id(&self) -> String {
        self.disk_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.disk_name, &self.disk_id)
    }

    fn status(&self) -> String {
        match self.disk_state.as_str() {
            "ATTACHING" => "attaching",
            "DETACHING" => "detaching",
            "EXPANDING" => "resizing",
            "ROLLBACKING" => "reset",
            "UNATTACHED" | "ATTACHED" => "ready",
            "TORECYCLE" => "deleting",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for Disk {
    const TAG_TARGET: TagTarget = TagTarget::new("cvm", "volume");
}

/// Arguments of [`CbsClient::create_disk`].
#[derive(Debug, Clone, Default)]
pub struct CreateDiskOptions {
    pub zone: String,
    pub name: String,
    pub disk_type: String,
    pub size_gb: u64,
    pub project_id: Option<String>,
    pub tags: HashMap<String, String>,
}

// ── Client ──────────────────────────────────────────────────────────────

pub struct CbsClient {
    region: QcloudRegion,
}

impl CbsClient {
    /// Pacing for a fresh disk to appear in DescribeDisks.
    pub const CREATE_WAIT: WaitSpec = WaitSpec::secs(5, 5 * 60);

    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn disk_spec() -> PageSpec {
        PageSpec::new(Service::Cbs, "DescribeDisks", "DiskSet").limit(100)
    }

    fn disk_params(zone: Option<&str>, instance_id: Option<&str>, disk_ids: &[String]) -> Params {
        let mut params = Params::new();
        params.set_list("DiskIds", disk_ids);
        if let Some(zone) = zone.filter(|z| !z.is_empty()) {
            params.add_filter("zone", &[zone]);
        }
        if let Some(instance_id) = instance_id.filter(|i| !i.is_empty()) {
            params.add_filter("instance-id", &[instance_id]);
        }
        params
    }

    pub async fn describe_disks(
        &self,
        zone: Option<&str>,
        instance_id: Option<&str>,
        disk_ids: &[String],
        offset: usize,
    ) -> QcloudResult<(Vec<Disk>, usize)> {
        self.region
            .client()
            .list_page(
                &Self::disk_spec(),
                Self::disk_params(zone, instance_id, disk_ids),
                Some(self.region.id()),
                offset,
            )
            .await
    }

    pub async fn describe_all_disks(&self, zone: Option<&str>, instance_id: Option<&str>) -> QcloudResult<Vec<Disk>> {
        self.region
            .client()
            .list_all(
                &Self::disk_spec(),
                Self::disk_params(zone, instance_id, &[]),
                Some(self.region.id()),
            )
            .await
    }

    pub async fn get_disk(&self, disk_id: &str) -> QcloudResult<Disk> {
        let (disks, _) = self.describe_disks(None, None, &[disk_id.to_string()], 0).await?;
        expect_single(disks, "disk", disk_id)
    }

    /// CreateDisks, then wait until the new disk is visible.
    pub async fn create_disk(&self, opts: &CreateDiskOptions) -> QcloudResult<Disk> {
        let mut params = Params::new();
        params
            .set("Placement.Zone", &opts.zone)
            .set("DiskName", &opts.name)
            .set("DiskType", &opts.disk_type)
            .set("DiskSize", opts.size_gb)
            .set("DiskChargeType", "POSTPAID_BY_HOUR")
            .set("DiskCount", 1)
            .set("ClientToken", client_token());
        params.set_opt("Placement.ProjectId", opts.project_id.as_deref());
        let mut tags: Vec<_> = opts.tags.iter().collect();
        tags.sort();
        params.set_struct_list(
            "Tags",
            tags.into_iter()
                .map(|(k, v)| vec![("Key", k.clone()), ("Value", v.clone())]),
        );

        let payload = self.region.cbs_request("CreateDisks", params).await?;
        let ids: Vec<String> = payload.list("DiskIdSet")?;
        let disk_id = ids
            .into_iter()
            .next()
            .ok_or_else(|| QcloudError::decode("CreateDisks returned no disk id"))?;

        let id = disk_id.as_str();
        wait_until(
            &format!("disk {} visible", id),
            Self::CREATE_WAIT,
            self.region.client().cancellation_token(),
            || async move {
                match self.get_disk(id).await {
                    Ok(_) => Ok(true),
                    Err(e) if e.is_not_found() => Ok(false),
                    Err(e) => Err(e),
                }
            },
        )
        .await?;
        self.get_disk(&disk_id).await
    }

    /// TerminateDisks - terminating an absent disk succeeds.
    pub async fn delete_disk(&self, disk_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("DiskIds.0", disk_id);
        match self.region.cbs_request("TerminateDisks", params).await {
            Err(e) if e.is_not_found() || e.is_code(&["InvalidDiskId.NotFound"]) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

impl QcloudRegion {
    pub fn cbs(&self) -> CbsClient {
        CbsClient::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{region_of, scripted_client};
    use serde_json::json;

    fn disk(id: &str) -> serde_json::Value {
        json!({
            "DiskId": id,
            "DiskName": "data",
            "DiskType": "CLOUD_PREMIUM",
            "DiskUsage": "DATA_DISK",
            "DiskSize": 50,
            "DiskState": "UNATTACHED",
            "Placement": {"Zone": "ap-guangzhou-3", "ProjectId": 0},
            "Tags": [{"Key": "tencentcloud:owner", "Value": "ops"}]
        })
    }

    #[test]
    fn disk_serde_splits_system_tags() {
        let d: Disk = serde_json::from_value(disk("disk-1")).unwrap();
        assert_eq!(d.status(), "ready");
        assert!(!d.is_system_disk());
        assert!(d.tags().is_empty());
        assert_eq!(d.sys_tags()["tencentcloud:owner"], "ops");
    }

    #[tokio::test(start_paused = true)]
    async fn create_waits_until_visible() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"DiskIdSet": ["disk-9"]})).await;
        wire.push_json(json!({"DiskSet": [], "TotalCount": 0})).await;
        wire.push_json(json!({"DiskSet": [disk("disk-9")], "TotalCount": 1})).await;
        wire.push_json(json!({"DiskSet": [disk("disk-9")], "TotalCount": 1})).await;

        let opts = CreateDiskOptions {
            zone: "ap-guangzhou-3".to_string(),
            name: "data".to_string(),
            disk_type: "CLOUD_PREMIUM".to_string(),
            size_gb: 50,
            tags: HashMap::from([("env".to_string(), "dev".to_string())]),
            ..Default::default()
        };
        let created = region_of(client, "ap-guangzhou")
            .cbs()
            .create_disk(&opts)
            .await
            .unwrap();
        assert_eq!(created.disk_id, "disk-9");

        let reqs = wire.requests().await;
        assert_eq!(reqs.len(), 4);
        assert_eq!(reqs[0].action(), Some("CreateDisks"));
        assert!(reqs[0].param("ClientToken").is_some());
        assert_eq!(reqs[0].param("Tags.0.Key").as_deref(), Some("env"));
        assert_eq!(reqs[1].param("DiskIds.0").as_deref(), Some("disk-9"));
    }

    #[tokio::test]
    async fn instance_filter() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"DiskSet": [disk("disk-1")], "TotalCount": 1})).await;
        let disks = region_of(client, "ap-guangzhou")
            .cbs()
            .describe_all_disks(Some("ap-guangzhou-3"), Some("ins-1"))
            .await
            .unwrap();
        assert_eq!(disks.len(), 1);
        let req = &wire.requests().await[0];
        assert_eq!(req.param("Filters.0.Name").as_deref(), Some("zone"));
        assert_eq!(req.param("Filters.1.Name").as_deref(), Some("instance-id"));
        assert_eq!(req.param("Filters.1.Values.0").as_deref(), Some("ins-1"));
    }

    #[tokio::test]
    async fn delete_missing_disk_is_ok() {
        let (client, wire, _) = scripted_client(false);
        wire.push_api_error("InvalidDiskId.NotFound", "gone").await;
        region_of(client, "ap-guangzhou").cbs().delete_disk("disk-1").await.unwrap();
    }
}
