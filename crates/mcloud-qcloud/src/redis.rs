//! TencentDB for Redis (service `redis`, API 2018-04-12).
//!
//! Listing calls carry the region as an explicit `Region` parameter and page
//! by 20. Instances report their zone as a numeric code; the subnet's zone is
//! authoritative and the static code table is only a fallback.

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::{expect_single, PageSpec};
use crate::params::Params;
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use crate::waiter::{wait_task, RedisTask};
use serde::{Deserialize, Serialize};

const REDIS_PAGE: usize = 20;

/// Numeric zone codes used by the Redis API.
const ZONE_CODES: &[(i64, &str)] = &[
    (100001, "ap-guangzhou-1"),
    (100002, "ap-guangzhou-2"),
    (100003, "ap-guangzhou-3"),
    (100004, "ap-guangzhou-4"),
    (100006, "ap-guangzhou-6"),
    (110001, "ap-shenzhen-fsi-1"),
    (110002, "ap-shenzhen-fsi-2"),
    (110003, "ap-shenzhen-fsi-3"),
    (200001, "ap-shanghai-1"),
    (200002, "ap-shanghai-2"),
    (200003, "ap-shanghai-3"),
    (200004, "ap-shanghai-4"),
    (200005, "ap-shanghai-5"),
    (200006, "ap-shanghai-6"),
    (200007, "ap-shanghai-7"),
    (700001, "ap-shanghai-fsi-1"),
    (700002, "ap-shanghai-fsi-2"),
    (700003, "ap-shanghai-fsi-3"),
    (330001, "ap-nanjing-1"),
    (330002, "ap-nanjing-2"),
    (330003, "ap-nanjing-3"),
    (800001, "ap-beijing-1"),
    (800002, "ap-beijing-2"),
    (800003, "ap-beijing-3"),
    (800004, "ap-beijing-4"),
    (800005, "ap-beijing-5"),
    (800006, "ap-beijing-6"),
    (800007, "ap-beijing-7"),
    (460001, "ap-beijing-fsi-1"),
    (360001, "ap-tianjin-1"),
    (360002, "ap-tianjin-2"),
    (160001, "ap-chengdu-1"),
    (160002, "ap-chengdu-2"),
    (190001, "ap-chongqing-1"),
    (300001, "ap-hongkong-1"),
    (300002, "ap-hongkong-2"),
    (300003, "ap-hongkong-3"),
    (390001, "ap-taipei-1"),
    (900001, "ap-singapore-1"),
    (230001, "ap-bangkok-1"),
    (210001, "ap-mumbai-1"),
    (210002, "ap-mumbai-2"),
    (180001, "ap-seoul-1"),
    (180002, "ap-seoul-2"),
    (250001, "ap-tokyo-1"),
    (150001, "na-siliconvalley-1"),
    (150002, "na-siliconvalley-2"),
    (220001, "na-ashburn-1"),
    (220002, "na-ashburn-2"),
    (400001, "na-toronto-1"),
    (170001, "eu-frankfurt-1"),
    (240001, "eu-moscow-1"),
];

pub fn zone_by_code(code: i64) -> Option<&'static str> {
    ZONE_CODES.iter().find(|(c, _)| *c == code).map(|(_, z)| *z)
}

pub fn code_by_zone(zone: &str) -> Option<i64> {
    ZONE_CODES.iter().find(|(_, z)| *z == zone).map(|(c, _)| *c)
}

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisInstance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "InstanceName", default)]
    pub instance_name: String,
    /// 0 pending, 1 in flow, 2 running, -2 isolated, -3 pending deletion.
    #[serde(rename = "Status", default, deserialize_with = "crate::payload::lenient::int")]
    pub status_code: i64,
    #[serde(rename = "Engine", default)]
    pub engine: String,
    #[serde(rename = "ProductType", default)]
    pub product_type: String,
    #[serde(rename = "Type", default, deserialize_with = "crate::payload::lenient::int")]
    pub type_code: i64,
    #[serde(rename = "Size", default)]
    pub size_mb: f64,
    #[serde(rename = "RedisShardNum", default, deserialize_with = "crate::payload::lenient::int")]
    pub shard_num: i64,
    #[serde(rename = "RedisReplicasNum", default, deserialize_with = "crate::payload::lenient::int")]
    pub replicas_num: i64,
    #[serde(rename = "WanIp", default)]
    pub private_ip: String,
    #[serde(rename = "Port", default)]
    pub port: u16,
    #[serde(rename = "UniqVpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "UniqSubnetId", default)]
    pub subnet_id: String,
    #[serde(rename = "ZoneId", default, deserialize_with = "crate::payload::lenient::int")]
    pub zone_code: i64,
    #[serde(rename = "ProjectId", default, deserialize_with = "crate::payload::lenient::string")]
    pub project_id: String,
    /// 0 hourly, 1 prepaid.
    #[serde(rename = "BillingMode", default, deserialize_with = "crate::payload::lenient::int")]
    pub billing_mode: i64,
    #[serde(rename = "Createtime", default)]
    pub create_time: String,
    #[serde(rename = "DeadlineTime", default)]
    pub deadline_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for RedisInstance {
    fn id(&self) -> String {
        self.instance_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.instance_name, &self.instance_id)
    }

    fn status(&self) -> String {
        match self.status_code {
            2 => "running",
            0 => "deploying",
            1 => "changing",
            -2 => "unavailable",
            -3 => "releasing",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for RedisInstance {
    const TAG_TARGET: TagTarget = TagTarget::new("redis", "instance");
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedisBackup {
    #[serde(rename = "BackupId")]
    pub backup_id: String,
    #[serde(rename = "InstanceId", default)]
    pub instance_id: String,
    #[serde(rename = "Remark", default)]
    pub remark: Option<String>,
    #[serde(rename = "BackupType", default)]
    pub backup_type: String,
    #[serde(rename = "Status", default, deserialize_with = "crate::payload::lenient::int")]
    pub status_code: i64,
    #[serde(rename = "StartTime", default)]
    pub start_time: String,
    #[serde(rename = "EndTime", default)]
    pub end_time: String,
}

// ── Client ──────────────────────────────────────────────────────────────

pub struct RedisClient {
    region: QcloudRegion,
}

impl RedisClient {
    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn regional_params(&self) -> Params {
        Params::new().with("Region", self.region.id())
    }

    /// DescribeInstances, 20 per page; `instance_id` narrows to one.
    pub async fn describe_instances(&self, instance_id: Option<&str>) -> QcloudResult<Vec<RedisInstance>> {
        let mut params = self.regional_params();
        params.set_opt("InstanceId", instance_id);
        let spec = PageSpec::new(Service::Redis, "DescribeInstances", "InstanceSet").limit(REDIS_PAGE);
        self.region.client().list_all(&spec, params, None).await
    }

    pub async fn get_instance(&self, instance_id: &str) -> QcloudResult<RedisInstance> {
        if instance_id.is_empty() {
            return Err(QcloudError::not_found("redis instance with empty id"));
        }
        let items = self.describe_instances(Some(instance_id)).await?;
        expect_single(items, "redis instance", instance_id)
    }

    /// Every backup of one instance, 20 per page.
    pub async fn describe_backups(&self, instance_id: &str) -> QcloudResult<Vec<RedisBackup>> {
        let params = self.regional_params().with("InstanceId", instance_id);
        let spec = PageSpec::new(Service::Redis, "DescribeInstanceBackups", "BackupSet").limit(REDIS_PAGE);
        self.region.client().list_all(&spec, params, None).await
    }

    /// ManualBackupInstance; the backup is located by its remark once the
    /// backup task succeeds.
    pub async fn create_backup(&self, instance_id: &str, description: &str) -> QcloudResult<RedisBackup> {
        let remark = format!("{}@{}", description, chrono::Utc::now().timestamp());
        let params = self
            .regional_params()
            .with("InstanceId", instance_id)
            .with("Remark", &remark);
        let payload = self
            .region
            .client()
            .request(Service::Redis, "ManualBackupInstance", params, None)
            .await?;
        let task_id = payload
            .string("TaskId")
            .ok_or_else(|| QcloudError::decode("ManualBackupInstance returned no TaskId"))?;

        let client = self.region.client();
        let task = RedisTask::new(client, self.region.id(), &task_id);
        wait_task(&task, RedisTask::WAIT, client.cancellation_token()).await?;

        self.describe_backups(instance_id)
            .await?
            .into_iter()
            .find(|b| b.remark.as_deref() == Some(remark.as_str()))
            .ok_or_else(|| QcloudError::not_found(format!("redis backup {}", remark)))
    }

    /// Vendor zone id of an instance.
    pub async fn zone_id(&self, instance: &RedisInstance) -> Option<String> {
        if !instance.subnet_id.is_empty() {
            match self.region.vpc().get_subnet(&instance.subnet_id).await {
                Ok(subnet) if !subnet.zone.is_empty() => return Some(subnet.zone),
                Ok(_) => {}
                Err(e) => log::debug!("subnet {} of {}: {}", instance.subnet_id, instance.instance_id, e),
            }
        }
        let zone = zone_by_code(instance.zone_code);
        if zone.is_none() {
            log::warn!(
                "zone code {} of redis instance {} is not in the zone table",
                instance.zone_code,
                instance.instance_id
            );
        }
        zone.map(str::to_string)
    }
}

impl QcloudRegion {
    pub fn redis(&self) -> RedisClient {
        RedisClient::new(self.clone())
    }
}
