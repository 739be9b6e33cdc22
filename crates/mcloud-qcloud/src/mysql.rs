//! TencentDB for MySQL (service `cdb`, API 2017-03-20).
//!
//! Creation goes through `CreateDBInstanceHour` (pay-as-you-go) or
//! `CreateDBInstance` (prepaid). Both answer with instance ids and an
//! `AsyncRequestId` that is polled through `DescribeAsyncRequestInfo`.

use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::{expect_single, PageSpec};
use crate::params::{client_token, Params};
use crate::region::QcloudRegion;
use crate::tags::{display_name, QcloudTags, Resource, TagTarget, TaggedResource};
use crate::waiter::{retry_on_codes, wait_task, wait_until, AsyncRequestTask, WaitSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Codes returned while another order of the account is still processing.
const ORDER_IN_PROCESS: &[&str] = &["OperationDenied.OtherOderInProcess"];

// ── Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MysqlInstance {
    #[serde(rename = "InstanceId")]
    pub instance_id: String,
    #[serde(rename = "InstanceName", default)]
    pub instance_name: String,
    /// 0 creating, 1 running, 4 isolating, 5 isolated.
    #[serde(rename = "Status", default, deserialize_with = "crate::payload::lenient::int")]
    pub status_code: i64,
    #[serde(rename = "TaskStatus", default, deserialize_with = "crate::payload::lenient::int")]
    pub task_status: i64,
    #[serde(rename = "InitFlag", default, deserialize_with = "crate::payload::lenient::int")]
    pub init_flag: i64,
    #[serde(rename = "Cpu", default)]
    pub cpu: u32,
    #[serde(rename = "Memory", default)]
    pub memory_mb: u64,
    #[serde(rename = "Volume", default)]
    pub volume_gb: u64,
    #[serde(rename = "EngineVersion", default)]
    pub engine_version: String,
    #[serde(rename = "DeviceType", default)]
    pub device_type: String,
    #[serde(rename = "Zone", default)]
    pub zone: String,
    #[serde(rename = "UniqVpcId", default)]
    pub vpc_id: String,
    #[serde(rename = "UniqSubnetId", default)]
    pub subnet_id: String,
    #[serde(rename = "Vip", default)]
    pub vip: String,
    #[serde(rename = "Vport", default)]
    pub vport: u16,
    #[serde(rename = "WanDomain", default)]
    pub wan_domain: String,
    #[serde(rename = "WanPort", default)]
    pub wan_port: u16,
    #[serde(rename = "ProjectId", default, deserialize_with = "crate::payload::lenient::string")]
    pub project_id: String,
    /// 0 prepaid, 1 hourly.
    #[serde(rename = "PayType", default, deserialize_with = "crate::payload::lenient::int")]
    pub pay_type: i64,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
    #[serde(rename = "DeadlineTime", default)]
    pub deadline_time: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl MysqlInstance {
    pub fn is_isolated(&self) -> bool {
        self.status_code == 5
    }
}

impl Resource for MysqlInstance {
    fn id(&self) -> String {
        self.instance_id.clone()
    }

    fn name(&self) -> String {
        display_name(&self.instance_name, &self.instance_id)
    }

    fn status(&self) -> String {
        if self.init_flag == 0 {
            return "init".to_string();
        }
        match self.status_code {
            4 => return "isolating".to_string(),
            5 => return "isolated".to_string(),
            _ => {}
        }
        match (self.task_status, self.status_code) {
            (0, 1) => "running",
            (0, _) => "deploying",
            (1, _) => "upgrading",
            (2, _) => "importing",
            (10, _) => "rebooting",
            (12, _) => "migrating",
            _ => "deploying",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for MysqlInstance {
    const TAG_TARGET: TagTarget = TagTarget::new("cdb", "instanceId");
}

/// High-availability flavour of a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MysqlCategory {
    Basic,
    #[default]
    Ha,
    Finance,
}

/// Arguments of [`CdbClient::create_instance`].
#[derive(Debug, Clone, Default)]
pub struct CreateMysqlOptions {
    pub name: String,
    pub engine_version: String,
    pub memory_mb: u64,
    pub volume_gb: u64,
    pub category: MysqlCategory,
    pub zone: String,
    pub slave_zone: Option<String>,
    pub backup_zone: Option<String>,
    pub vpc_id: Option<String>,
    pub subnet_id: Option<String>,
    pub project_id: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub security_group_ids: Vec<String>,
    /// Prepaid months; `None` selects hourly billing.
    pub period_months: Option<u32>,
    pub auto_renew: bool,
    pub tags: HashMap<String, String>,
}

impl CreateMysqlOptions {
    fn action(&self) -> &'static str {
        if self.period_months.is_some() {
            "CreateDBInstance"
        } else {
            "CreateDBInstanceHour"
        }
    }

    fn to_params(&self) -> Params {
        let mut params = Params::new();
        params
            .set("InstanceName", &self.name)
            .set("GoodsNum", 1)
            .set("Memory", self.memory_mb)
            .set("Volume", self.volume_gb)
            .set("EngineVersion", &self.engine_version)
            .set("DeployMode", 0);
        params.set_opt("UniqVpcId", self.vpc_id.as_deref());
        params.set_opt("UniqSubnetId", self.subnet_id.as_deref());
        params.set_opt("ProjectId", self.project_id.as_deref());
        params.set_opt("Password", self.password.as_deref());
        params.set_opt("Zone", Some(self.zone.as_str()));
        if let Some(port) = self.port.filter(|p| *p > 1024 && *p < 65535) {
            params.set("Port", port);
        }
        params.set_list("SecurityGroup", &self.security_group_ids);
        if let Some(months) = self.period_months {
            params
                .set("Period", months)
                .set("AutoRenewFlag", if self.auto_renew { 1 } else { 0 });
        }

        match self.category {
            MysqlCategory::Basic => {
                params.set("DeviceType", "BASIC");
            }
            MysqlCategory::Ha => {
                params.set("DeviceType", "HA");
                params.set_opt("SlaveZone", self.slave_zone.as_deref());
            }
            MysqlCategory::Finance => {
                params.set("DeviceType", "HA").set("ProtectMode", 2);
                params.set_opt("SlaveZone", self.slave_zone.as_deref());
                params.set_opt("BackupZone", self.backup_zone.as_deref());
            }
        }
        if let Some(slave) = self.slave_zone.as_deref() {
            if !self.zone.is_empty() && !slave.is_empty() && slave != self.zone {
                params.set("DeployMode", 1);
            }
        }

        let mut tags: Vec<_> = self.tags.iter().collect();
        tags.sort();
        params.set_struct_list(
            "ResourceTags",
            tags.into_iter()
                .map(|(k, v)| vec![("TagKey", k.clone()), ("TagValue", v.clone())]),
        );
        params
    }
}

// ── Client ──────────────────────────────────────────────────────────────

pub struct CdbClient {
    region: QcloudRegion,
}

impl CdbClient {
    /// Re-submission pacing while another order is in flight.
    pub const ORDER_RETRY: WaitSpec = WaitSpec::secs(20, 10 * 60);
    /// Isolation without an async request id: poll the instance status.
    pub const ISOLATE_WAIT: WaitSpec = WaitSpec::secs(10, 5 * 60);

    pub fn new(region: QcloudRegion) -> Self {
        Self { region }
    }

    fn instance_spec() -> PageSpec {
        PageSpec::new(Service::Cdb, "DescribeDBInstances", "Items").limit(100)
    }

    pub async fn describe_instances(
        &self,
        instance_ids: &[String],
        offset: usize,
    ) -> QcloudResult<(Vec<MysqlInstance>, usize)> {
        let mut params = Params::new();
        params.set_list("InstanceIds", instance_ids);
        self.region
            .client()
            .list_page(&Self::instance_spec(), params, Some(self.region.id()), offset)
            .await
    }

    pub async fn describe_all_instances(&self) -> QcloudResult<Vec<MysqlInstance>> {
        self.region
            .client()
            .list_all(&Self::instance_spec(), Params::new(), Some(self.region.id()))
            .await
    }

    pub async fn get_instance(&self, instance_id: &str) -> QcloudResult<MysqlInstance> {
        let (items, _) = self.describe_instances(&[instance_id.to_string()], 0).await?;
        expect_single(items, "mysql instance", instance_id)
    }

    async fn wait_async_request(&self, request_id: &str) -> QcloudResult<()> {
        let client = self.region.client();
        let task = AsyncRequestTask::new(client, Service::Cdb, self.region.id(), request_id);
        wait_task(&task, AsyncRequestTask::WAIT, client.cancellation_token()).await
    }

    /// Create an instance and wait for the creation request to finish.
    pub async fn create_instance(&self, opts: &CreateMysqlOptions) -> QcloudResult<MysqlInstance> {
        let action = opts.action();
        let mut params = opts.to_params();
        params.set("ClientToken", client_token());

        let client = self.region.client();
        let payload = retry_on_codes(
            ORDER_IN_PROCESS,
            Self::ORDER_RETRY,
            client.cancellation_token(),
            || self.region.cdb_request(action, params.clone()),
        )
        .await?;

        let ids: Vec<String> = payload.list("InstanceIds")?;
        let instance_id = ids
            .into_iter()
            .next()
            .ok_or_else(|| QcloudError::decode(format!("{} returned no InstanceIds", action)))?;
        match payload.string("AsyncRequestId").filter(|id| !id.is_empty()) {
            Some(request_id) => self.wait_async_request(&request_id).await?,
            None => log::warn!("{} for {} returned no AsyncRequestId", action, instance_id),
        }
        self.get_instance(&instance_id).await
    }

    /// IsolateDBInstance, waiting until the instance reports isolated.
    pub async fn isolate_instance(&self, instance_id: &str) -> QcloudResult<()> {
        let params = Params::new().with("InstanceId", instance_id);
        let payload = self.region.cdb_request("IsolateDBInstance", params).await?;
        if let Some(request_id) = payload.string("AsyncRequestId").filter(|id| !id.is_empty()) {
            return self.wait_async_request(&request_id).await;
        }
        wait_until(
            &format!("mysql instance {} isolated", instance_id),
            Self::ISOLATE_WAIT,
            self.region.client().cancellation_token(),
            || async move { Ok(self.get_instance(instance_id).await?.is_isolated()) },
        )
        .await
    }
}

impl QcloudRegion {
    pub fn cdb(&self) -> CdbClient {
        CdbClient::new(self.clone())
    }
}
