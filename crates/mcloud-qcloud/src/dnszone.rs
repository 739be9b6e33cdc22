//! DNSPod public zones (service `dnspod`, global).

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::PageSpec;
use crate::params::Params;
use crate::tags::{QcloudTags, Resource, TagTarget, TaggedResource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsZone {
    #[serde(rename = "DomainId", deserialize_with = "crate::payload::lenient::string")]
    pub domain_id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    /// `ENABLE`, `PAUSE` or `SPAM`.
    #[serde(rename = "Status", default)]
    pub status_code: String,
    #[serde(rename = "DNSStatus", default)]
    pub dns_status: String,
    #[serde(rename = "Grade", default)]
    pub grade: String,
    #[serde(rename = "TTL", default)]
    pub ttl: u32,
    #[serde(rename = "RecordCount", default)]
    pub record_count: u64,
    #[serde(rename = "EffectiveDNS", default)]
    pub effective_dns: Option<Vec<String>>,
    #[serde(rename = "Remark", default)]
    pub remark: String,
    #[serde(rename = "CreatedOn", default)]
    pub created_on: String,
    #[serde(rename = "UpdatedOn", default)]
    pub updated_on: String,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl Resource for DnsZone {
    fn id(&self) -> String {
        self.domain_id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn global_id(&self) -> String {
        self.name.clone()
    }

    fn status(&self) -> String {
        match self.status_code.as_str() {
            "ENABLE" => "available",
            "PAUSE" | "SPAM" => "disabled",
            _ => "unknown",
        }
        .to_string()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for DnsZone {
    const TAG_TARGET: TagTarget = TagTarget::new("dnspod", "domain");
}

impl QcloudClient {
    /// DescribeDomainList - every zone of the account.
    pub async fn dns_zones(&self) -> QcloudResult<Vec<DnsZone>> {
        let spec = PageSpec::new(Service::Dns, "DescribeDomainList", "DomainList")
            .total_at("DomainCountInfo.AllTotal")
            .limit(3000);
        self.list_all(&spec, Params::new(), None).await
    }

    /// Zone by domain id or domain name.
    pub async fn dns_zone(&self, id: &str) -> QcloudResult<DnsZone> {
        self.dns_zones()
            .await?
            .into_iter()
            .find(|z| z.domain_id == id || z.name == id)
            .ok_or_else(|| QcloudError::not_found(format!("dns zone {}", id)))
    }
}
