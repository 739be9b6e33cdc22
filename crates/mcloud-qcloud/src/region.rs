//! Regions, zones and the synthetic wire/host views.
//!
//! A [`QcloudRegion`] is a cheap handle pairing the shared client with one
//! region's data. It scopes every regional request and hands out the
//! per-family service clients.

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::params::Params;
use crate::payload::Payload;
use crate::tags::{Resource, TaggedResource};
use crate::vpc::Vpc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Provider token used in global ids.
pub const PROVIDER: &str = "qcloud";

/// Provider display prefix used in region names.
pub const PROVIDER_DISPLAY_NAME: &str = "腾讯云";

/// Approximate city coordinates per region id.
const GEOGRAPHY: &[(&str, f64, f64)] = &[
    ("ap-beijing", 39.9042, 116.4074),
    ("ap-beijing-fsi", 39.9042, 116.4074),
    ("ap-shanghai", 31.2304, 121.4737),
    ("ap-shanghai-fsi", 31.2304, 121.4737),
    ("ap-guangzhou", 23.1291, 113.2644),
    ("ap-shenzhen-fsi", 22.5431, 114.0579),
    ("ap-chengdu", 30.5728, 104.0668),
    ("ap-chongqing", 29.5630, 106.5516),
    ("ap-nanjing", 32.0603, 118.7969),
    ("ap-hongkong", 22.3193, 114.1694),
    ("ap-taipei", 25.0330, 121.5654),
    ("ap-singapore", 1.3521, 103.8198),
    ("ap-bangkok", 13.7563, 100.5018),
    ("ap-jakarta", -6.2088, 106.8456),
    ("ap-mumbai", 19.0760, 72.8777),
    ("ap-seoul", 37.5665, 126.9780),
    ("ap-tokyo", 35.6762, 139.6503),
    ("na-siliconvalley", 37.3875, -122.0575),
    ("na-ashburn", 39.0438, -77.4874),
    ("na-toronto", 43.6532, -79.3832),
    ("eu-frankfurt", 50.1109, 8.6821),
    ("eu-moscow", 55.7558, 37.6173),
    ("sa-saopaulo", -23.5505, -46.6333),
];

// ── Region ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    /// Region id, e.g. `ap-guangzhou`.
    #[serde(rename = "Region")]
    pub id: String,
    /// Localised display name.
    #[serde(rename = "RegionName", default)]
    pub name: String,
    /// `AVAILABLE` or `UNAVAILABLE`.
    #[serde(rename = "RegionState", default)]
    pub state: String,
}

impl RegionInfo {
    pub fn global_id(&self) -> String {
        format!("{}/{}", PROVIDER, self.id)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", PROVIDER_DISPLAY_NAME, self.name)
    }

    pub fn is_available(&self) -> bool {
        self.state == "AVAILABLE"
    }

    /// `(latitude, longitude)` when known.
    pub fn geography(&self) -> Option<(f64, f64)> {
        GEOGRAPHY
            .iter()
            .find(|(id, _, _)| *id == self.id)
            .map(|(_, lat, lon)| (*lat, *lon))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    /// Zone id, e.g. `ap-guangzhou-3`.
    #[serde(rename = "Zone")]
    pub id: String,
    #[serde(rename = "ZoneName", default)]
    pub name: String,
    /// Numeric zone code some services report instead of the zone id.
    #[serde(rename = "ZoneId", default, deserialize_with = "crate::payload::lenient::string")]
    pub numeric_id: String,
    /// `AVAILABLE` or `UNAVAILABLE`.
    #[serde(rename = "ZoneState", default)]
    pub state: String,
}

impl ZoneInfo {
    pub fn is_available(&self) -> bool {
        self.state == "AVAILABLE"
    }
}

/// One zone, bound to its region for id composition.
#[derive(Debug, Clone)]
pub struct Zone {
    /// `qcloud/<region-id>`.
    pub region_global_id: String,
    pub info: ZoneInfo,
}

impl Resource for Zone {
    fn id(&self) -> String {
        self.info.id.clone()
    }

    fn name(&self) -> String {
        crate::tags::display_name(&self.info.name, &self.info.id)
    }

    fn global_id(&self) -> String {
        format!("{}/{}", self.region_global_id, self.info.id)
    }

    fn status(&self) -> String {
        if self.info.is_available() {
            "enable".to_string()
        } else {
            "disable".to_string()
        }
    }
}

/// Synthetic (zone, vpc) cross-join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    pub vpc_id: String,
    /// Global id of the owning VPC; the wire's own global id extends it.
    pub vpc_global_id: String,
    pub zone_id: String,
}

impl Resource for Wire {
    fn id(&self) -> String {
        format!("{}-{}", self.vpc_id, self.zone_id)
    }

    fn global_id(&self) -> String {
        format!("{}/{}", self.vpc_global_id, self.zone_id)
    }

    fn status(&self) -> String {
        "available".to_string()
    }
}

/// Synthetic per-zone host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Cloud-provider id of the account this host belongs to.
    pub provider_id: String,
    pub zone_id: String,
}

impl Resource for Host {
    fn id(&self) -> String {
        format!("{}-{}", self.provider_id, self.zone_id)
    }

    fn status(&self) -> String {
        "enabled".to_string()
    }
}

// ── Region handle ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QcloudRegion {
    client: QcloudClient,
    info: Arc<RegionInfo>,
}

impl QcloudRegion {
    pub fn new(client: QcloudClient, info: RegionInfo) -> Self {
        Self {
            client,
            info: Arc::new(info),
        }
    }

    pub fn client(&self) -> &QcloudClient {
        &self.client
    }

    pub fn info(&self) -> &RegionInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn global_id(&self) -> String {
        self.info.global_id()
    }

    pub fn name(&self) -> String {
        self.info.display_name()
    }

    pub async fn request(&self, service: Service, action: &str, params: Params) -> QcloudResult<Payload> {
        self.client.request(service, action, params, Some(&self.info.id)).await
    }

    pub async fn cvm_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Cvm, action, params).await
    }

    pub async fn vpc_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Vpc, action, params).await
    }

    pub async fn cbs_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Cbs, action, params).await
    }

    pub async fn clb_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Clb, action, params).await
    }

    pub async fn cdb_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Cdb, action, params).await
    }

    pub async fn redis_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Redis, action, params).await
    }

    pub async fn monitor_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Monitor, action, params).await
    }

    pub async fn audit_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Audit, action, params).await
    }

    // ── Zones, wires, hosts ─────────────────────────────────────────────

    /// Zones of this region, cached per client.
    pub async fn zones(&self) -> QcloudResult<Vec<Zone>> {
        let infos = self
            .client
            .catalog()
            .zones(&self.info.id)
            .await
            .get_or_fetch(|| async {
                let payload = self.cvm_request("DescribeZones", Params::new()).await?;
                payload.list::<ZoneInfo>("ZoneSet")
            })
            .await?;
        let region_global_id = self.global_id();
        Ok(infos
            .iter()
            .map(|info| Zone {
                region_global_id: region_global_id.clone(),
                info: info.clone(),
            })
            .collect())
    }

    pub async fn zone(&self, zone_id: &str) -> QcloudResult<Zone> {
        self.zones()
            .await?
            .into_iter()
            .find(|z| z.info.id == zone_id)
            .ok_or_else(|| QcloudError::not_found(format!("zone {}", zone_id)))
    }

    pub async fn zone_by_global_id(&self, global_id: &str) -> QcloudResult<Zone> {
        self.zones()
            .await?
            .into_iter()
            .find(|z| z.global_id() == global_id)
            .ok_or_else(|| QcloudError::not_found(format!("zone {}", global_id)))
    }

    /// One wire per (zone, vpc).
    pub async fn wires(&self) -> QcloudResult<Vec<Wire>> {
        let zones = self.zones().await?;
        let vpcs = self.vpc().describe_all_vpcs().await?;
        Ok(cross_join(&zones, &vpcs))
    }

    pub async fn hosts(&self) -> QcloudResult<Vec<Host>> {
        let provider_id = self.client.provider_id().to_string();
        Ok(self
            .zones()
            .await?
            .into_iter()
            .map(|z| Host {
                provider_id: provider_id.clone(),
                zone_id: z.info.id,
            })
            .collect())
    }

    pub async fn host_by_id(&self, global_id: &str) -> QcloudResult<Host> {
        self.hosts()
            .await?
            .into_iter()
            .find(|h| h.global_id() == global_id)
            .ok_or_else(|| QcloudError::not_found(format!("host {}", global_id)))
    }

    /// Write tags of a tag-service resource in this region.
    pub async fn set_tags<R: TaggedResource>(
        &self,
        resource: &R,
        tags: &HashMap<String, String>,
        replace: bool,
    ) -> QcloudResult<()> {
        self.client
            .set_resource_tags(R::TAG_TARGET, &self.info.id, &resource.id(), tags, replace)
            .await
    }
}

fn cross_join(zones: &[Zone], vpcs: &[Vpc]) -> Vec<Wire> {
    let mut wires = Vec::with_capacity(zones.len() * vpcs.len());
    for vpc in vpcs {
        for zone in zones {
            wires.push(Wire {
                vpc_id: vpc.id(),
                vpc_global_id: vpc.global_id(),
                zone_id: zone.info.id.clone(),
            });
        }
    }
    wires
}

// ── Client-level catalog access ─────────────────────────────────────────

impl QcloudClient {
    /// Region list, fetched on first use.
    pub async fn regions(&self) -> QcloudResult<Vec<QcloudRegion>> {
        let infos = self
            .catalog()
            .regions
            .get_or_fetch(|| self.load_regions())
            .await?;
        Ok(infos
            .iter()
            .map(|info| QcloudRegion::new(self.clone(), info.clone()))
            .collect())
    }

    /// Reload the region list unconditionally.
    pub async fn fetch_regions(&self) -> QcloudResult<()> {
        let infos = self.load_regions().await?;
        self.catalog().regions.replace(infos).await;
        Ok(())
    }

    async fn load_regions(&self) -> QcloudResult<Vec<RegionInfo>> {
        let payload = self
            .request(Service::Cvm, "DescribeRegions", Params::new(), None)
            .await
            .map_err(|e| {
                log::error!("fetch regions failed: {}", e);
                e
            })?;
        payload.list("RegionSet")
    }

    pub async fn region(&self, region_id: &str) -> QcloudResult<QcloudRegion> {
        self.regions()
            .await?
            .into_iter()
            .find(|r| r.id() == region_id)
            .ok_or_else(|| QcloudError::not_found(format!("region {}", region_id)))
    }

    pub async fn region_by_global_id(&self, global_id: &str) -> QcloudResult<QcloudRegion> {
        self.regions()
            .await?
            .into_iter()
            .find(|r| r.global_id() == global_id)
            .ok_or_else(|| QcloudError::not_found(format!("region {}", global_id)))
    }

    pub async fn default_region(&self) -> QcloudResult<QcloudRegion> {
        self.region(crate::endpoint::DEFAULT_REGION).await
    }

    /// Search every region for a host by global id.
    pub async fn host_by_id(&self, global_id: &str) -> QcloudResult<Host> {
        for region in self.regions().await? {
            match region.host_by_id(global_id).await {
                Ok(host) => return Ok(host),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(QcloudError::not_found(format!("host {}", global_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::scripted_client;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn region_set() -> serde_json::Value {
        json!({
            "TotalCount": 2,
            "RegionSet": [
                {"Region": "ap-beijing", "RegionName": "华北地区(北京)", "RegionState": "AVAILABLE"},
                {"Region": "ap-shanghai-fsi", "RegionName": "华东地区(上海金融)", "RegionState": "UNAVAILABLE"}
            ]
        })
    }

    #[tokio::test]
    async fn regions_are_fetched_once() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(region_set()).await;
        let regions = client.regions().await.unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].global_id(), "qcloud/ap-beijing");
        assert!(regions[0].info().is_available());
        assert!(!regions[1].info().is_available());
        assert!(regions[0].info().geography().is_some());

        let again = client.region("ap-shanghai-fsi").await.unwrap();
        assert_eq!(again.id(), "ap-shanghai-fsi");
        assert_eq!(wire.request_count().await, 1);
        assert_eq!(wire.requests().await[0].action(), Some("DescribeRegions"));

        let err = client.region("ap-nowhere").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(client.region_by_global_id("qcloud/ap-beijing").await.is_ok());
    }

    #[tokio::test]
    async fn zones_are_cached_and_composed() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(region_set()).await;
        wire.push_json(json!({
            "ZoneSet": [
                {"Zone": "ap-beijing-1", "ZoneName": "北京一区", "ZoneId": "800001", "ZoneState": "AVAILABLE"},
                {"Zone": "ap-beijing-2", "ZoneName": "北京二区", "ZoneId": 800002, "ZoneState": "UNAVAILABLE"}
            ]
        }))
        .await;
        let region = client.region("ap-beijing").await.unwrap();
        let zones = region.zones().await.unwrap();
        assert_eq!(zones[0].global_id(), "qcloud/ap-beijing/ap-beijing-1");
        assert_eq!(zones[1].info.numeric_id, "800002");
        assert_eq!(zones[1].status(), "disable");
        region.zone("ap-beijing-2").await.unwrap();
        assert_eq!(wire.request_count().await, 2);

        let hosts = region.hosts().await.unwrap();
        assert_eq!(hosts[0].global_id(), "prov-1-ap-beijing-1");
    }

    #[tokio::test]
    async fn wires_cross_join_zones_and_vpcs() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(region_set()).await;
        wire.push_json(json!({"ZoneSet": [{"Zone": "ap-beijing-1"}, {"Zone": "ap-beijing-2"}]})).await;
        wire.push_json(json!({
            "TotalCount": 1,
            "VpcSet": [{"VpcId": "vpc-1", "VpcName": "main", "CidrBlock": "10.0.0.0/16"}]
        }))
        .await;
        let region = client.region("ap-beijing").await.unwrap();
        let wires = region.wires().await.unwrap();
        assert_eq!(wires.len(), 2);
        assert_eq!(wires[0].id(), "vpc-1-ap-beijing-1");
        assert_eq!(wires[1].global_id(), "vpc-1/ap-beijing-2");
    }

    #[tokio::test]
    async fn connect_fails_fast_on_bad_key() {
        let wire = crate::transport::ScriptedTransport::new();
        wire.push_api_error("AuthFailure.SignatureFailure", "bad signature").await;
        let config = crate::config::QcloudClientConfig::new("AKID", "bad").transport(wire.clone());
        let err = QcloudClient::connect(config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAccessKey);
    }
}
