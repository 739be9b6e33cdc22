//! Bucket records, the per-client bucket list and bucket-level operations.

use super::client::CosClient;
use super::types::{BucketEntry, Grant};
use crate::catalog;
use crate::cdn::CdnDomain;
use crate::client::QcloudClient;
use crate::endpoint::DEFAULT_REGION;
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::permission::COS_SERVICE;
use crate::region::{QcloudRegion, RegionInfo};
use crate::tags::Resource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const GROUP_ALL_USERS: &str = "http://cam.qcloud.com/groups/global/AllUsers";
const GROUP_AUTH_USERS: &str = "http://cam.qcloud.com/groups/global/AuthenticatedUsers";

/// Canned bucket ACLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    /// Grants that match no canned ACL.
    Unknown,
}

impl BucketAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketAcl::Private => "private",
            BucketAcl::PublicRead => "public-read",
            BucketAcl::PublicReadWrite => "public-read-write",
            BucketAcl::AuthenticatedRead => "authenticated-read",
            BucketAcl::Unknown => "unknown",
        }
    }

    /// Parse a canned ACL name; `unknown` is not accepted.
    pub fn parse(s: &str) -> QcloudResult<Self> {
        match s {
            "private" => Ok(BucketAcl::Private),
            "public-read" => Ok(BucketAcl::PublicRead),
            "public-read-write" => Ok(BucketAcl::PublicReadWrite),
            "authenticated-read" => Ok(BucketAcl::AuthenticatedRead),
            other => Err(QcloudError::invalid_arg(format!("invalid acl {:?}", other))),
        }
    }

    /// Recognise the canned ACL behind a grant list.
    pub fn from_grants(grants: &[Grant]) -> Self {
        let has = |uri: &str, permission: &str| {
            grants
                .iter()
                .any(|g| g.grantee.uri == uri && g.permission == permission)
        };
        match grants.len() {
            1 if grants[0].grantee.uri.is_empty() && grants[0].permission == "FULL_CONTROL" => {
                BucketAcl::Private
            }
            2 if has(GROUP_AUTH_USERS, "READ") => BucketAcl::AuthenticatedRead,
            2 if has(GROUP_ALL_USERS, "READ") => BucketAcl::PublicRead,
            3 if has(GROUP_ALL_USERS, "WRITE") => BucketAcl::PublicReadWrite,
            _ => BucketAcl::Unknown,
        }
    }
}

impl std::fmt::Display for BucketAcl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAccessUrl {
    pub url: String,
    pub description: String,
    pub primary: bool,
}

// ── Bucket ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    /// Public name, without the app id suffix.
    pub name: String,
    pub app_id: String,
    /// Location as reported by COS: a region id or a zone id.
    pub location: String,
    pub region_id: String,
    /// Set for zonal buckets.
    pub zone_id: Option<String>,
    /// App id of the credential that listed the bucket.
    pub owner_app_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Bucket {
    /// Build from a service listing entry, resolving its location.
    ///
    /// Returns `None` when the location matches no known region.
    fn from_entry(entry: &BucketEntry, regions: &[RegionInfo], owner_app_id: &str) -> Option<Self> {
        let (name, app_id) = super::split_wire_name(&entry.name);
        if app_id != owner_app_id {
            log::error!(
                "[{} {}] inconsistent app id: {} expect {}",
                entry.name,
                entry.location,
                app_id,
                owner_app_id
            );
        }
        let Some((region, zone_id)) = catalog::locate(regions, &entry.location) else {
            log::error!("no region for bucket {} at {}", entry.name, entry.location);
            return None;
        };
        if let Some(ref zone) = zone_id {
            log::debug!("zonal bucket {} in {}", entry.name, zone);
        }
        Some(Self {
            name: name.to_string(),
            app_id: app_id.to_string(),
            location: entry.location.clone(),
            region_id: region.id.clone(),
            zone_id,
            owner_app_id: owner_app_id.to_string(),
            created_at: DateTime::parse_from_rfc3339(&entry.creation_date)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        })
    }

    pub fn wire_name(&self) -> String {
        format!("{}-{}", self.name, self.app_id)
    }

    /// Zone id for zonal buckets, region id otherwise.
    fn endpoint_location(&self) -> &str {
        self.zone_id.as_deref().unwrap_or(&self.region_id)
    }

    pub fn url(&self) -> String {
        format!("https://{}", super::bucket_host(&self.wire_name(), self.endpoint_location()))
    }

    pub fn website_url(&self) -> String {
        format!(
            "https://{}.{}",
            self.wire_name(),
            super::website_endpoint(self.endpoint_location())
        )
    }

    pub fn access_urls(&self) -> Vec<BucketAccessUrl> {
        vec![
            BucketAccessUrl {
                url: self.url(),
                description: "bucket domain".to_string(),
                primary: true,
            },
            BucketAccessUrl {
                url: format!("https://{}/{}", super::endpoint(&self.region_id), self.wire_name()),
                description: "cos domain".to_string(),
                primary: false,
            },
        ]
    }

    /// Data-path client bound to this bucket's endpoint.
    pub fn cos(&self, client: &QcloudClient) -> CosClient {
        client.cos(self.endpoint_location())
    }

    pub async fn acl(&self, client: &QcloudClient) -> QcloudResult<BucketAcl> {
        let policy = self.cos(client).get_bucket_acl(&self.wire_name()).await?;
        Ok(BucketAcl::from_grants(&policy.access_control_list.grants))
    }

    pub async fn set_acl(&self, client: &QcloudClient, acl: BucketAcl) -> QcloudResult<()> {
        if acl == BucketAcl::Unknown {
            return Err(QcloudError::invalid_arg("cannot set an unknown acl"));
        }
        self.cos(client).put_bucket_acl(&self.wire_name(), acl.as_str()).await
    }

    /// Pre-signed GET URL for one object.
    pub fn temp_url(&self, client: &QcloudClient, key: &str, validity: Duration) -> QcloudResult<String> {
        self.cos(client).presign_get(&self.wire_name(), key, validity)
    }

    /// CDN domains whose origin is this bucket.
    pub async fn cdn_domains(&self, client: &QcloudClient) -> QcloudResult<Vec<CdnDomain>> {
        let host = super::bucket_host(&self.wire_name(), self.endpoint_location());
        client.cdn_domains_for_origin(&host).await
    }

    pub async fn get_tags(&self, client: &QcloudClient) -> QcloudResult<HashMap<String, String>> {
        self.cos(client).get_bucket_tagging(&self.wire_name()).await
    }

    /// Only whole-set replacement is supported.
    pub async fn set_tags(
        &self,
        client: &QcloudClient,
        tags: &HashMap<String, String>,
        replace: bool,
    ) -> QcloudResult<()> {
        if !replace {
            return Err(QcloudError::not_supported("bucket tags can only be replaced"));
        }
        let cos = self.cos(client);
        let wire = self.wire_name();
        cos.delete_bucket_tagging(&wire).await?;
        if !tags.is_empty() {
            cos.put_bucket_tagging(&wire, tags).await?;
        }
        Ok(())
    }
}

impl Resource for Bucket {
    fn id(&self) -> String {
        self.global_id()
    }

    fn name(&self) -> String {
        self.global_id()
    }

    fn global_id(&self) -> String {
        if self.app_id == self.owner_app_id {
            self.name.clone()
        } else {
            self.wire_name()
        }
    }

    fn status(&self) -> String {
        "available".to_string()
    }
}

// ── Client-level bucket list ────────────────────────────────────────────

impl QcloudClient {
    /// Every bucket of the account, listed once per client.
    pub async fn buckets(&self) -> QcloudResult<Vec<Bucket>> {
        let buckets = self
            .catalog()
            .buckets
            .get_or_fetch(|| self.load_buckets())
            .await?;
        Ok(buckets.to_vec())
    }

    pub async fn bucket(&self, id: &str) -> QcloudResult<Bucket> {
        self.buckets()
            .await?
            .into_iter()
            .find(|b| b.global_id() == id || b.wire_name() == id)
            .ok_or_else(|| QcloudError::not_found(format!("bucket {}", id)))
    }

    pub(crate) async fn invalidate_buckets(&self) {
        self.catalog().buckets.invalidate().await;
    }

    async fn load_buckets(&self) -> QcloudResult<Vec<Bucket>> {
        let listing = self.cos(DEFAULT_REGION).list_service().await?;
        let owner = if listing.owner.display_name.is_empty() {
            listing.owner.id.as_str()
        } else {
            listing.owner.display_name.as_str()
        };
        self.catalog().remember_owner_id(owner);

        let regions: Vec<RegionInfo> = self.regions().await?.iter().map(|r| r.info().clone()).collect();
        Ok(listing
            .buckets
            .items
            .iter()
            .filter_map(|entry| Bucket::from_entry(entry, &regions, self.app_id()))
            .collect())
    }
}

// ── Region-level bucket operations ──────────────────────────────────────

impl QcloudRegion {
    fn bucket_wire_name(&self, name: &str) -> String {
        super::wire_name(name, self.client().app_id())
    }

    /// PUT Bucket. COS buckets carry no storage class of their own; it is
    /// chosen per object, so `_storage_class` is accepted for interface
    /// parity only.
    pub async fn create_bucket(&self, name: &str, _storage_class: &str, acl: &str) -> QcloudResult<()> {
        let acl = if acl.is_empty() {
            None
        } else {
            Some(BucketAcl::parse(acl)?)
        };
        self.client()
            .cos(self.id())
            .put_bucket(&self.bucket_wire_name(name), acl.as_ref().map(BucketAcl::as_str))
            .await?;
        self.client().invalidate_buckets().await;
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> QcloudResult<()> {
        self.client()
            .cos(self.id())
            .delete_bucket(&self.bucket_wire_name(name))
            .await?;
        self.client().invalidate_buckets().await;
        Ok(())
    }

    /// HEAD Bucket: 404 is "absent", 2xx is "present", anything else fails.
    pub async fn bucket_exists(&self, name: &str) -> QcloudResult<bool> {
        let wire = self.bucket_wire_name(name);
        let status = self.client().cos(self.id()).head_bucket(&wire).await?;
        match status {
            404 => Ok(false),
            200..=299 => Ok(true),
            other => Err(QcloudError::vendor(
                ErrorKind::Unknown,
                "HttpError",
                &format!("head bucket {}: status {}", wire, other),
            )
            .with_service(COS_SERVICE)
            .with_action("HEAD /")
            .with_status(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{region_of, scripted_client};
    use crate::cos::types::Grantee;
    use crate::transport::Method;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const SERVICE_XML: &str = "<ListAllMyBucketsResult>\
        <Owner><ID>qcs::cam::uin/100001:uin/100001</ID><DisplayName>100001</DisplayName></Owner>\
        <Buckets>\
        <Bucket><Name>media-12345</Name><Location>ap-guangzhou</Location><CreationDate>2023-01-02T03:04:05Z</CreationDate></Bucket>\
        <Bucket><Name>my-logs-99999</Name><Location>ap-beijing-1</Location><CreationDate>2023-01-02T03:04:05Z</CreationDate></Bucket>\
        <Bucket><Name>lost-12345</Name><Location>xx-nowhere</Location><CreationDate>2023-01-02T03:04:05Z</CreationDate></Bucket>\
        </Buckets></ListAllMyBucketsResult>";

    fn regions_json() -> serde_json::Value {
        json!({"RegionSet": [
            {"Region": "ap-guangzhou", "RegionName": "广州", "RegionState": "AVAILABLE"},
            {"Region": "ap-beijing", "RegionName": "北京", "RegionState": "AVAILABLE"}
        ]})
    }

    #[tokio::test]
    async fn bucket_listing_resolves_locations() {
        let (client, wire, _) = scripted_client(false);
        wire.push_status(200, SERVICE_XML).await;
        wire.push_json(regions_json()).await;

        let buckets = client.buckets().await.unwrap();
        assert_eq!(buckets.len(), 2);

        let media = &buckets[0];
        assert_eq!(media.global_id(), "media");
        assert_eq!(media.url(), "https://media-12345.cos.ap-guangzhou.myqcloud.com");
        assert_eq!(
            media.access_urls()[1].url,
            "https://cos.ap-guangzhou.myqcloud.com/media-12345"
        );
        assert!(media.created_at.is_some());

        let logs = &buckets[1];
        assert_eq!(logs.name, "my-logs");
        assert_eq!(logs.global_id(), "my-logs-99999");
        assert_eq!(logs.region_id, "ap-beijing");
        assert_eq!(logs.zone_id.as_deref(), Some("ap-beijing-1"));
        assert_eq!(logs.url(), "https://my-logs-99999.cos.ap-beijing-1.myqcloud.com");
        assert_eq!(
            logs.website_url(),
            "https://my-logs-99999.cos-website.ap-beijing-1.myqcloud.com"
        );

        assert_eq!(client.catalog().owner_id(), Some("100001"));
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].host(), "service.cos.myqcloud.com");

        // cached
        client.buckets().await.unwrap();
        assert_eq!(wire.request_count().await, 2);
    }

    #[tokio::test]
    async fn bucket_existence_check() {
        let (client, wire, _) = scripted_client(false);
        let region = region_of(client, "ap-guangzhou");
        wire.push_status(404, "").await;
        wire.push_status(200, "").await;
        wire.push_status(500, "").await;

        assert!(!assert_ok!(region.bucket_exists("mybucket").await));
        assert!(assert_ok!(region.bucket_exists("mybucket").await));
        let err = assert_err!(region.bucket_exists("mybucket").await);
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.status_code, Some(500));

        let reqs = wire.requests().await;
        assert_eq!(reqs.len(), 3);
        for req in &reqs {
            assert_eq!(req.method, Method::Head);
            assert_eq!(req.host(), "mybucket-12345.cos.ap-guangzhou.myqcloud.com");
        }
    }

    #[tokio::test]
    async fn create_validates_acl_and_invalidates() {
        let (client, wire, _) = scripted_client(false);
        let region = region_of(client.clone(), "ap-guangzhou");
        let err = region.create_bucket("media", "", "world-writable").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArg);
        assert_eq!(wire.request_count().await, 0);

        client.catalog().buckets.replace(Vec::new()).await;
        wire.push_status(200, "").await;
        region.create_bucket("media", "STANDARD", "public-read").await.unwrap();
        assert!(client.catalog().buckets.cached().await.is_none());

        let req = &wire.requests().await[0];
        assert_eq!(req.method, Method::Put);
        assert_eq!(req.host(), "media-12345.cos.ap-guangzhou.myqcloud.com");
        assert_eq!(req.headers["x-cos-acl"], "public-read");
    }

    #[tokio::test]
    async fn delete_missing_bucket_is_ok() {
        let (client, wire, _) = scripted_client(false);
        wire.push_status(404, "<Error><Code>NoSuchBucket</Code></Error>").await;
        region_of(client, "ap-guangzhou").delete_bucket("gone").await.unwrap();
    }

    #[tokio::test]
    async fn tags_are_replaced_only() {
        let (client, wire, _) = scripted_client(false);
        let bucket = Bucket {
            name: "media".to_string(),
            app_id: "12345".to_string(),
            location: "ap-guangzhou".to_string(),
            region_id: "ap-guangzhou".to_string(),
            zone_id: None,
            owner_app_id: "12345".to_string(),
            created_at: None,
        };
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());

        let err = bucket.set_tags(&client, &tags, false).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotSupported);

        wire.push_status(204, "").await;
        wire.push_status(200, "").await;
        bucket.set_tags(&client, &tags, true).await.unwrap();
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].method, Method::Delete);
        assert_eq!(reqs[1].method, Method::Put);
        assert!(reqs[1].url.ends_with("?tagging"));
        let body = String::from_utf8(reqs[1].body.to_vec()).unwrap();
        assert!(body.contains("<Key>env</Key><Value>prod</Value>"));
    }

    fn media_bucket() -> Bucket {
        Bucket {
            name: "media".to_string(),
            app_id: "12345".to_string(),
            location: "ap-guangzhou".to_string(),
            region_id: "ap-guangzhou".to_string(),
            zone_id: None,
            owner_app_id: "12345".to_string(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn cdn_domains_by_bucket_origin() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"TotalNumber": 1, "Domains": [{
            "Domain": "static.example.com",
            "Disable": "normal",
            "Origin": {"Origins": ["media-12345.cos.ap-guangzhou.myqcloud.com"], "OriginType": "cos"}
        }]}))
        .await;
        let domains = media_bucket().cdn_domains(&client).await.unwrap();
        assert_eq!(domains[0].domain, "static.example.com");
        let req = &wire.requests().await[0];
        assert_eq!(req.action(), Some("DescribeDomainsConfig"));
        assert_eq!(req.param("Filters.0.Name").as_deref(), Some("origin"));
        assert_eq!(
            req.param("Filters.0.Value.0").as_deref(),
            Some("media-12345.cos.ap-guangzhou.myqcloud.com")
        );
        assert_eq!(req.param("Filters.1.Name").as_deref(), Some("domainType"));
        assert_eq!(req.param("Filters.1.Value.0").as_deref(), Some("cos"));
    }

    #[test]
    fn temp_url_targets_bucket_host() {
        let (client, _, _) = scripted_client(false);
        let url = media_bucket()
            .temp_url(&client, "a.txt", Duration::from_secs(60))
            .unwrap();
        assert!(url.starts_with("https://media-12345.cos.ap-guangzhou.myqcloud.com/a.txt?q-sign-algorithm=sha1"));
    }

    #[test]
    fn canned_acl_from_grants() {
        let grant = |uri: &str, permission: &str| Grant {
            grantee: Grantee {
                id: String::new(),
                uri: uri.to_string(),
            },
            permission: permission.to_string(),
        };
        assert_eq!(BucketAcl::from_grants(&[grant("", "FULL_CONTROL")]), BucketAcl::Private);
        assert_eq!(
            BucketAcl::from_grants(&[grant("", "FULL_CONTROL"), grant(GROUP_ALL_USERS, "READ")]),
            BucketAcl::PublicRead
        );
        assert_eq!(
            BucketAcl::from_grants(&[
                grant("", "FULL_CONTROL"),
                grant(GROUP_ALL_USERS, "READ"),
                grant(GROUP_ALL_USERS, "WRITE")
            ]),
            BucketAcl::PublicReadWrite
        );
        assert_eq!(BucketAcl::from_grants(&[]), BucketAcl::Unknown);
    }
}
