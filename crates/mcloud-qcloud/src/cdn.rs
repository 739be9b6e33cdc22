//! CDN acceleration domains (service `cdn`, global).
//!
//! `DescribeDomainsConfig` returns each domain together with its full
//! configuration, so a [`CdnDomain`] carries the config blocks it was listed
//! with. [`QcloudClient::cdn_domain_config`] re-reads them for one domain.

use crate::client::QcloudClient;
use crate::endpoint::{Service, DEFAULT_REGION};
use crate::error::{QcloudError, QcloudResult};
use crate::pagination::PageSpec;
use crate::params::Params;
use crate::tags::{QcloudTags, Resource, TagTarget, TaggedResource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Origin type used by object-storage origins.
const COS_ORIGIN_TYPE: &str = "cos";

/// Provider-neutral name for object-storage origins.
pub const BUCKET_ORIGIN_TYPE: &str = "bucket";

fn is_on(switch: &str) -> bool {
    switch == "on"
}

// ── Records ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnOrigin {
    #[serde(rename = "Origins", default, deserialize_with = "crate::payload::lenient::list")]
    pub origins: Vec<String>,
    /// `domain`, `cos`, `ip`, `ipv6` ...
    #[serde(rename = "OriginType", default, deserialize_with = "crate::payload::lenient::string")]
    pub origin_type: String,
    /// Host header sent to the origin.
    #[serde(rename = "ServerName", default, deserialize_with = "crate::payload::lenient::string")]
    pub server_name: String,
    #[serde(rename = "CosPrivateAccess", default, deserialize_with = "crate::payload::lenient::string")]
    pub cos_private_access: String,
    /// `http`, `https` or `follow`.
    #[serde(rename = "OriginPullProtocol", default, deserialize_with = "crate::payload::lenient::string")]
    pub origin_pull_protocol: String,
    #[serde(rename = "BackupOrigins", default, deserialize_with = "crate::payload::lenient::list")]
    pub backup_origins: Vec<String>,
    #[serde(rename = "BackupOriginType", default, deserialize_with = "crate::payload::lenient::string")]
    pub backup_origin_type: String,
    #[serde(rename = "BackupServerName", default, deserialize_with = "crate::payload::lenient::string")]
    pub backup_server_name: String,
}

/// One origin address, primary or backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnOriginSpec {
    pub origin_type: String,
    pub origin: String,
    pub server_name: String,
    pub protocol: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStringKey {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    /// `includeCustom`, `excludeCustom` ...
    #[serde(rename = "Action", default)]
    pub action: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheKeyRule {
    #[serde(rename = "RulePaths", default, deserialize_with = "crate::payload::lenient::list")]
    pub rule_paths: Vec<String>,
    #[serde(rename = "RuleType", default)]
    pub rule_type: String,
    #[serde(rename = "FullUrlCache", default)]
    pub full_url_cache: String,
    #[serde(rename = "IgnoreCase", default)]
    pub ignore_case: String,
    #[serde(rename = "QueryString", default)]
    pub query_string: QueryStringKey,
    #[serde(rename = "RuleTag", default)]
    pub rule_tag: String,
}

/// How cache keys are derived from request URLs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheKey {
    #[serde(rename = "FullUrlCache", default)]
    pub full_url_cache: String,
    #[serde(rename = "IgnoreCase", default)]
    pub ignore_case: String,
    #[serde(rename = "KeyRules", default, deserialize_with = "crate::payload::lenient::list")]
    pub key_rules: Vec<CacheKeyRule>,
}

impl CacheKey {
    pub fn full_url(&self) -> bool {
        is_on(&self.full_url_cache)
    }

    pub fn ignores_case(&self) -> bool {
        is_on(&self.ignore_case)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheTime {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "CacheTime", default)]
    pub cache_time: i64,
    #[serde(rename = "CompareMaxAge", default)]
    pub compare_max_age: String,
    #[serde(rename = "IgnoreCacheControl", default)]
    pub ignore_cache_control: String,
    #[serde(rename = "IgnoreSetCookie", default)]
    pub ignore_set_cookie: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoCache {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "Revalidate", default)]
    pub revalidate: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeuristicCacheConfig {
    #[serde(rename = "HeuristicCacheTimeSwitch", default)]
    pub heuristic_cache_time_switch: String,
    #[serde(rename = "HeuristicCacheTime", default)]
    pub heuristic_cache_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeuristicCache {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "CacheConfig", default)]
    pub cache_config: HeuristicCacheConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FollowOrigin {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "HeuristicCache", default)]
    pub heuristic_cache: HeuristicCache,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleCacheConfig {
    #[serde(rename = "Cache", default)]
    pub cache: CacheTime,
    #[serde(rename = "NoCache", default)]
    pub no_cache: NoCache,
    #[serde(rename = "FollowOrigin", default)]
    pub follow_origin: FollowOrigin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleCache {
    #[serde(rename = "RulePaths", default, deserialize_with = "crate::payload::lenient::list")]
    pub rule_paths: Vec<String>,
    #[serde(rename = "RuleType", default)]
    pub rule_type: String,
    #[serde(rename = "CacheConfig", default)]
    pub cache_config: RuleCacheConfig,
}

/// Which of the three mutually exclusive behaviours a cache rule has on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheMode {
    Cache { seconds: i64, compare_max_age: bool },
    NoCache { revalidate: bool },
    FollowOrigin { heuristic_seconds: Option<i64> },
    Unset,
}

impl RuleCache {
    pub fn mode(&self) -> CacheMode {
        let config = &self.cache_config;
        if is_on(&config.cache.switch) {
            CacheMode::Cache {
                seconds: config.cache.cache_time,
                compare_max_age: is_on(&config.cache.compare_max_age),
            }
        } else if is_on(&config.no_cache.switch) {
            CacheMode::NoCache {
                revalidate: is_on(&config.no_cache.revalidate),
            }
        } else if is_on(&config.follow_origin.switch) {
            let heuristic = &config.follow_origin.heuristic_cache;
            CacheMode::FollowOrigin {
                heuristic_seconds: is_on(&heuristic.switch)
                    .then_some(heuristic.cache_config.heuristic_cache_time),
            }
        } else {
            CacheMode::Unset
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    #[serde(rename = "RuleCache", default, deserialize_with = "crate::payload::lenient::list")]
    pub rule_cache: Vec<RuleCache>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeRule {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "RuleType", default)]
    pub rule_type: String,
    #[serde(rename = "RulePaths", default, deserialize_with = "crate::payload::lenient::list")]
    pub rule_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeOriginPull {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "RangeRules", default, deserialize_with = "crate::payload::lenient::list")]
    pub range_rules: Vec<RangeRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnHttps {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "Http2", default)]
    pub http2: String,
}

impl CdnHttps {
    pub fn enabled(&self) -> bool {
        is_on(&self.switch)
    }

    pub fn http2(&self) -> bool {
        is_on(&self.http2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceRedirect {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    /// `http` or `https`.
    #[serde(rename = "RedirectType", default)]
    pub redirect_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefererRule {
    #[serde(rename = "RuleType", default)]
    pub rule_type: String,
    #[serde(rename = "RulePaths", default, deserialize_with = "crate::payload::lenient::list")]
    pub rule_paths: Vec<String>,
    /// `whitelist` or `blacklist`.
    #[serde(rename = "RefererType", default)]
    pub referer_type: String,
    #[serde(rename = "Referers", default, deserialize_with = "crate::payload::lenient::list")]
    pub referers: Vec<String>,
    #[serde(rename = "AllowEmpty", default)]
    pub allow_empty: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnReferer {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "RefererRules", default, deserialize_with = "crate::payload::lenient::list")]
    pub referer_rules: Vec<RefererRule>,
}

impl CdnReferer {
    pub fn enabled(&self) -> bool {
        is_on(&self.switch)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxAgeRule {
    #[serde(rename = "MaxAgeType", default)]
    pub max_age_type: String,
    #[serde(rename = "MaxAgeContents", default, deserialize_with = "crate::payload::lenient::list")]
    pub max_age_contents: Vec<String>,
    #[serde(rename = "MaxAgeTime", default)]
    pub max_age_time: i64,
    #[serde(rename = "FollowOrigin", default)]
    pub follow_origin: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxAge {
    #[serde(rename = "Switch", default)]
    pub switch: String,
    #[serde(rename = "MaxAgeRules", default, deserialize_with = "crate::payload::lenient::list")]
    pub max_age_rules: Vec<MaxAgeRule>,
}

/// Configuration blocks of one domain; absent blocks are `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnConfig {
    #[serde(rename = "CacheKey", default)]
    pub cache_key: Option<CacheKey>,
    #[serde(rename = "RangeOriginPull", default)]
    pub range_origin_pull: Option<RangeOriginPull>,
    #[serde(rename = "Cache", default)]
    pub cache: Option<Cache>,
    #[serde(rename = "Https", default)]
    pub https: Option<CdnHttps>,
    #[serde(rename = "ForceRedirect", default)]
    pub force_redirect: Option<ForceRedirect>,
    #[serde(rename = "Referer", default)]
    pub referer: Option<CdnReferer>,
    #[serde(rename = "MaxAge", default)]
    pub max_age: Option<MaxAge>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CdnDomain {
    #[serde(rename = "Domain")]
    pub domain: String,
    #[serde(rename = "ResourceId", default)]
    pub resource_id: String,
    #[serde(rename = "Cname", default)]
    pub cname: String,
    /// `mainland`, `overseas` or `global`.
    #[serde(rename = "Area", default)]
    pub area: String,
    /// `online`, `offline`, `processing` or `rejected`.
    #[serde(rename = "Status", default)]
    pub status_code: String,
    /// `normal` unless the platform blocked the domain.
    #[serde(rename = "Disable", default)]
    pub disable: String,
    #[serde(rename = "ServiceType", default)]
    pub service_type: String,
    #[serde(rename = "ProjectId", default, deserialize_with = "crate::payload::lenient::int")]
    pub project_id: i64,
    #[serde(rename = "Readonly", default)]
    pub readonly: String,
    #[serde(rename = "Origin", default)]
    pub origin: CdnOrigin,
    #[serde(rename = "CreateTime", default)]
    pub create_time: String,
    #[serde(rename = "UpdateTime", default)]
    pub update_time: String,
    #[serde(flatten)]
    pub config: CdnConfig,
    #[serde(flatten)]
    pub tags: QcloudTags,
}

impl CdnDomain {
    pub fn is_enabled(&self) -> bool {
        self.disable == "normal"
    }

    /// Primary then backup origins, with `cos` reported as `bucket`.
    pub fn origins(&self) -> Vec<CdnOriginSpec> {
        let primary_type = if self.origin.origin_type == COS_ORIGIN_TYPE {
            BUCKET_ORIGIN_TYPE.to_string()
        } else {
            self.origin.origin_type.clone()
        };
        let primary = self.origin.origins.iter().map(|origin| CdnOriginSpec {
            origin_type: primary_type.clone(),
            origin: origin.clone(),
            server_name: self.origin.server_name.clone(),
            protocol: self.origin.origin_pull_protocol.clone(),
        });
        let backup = self.origin.backup_origins.iter().map(|origin| CdnOriginSpec {
            origin_type: self.origin.backup_origin_type.clone(),
            origin: origin.clone(),
            server_name: self.origin.backup_server_name.clone(),
            protocol: String::new(),
        });
        primary.chain(backup).collect()
    }
}

impl Resource for CdnDomain {
    fn id(&self) -> String {
        self.domain.clone()
    }

    fn status(&self) -> String {
        self.status_code.clone()
    }

    fn qcloud_tags(&self) -> Option<&QcloudTags> {
        Some(&self.tags)
    }
}

impl TaggedResource for CdnDomain {
    const TAG_TARGET: TagTarget = TagTarget::new("cdn", "domain");
}

// ── Queries ─────────────────────────────────────────────────────────────

/// Filters accepted by `DescribeDomainsConfig`; empty fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct CdnDomainFilter {
    pub domains: Vec<String>,
    pub origins: Vec<String>,
    /// e.g. `cos` for bucket-backed domains.
    pub domain_type: String,
    pub resource_id: String,
}

impl CdnDomainFilter {
    /// `Filters.i.Name` / `Filters.i.Value.j`, in the order the API documents.
    fn to_params(&self) -> Params {
        let mut params = Params::new();
        let single = |v: &str| if v.is_empty() { Vec::new() } else { vec![v.to_string()] };
        let filters = [
            ("domain", self.domains.clone()),
            ("origin", self.origins.clone()),
            ("domainType", single(&self.domain_type)),
            ("resourceId", single(&self.resource_id)),
        ];
        for (index, (name, values)) in filters.iter().filter(|(_, v)| !v.is_empty()).enumerate() {
            params.set(format!("Filters.{}.Name", index), name);
            params.set_list(&format!("Filters.{}.Value", index), values);
        }
        params
    }
}

#[derive(Debug, Clone, Default)]
pub struct CdnCreateOptions {
    pub domain: String,
    /// `web`, `download` or `media`.
    pub service_type: String,
    pub area: Option<String>,
    pub origins: Vec<CdnOriginSpec>,
}

fn domains_spec() -> PageSpec {
    PageSpec::new(Service::Cdn, "DescribeDomainsConfig", "Domains").total_at("TotalNumber")
}

impl QcloudClient {
    /// Every acceleration domain matching `filter`.
    pub async fn describe_cdn_domains(&self, filter: &CdnDomainFilter) -> QcloudResult<Vec<CdnDomain>> {
        self.list_all(&domains_spec(), filter.to_params(), None).await
    }

    pub async fn cdn_domains(&self) -> QcloudResult<Vec<CdnDomain>> {
        self.describe_cdn_domains(&CdnDomainFilter::default()).await
    }

    /// Domain by exact name.
    pub async fn cdn_domain(&self, domain: &str) -> QcloudResult<CdnDomain> {
        let filter = CdnDomainFilter {
            domains: vec![domain.to_string()],
            ..Default::default()
        };
        let (domains, _) = self
            .list_page::<CdnDomain>(&domains_spec().limit(100), filter.to_params(), None, 0)
            .await?;
        domains
            .into_iter()
            .find(|d| d.domain == domain)
            .ok_or_else(|| QcloudError::not_found(format!("cdn domain {}", domain)))
    }

    /// Current configuration blocks of the domain with `resource_id`.
    pub async fn cdn_domain_config(&self, resource_id: &str) -> QcloudResult<CdnConfig> {
        let filter = CdnDomainFilter {
            resource_id: resource_id.to_string(),
            ..Default::default()
        };
        let (configs, _) = self
            .list_page::<CdnConfig>(&domains_spec().limit(1), filter.to_params(), None, 0)
            .await?;
        configs
            .into_iter()
            .next()
            .ok_or_else(|| QcloudError::not_found(format!("cdn config {}", resource_id)))
    }

    /// AddCdnDomain, then read the new domain back.
    ///
    /// All origins must share the type of the first one; object-storage
    /// origins may be given as `bucket`.
    pub async fn create_cdn_domain(&self, opts: &CdnCreateOptions) -> QcloudResult<CdnDomain> {
        let first = opts
            .origins
            .first()
            .ok_or_else(|| QcloudError::invalid_arg(format!("cdn domain {} needs an origin", opts.domain)))?;
        if let Some(other) = opts.origins.iter().find(|o| o.origin_type != first.origin_type) {
            return Err(QcloudError::invalid_arg(format!(
                "mixed origin types {} and {}",
                first.origin_type, other.origin_type
            )));
        }
        let origin_type = if first.origin_type == BUCKET_ORIGIN_TYPE {
            COS_ORIGIN_TYPE
        } else {
            first.origin_type.as_str()
        };
        let server_name = if first.server_name.is_empty() {
            &first.origin
        } else {
            &first.server_name
        };

        let mut params = Params::new()
            .with("Domain", &opts.domain)
            .with("ServiceType", &opts.service_type)
            .with("Origin.OriginType", origin_type)
            .with("Origin.ServerName", server_name);
        params.set_opt("Area", opts.area.as_deref());
        params.set_opt("Origin.OriginPullProtocol", Some(first.protocol.as_str()));
        let origins: Vec<&str> = opts.origins.iter().map(|o| o.origin.as_str()).collect();
        params.set_list("Origin.Origins", &origins);
        self.cdn_request("AddCdnDomain", params).await?;
        self.cdn_domain(&opts.domain).await
    }

    pub async fn start_cdn_domain(&self, domain: &str) -> QcloudResult<()> {
        self.cdn_request("StartCdnDomain", Params::new().with("Domain", domain))
            .await
            .map(|_| ())
    }

    pub async fn stop_cdn_domain(&self, domain: &str) -> QcloudResult<()> {
        self.cdn_request("StopCdnDomain", Params::new().with("Domain", domain))
            .await
            .map(|_| ())
    }

    /// Stop, then delete; a domain must be offline before it can go.
    pub async fn delete_cdn_domain(&self, domain: &str) -> QcloudResult<()> {
        self.stop_cdn_domain(domain).await?;
        self.cdn_request("DeleteCdnDomain", Params::new().with("Domain", domain))
            .await
            .map(|_| ())
    }

    /// Domains that pull from `origin_host`, e.g. a bucket's virtual host.
    pub async fn cdn_domains_for_origin(&self, origin_host: &str) -> QcloudResult<Vec<CdnDomain>> {
        let filter = CdnDomainFilter {
            origins: vec![origin_host.to_string()],
            domain_type: COS_ORIGIN_TYPE.to_string(),
            ..Default::default()
        };
        self.describe_cdn_domains(&filter).await
    }

    pub async fn set_cdn_domain_tags(
        &self,
        domain: &CdnDomain,
        tags: &HashMap<String, String>,
        replace: bool,
    ) -> QcloudResult<()> {
        self.set_resource_tags(CdnDomain::TAG_TARGET, DEFAULT_REGION, &domain.id(), tags, replace)
            .await
    }
}
