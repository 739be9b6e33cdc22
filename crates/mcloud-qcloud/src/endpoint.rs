//! Endpoint resolution and per-service API versions.
//!
//! Hosts follow `<service>.tencentcloudapi.com`. Financial-isolation regions
//! (`*-fsi`) are not reachable through the shared host and must be addressed
//! as `<service>.<region>.tencentcloudapi.com`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Vendor API top-level domain.
pub const API_TLD: &str = "tencentcloudapi.com";

/// Region id suffix marking a financial-isolation region.
pub const FSI_SUFFIX: &str = "-fsi";

/// Region used when a call carries no region of its own.
pub const DEFAULT_REGION: &str = "ap-beijing";

/// Vendor services reachable through the control-plane pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Service {
    Cvm,
    Vpc,
    Cbs,
    Clb,
    Billing,
    Audit,
    Cam,
    Cdb,
    Mariadb,
    Postgres,
    Sqlserver,
    Redis,
    Memcached,
    Ssl,
    Cdn,
    Mongodb,
    Es,
    Dcdb,
    Kafka,
    Tke,
    Dns,
    Sts,
    Tag,
    Monitor,
    Organization,
}

impl Service {
    pub const ALL: &'static [Service] = &[
        Service::Cvm,
        Service::Vpc,
        Service::Cbs,
        Service::Clb,
        Service::Billing,
        Service::Audit,
        Service::Cam,
        Service::Cdb,
        Service::Mariadb,
        Service::Postgres,
        Service::Sqlserver,
        Service::Redis,
        Service::Memcached,
        Service::Ssl,
        Service::Cdn,
        Service::Mongodb,
        Service::Es,
        Service::Dcdb,
        Service::Kafka,
        Service::Tke,
        Service::Dns,
        Service::Sts,
        Service::Tag,
        Service::Monitor,
        Service::Organization,
    ];

    /// First DNS label of the service host; also the signing scope.
    pub fn token(&self) -> &'static str {
        match self {
            Service::Cvm => "cvm",
            Service::Vpc => "vpc",
            Service::Cbs => "cbs",
            Service::Clb => "clb",
            Service::Billing => "billing",
            Service::Audit => "cloudaudit",
            Service::Cam => "cam",
            Service::Cdb => "cdb",
            Service::Mariadb => "mariadb",
            Service::Postgres => "postgres",
            Service::Sqlserver => "sqlserver",
            Service::Redis => "redis",
            Service::Memcached => "memcached",
            Service::Ssl => "ssl",
            Service::Cdn => "cdn",
            Service::Mongodb => "mongodb",
            Service::Es => "es",
            Service::Dcdb => "dcdb",
            Service::Kafka => "ckafka",
            Service::Tke => "tke",
            Service::Dns => "dnspod",
            Service::Sts => "sts",
            Service::Tag => "tag",
            Service::Monitor => "monitor",
            Service::Organization => "organization",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Service::Cvm | Service::Vpc | Service::Cbs => "2017-03-12",
            Service::Mariadb | Service::Postgres => "2017-03-12",
            Service::Clb => "2018-03-17",
            Service::Billing => "2018-07-09",
            Service::Audit => "2019-03-19",
            Service::Cam => "2019-01-16",
            Service::Cdb => "2017-03-20",
            Service::Sqlserver => "2018-03-28",
            Service::Redis => "2018-04-12",
            Service::Memcached => "2019-03-18",
            Service::Ssl => "2019-12-05",
            Service::Cdn => "2018-06-06",
            Service::Mongodb => "2019-07-25",
            Service::Es => "2018-04-16",
            Service::Dcdb => "2018-04-11",
            Service::Kafka => "2019-08-19",
            Service::Tke => "2018-05-25",
            Service::Dns => "2021-03-23",
            Service::Sts => "2018-08-13",
            Service::Tag => "2018-08-13",
            Service::Monitor => "2018-07-24",
            Service::Organization => "2021-03-31",
        }
    }

    /// Services whose host never carries a region component.
    pub fn has_fixed_host(&self) -> bool {
        matches!(
            self,
            Service::Cam
                | Service::Billing
                | Service::Dns
                | Service::Ssl
                | Service::Sts
                | Service::Tag
                | Service::Organization
                | Service::Cdn
                | Service::Monitor
                | Service::Tke
        )
    }

    /// Whether actions of this service are scoped by a `Region` parameter.
    pub fn is_regional(&self) -> bool {
        !matches!(
            self,
            Service::Cam
                | Service::Billing
                | Service::Dns
                | Service::Ssl
                | Service::Sts
                | Service::Tag
                | Service::Organization
                | Service::Cdn
        )
    }

    pub fn from_token(token: &str) -> Option<Service> {
        Service::ALL.iter().copied().find(|s| s.token() == token)
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

pub fn is_financial_region(region_id: &str) -> bool {
    region_id.ends_with(FSI_SUFFIX)
}

/// Resolve the API host for `(service, region)`.
pub fn resolve_host(service: Service, region_id: Option<&str>) -> String {
    match region_id {
        Some(region) if !service.has_fixed_host() && is_financial_region(region) => {
            format!("{}.{}.{}", service.token(), region, API_TLD)
        }
        _ => format!("{}.{}", service.token(), API_TLD),
    }
}

/// Service token of a host: its first DNS label.
pub fn service_token_of_host(host: &str) -> &str {
    host.split('.').next().unwrap_or(host)
}
