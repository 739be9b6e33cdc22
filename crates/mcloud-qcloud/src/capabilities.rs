//! Capability tags published to the orchestrator, and app id verification.

use crate::client::QcloudClient;
use crate::endpoint::DEFAULT_REGION;
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use serde::{Deserialize, Serialize};

/// Suffix marking a capability that is listed but never written.
pub const READ_ONLY_SUFFIX: &str = "+readonly";

/// Bucket queried by [`QcloudClient::verify_app_id`]. It does not need to exist.
const CHECK_BUCKET: &str = "yuniondocument";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Project,
    Compute,
    Network,
    SecurityGroup,
    Eip,
    Loadbalancer,
    Objectstore,
    Rds,
    Cache,
    Event,
    Cloudid,
    Dnszone,
    PublicIp,
    SamlAuth,
    Quota,
    Mongodb,
    Es,
    Kafka,
    Cdn,
    Container,
    Cert,
    SnapshotPolicy,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Project => "project",
            Capability::Compute => "compute",
            Capability::Network => "network",
            Capability::SecurityGroup => "security_group",
            Capability::Eip => "eip",
            Capability::Loadbalancer => "loadbalancer",
            Capability::Objectstore => "objectstore",
            Capability::Rds => "rds",
            Capability::Cache => "cache",
            Capability::Event => "event",
            Capability::Cloudid => "cloudid",
            Capability::Dnszone => "dnszone",
            Capability::PublicIp => "public_ip",
            Capability::SamlAuth => "saml_auth",
            Capability::Quota => "quota",
            Capability::Mongodb => "mongodb",
            Capability::Es => "es",
            Capability::Kafka => "kafka",
            Capability::Cdn => "cdn",
            Capability::Container => "container",
            Capability::Cert => "cert",
            Capability::SnapshotPolicy => "snapshot_policy",
        }
    }
}

/// What the adapter offers, in publication order. `true` = read-only.
const CAPABILITIES: &[(Capability, bool)] = &[
    (Capability::Project, false),
    (Capability::Compute, false),
    (Capability::Network, false),
    (Capability::SecurityGroup, false),
    (Capability::Eip, false),
    (Capability::Loadbalancer, false),
    (Capability::Objectstore, false),
    (Capability::Rds, false),
    (Capability::Cache, false),
    (Capability::Event, false),
    (Capability::Cloudid, false),
    (Capability::Dnszone, false),
    (Capability::PublicIp, false),
    (Capability::SamlAuth, false),
    (Capability::Quota, true),
    (Capability::Mongodb, true),
    (Capability::Es, true),
    (Capability::Kafka, true),
    (Capability::Cdn, true),
    (Capability::Container, true),
    (Capability::Cert, false),
    (Capability::SnapshotPolicy, false),
];

/// Capability tags, read-only ones suffixed with [`READ_ONLY_SUFFIX`].
pub fn capabilities() -> Vec<String> {
    CAPABILITIES
        .iter()
        .map(|(cap, read_only)| {
            if *read_only {
                format!("{}{}", cap.as_str(), READ_ONLY_SUFFIX)
            } else {
                cap.as_str().to_string()
            }
        })
        .collect()
}

/// Whether `capability` is offered, writable or not.
pub fn supports(capability: Capability) -> bool {
    CAPABILITIES.iter().any(|(cap, _)| *cap == capability)
}

pub fn is_read_only(capability: Capability) -> bool {
    CAPABILITIES
        .iter()
        .any(|(cap, read_only)| *cap == capability && *read_only)
}

impl QcloudClient {
    pub fn capabilities(&self) -> Vec<String> {
        capabilities()
    }

    /// HEAD a well-known bucket under this app id in the default region.
    ///
    /// Any status below 400, or 404, proves COS accepted the app id.
    pub async fn verify_app_id(&self) -> QcloudResult<()> {
        let wire = crate::cos::wire_name(CHECK_BUCKET, self.app_id());
        let status = self.cos(DEFAULT_REGION).head_bucket(&wire).await?;
        if status < 400 || status == 404 {
            Ok(())
        } else {
            log::error!("app id {} rejected by COS: status {}", self.app_id(), status);
            Err(QcloudError::vendor(
                ErrorKind::InvalidAccessKey,
                "InvalidAppId",
                &format!("invalid AppId: {}", status),
            )
            .with_status(status))
        }
    }
}
