//! TC3-HMAC-SHA256 (API v3) request signing.
//!
//! The algorithm consists of four steps:
//!
//! 1. Build the canonical request over method, path, query, the signed
//!    headers (`content-type;host`) and the payload hash
//! 2. Build the string to sign from the timestamp, the credential scope
//!    `<date>/<service>/tc3_request` and the canonical request hash
//! 3. Derive the signing key: `HMAC("TC3" + key, date) → service → "tc3_request"`
//! 4. Hex-encode `HMAC(signing key, string to sign)` into `Authorization`
//!
//! The action travels in `X-TC-Action`; the service token (first DNS label
//! of the host) scopes the credential.

use crate::config::QcloudCredential;
use crate::endpoint::{self, Service};
use crate::params::Params;
use crate::transport::{HttpRequest, Method};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "TC3-HMAC-SHA256";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Identifies one control-plane call.
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    pub service: Service,
    pub action: String,
    pub region: Option<String>,
}

impl ActionDescriptor {
    pub fn new(service: Service, action: &str, region: Option<&str>) -> Self {
        Self {
            service,
            action: action.to_string(),
            region: region.filter(|r| !r.is_empty()).map(|r| r.to_string()),
        }
    }

    pub fn host(&self) -> String {
        endpoint::resolve_host(self.service, self.region.as_deref())
    }
}

/// Signs control-plane envelopes for one credential.
#[derive(Debug, Clone)]
pub struct Tc3Signer {
    secret_id: String,
    secret_key: String,
}

impl Tc3Signer {
    pub fn new(credential: &QcloudCredential) -> Self {
        Self {
            secret_id: credential.secret_id.clone(),
            secret_key: credential.secret_key.clone(),
        }
    }

    /// Build the signed HTTP request for `descriptor` with `params`.
    ///
    /// `Region` travels as the `X-TC-Region` header, so it must not be in
    /// `params` any more.
    pub fn sign(
        &self,
        descriptor: &ActionDescriptor,
        params: &Params,
        timestamp: DateTime<Utc>,
    ) -> HttpRequest {
        let host = descriptor.host();
        let service = endpoint::service_token_of_host(&host).to_string();
        let body = params.to_form();
        let ts = timestamp.timestamp();
        let date = timestamp.format("%Y-%m-%d").to_string();

        let canonical_request = canonical_request("POST", &host, &body);
        let credential_scope = format!("{}/{}/tc3_request", date, service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            ts,
            credential_scope,
            sha256_hex(canonical_request.as_bytes())
        );
        let signing_key = self.derive_signing_key(&date, &service);
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders=content-type;host, Signature={}",
            ALGORITHM, self.secret_id, credential_scope, signature
        );

        let mut headers = BTreeMap::new();
        headers.insert("authorization".to_string(), authorization);
        headers.insert("content-type".to_string(), FORM_CONTENT_TYPE.to_string());
        headers.insert("host".to_string(), host.clone());
        headers.insert("x-tc-action".to_string(), descriptor.action.clone());
        headers.insert("x-tc-timestamp".to_string(), ts.to_string());
        headers.insert(
            "x-tc-version".to_string(),
            descriptor.service.api_version().to_string(),
        );
        if let Some(ref region) = descriptor.region {
            headers.insert("x-tc-region".to_string(), region.clone());
        }

        HttpRequest {
            method: Method::Post,
            url: format!("https://{}/", host),
            headers,
            body: body.into_bytes().into(),
        }
    }

    fn derive_signing_key(&self, date: &str, service: &str) -> Vec<u8> {
        let k_secret = format!("TC3{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
        let k_service = hmac_sha256(&k_date, service.as_bytes());
        hmac_sha256(&k_service, b"tc3_request")
    }
}

/// CanonicalRequest for a form POST to `/` with no query string.
fn canonical_request(method: &str, host: &str, body: &str) -> String {
    format!(
        "{}\n/\n\ncontent-type:{}\nhost:{}\n\ncontent-type;host\n{}",
        method,
        FORM_CONTENT_TYPE,
        host,
        sha256_hex(body.as_bytes())
    )
}

// ── Helper functions ────────────────────────────────────────────────────

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Tc3Signer {
        Tc3Signer::new(&QcloudCredential::new(
            "AKIDz8krbsJ5yKBZQpn74WFkmLPx3EXAMPLE",
            "Gu5t9xGARNpq86cd98joQYCN3EXAMPLE",
        ))
    }

    fn fixed_ts() -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2019, 2, 25)
            .unwrap()
            .and_hms_opt(8, 44, 12)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn sha256_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn headers_and_scope() {
        let desc = ActionDescriptor::new(Service::Cvm, "DescribeInstances", Some("ap-guangzhou"));
        let params = Params::new().with("Limit", 10).with("Offset", 0);
        let req = signer().sign(&desc, &params, fixed_ts());

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.url, "https://cvm.tencentcloudapi.com/");
        assert_eq!(req.headers["x-tc-action"], "DescribeInstances");
        assert_eq!(req.headers["x-tc-version"], "2017-03-12");
        assert_eq!(req.headers["x-tc-region"], "ap-guangzhou");
        assert_eq!(req.headers["x-tc-timestamp"], "1551084252");
        let auth = &req.headers["authorization"];
        assert!(auth.starts_with(
            "TC3-HMAC-SHA256 Credential=AKIDz8krbsJ5yKBZQpn74WFkmLPx3EXAMPLE/2019-02-25/cvm/tc3_request"
        ));
        assert!(auth.contains("SignedHeaders=content-type;host"));
        assert_eq!(req.body.as_bytes(), b"Limit=10&Offset=0");
    }

    #[test]
    fn signing_is_deterministic_for_fixed_clock() {
        let desc = ActionDescriptor::new(Service::Vpc, "CreateVpc", Some("ap-beijing"));
        let params = Params::new().with("VpcName", "v").with("CidrBlock", "10.0.0.0/16");
        let a = signer().sign(&desc, &params, fixed_ts());
        let b = signer().sign(&desc, &params, fixed_ts());
        assert_eq!(a.headers["authorization"], b.headers["authorization"]);

        let later = fixed_ts() + chrono::Duration::seconds(1);
        let c = signer().sign(&desc, &params, later);
        assert_ne!(a.headers["authorization"], c.headers["authorization"]);
    }

    #[test]
    fn financial_region_scopes_by_first_label() {
        let desc = ActionDescriptor::new(Service::Clb, "DescribeLoadBalancers", Some("ap-shanghai-fsi"));
        let req = signer().sign(&desc, &Params::new(), fixed_ts());
        assert_eq!(req.headers["host"], "clb.ap-shanghai-fsi.tencentcloudapi.com");
        assert!(req.headers["authorization"].contains("/2019-02-25/clb/tc3_request"));
    }

    #[test]
    fn no_region_header_for_global_calls() {
        let desc = ActionDescriptor::new(Service::Sts, "GetCallerIdentity", None);
        let req = signer().sign(&desc, &Params::new(), fixed_ts());
        assert!(!req.headers.contains_key("x-tc-region"));
    }

    #[test]
    fn signing_key_is_32_bytes() {
        assert_eq!(signer().derive_signing_key("2019-02-25", "cvm").len(), 32);
    }
}
