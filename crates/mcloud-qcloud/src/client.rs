//! Base QCloud client.
//!
//! Owns the credential, the checked transport, the retry policy and the
//! regional catalog. Cloning is cheap: clones share one inner state, and a
//! clone made through [`QcloudClient::with_cancellation`] differs only in the
//! cancellation token its loops observe.

use crate::catalog::Catalog;
use crate::config::{QcloudClientConfig, QcloudCredential, RetryConfig};
use crate::endpoint::{Service, DEFAULT_REGION};
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::params::Params;
use crate::payload::{decode_envelope, Payload};
use crate::permission::{observes_outcome, CheckedTransport, PermissionObserver};
use crate::retry;
use crate::signing::{ActionDescriptor, Tc3Signer};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Longest response excerpt quoted in HTTP errors.
const ERROR_BODY_EXCERPT: usize = 512;

struct ClientInner {
    credential: QcloudCredential,
    provider_id: String,
    provider_name: String,
    debug: bool,
    read_only: bool,
    retry: RetryConfig,
    signer: Tc3Signer,
    transport: Arc<dyn HttpTransport>,
    observer: PermissionObserver,
    catalog: Catalog,
}

/// Shared client handle.
#[derive(Clone)]
pub struct QcloudClient {
    inner: Arc<ClientInner>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for QcloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QcloudClient")
            .field("secret_id", &self.inner.credential.secret_id)
            .field("provider_id", &self.inner.provider_id)
            .field("read_only", &self.inner.read_only)
            .finish()
    }
}

impl QcloudClient {
    /// Build a client without touching the network.
    pub fn new(config: QcloudClientConfig) -> QcloudResult<Self> {
        config.validate()?;
        let wire: Arc<dyn HttpTransport> = match config.transport {
            Some(ref transport) => transport.clone(),
            None => Arc::new(ReqwestTransport::new(&config)),
        };
        let observer = PermissionObserver::new(config.observer.clone());
        let transport = Arc::new(CheckedTransport::new(wire, config.read_only, observer.clone()));
        let inner = ClientInner {
            signer: Tc3Signer::new(&config.credential),
            credential: config.credential,
            provider_id: config.provider_id,
            provider_name: config.provider_name,
            debug: config.debug,
            read_only: config.read_only,
            retry: config.retry,
            transport,
            observer,
            catalog: Catalog::default(),
        };
        Ok(Self {
            inner: Arc::new(inner),
            cancel: CancellationToken::new(),
        })
    }

    /// Build a client and load the region list, failing fast on bad keys.
    /// With `verify_app_id` set, the app id is checked against COS as well.
    pub async fn connect(config: QcloudClientConfig) -> QcloudResult<Self> {
        let verify = config.verify_app_id && config.credential.app_id.is_some();
        let client = Self::new(config)?;
        client.fetch_regions().await?;
        if verify {
            client.verify_app_id().await?;
        }
        Ok(client)
    }

    /// A handle whose loops stop when `token` is cancelled.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            inner: self.inner.clone(),
            cancel: token,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn credential(&self) -> &QcloudCredential {
        &self.inner.credential
    }

    pub fn app_id(&self) -> &str {
        self.inner.credential.app_id()
    }

    pub fn provider_id(&self) -> &str {
        &self.inner.provider_id
    }

    pub fn provider_name(&self) -> &str {
        &self.inner.provider_name
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.read_only
    }

    pub fn is_debug(&self) -> bool {
        self.inner.debug
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    // ── Control plane ───────────────────────────────────────────────────

    /// Call `action` on `service`, retrying transient failures.
    ///
    /// A `Region` entry in `params` takes precedence over `region`; regional
    /// services fall back to the default region.
    pub async fn request(
        &self,
        service: Service,
        action: &str,
        mut params: Params,
        region: Option<&str>,
    ) -> QcloudResult<Payload> {
        let annotate = |e: QcloudError| e.with_service(service.token()).with_action(action);
        params.check_ids().map_err(annotate)?;

        let explicit = params.remove("Region").filter(|r| !r.is_empty());
        let region = match explicit.as_deref().or(region) {
            Some(r) => Some(r),
            None if service.is_regional() => Some(DEFAULT_REGION),
            None => None,
        };
        let descriptor = ActionDescriptor::new(service, action, region);

        let max_attempts = self.inner.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            retry::check_cancelled(&self.cancel).map_err(annotate)?;
            match self.exchange(&descriptor, &params).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.kind == ErrorKind::Transient && attempt < max_attempts => {
                    let delay = self.inner.retry.backoff(attempt);
                    log::warn!(
                        "QCloud {}.{} transient error (attempt {}/{}): {} - retrying in {}s",
                        service,
                        action,
                        attempt,
                        max_attempts,
                        e,
                        delay.as_secs()
                    );
                    retry::pause(delay, &self.cancel).await.map_err(annotate)?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One signed exchange, classified.
    async fn exchange(&self, descriptor: &ActionDescriptor, params: &Params) -> QcloudResult<Payload> {
        let service = descriptor.service.token();
        let action = descriptor.action.as_str();
        let annotate = |e: QcloudError| e.with_service(service).with_action(action);

        let request = self.inner.signer.sign(descriptor, params, Utc::now());
        if self.inner.debug {
            log::debug!(
                "[{}] {} region={:?} params={:?}",
                request.host(),
                action,
                descriptor.region,
                params
            );
        }

        let response = self
            .inner
            .transport
            .send(request)
            .await
            .map_err(retry::classify_transport)
            .map_err(annotate)?;

        if self.inner.debug {
            let pretty = serde_json::from_slice::<serde_json::Value>(&response.body)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| response.text());
            log::debug!("[{}] response {}:\n{}", action, response.status, pretty);
        }

        let outcome = interpret(&response, action).map_err(annotate);
        if observes_outcome(&outcome) {
            self.inner.observer.notify(service, action);
        }
        outcome
    }

    /// Send a pre-signed request through the checked transport, no retry.
    pub async fn send_raw(&self, request: HttpRequest) -> QcloudResult<HttpResponse> {
        retry::check_cancelled(&self.cancel)?;
        self.inner
            .transport
            .send(request)
            .await
            .map_err(retry::classify_transport)
    }

    // ── Global services ─────────────────────────────────────────────────

    pub async fn cam_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Cam, action, params, None).await
    }

    pub async fn sts_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Sts, action, params, None).await
    }

    pub async fn billing_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Billing, action, params, None).await
    }

    pub async fn tag_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Tag, action, params, None).await
    }

    pub async fn dns_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Dns, action, params, None).await
    }

    pub async fn ssl_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Ssl, action, params, None).await
    }

    pub async fn cdn_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Cdn, action, params, None).await
    }

    pub async fn organization_request(&self, action: &str, params: Params) -> QcloudResult<Payload> {
        self.request(Service::Organization, action, params, None).await
    }
}

/// Map a completed control-plane response to payload or classified error.
fn interpret(response: &HttpResponse, action: &str) -> QcloudResult<Payload> {
    let classify = |mut e: QcloudError| {
        if !e.is_decode() {
            e.kind = retry::classify_code(&e.code, &e.message, action);
        }
        e.with_status(response.status)
    };
    let decoded = decode_envelope(&response.body);
    if !response.is_success() {
        return match decoded {
            Err(e) if !e.is_decode() => Err(classify(e)),
            _ => {
                let text = response.text();
                let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
                Err(QcloudError::vendor(
                    ErrorKind::Unknown,
                    "HttpError",
                    &format!("status {}: {}", response.status, excerpt),
                )
                .with_status(response.status))
            }
        };
    }
    decoded.map_err(classify)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;

    pub(crate) type Seen = Arc<Mutex<Vec<(String, String)>>>;

    /// Client over a scripted wire with a recording observer.
    pub(crate) fn scripted_client(read_only: bool) -> (QcloudClient, Arc<ScriptedTransport>, Seen) {
        let wire = ScriptedTransport::new();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let config = QcloudClientConfig::new("AKIDEXAMPLE", "secret")
            .app_id("12345")
            .provider("prov-1", "qcloud-test")
            .read_only(read_only)
            .observer(move |s, a| sink.lock().unwrap().push((s.to_string(), a.to_string())))
            .transport(wire.clone());
        (QcloudClient::new(config).unwrap(), wire, seen)
    }

    /// Region handle without a catalog round trip.
    pub(crate) fn region_of(client: QcloudClient, region_id: &str) -> crate::region::QcloudRegion {
        crate::region::QcloudRegion::new(
            client,
            crate::region::RegionInfo {
                id: region_id.to_string(),
                name: region_id.to_string(),
                state: "AVAILABLE".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn region_travels_as_header() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"TotalCount": 0, "VpcSet": []})).await;
        let params = Params::new().with("Region", "ap-guangzhou").with("Limit", 20);
        client.request(Service::Vpc, "DescribeVpcs", params, None).await.unwrap();
        let req = &wire.requests().await[0];
        assert_eq!(req.headers["x-tc-region"], "ap-guangzhou");
        assert_eq!(req.param("Region"), None);
        assert_eq!(req.param("Limit").as_deref(), Some("20"));
    }

    #[tokio::test]
    async fn regional_service_defaults_region() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({})).await;
        wire.push_json(json!({"AccountId": "100"})).await;
        client.request(Service::Cvm, "DescribeZones", Params::new(), None).await.unwrap();
        client.sts_request("GetCallerIdentity", Params::new()).await.unwrap();
        let reqs = wire.requests().await;
        assert_eq!(reqs[0].headers["x-tc-region"], DEFAULT_REGION);
        assert!(!reqs[1].headers.contains_key("x-tc-region"));
        assert_eq!(reqs[1].host(), "sts.tencentcloudapi.com");
    }

    #[tokio::test]
    async fn empty_id_never_reaches_wire() {
        let (client, wire, seen) = scripted_client(false);
        let params = Params::new().with("InstanceIds.0", "");
        let err = client
            .request(Service::Cvm, "DescribeInstances", params, Some("ap-beijing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.action.as_deref(), Some("DescribeInstances"));
        assert_eq!(wire.request_count().await, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_then_succeed() {
        let (client, wire, seen) = scripted_client(false);
        wire.push_api_error("RequestLimitExceeded", "slow down").await;
        wire.push_api_error("RequestLimitExceeded", "slow down").await;
        wire.push_json(json!({"VpcSet": []})).await;

        let start = tokio::time::Instant::now();
        let payload = client
            .request(Service::Vpc, "DescribeVpcs", Params::new(), Some("ap-beijing"))
            .await
            .unwrap();
        assert!(payload.get("VpcSet").is_some());
        assert_eq!(wire.request_count().await, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|(s, a)| s == "vpc" && a == "DescribeVpcs"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_budget_exhausted() {
        let (client, wire, _) = scripted_client(false);
        for _ in 0..3 {
            wire.push_api_error("InternalError", "oops").await;
        }
        let err = client
            .request(Service::Cvm, "DescribeInstances", Params::new(), Some("ap-beijing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
        assert_eq!(err.code, "InternalError");
        assert_eq!(wire.request_count().await, 3);
    }

    #[tokio::test]
    async fn permission_denied_is_not_retried() {
        let (client, wire, seen) = scripted_client(false);
        wire.push_api_error("UnauthorizedOperation", "denied").await;
        let err = client
            .request(Service::Vpc, "CreateVpc", Params::new(), Some("ap-beijing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoPermission);
        assert_eq!(err.service.as_deref(), Some("vpc"));
        assert_eq!(wire.request_count().await, 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("vpc".to_string(), "CreateVpc".to_string())]
        );
    }

    #[tokio::test]
    async fn unknown_codes_surface_verbatim() {
        let (client, wire, seen) = scripted_client(false);
        wire.push_api_error("InvalidParameter.Foo", "bad foo").await;
        let err = client
            .request(Service::Cbs, "DescribeDisks", Params::new(), Some("ap-beijing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.code, "InvalidParameter.Foo");
        assert_eq!(err.message, "bad foo");
        assert!(err.request_id.is_some());
        assert_eq!(wire.request_count().await, 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_skips_key_and_missing_resource_errors() {
        let (client, wire, seen) = scripted_client(false);
        wire.push_api_error("AuthFailure.SignatureFailure", "bad signature").await;
        wire.push_api_error("ResourceNotFound", "gone").await;
        wire.push_json(json!({"DiskSet": []})).await;
        for _ in 0..3 {
            let _ = client
                .request(Service::Cbs, "DescribeDisks", Params::new(), Some("ap-beijing"))
                .await;
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("cbs".to_string(), "DescribeDisks".to_string())]
        );
    }

    #[tokio::test]
    async fn read_only_create_never_sent() {
        let (client, wire, seen) = scripted_client(true);
        let params = Params::new().with("VpcName", "v").with("CidrBlock", "10.0.0.0/16");
        let err = client
            .request(Service::Vpc, "CreateVpc", params, Some("ap-beijing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccountReadOnly);
        assert_eq!(wire.request_count().await, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn http_error_without_envelope() {
        let (client, wire, _) = scripted_client(false);
        wire.push_status(502, "<html>bad gateway</html>").await;
        let err = client
            .request(Service::Cvm, "DescribeZones", Params::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, "HttpError");
        assert_eq!(err.status_code, Some(502));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_eof_is_retried() {
        let (client, wire, _) = scripted_client(false);
        wire.push_transport_error("connection closed before message completed: EOF").await;
        wire.push_json(json!({"ZoneSet": []})).await;
        client
            .request(Service::Cvm, "DescribeZones", Params::new(), None)
            .await
            .unwrap();
        assert_eq!(wire.request_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let (client, wire, _) = scripted_client(false);
        wire.push_api_error("RequestLimitExceeded", "").await;
        let token = CancellationToken::new();
        let handle = client.with_cancellation(token.clone());
        let task = tokio::spawn(async move {
            handle
                .request(Service::Vpc, "DescribeVpcs", Params::new(), None)
                .await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(wire.request_count().await, 1);
    }

    #[test]
    fn new_rejects_bad_config() {
        let err = QcloudClient::new(QcloudClientConfig::new("", "k")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArg);
    }
}
