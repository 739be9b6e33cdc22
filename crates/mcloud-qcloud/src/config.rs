//! Credential and client configuration.
//!
//! The configuration is consumed once at client construction. Hooks (proxy
//! selector, permission observer) and the transport are shared behind `Arc`
//! so that every clone of the client sees the same instances.

use crate::error::{QcloudError, QcloudResult};
use crate::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Proxy selector: returns the proxy to use for a target URL, if any.
pub type ProxyFn = Arc<dyn Fn(&url::Url) -> Option<url::Url> + Send + Sync>;

/// Permission observer: receives `(service, action)` for every exercised call.
pub type ObserverFn = Arc<dyn Fn(&str, &str) + Send + Sync>;

// ── Credentials ─────────────────────────────────────────────────────────

/// API key pair plus the tenant app id used to address COS buckets.
#[derive(Clone, Serialize, Deserialize)]
pub struct QcloudCredential {
    pub secret_id: String,
    #[serde(skip_serializing, default)]
    pub secret_key: String,
    /// Required only for object storage (`<bucket>-<app_id>`).
    #[serde(default)]
    pub app_id: Option<String>,
}

impl QcloudCredential {
    pub fn new(secret_id: &str, secret_key: &str) -> Self {
        Self {
            secret_id: secret_id.to_string(),
            secret_key: secret_key.to_string(),
            app_id: None,
        }
    }

    pub fn app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or_default()
    }
}

impl fmt::Debug for QcloudCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcloudCredential")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("app_id", &self.app_id)
            .finish()
    }
}

// ── Retry ───────────────────────────────────────────────────────────────

/// Retry budget for transient control-plane failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first one (default: 3).
    pub max_attempts: u32,
    /// Linear backoff unit; attempt `i` sleeps `i * backoff_step`.
    pub backoff_step: Duration,
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the failed 1-based attempt `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(10),
        }
    }
}

// ── Client config ───────────────────────────────────────────────────────

/// Everything the client needs at construction.
#[derive(Clone)]
pub struct QcloudClientConfig {
    pub credential: QcloudCredential,
    /// Provider id used to synthesize global ids for synthetic objects.
    pub provider_id: String,
    pub provider_name: String,
    pub debug: bool,
    pub read_only: bool,
    /// Check the app id against COS during [`connect`](crate::client::QcloudClient::connect).
    pub verify_app_id: bool,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub proxy_fn: Option<ProxyFn>,
    pub observer: Option<ObserverFn>,
    /// Overrides the reqwest-backed transport (tests, recording proxies).
    pub transport: Option<Arc<dyn HttpTransport>>,
}

impl QcloudClientConfig {
    pub fn new(secret_id: &str, secret_key: &str) -> Self {
        Self {
            credential: QcloudCredential::new(secret_id, secret_key),
            provider_id: String::new(),
            provider_name: String::new(),
            debug: false,
            read_only: false,
            verify_app_id: false,
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            proxy_fn: None,
            observer: None,
            transport: None,
        }
    }

    pub fn app_id(mut self, app_id: &str) -> Self {
        self.credential.app_id = if app_id.is_empty() {
            None
        } else {
            Some(app_id.to_string())
        };
        self
    }

    pub fn provider(mut self, id: &str, name: &str) -> Self {
        self.provider_id = id.to_string();
        self.provider_name = name.to_string();
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn verify_app_id(mut self, verify: bool) -> Self {
        self.verify_app_id = verify;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn proxy_fn(mut self, f: impl Fn(&url::Url) -> Option<url::Url> + Send + Sync + 'static) -> Self {
        self.proxy_fn = Some(Arc::new(f));
        self
    }

    pub fn observer(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(f));
        self
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration before any network I/O.
    pub fn validate(&self) -> QcloudResult<()> {
        if self.credential.secret_id.trim().is_empty() {
            return Err(QcloudError::invalid_arg("secret id is required"));
        }
        if self.credential.secret_key.trim().is_empty() {
            return Err(QcloudError::invalid_arg("secret key is required"));
        }
        if let Some(ref app_id) = self.credential.app_id {
            if !app_id.chars().all(|c| c.is_ascii_digit()) {
                return Err(QcloudError::invalid_arg(format!(
                    "app id must be numeric, got '{}'",
                    app_id
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(QcloudError::invalid_arg("retry.max_attempts must be >= 1"));
        }
        Ok(())
    }
}

impl fmt::Debug for QcloudClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QcloudClientConfig")
            .field("credential", &self.credential)
            .field("provider_id", &self.provider_id)
            .field("provider_name", &self.provider_name)
            .field("debug", &self.debug)
            .field("read_only", &self.read_only)
            .field("retry", &self.retry)
            .field("proxy_fn", &self.proxy_fn.is_some())
            .field("observer", &self.observer.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}
