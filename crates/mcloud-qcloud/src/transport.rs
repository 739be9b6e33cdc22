//! HTTP transport abstraction.
//!
//! Both data paths (control-plane JSON and COS) go through an injected
//! [`HttpTransport`]. The production back-end is [`ReqwestTransport`];
//! [`ScriptedTransport`] replays queued responses and records every request
//! it sees, for tests and offline use.

use crate::config::QcloudClientConfig;
use crate::error::QcloudError;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

// ── Request / response ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }

    /// GET and HEAD never mutate server state.
    pub fn is_safe(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming request body chunks.
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

pub enum RequestBody {
    Bytes(Bytes),
    Stream { stream: BodyStream, length: u64 },
}

impl RequestBody {
    pub fn empty() -> Self {
        RequestBody::Bytes(Bytes::new())
    }

    /// Buffered bytes; streaming bodies report an empty slice.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RequestBody::Bytes(b) => b.as_ref(),
            RequestBody::Stream { .. } => &[],
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Bytes(b) => b.len() as u64,
            RequestBody::Stream { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(v: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for RequestBody {
    fn from(b: Bytes) -> Self {
        RequestBody::Bytes(b)
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream { length, .. } => write!(f, "Stream({} bytes)", length),
        }
    }
}

/// One outgoing HTTP exchange. Header names are lower-case.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }

    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Failure below the HTTP status level.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Io(String),
    /// The interception hook refused the request before the wire send.
    #[error("{0}")]
    Rejected(QcloudError),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // hyper buries "EOF" / "i/o timeout" in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        if err.is_timeout() {
            TransportError::Timeout(message)
        } else if err.is_connect() {
            TransportError::Connect(message)
        } else {
            TransportError::Io(message)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sends one HTTP request.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and used from many tasks at once. Any completed exchange is `Ok`,
/// whatever its status code.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  reqwest back-end
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &QcloudClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(10)
            .user_agent("mcloud-qcloud/0.1");
        if let Some(proxy_fn) = config.proxy_fn.clone() {
            builder = builder.proxy(reqwest::Proxy::custom(move |url| proxy_fn(url)));
        }
        let http = builder.build().unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        });
        Self { http }
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut req = self.http.request(method, &request.url);
        for (key, value) in &request.headers {
            // reqwest derives Host from the URL
            if key != "host" {
                req = req.header(key.as_str(), value.as_str());
            }
        }
        req = match request.body {
            RequestBody::Bytes(b) if b.is_empty() => req,
            RequestBody::Bytes(b) => req.body(b),
            RequestBody::Stream { stream, length } => req
                .header("content-length", length.to_string())
                .body(reqwest::Body::wrap_stream(stream)),
        };

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (key, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.as_str().to_ascii_lowercase(), v.to_string());
            }
        }
        let body = resp.bytes().await?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Scripted transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A request as seen by [`ScriptedTransport`], with its body collected.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl RecordedRequest {
    /// `X-TC-Action` of a control-plane request.
    pub fn action(&self) -> Option<&str> {
        self.headers.get("x-tc-action").map(|s| s.as_str())
    }

    /// Decoded form field of a control-plane request.
    pub fn param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn host(&self) -> String {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }
}

enum Reply {
    Response(HttpResponse),
    Error(String),
}

/// In-memory transport that answers with queued replies, in order.
///
/// Running out of replies yields a `500` so that a missing script line
/// surfaces as a test failure instead of a hang.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a control-plane success: `{"Response": payload}` with a RequestId.
    pub async fn push_json(&self, payload: serde_json::Value) {
        let mut inner = match payload {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        inner
            .entry("RequestId")
            .or_insert_with(|| serde_json::Value::String(uuid::Uuid::new_v4().to_string()));
        let body = serde_json::json!({ "Response": inner }).to_string();
        self.push_response(HttpResponse::new(200, body)).await;
    }

    /// Queue a control-plane vendor error.
    pub async fn push_api_error(&self, code: &str, message: &str) {
        let body = serde_json::json!({
            "Response": {
                "Error": { "Code": code, "Message": message },
                "RequestId": uuid::Uuid::new_v4().to_string(),
            }
        })
        .to_string();
        self.push_response(HttpResponse::new(200, body)).await;
    }

    pub async fn push_status(&self, status: u16, body: &str) {
        self.push_response(HttpResponse::new(status, body.to_string())).await;
    }

    pub async fn push_response(&self, response: HttpResponse) {
        self.replies.lock().await.push_back(Reply::Response(response));
    }

    /// Queue a transport failure carrying `message`.
    pub async fn push_transport_error(&self, message: &str) {
        self.replies.lock().await.push_back(Reply::Error(message.to_string()));
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    pub async fn remaining(&self) -> usize {
        self.replies.lock().await.len()
    }
}

#[async_trait::async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let body = match request.body {
            RequestBody::Bytes(b) => b,
            RequestBody::Stream { mut stream, .. } => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| TransportError::Io(e.to_string()))?;
                    buf.extend_from_slice(&chunk);
                }
                Bytes::from(buf)
            }
        };
        self.requests.lock().await.push(RecordedRequest {
            method: request.method,
            url: request.url,
            headers: request.headers,
            body,
        });
        match self.replies.lock().await.pop_front() {
            Some(Reply::Response(resp)) => Ok(resp),
            Some(Reply::Error(msg)) => Err(TransportError::Io(msg)),
            None => Ok(HttpResponse::new(500, "no scripted reply left")),
        }
    }
}
