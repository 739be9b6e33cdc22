//! Permission observation and read-only gating.
//!
//! Every transport the client uses is wrapped once in a [`CheckedTransport`].
//! Before the wire send it refuses writes on a read-only client. Object
//! storage exchanges are reported to the observer hook here, from the HTTP
//! status; control-plane actions are reported by the client once the
//! response envelope has been classified.

use crate::config::ObserverFn;
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Observer label used for object-storage exchanges.
pub const COS_SERVICE: &str = "cos";

const READ_ONLY_PREFIXES: &[&str] = &["Get", "List", "Describe"];

/// Whether a control-plane action may run on a read-only client.
pub fn is_read_action(action: &str) -> bool {
    READ_ONLY_PREFIXES.iter().any(|p| action.starts_with(p))
}

/// What an outgoing request exercises, as reported to the observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallLabel {
    /// Control-plane action, e.g. `("vpc", "CreateVpc")`.
    Action { service: String, action: String },
    /// Object-storage request, e.g. `(PUT, "/a/b.txt")`.
    Object { method: Method, path: String },
}

impl CallLabel {
    pub fn of(request: &HttpRequest) -> Self {
        match request.header("x-tc-action") {
            Some(action) => {
                let host = request.host();
                CallLabel::Action {
                    service: crate::endpoint::service_token_of_host(&host).to_string(),
                    action: action.to_string(),
                }
            }
            None => CallLabel::Object {
                method: request.method,
                path: request.path(),
            },
        }
    }

    pub fn is_read(&self) -> bool {
        match self {
            CallLabel::Action { action, .. } => is_read_action(action),
            CallLabel::Object { method, .. } => method.is_safe(),
        }
    }

    /// `(service, action)` pair handed to the hook.
    pub fn pair(&self) -> (String, String) {
        match self {
            CallLabel::Action { service, action } => (service.clone(), action.clone()),
            CallLabel::Object { method, path } => {
                (COS_SERVICE.to_string(), format!("{} {}", method, path))
            }
        }
    }

    /// Whether a completed exchange is reported from the transport layer.
    fn observed(&self, response: &HttpResponse) -> bool {
        match self {
            // vendor errors ride on 200; see `observes_outcome`
            CallLabel::Action { .. } => false,
            CallLabel::Object { .. } => response.is_success() || response.status == 403,
        }
    }
}

/// Whether a classified control-plane outcome counts as a use of the action.
///
/// Transient failures still reached the action, so each attempt counts.
pub fn observes_outcome<T>(outcome: &QcloudResult<T>) -> bool {
    match outcome {
        Ok(_) => true,
        Err(e) => matches!(e.kind, ErrorKind::NoPermission | ErrorKind::Transient),
    }
}

// ── Observer ────────────────────────────────────────────────────────────

/// Wraps the user hook so that it can never fail the request it observes.
#[derive(Clone, Default)]
pub struct PermissionObserver {
    hook: Option<ObserverFn>,
}

impl PermissionObserver {
    pub fn new(hook: Option<ObserverFn>) -> Self {
        Self { hook }
    }

    pub fn notify(&self, service: &str, action: &str) {
        let Some(ref hook) = self.hook else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| hook(service, action))).is_err() {
            log::error!("permission observer panicked on {}.{}", service, action);
        }
    }
}

impl std::fmt::Debug for PermissionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionObserver")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

// ── Checked transport ───────────────────────────────────────────────────

pub struct CheckedTransport {
    inner: Arc<dyn HttpTransport>,
    read_only: bool,
    observer: PermissionObserver,
}

impl CheckedTransport {
    pub fn new(inner: Arc<dyn HttpTransport>, read_only: bool, observer: PermissionObserver) -> Self {
        Self {
            inner,
            read_only,
            observer,
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for CheckedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let label = CallLabel::of(&request);
        if self.read_only && !label.is_read() {
            let (service, action) = label.pair();
            log::debug!("read-only client refused {}.{}", service, action);
            return Err(TransportError::Rejected(
                QcloudError::read_only(action.clone())
                    .with_service(&service)
                    .with_action(&action),
            ));
        }

        let response = self.inner.send(request).await?;
        if label.observed(&response) {
            let (service, action) = label.pair();
            self.observer.notify(&service, &action);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::{RequestBody, ScriptedTransport};
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn control(action: &str) -> HttpRequest {
        HttpRequest {
            method: Method::Post,
            url: "https://vpc.tencentcloudapi.com/".to_string(),
            headers: BTreeMap::from([("x-tc-action".to_string(), action.to_string())]),
            body: RequestBody::empty(),
        }
    }

    fn object(method: Method) -> HttpRequest {
        HttpRequest {
            method,
            url: "https://b-1.cos.ap-beijing.myqcloud.com/dir/key".to_string(),
            headers: BTreeMap::new(),
            body: RequestBody::empty(),
        }
    }

    fn recording() -> (PermissionObserver, Arc<Mutex<Vec<(String, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook: ObserverFn = Arc::new(move |s: &str, a: &str| {
            sink.lock().unwrap().push((s.to_string(), a.to_string()));
        });
        (PermissionObserver::new(Some(hook)), seen)
    }

    #[test]
    fn read_action_prefixes() {
        assert!(is_read_action("DescribeVpcs"));
        assert!(is_read_action("GetCallerIdentity"));
        assert!(is_read_action("ListUsers"));
        assert!(!is_read_action("CreateVpc"));
        assert!(!is_read_action("describeVpcs"));
    }

    #[test]
    fn labels() {
        assert_eq!(
            CallLabel::of(&control("CreateVpc")).pair(),
            ("vpc".to_string(), "CreateVpc".to_string())
        );
        assert_eq!(
            CallLabel::of(&object(Method::Put)).pair(),
            ("cos".to_string(), "PUT /dir/key".to_string())
        );
    }

    #[test]
    fn panicking_hook_is_swallowed() {
        let hook: ObserverFn = Arc::new(|_: &str, _: &str| panic!("boom"));
        PermissionObserver::new(Some(hook)).notify("cvm", "DescribeInstances");
    }

    #[tokio::test]
    async fn read_only_refuses_before_wire() {
        let wire = ScriptedTransport::new();
        let (observer, seen) = recording();
        let checked = CheckedTransport::new(wire.clone(), true, observer);

        let err = checked.send(control("CreateVpc")).await.unwrap_err();
        match err {
            TransportError::Rejected(e) => assert_eq!(e.kind, ErrorKind::AccountReadOnly),
            other => panic!("unexpected {:?}", other),
        }
        assert!(checked.send(object(Method::Delete)).await.is_err());
        assert_eq!(wire.request_count().await, 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_only_allows_reads() {
        let wire = ScriptedTransport::new();
        wire.push_json(serde_json::json!({})).await;
        wire.push_status(200, "").await;
        let checked = CheckedTransport::new(wire.clone(), true, PermissionObserver::default());
        assert!(checked.send(control("DescribeVpcs")).await.is_ok());
        assert!(checked.send(object(Method::Head)).await.is_ok());
        assert_eq!(wire.request_count().await, 2);
    }

    #[tokio::test]
    async fn control_plane_exchanges_are_left_to_the_client() {
        let wire = ScriptedTransport::new();
        wire.push_json(serde_json::json!({})).await;
        let (observer, seen) = recording();
        let checked = CheckedTransport::new(wire, false, observer);
        checked.send(control("DescribeVpcs")).await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn observed_outcomes() {
        let ok: QcloudResult<()> = Ok(());
        assert!(observes_outcome(&ok));
        for (kind, observed) in [
            (ErrorKind::NoPermission, true),
            (ErrorKind::Transient, true),
            (ErrorKind::InvalidAccessKey, false),
            (ErrorKind::NotFound, false),
            (ErrorKind::Unknown, false),
        ] {
            let err: QcloudResult<()> = Err(QcloudError::vendor(kind, "Code", "message"));
            assert_eq!(observes_outcome(&err), observed, "{:?}", kind);
        }
    }

    #[tokio::test]
    async fn object_observer_fires_on_success_and_forbidden_only() {
        let wire = ScriptedTransport::new();
        wire.push_status(200, "").await;
        wire.push_status(403, "").await;
        wire.push_status(404, "").await;
        let (observer, seen) = recording();
        let checked = CheckedTransport::new(wire, false, observer);
        for _ in 0..3 {
            checked.send(object(Method::Get)).await.unwrap();
        }
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
