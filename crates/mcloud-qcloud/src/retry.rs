//! Error classification and retry pacing.
//!
//! Vendor codes are mapped into [`ErrorKind`] in a fixed order: key errors
//! first, then permission, not-found and region support, then the transient
//! set. Anything unrecognised stays [`ErrorKind::Unknown`] and is surfaced
//! verbatim without a retry.

use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::transport::TransportError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const INVALID_ACCESS_KEY_CODES: &[&str] = &["AuthFailure.SecretIdNotFound", "AuthFailure.SignatureFailure"];

const NO_PERMISSION_PREFIXES: &[&str] = &["UnauthorizedOperation.", "AuthFailure."];

const NO_PERMISSION_CODES: &[&str] = &[
    "SecretidNotAuthAccessResource",
    "UnauthorizedOperation",
    "InvalidParameter.PermissionDenied",
    "AuthFailure",
];

const NOT_FOUND_CODES: &[&str] = &[
    "InvalidParameter.RoleNotExist",
    "ResourceNotFound",
    "FailedOperation.CertificateNotFound",
];

const NOT_SUPPORTED_CODES: &[&str] = &["UnsupportedRegion"];

const TRANSIENT_CODES: &[&str] = &[
    "InternalError",
    "MutexOperation.TaskRunning",
    "InvalidInstance.NotSupported",
    "InvalidAddressId.StatusNotPermit",
    "RequestLimitExceeded",
    "OperationDenied.InstanceOperationInProgress",
];

const TRANSIENT_MESSAGES: &[&str] = &["EOF", "TLS handshake timeout", "try later", "i/o timeout"];

/// Metric queries report a destroyed instance with a generic code.
const DESTROYED_INSTANCE_ACTION: &str = "GetMonitorData";
const DESTROYED_INSTANCE_MESSAGE: &str = "the instance has been destroyed";

/// Kind of a vendor error `code` raised by `action`.
pub fn classify_code(code: &str, message: &str, action: &str) -> ErrorKind {
    if INVALID_ACCESS_KEY_CODES.contains(&code) {
        return ErrorKind::InvalidAccessKey;
    }
    if NO_PERMISSION_CODES.contains(&code) || NO_PERMISSION_PREFIXES.iter().any(|p| code.starts_with(p)) {
        return ErrorKind::NoPermission;
    }
    if NOT_FOUND_CODES.contains(&code) {
        return ErrorKind::NotFound;
    }
    if NOT_SUPPORTED_CODES.contains(&code) {
        return ErrorKind::NotSupported;
    }
    if code == "InvalidParameterValue"
        && action == DESTROYED_INSTANCE_ACTION
        && message.contains(DESTROYED_INSTANCE_MESSAGE)
    {
        return ErrorKind::NotFound;
    }
    if TRANSIENT_CODES.contains(&code) {
        return ErrorKind::Transient;
    }
    ErrorKind::Unknown
}

pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_MESSAGES.iter().any(|m| message.contains(m))
}

/// Convert a transport failure into a classified error.
pub fn classify_transport(err: TransportError) -> QcloudError {
    match err {
        TransportError::Rejected(e) => e,
        TransportError::Timeout(msg) => QcloudError::vendor(ErrorKind::Transient, "Timeout", &msg),
        TransportError::Connect(msg) | TransportError::Io(msg) => {
            let kind = if is_transient_message(&msg) {
                ErrorKind::Transient
            } else {
                ErrorKind::Unknown
            };
            QcloudError::vendor(kind, "TransportError", &msg)
        }
    }
}

/// Sleep for `delay`, returning `Cancelled` as soon as `cancel` fires.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> QcloudResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(QcloudError::cancelled()),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Fail fast when `cancel` already fired.
pub fn check_cancelled(cancel: &CancellationToken) -> QcloudResult<()> {
    if cancel.is_cancelled() {
        Err(QcloudError::cancelled())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_errors_win_over_auth_prefix() {
        assert_eq!(
            classify_code("AuthFailure.SignatureFailure", "", "DescribeVpcs"),
            ErrorKind::InvalidAccessKey
        );
        assert_eq!(
            classify_code("AuthFailure.SecretIdNotFound", "", "DescribeVpcs"),
            ErrorKind::InvalidAccessKey
        );
        assert_eq!(
            classify_code("AuthFailure.TokenFailure", "", "DescribeVpcs"),
            ErrorKind::NoPermission
        );
    }

    #[test]
    fn permission_codes() {
        for code in [
            "UnauthorizedOperation",
            "UnauthorizedOperation.CamNoAuth",
            "SecretidNotAuthAccessResource",
            "InvalidParameter.PermissionDenied",
            "AuthFailure",
        ] {
            assert_eq!(classify_code(code, "", "CreateVpc"), ErrorKind::NoPermission, "{}", code);
        }
    }

    #[test]
    fn not_found_and_not_supported() {
        assert_eq!(classify_code("ResourceNotFound", "", "X"), ErrorKind::NotFound);
        assert_eq!(
            classify_code("FailedOperation.CertificateNotFound", "", "X"),
            ErrorKind::NotFound
        );
        assert_eq!(classify_code("UnsupportedRegion", "", "X"), ErrorKind::NotSupported);
    }

    #[test]
    fn destroyed_instance_only_for_metric_queries() {
        let msg = "invalid: the instance has been destroyed";
        assert_eq!(
            classify_code("InvalidParameterValue", msg, "GetMonitorData"),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify_code("InvalidParameterValue", msg, "DescribeInstances"),
            ErrorKind::Unknown
        );
    }

    #[test]
    fn transient_codes() {
        for code in TRANSIENT_CODES {
            assert_eq!(classify_code(code, "", "X"), ErrorKind::Transient);
        }
        assert_eq!(classify_code("InvalidParameter", "", "X"), ErrorKind::Unknown);
    }

    #[test]
    fn transport_messages() {
        let e = classify_transport(TransportError::Io("connection closed: unexpected EOF".into()));
        assert_eq!(e.kind, ErrorKind::Transient);
        let e = classify_transport(TransportError::Connect("dns error: no such host".into()));
        assert_eq!(e.kind, ErrorKind::Unknown);
        let e = classify_transport(TransportError::Timeout("operation timed out".into()));
        assert_eq!(e.kind, ErrorKind::Transient);
        let e = classify_transport(TransportError::Rejected(QcloudError::read_only("CreateVpc")));
        assert_eq!(e.kind, ErrorKind::AccountReadOnly);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_sleeps_full_delay() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        pause(Duration::from_secs(10), &cancel).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_is_cut_short_by_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let err = pause(Duration::from_secs(30), &cancel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(check_cancelled(&cancel).is_err());
    }
}
