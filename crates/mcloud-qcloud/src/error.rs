//! QCloud error types.
//!
//! Every vendor error code maps into exactly one [`ErrorKind`]. The kind is
//! what callers branch on; the vendor `Code`/`Message` pair is kept verbatim
//! for diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

const DECODE_ERROR_CODE: &str = "DecodeError";

/// Closed error taxonomy exposed by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Resource absent or deleted.
    NotFound,
    /// A lookup by unique id returned more than one record.
    DuplicateId,
    /// The credential may not perform the action.
    NoPermission,
    /// Signature or key rejected.
    InvalidAccessKey,
    /// A write was attempted on a read-only client.
    AccountReadOnly,
    /// Region/service combination unavailable.
    NotSupported,
    /// Retry budget or async deadline exhausted.
    Timeout,
    /// Caller-side shape violation.
    InvalidArg,
    /// Transient failure that survived the retry budget.
    Transient,
    /// Caller cancelled the operation.
    Cancelled,
    /// Unclassified vendor or transport error.
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::DuplicateId => "DuplicateId",
            ErrorKind::NoPermission => "NoPermission",
            ErrorKind::InvalidAccessKey => "InvalidAccessKey",
            ErrorKind::AccountReadOnly => "AccountReadOnly",
            ErrorKind::NotSupported => "NotSupported",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::InvalidArg => "InvalidArg",
            ErrorKind::Transient => "Transient",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for all QCloud operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcloudError {
    pub kind: ErrorKind,
    /// Vendor error code (e.g. "ResourceNotFound"), empty when synthesized.
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
    /// Service token ("cvm", "vpc", "cos", ...).
    pub service: Option<String>,
    pub action: Option<String>,
    /// HTTP status, when the error came from a response.
    pub status_code: Option<u16>,
}

impl fmt::Display for QcloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match (&self.service, &self.action) {
            (Some(service), Some(action)) => write!(f, " [{}.{}]", service, action)?,
            (Some(service), None) => write!(f, " [{}]", service)?,
            (None, Some(action)) => write!(f, " [{}]", action)?,
            (None, None) => {}
        }
        if !self.code.is_empty() {
            write!(f, " Code={}", self.code)?;
        }
        if !self.message.is_empty() {
            write!(f, " Message={}", self.message)?;
        }
        if let Some(ref req_id) = self.request_id {
            write!(f, " RequestId={}", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for QcloudError {}

impl QcloudError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: String::new(),
            message: message.into(),
            request_id: None,
            service: None,
            action: None,
            status_code: None,
        }
    }

    /// Error carrying a vendor `Code`/`Message` pair.
    pub fn vendor(kind: ErrorKind, code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Self::new(kind, message)
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, what)
    }

    pub fn duplicate_id(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateId, what)
    }

    pub fn invalid_arg(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArg, what)
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, what)
    }

    pub fn read_only(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccountReadOnly, what)
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, what)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    /// Malformed or unexpected payload.
    pub fn decode(what: impl Into<String>) -> Self {
        Self::vendor(ErrorKind::Unknown, DECODE_ERROR_CODE, &what.into())
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// Local payload decoding failed, as opposed to a vendor-reported error.
    pub fn is_decode(&self) -> bool {
        self.code == DECODE_ERROR_CODE
    }

    /// Whether the vendor code is one of `codes`.
    pub fn is_code(&self, codes: &[&str]) -> bool {
        codes.iter().any(|c| *c == self.code)
    }
}

impl From<reqwest::Error> for QcloudError {
    fn from(err: reqwest::Error) -> Self {
        let mut e = Self::vendor(ErrorKind::Unknown, "HttpError", &err.to_string());
        e.status_code = err.status().map(|s| s.as_u16());
        e
    }
}

impl From<serde_json::Error> for QcloudError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

impl From<quick_xml::DeError> for QcloudError {
    fn from(err: quick_xml::DeError) -> Self {
        Self::decode(format!("xml: {}", err))
    }
}

/// Convenience result type for QCloud operations.
pub type QcloudResult<T> = Result<T, QcloudError>;
