//! Response envelope decoding.
//!
//! Every control-plane response is `{"Response": {...}}`. A present
//! `Response.Error` becomes a [`QcloudError`]; otherwise the inner object is
//! handed out as a [`Payload`] and read through dotted key paths.

use crate::error::{ErrorKind, QcloudError, QcloudResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct VendorError {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: String,
}

/// Split a raw body into payload or vendor error.
///
/// The vendor error comes back as [`ErrorKind::Unknown`]; classification
/// happens in the client, which knows the action.
pub fn decode_envelope(body: &[u8]) -> QcloudResult<Payload> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    let Some(response) = envelope.response else {
        return Err(QcloudError::decode("missing Response object"));
    };
    if let Some(error) = response.get("Error") {
        let vendor: VendorError = serde_json::from_value(error.clone())?;
        let mut err = QcloudError::vendor(ErrorKind::Unknown, &vendor.code, &vendor.message);
        if let Some(id) = response.get("RequestId").and_then(Value::as_str) {
            err = err.with_request_id(id);
        }
        return Err(err);
    }
    Ok(Payload(response))
}

/// Decoded action payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(pub Value);

impl Payload {
    pub fn new(value: Value) -> Self {
        Payload(value)
    }

    /// Walk a dotted path. Numeric segments index arrays.
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.0);
        }
        let mut current = &self.0;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mandatory field: absence is a decode error.
    pub fn unmarshal<T: DeserializeOwned>(&self, path: &str) -> QcloudResult<T> {
        match self.get(path) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| QcloudError::decode(format!("{}: {}", path, e))),
            None => Err(QcloudError::decode(format!("missing field {}", path))),
        }
    }

    /// Optional field: absent or `null` yields `None`.
    pub fn unmarshal_opt<T: DeserializeOwned>(&self, path: &str) -> QcloudResult<Option<T>> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| QcloudError::decode(format!("{}: {}", path, e))),
        }
    }

    /// List field; absent or `null` is an empty list.
    pub fn list<T: DeserializeOwned>(&self, path: &str) -> QcloudResult<Vec<T>> {
        Ok(self.unmarshal_opt(path)?.unwrap_or_default())
    }

    pub fn string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Total count, tolerant to int, float, numeric string and `null`.
    pub fn total_count(&self, path: &str) -> QcloudResult<usize> {
        match self.get(path) {
            None | Some(Value::Null) => Ok(0),
            Some(value) => coerce_count(value)
                .ok_or_else(|| QcloudError::decode(format!("{}: not a count: {}", path, value))),
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.get("RequestId").and_then(Value::as_str)
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

fn coerce_count(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Some(0);
            }
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(|n| n as usize)
        }
        Value::Null => Some(0),
        _ => None,
    }
}

/// Serde helpers for fields the vendor types inconsistently.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// String field that may arrive as a number or `null`.
    pub fn string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        })
    }

    /// List field that may arrive as `null`.
    pub fn list<'de, D, T>(de: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(de)?.unwrap_or_default())
    }

    /// Integer field that may arrive as a float, string or `null`.
    pub fn int<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
        Ok(match Value::deserialize(de)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
            Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or(0),
            _ => 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> Vec<u8> {
        v.to_string().into_bytes()
    }

    #[test]
    fn success_payload() {
        let p = decode_envelope(&body(json!({
            "Response": {"TotalCount": 2, "VpcSet": [{"VpcId": "vpc-1"}], "RequestId": "r"}
        })))
        .unwrap();
        assert_eq!(p.request_id(), Some("r"));
        assert_eq!(p.string("VpcSet.0.VpcId").as_deref(), Some("vpc-1"));
    }

    #[test]
    fn vendor_error() {
        let err = decode_envelope(&body(json!({
            "Response": {
                "Error": {"Code": "ResourceNotFound", "Message": "gone"},
                "RequestId": "req-9"
            }
        })))
        .unwrap_err();
        assert_eq!(err.code, "ResourceNotFound");
        assert_eq!(err.message, "gone");
        assert_eq!(err.request_id.as_deref(), Some("req-9"));
    }

    #[test]
    fn garbage_is_decode_error() {
        let err = decode_envelope(b"<html>").unwrap_err();
        assert_eq!(err.code, "DecodeError");
        let err = decode_envelope(b"{}").unwrap_err();
        assert!(err.message.contains("Response"));
    }

    #[test]
    fn total_count_coercion() {
        let p = Payload::new(json!({
            "A": 3, "B": 4.0, "C": "5", "D": null, "E": "7.0", "F": [1]
        }));
        assert_eq!(p.total_count("A").unwrap(), 3);
        assert_eq!(p.total_count("B").unwrap(), 4);
        assert_eq!(p.total_count("C").unwrap(), 5);
        assert_eq!(p.total_count("D").unwrap(), 0);
        assert_eq!(p.total_count("E").unwrap(), 7);
        assert_eq!(p.total_count("Missing").unwrap(), 0);
        assert!(p.total_count("F").is_err());
    }

    #[test]
    fn optional_versus_mandatory() {
        #[derive(Debug, Deserialize)]
        struct Vpc {
            #[serde(rename = "VpcId")]
            id: String,
        }
        let p = Payload::new(json!({"Vpc": {"VpcId": "vpc-1"}, "Nothing": null}));
        let vpc: Vpc = p.unmarshal("Vpc").unwrap();
        assert_eq!(vpc.id, "vpc-1");
        assert!(p.unmarshal::<Vpc>("Other").is_err());
        assert!(p.unmarshal_opt::<Vpc>("Other").unwrap().is_none());
        assert!(p.unmarshal_opt::<Vpc>("Nothing").unwrap().is_none());
        assert!(p.list::<Vpc>("Missing").unwrap().is_empty());
    }

    #[test]
    fn lenient_fields() {
        #[derive(Deserialize)]
        struct Row {
            #[serde(deserialize_with = "lenient::string", default)]
            zone: String,
            #[serde(deserialize_with = "lenient::int", default)]
            size: i64,
        }
        let r: Row = serde_json::from_value(json!({"zone": 100003, "size": "20"})).unwrap();
        assert_eq!(r.zone, "100003");
        assert_eq!(r.size, 20);
        let r: Row = serde_json::from_value(json!({"zone": null, "size": null})).unwrap();
        assert_eq!(r.zone, "");
        assert_eq!(r.size, 0);
    }
}
