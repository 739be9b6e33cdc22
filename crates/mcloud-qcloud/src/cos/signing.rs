//! COS request authorization (`q-sign-algorithm=sha1`).
//!
//! ```text
//! KeyTime      = "<start>;<end>"                  (unix seconds)
//! SignKey      = hex(HMAC-SHA1(SecretKey, KeyTime))
//! HttpString   = lower(method) \n path \n params \n headers \n
//! StringToSign = "sha1" \n KeyTime \n hex(SHA1(HttpString)) \n
//! Signature    = hex(HMAC-SHA1(SignKey, StringToSign))
//! ```
//!
//! Parameter and header names are lower-cased and percent-encoded, then
//! sorted; both the `key=value` lists and the bare name lists join on `&`
//! and `;` respectively.

use crate::config::QcloudCredential;
use crate::error::{QcloudError, QcloudResult};
use crate::transport::Method;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

/// Everything but RFC 3986 unreserved characters.
const COS_ENCODE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Same as [`COS_ENCODE`] but keeps the path separator.
const PATH_ENCODE: &AsciiSet = &COS_ENCODE.remove(b'/');

/// Authorization carried in a query string keeps its own separators.
const PRESIGN_ENCODE: &AsciiSet = &COS_ENCODE.remove(b'&').remove(b'=');

/// How long a signature stays valid.
pub const SIGN_VALIDITY: Duration = Duration::from_secs(3600);

pub fn encode(s: &str) -> String {
    utf8_percent_encode(s, COS_ENCODE).to_string()
}

/// Percent-encode an object key for use in a URL path.
pub fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH_ENCODE).to_string()
}

/// Base64 of the MD5 digest, for `Content-MD5`.
pub fn content_md5(body: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(Md5::digest(body))
}

/// Headers that take part in the signature.
fn is_signed_header(name: &str) -> bool {
    name == "host" || name.starts_with("content-") || name.starts_with("x-cos-")
}

#[derive(Debug, Clone)]
pub struct CosSigner {
    secret_id: String,
    secret_key: String,
}

impl CosSigner {
    pub fn new(credential: &QcloudCredential) -> Self {
        Self {
            secret_id: credential.secret_id.clone(),
            secret_key: credential.secret_key.clone(),
        }
    }

    /// Value of the `Authorization` header.
    ///
    /// `path` is the unencoded request path (`/` or `/<key>`); `headers`
    /// must use lower-case names.
    pub fn authorization(
        &self,
        method: &str,
        path: &str,
        query: &BTreeMap<String, String>,
        headers: &BTreeMap<String, String>,
        start: DateTime<Utc>,
        validity: Duration,
    ) -> String {
        let begin = start.timestamp();
        let key_time = format!("{};{}", begin, begin + validity.as_secs() as i64);

        let (param_list, params) = canonical_pairs(query.iter());
        let (header_list, signed_headers) =
            canonical_pairs(headers.iter().filter(|(k, _)| is_signed_header(k)));

        let http_string = format!(
            "{}\n{}\n{}\n{}\n",
            method.to_ascii_lowercase(),
            path,
            params,
            signed_headers
        );
        let string_to_sign = format!("sha1\n{}\n{}\n", key_time, hex::encode(Sha1::digest(http_string)));
        let sign_key = hex::encode(hmac_sha1(self.secret_key.as_bytes(), key_time.as_bytes()));
        let signature = hex::encode(hmac_sha1(sign_key.as_bytes(), string_to_sign.as_bytes()));

        format!(
            "q-sign-algorithm=sha1&q-ak={}&q-sign-time={}&q-key-time={}&q-header-list={}&q-url-param-list={}&q-signature={}",
            self.secret_id, key_time, key_time, header_list, param_list, signature
        )
    }

    /// URL for `method` on `/<key>` with the authorization in the query.
    ///
    /// Only `host` is signed, so the holder may send any other header.
    pub fn presign(
        &self,
        method: Method,
        host: &str,
        key: &str,
        start: DateTime<Utc>,
        validity: Duration,
    ) -> QcloudResult<String> {
        if !matches!(method, Method::Get | Method::Put | Method::Delete) {
            return Err(QcloudError::invalid_arg(format!("cannot presign {} requests", method)));
        }
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host.to_string());
        let authorization = self.authorization(
            method.as_str(),
            &format!("/{}", key),
            &BTreeMap::new(),
            &headers,
            start,
            validity,
        );
        Ok(format!(
            "https://{}/{}?{}",
            host,
            encode_path(key),
            utf8_percent_encode(&authorization, PRESIGN_ENCODE)
        ))
    }
}

/// `(name list, key=value list)` over lower-cased, encoded, sorted pairs.
fn canonical_pairs<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> (String, String) {
    let sorted: BTreeMap<String, String> = pairs
        .map(|(k, v)| (encode(&k.to_ascii_lowercase()), encode(v)))
        .collect();
    let names: Vec<&str> = sorted.keys().map(|k| k.as_str()).collect();
    let joined: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    (names.join(";"), joined.join("&"))
}

fn hmac_sha1(key: &[u8], data: &[u8]) -> Vec<u8> {
    let Ok(mut mac) = HmacSha1::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> CosSigner {
        CosSigner::new(&QcloudCredential::new("AKIDEXAMPLE", "secret"))
    }

    #[test]
    fn authorization_layout() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "media-12345.cos.ap-guangzhou.myqcloud.com".to_string());
        headers.insert("x-cos-acl".to_string(), "private".to_string());
        headers.insert("user-agent".to_string(), "test".to_string());
        let mut query = BTreeMap::new();
        query.insert("uploads".to_string(), String::new());
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let auth = signer().authorization("POST", "/a b.txt", &query, &headers, start, SIGN_VALIDITY);
        assert!(auth.starts_with("q-sign-algorithm=sha1&q-ak=AKIDEXAMPLE&"));
        assert!(auth.contains("q-sign-time=1700000000;1700003600"));
        assert!(auth.contains("q-header-list=host;x-cos-acl&"));
        assert!(auth.contains("q-url-param-list=uploads&"));
        let signature = auth.rsplit("q-signature=").next().unwrap();
        assert_eq!(signature.len(), 40);
    }

    #[test]
    fn signature_is_stable() {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), "media-12345.cos.ap-guangzhou.myqcloud.com".to_string());
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let a = signer().authorization("GET", "/", &BTreeMap::new(), &headers, start, SIGN_VALIDITY);
        let b = signer().authorization("get", "/", &BTreeMap::new(), &headers, start, SIGN_VALIDITY);
        assert_eq!(a, b);
        assert!(a.ends_with("&q-signature=982cff045f5555a4652a2d3fa6b3fc8bdb88b559"));
        let later = signer().authorization(
            "GET",
            "/",
            &BTreeMap::new(),
            &headers,
            start + chrono::Duration::seconds(1),
            SIGN_VALIDITY,
        );
        assert_ne!(a, later);
    }

    #[test]
    fn presigned_url_carries_authorization() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let host = "media-12345.cos.ap-guangzhou.myqcloud.com";
        let url = signer()
            .presign(Method::Get, host, "dir/a b.txt", start, Duration::from_secs(600))
            .unwrap();
        let (base, query) = url.split_once('?').unwrap();
        assert_eq!(base, "https://media-12345.cos.ap-guangzhou.myqcloud.com/dir/a%20b.txt");
        assert!(query.starts_with("q-sign-algorithm=sha1&q-ak=AKIDEXAMPLE&"));
        assert!(query.contains("q-sign-time=1700000000%3B1700000600&"));
        assert!(query.contains("q-header-list=host&"));

        // the query decodes back to the header form of the same request
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), host.to_string());
        let header_form = signer().authorization(
            "GET",
            "/dir/a b.txt",
            &BTreeMap::new(),
            &headers,
            start,
            Duration::from_secs(600),
        );
        let decoded = percent_encoding::percent_decode_str(query).decode_utf8().unwrap();
        assert_eq!(decoded, header_form);
    }

    #[test]
    fn presign_rejects_other_methods() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let err = signer()
            .presign(Method::Post, "h", "k", start, SIGN_VALIDITY)
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArg);
    }

    #[test]
    fn encoding() {
        assert_eq!(encode("a b/c~"), "a%20b%2Fc~");
        assert_eq!(encode_path("dir/a b.txt"), "dir/a%20b.txt");
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }
}
