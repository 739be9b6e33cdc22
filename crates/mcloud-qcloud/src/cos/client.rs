//! Signed REST client for one COS location (region or zone).
//!
//! Bucket arguments are wire names (`<name>-<app-id>`). Every exchange goes
//! through [`QcloudClient::send_raw`], so it is subject to read-only gating
//! and reported to the permission observer as `("cos", "<METHOD> <path>")`.

use super::signing::{self, CosSigner, SIGN_VALIDITY};
use super::types::{
    AccessControlPolicy, CompleteMultipartUpload, CompletedPart, CopyObjectResult,
    CorsConfiguration, CorsRule, DomainList, ErrorDocument, IndexDocument,
    InitiateMultipartUploadResult, ListAllMyBucketsResult, ListBucketResult,
    ListMultipartUploadsResult, ObjectEntry, RedirectAllRequestsTo, RefererConfiguration, Tag,
    TagSet, Tagging, WebsiteConfiguration, WebsiteErrorDocument,
};
use crate::client::QcloudClient;
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::permission::COS_SERVICE;
use crate::retry;
use crate::transport::{HttpRequest, HttpResponse, Method, RequestBody};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Object metadata keys that travel as standard HTTP headers.
const STANDARD_META_HEADERS: &[&str] = &[
    "cache-control",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-md5",
    "content-type",
    "expires",
];

const META_PREFIX: &str = "x-cos-meta-";

const ERROR_BODY_EXCERPT: usize = 256;

// ── Types ───────────────────────────────────────────────────────────────

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectListing {
    pub objects: Vec<ObjectEntry>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    /// Marker for the next page; empty when the listing is complete.
    pub next_marker: String,
}

/// Object details from HeadObject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub storage_class: String,
    /// `x-cos-meta-*` headers with the prefix removed.
    pub meta: HashMap<String, String>,
}

/// An upload that was initiated but neither completed nor aborted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultipartUpload {
    pub key: String,
    pub upload_id: String,
    pub initiator: String,
    pub initiated: String,
}

#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    pub content_type: Option<String>,
    /// Canned ACL sent as `x-cos-acl`.
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    /// User metadata. Standard header names (`Cache-Control`, `Content-MD5`
    /// ...) are sent as-is, everything else as `x-cos-meta-<key>`.
    pub meta: BTreeMap<String, String>,
}

impl PutObjectOptions {
    fn apply(&self, headers: &mut BTreeMap<String, String>) {
        if let Some(ref ct) = self.content_type {
            headers.insert("content-type".to_string(), ct.clone());
        }
        if let Some(ref acl) = self.acl {
            headers.insert("x-cos-acl".to_string(), acl.clone());
        }
        if let Some(ref class) = self.storage_class {
            headers.insert("x-cos-storage-class".to_string(), class.clone());
        }
        for (key, value) in &self.meta {
            let lower = key.to_ascii_lowercase();
            let name = if STANDARD_META_HEADERS.contains(&lower.as_str()) || lower.starts_with(META_PREFIX) {
                lower
            } else {
                format!("{}{}", META_PREFIX, lower)
            };
            headers.insert(name, value.clone());
        }
    }
}

/// Object a copy reads from; the bucket may live in another location.
#[derive(Debug, Clone, Copy)]
pub struct CopySource<'a> {
    pub bucket: &'a str,
    pub location: &'a str,
    pub key: &'a str,
}

/// Static website hosting of a bucket. All fields empty when hosting is off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketWebsite {
    pub index: String,
    pub error_document: String,
    /// Scheme every request is redirected to, `http` or `https`.
    pub protocol: String,
}

/// Referer allow / deny list of a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketReferer {
    pub enabled: bool,
    /// White list when true, black list otherwise.
    pub white_list: bool,
    pub domains: Vec<String>,
    pub allow_empty: bool,
}

impl From<RefererConfiguration> for BucketReferer {
    fn from(conf: RefererConfiguration) -> Self {
        Self {
            enabled: conf.status == "Enabled",
            white_list: conf.referer_type == "White-List",
            domains: conf.domain_list.domains,
            allow_empty: conf.empty_refer_configuration != "Deny",
        }
    }
}

// ── Request building ────────────────────────────────────────────────────

struct CosRequest<'a> {
    method: Method,
    host: String,
    key: &'a str,
    query: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: RequestBody,
}

impl<'a> CosRequest<'a> {
    fn new(method: Method, host: String, key: &'a str) -> Self {
        Self {
            method,
            host,
            key,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: RequestBody::empty(),
        }
    }

    fn query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds `key=value` only when `value` is non-empty.
    fn query_opt(mut self, key: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.query.insert(key.to_string(), value.to_string());
        }
        self
    }

    fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// XML body with its `Content-MD5`.
    fn xml_body(self, xml: String) -> Self {
        let md5 = signing::content_md5(xml.as_bytes());
        self.header("content-type", "application/xml")
            .header("content-md5", &md5)
            .body(RequestBody::Bytes(Bytes::from(xml)))
    }

    fn path(&self) -> String {
        format!("/{}", self.key)
    }

    fn sign(mut self, signer: &CosSigner) -> HttpRequest {
        self.headers.insert("host".to_string(), self.host.clone());
        let authorization = signer.authorization(
            self.method.as_str(),
            &self.path(),
            &self.query,
            &self.headers,
            Utc::now(),
            SIGN_VALIDITY,
        );
        self.headers.insert("authorization".to_string(), authorization);

        let mut url = format!("https://{}/{}", self.host, signing::encode_path(self.key));
        if !self.query.is_empty() {
            let query: Vec<String> = self
                .query
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        signing::encode(k)
                    } else {
                        format!("{}={}", signing::encode(k), signing::encode(v))
                    }
                })
                .collect();
            url.push('?');
            url.push_str(&query.join("&"));
        }
        HttpRequest {
            method: self.method,
            url,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Classified error for a non-2xx COS response.
fn response_error(response: &HttpResponse, method: Method, path: &str) -> QcloudError {
    let text = response.text();
    let doc: ErrorDocument = quick_xml::de::from_str(&text).unwrap_or_default();
    let kind = match (response.status, doc.code.as_str()) {
        (404, _) => ErrorKind::NotFound,
        (403, _) => ErrorKind::NoPermission,
        (409, "BucketAlreadyExists") | (409, "BucketAlreadyOwnedByYou") => ErrorKind::DuplicateId,
        _ => ErrorKind::Unknown,
    };
    let code = if doc.code.is_empty() { "HttpError" } else { doc.code.as_str() };
    let message = if doc.message.is_empty() {
        let excerpt: String = text.chars().take(ERROR_BODY_EXCERPT).collect();
        format!("status {}: {}", response.status, excerpt)
    } else {
        doc.message.clone()
    };
    let request_id = if doc.request_id.is_empty() {
        response.header("x-cos-request-id").unwrap_or_default().to_string()
    } else {
        doc.request_id
    };
    let mut err = QcloudError::vendor(kind, code, &message)
        .with_service(COS_SERVICE)
        .with_action(&format!("{} {}", method, path))
        .with_status(response.status);
    if !request_id.is_empty() {
        err = err.with_request_id(request_id);
    }
    err
}

// ── Client ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct CosClient {
    client: QcloudClient,
    location: String,
    signer: CosSigner,
}

impl CosClient {
    /// `location` is a region id, or a zone id for zonal buckets.
    pub fn new(client: QcloudClient, location: &str) -> Self {
        let signer = CosSigner::new(client.credential());
        Self {
            client,
            location: location.to_string(),
            signer,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn bucket_host(&self, bucket: &str) -> String {
        super::bucket_host(bucket, &self.location)
    }

    /// Sign and send; the raw response is returned whatever its status.
    async fn exchange(&self, request: CosRequest<'_>) -> QcloudResult<HttpResponse> {
        let request = request.sign(&self.signer);
        if self.client.is_debug() {
            log::debug!("[cos] {} {}", request.method, request.url);
        }
        self.client.send_raw(request).await
    }

    /// Like [`exchange`](Self::exchange), but non-2xx becomes an error.
    async fn call(&self, request: CosRequest<'_>) -> QcloudResult<HttpResponse> {
        let method = request.method;
        let path = request.path();
        let response = self.exchange(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response_error(&response, method, &path))
        }
    }

    // ── Service ─────────────────────────────────────────────────────────

    /// GET Service: every bucket of the account, with the owner.
    pub async fn list_service(&self) -> QcloudResult<ListAllMyBucketsResult> {
        let host = super::SERVICE_ENDPOINT
            .trim_start_matches("https://")
            .trim_end_matches('/')
            .to_string();
        let response = self.call(CosRequest::new(Method::Get, host, "")).await?;
        Ok(quick_xml::de::from_str(&response.text())?)
    }

    // ── Buckets ─────────────────────────────────────────────────────────

    /// HEAD Bucket; the status code is returned as is.
    pub async fn head_bucket(&self, bucket: &str) -> QcloudResult<u16> {
        let response = self
            .exchange(CosRequest::new(Method::Head, self.bucket_host(bucket), ""))
            .await?;
        Ok(response.status)
    }

    pub async fn put_bucket(&self, bucket: &str, acl: Option<&str>) -> QcloudResult<()> {
        let mut request = CosRequest::new(Method::Put, self.bucket_host(bucket), "");
        if let Some(acl) = acl.filter(|a| !a.is_empty()) {
            request = request.header("x-cos-acl", acl);
        }
        self.call(request).await.map(|_| ())
    }

    /// DELETE Bucket. A missing bucket is not an error.
    pub async fn delete_bucket(&self, bucket: &str) -> QcloudResult<()> {
        match self
            .call(CosRequest::new(Method::Delete, self.bucket_host(bucket), ""))
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn get_bucket_acl(&self, bucket: &str) -> QcloudResult<AccessControlPolicy> {
        let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "").query("acl", "");
        let response = self.call(request).await?;
        Ok(quick_xml::de::from_str(&response.text())?)
    }

    pub async fn put_bucket_acl(&self, bucket: &str, acl: &str) -> QcloudResult<()> {
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), "")
            .query("acl", "")
            .header("x-cos-acl", acl);
        self.call(request).await.map(|_| ())
    }

    /// Bucket tags; a bucket without a tag set yields an empty map.
    pub async fn get_bucket_tagging(&self, bucket: &str) -> QcloudResult<HashMap<String, String>> {
        let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "").query("tagging", "");
        let response = match self.call(request).await {
            Err(e) if e.is_not_found() => return Ok(HashMap::new()),
            other => other?,
        };
        let tagging: Tagging = quick_xml::de::from_str(&response.text())?;
        Ok(tagging
            .tag_set
            .tags
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect())
    }

    pub async fn put_bucket_tagging(&self, bucket: &str, tags: &HashMap<String, String>) -> QcloudResult<()> {
        let mut sorted: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| Tag {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        sorted.sort_by(|a, b| a.key.cmp(&b.key));
        let xml = quick_xml::se::to_string(&Tagging {
            tag_set: TagSet { tags: sorted },
        })?;
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), "")
            .query("tagging", "")
            .xml_body(xml);
        self.call(request).await.map(|_| ())
    }

    pub async fn delete_bucket_tagging(&self, bucket: &str) -> QcloudResult<()> {
        let request = CosRequest::new(Method::Delete, self.bucket_host(bucket), "").query("tagging", "");
        match self.call(request).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ── Bucket configuration ────────────────────────────────────────────

    pub async fn get_bucket_website(&self, bucket: &str) -> QcloudResult<BucketWebsite> {
        let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "").query("website", "");
        let response = match self.call(request).await {
            Err(e) if e.is_code(&["NoSuchWebsiteConfiguration"]) => return Ok(BucketWebsite::default()),
            other => other?,
        };
        let conf: WebsiteConfiguration = quick_xml::de::from_str(&response.text())?;
        Ok(BucketWebsite {
            index: conf.index_document.suffix,
            error_document: conf.error_document.map(|d| d.key).unwrap_or_default(),
            protocol: conf.redirect_all_requests_to.map(|r| r.protocol).unwrap_or_default(),
        })
    }

    pub async fn put_bucket_website(&self, bucket: &str, website: &BucketWebsite) -> QcloudResult<()> {
        if website.index.is_empty() {
            return Err(QcloudError::invalid_arg("website index document must not be empty"));
        }
        if website.error_document.is_empty() {
            return Err(QcloudError::invalid_arg("website error document must not be empty"));
        }
        if website.protocol != "http" && website.protocol != "https" {
            return Err(QcloudError::invalid_arg(format!(
                "website protocol {:?} is neither http nor https",
                website.protocol
            )));
        }
        let conf = WebsiteConfiguration {
            index_document: IndexDocument {
                suffix: website.index.clone(),
            },
            error_document: Some(WebsiteErrorDocument {
                key: website.error_document.clone(),
            }),
            redirect_all_requests_to: Some(RedirectAllRequestsTo {
                protocol: website.protocol.clone(),
            }),
        };
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), "")
            .query("website", "")
            .xml_body(quick_xml::se::to_string(&conf)?);
        self.call(request).await.map(|_| ())
    }

    pub async fn delete_bucket_website(&self, bucket: &str) -> QcloudResult<()> {
        let request = CosRequest::new(Method::Delete, self.bucket_host(bucket), "").query("website", "");
        match self.call(request).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn get_bucket_cors(&self, bucket: &str) -> QcloudResult<Vec<CorsRule>> {
        let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "").query("cors", "");
        let response = match self.call(request).await {
            Err(e) if e.is_code(&["NoSuchCORSConfiguration"]) => return Ok(Vec::new()),
            other => other?,
        };
        let conf: CorsConfiguration = quick_xml::de::from_str(&response.text())?;
        Ok(conf.rules)
    }

    async fn put_bucket_cors(&self, bucket: &str, rules: Vec<CorsRule>) -> QcloudResult<()> {
        let xml = quick_xml::se::to_string(&CorsConfiguration { rules })?;
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), "")
            .query("cors", "")
            .xml_body(xml);
        self.call(request).await.map(|_| ())
    }

    /// Merge `rules` into the bucket's CORS rules.
    ///
    /// A rule whose id is already present replaces it; the others are
    /// appended, and rules without an id take their position as id.
    pub async fn set_bucket_cors(&self, bucket: &str, rules: &[CorsRule]) -> QcloudResult<Vec<CorsRule>> {
        let mut merged = self.get_bucket_cors(bucket).await?;
        for rule in rules {
            match merged.iter_mut().find(|r| !rule.id.is_empty() && r.id == rule.id) {
                Some(existing) => *existing = rule.clone(),
                None => merged.push(rule.clone()),
            }
        }
        for (index, rule) in merged.iter_mut().enumerate() {
            if rule.id.is_empty() {
                rule.id = index.to_string();
            }
        }
        self.put_bucket_cors(bucket, merged.clone()).await?;
        Ok(merged)
    }

    /// Remove the rules with `ids`, or every rule when `ids` is empty.
    pub async fn delete_bucket_cors(&self, bucket: &str, ids: &[String]) -> QcloudResult<()> {
        let remaining: Vec<CorsRule> = if ids.is_empty() {
            Vec::new()
        } else {
            self.get_bucket_cors(bucket)
                .await?
                .into_iter()
                .filter(|r| !ids.contains(&r.id))
                .collect()
        };
        if !remaining.is_empty() {
            return self.put_bucket_cors(bucket, remaining).await;
        }
        let request = CosRequest::new(Method::Delete, self.bucket_host(bucket), "").query("cors", "");
        match self.call(request).await {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn get_bucket_referer(&self, bucket: &str) -> QcloudResult<BucketReferer> {
        let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "").query("referer", "");
        let response = match self.call(request).await {
            Err(e) if e.is_not_found() => return Ok(RefererConfiguration::default().into()),
            other => other?,
        };
        let text = response.text();
        if text.trim().is_empty() {
            return Ok(RefererConfiguration::default().into());
        }
        let conf: RefererConfiguration = quick_xml::de::from_str(&text)?;
        Ok(conf.into())
    }

    /// COS wants at least one domain, so an empty list turns the check off.
    pub async fn put_bucket_referer(&self, bucket: &str, referer: &BucketReferer) -> QcloudResult<()> {
        let disabled = !referer.enabled || referer.domains.is_empty();
        let conf = RefererConfiguration {
            status: if disabled { "Disabled" } else { "Enabled" }.to_string(),
            referer_type: if referer.white_list { "White-List" } else { "Black-List" }.to_string(),
            domain_list: DomainList {
                domains: if referer.domains.is_empty() {
                    vec!["*".to_string()]
                } else {
                    referer.domains.clone()
                },
            },
            empty_refer_configuration: if referer.allow_empty { "Allow" } else { "Deny" }.to_string(),
        };
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), "")
            .query("referer", "")
            .xml_body(quick_xml::se::to_string(&conf)?);
        self.call(request).await.map(|_| ())
    }

    // ── Objects ─────────────────────────────────────────────────────────

    /// GET Bucket: one page of objects.
    ///
    /// `max_keys` of zero leaves the page size to the server.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> QcloudResult<ObjectListing> {
        let mut request = CosRequest::new(Method::Get, self.bucket_host(bucket), "")
            .query_opt("prefix", prefix)
            .query_opt("marker", marker)
            .query_opt("delimiter", delimiter);
        if max_keys > 0 {
            request = request.query("max-keys", &max_keys.to_string());
        }
        let response = self.call(request).await?;
        let result: ListBucketResult = quick_xml::de::from_str(&response.text())?;

        let mut next_marker = result.next_marker;
        if result.is_truncated && next_marker.is_empty() {
            next_marker = result
                .contents
                .last()
                .map(|o| o.key.clone())
                .unwrap_or_default();
        }
        Ok(ObjectListing {
            objects: result.contents,
            common_prefixes: result.common_prefixes.into_iter().map(|p| p.prefix).collect(),
            is_truncated: result.is_truncated,
            next_marker,
        })
    }

    pub async fn head_object(&self, bucket: &str, key: &str) -> QcloudResult<ObjectMeta> {
        let response = self
            .call(CosRequest::new(Method::Head, self.bucket_host(bucket), key))
            .await?;
        let header = |name: &str| response.header(name).map(|v| v.to_string());
        Ok(ObjectMeta {
            key: key.to_string(),
            size: response
                .header("content-length")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            content_type: header("content-type"),
            etag: header("etag"),
            last_modified: header("last-modified"),
            storage_class: header("x-cos-storage-class").unwrap_or_else(|| "STANDARD".to_string()),
            meta: response
                .headers
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(META_PREFIX).map(|m| (m.to_string(), v.clone())))
                .collect(),
        })
    }

    /// PUT Object. Stream bodies carry their length; the transport sends it
    /// as `Content-Length`.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: RequestBody,
        options: &PutObjectOptions,
    ) -> QcloudResult<()> {
        if key.is_empty() {
            return Err(QcloudError::invalid_arg("object key must not be empty"));
        }
        let mut request = CosRequest::new(Method::Put, self.bucket_host(bucket), key).body(body);
        options.apply(&mut request.headers);
        self.call(request).await.map(|_| ())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> QcloudResult<()> {
        match self
            .call(CosRequest::new(Method::Delete, self.bucket_host(bucket), key))
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// PUT Object - Copy; returns the new object's ETag.
    ///
    /// Metadata is copied from the source unless `options` sets a content
    /// type or metadata, in which case it is replaced.
    pub async fn copy_object(
        &self,
        bucket: &str,
        key: &str,
        source: CopySource<'_>,
        options: &PutObjectOptions,
    ) -> QcloudResult<String> {
        if key.is_empty() || source.key.is_empty() {
            return Err(QcloudError::invalid_arg("object key must not be empty"));
        }
        let copy_source = format!(
            "{}/{}",
            super::bucket_host(source.bucket, source.location),
            signing::encode_path(source.key)
        );
        let directive = if options.meta.is_empty() && options.content_type.is_none() {
            "Copy"
        } else {
            "Replaced"
        };
        let mut request = CosRequest::new(Method::Put, self.bucket_host(bucket), key)
            .header("x-cos-copy-source", &copy_source)
            .header("x-cos-metadata-directive", directive);
        options.apply(&mut request.headers);
        let path = request.path();
        let response = self.call(request).await?;

        // a copy that fails after the headers went out still answers 200
        let text = response.text();
        if text.contains("<Error>") {
            return Err(response_error(&response, Method::Put, &path));
        }
        let result: CopyObjectResult = quick_xml::de::from_str(&text)?;
        Ok(result.etag)
    }

    /// Pre-signed URL valid for `validity`; only GET, PUT and DELETE.
    pub fn presigned_url(&self, method: Method, bucket: &str, key: &str, validity: Duration) -> QcloudResult<String> {
        if !method.is_safe() && self.client.is_read_only() {
            return Err(QcloudError::read_only(format!("{} /{}", method, key)));
        }
        self.signer
            .presign(method, &self.bucket_host(bucket), key, Utc::now(), validity)
    }

    pub fn presign_get(&self, bucket: &str, key: &str, validity: Duration) -> QcloudResult<String> {
        self.presigned_url(Method::Get, bucket, key, validity)
    }

    // ── Multipart ───────────────────────────────────────────────────────

    /// Returns the upload id.
    pub async fn initiate_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        options: &PutObjectOptions,
    ) -> QcloudResult<String> {
        let mut request = CosRequest::new(Method::Post, self.bucket_host(bucket), key).query("uploads", "");
        options.apply(&mut request.headers);
        let response = self.call(request).await?;
        let result: InitiateMultipartUploadResult = quick_xml::de::from_str(&response.text())?;
        Ok(result.upload_id)
    }

    /// Upload part `part_index` (0-based); returns the part's ETag.
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_index: usize,
        body: RequestBody,
    ) -> QcloudResult<String> {
        let request = CosRequest::new(Method::Put, self.bucket_host(bucket), key)
            .query("partNumber", &(part_index + 1).to_string())
            .query("uploadId", upload_id)
            .body(body);
        let response = self.call(request).await?;
        response
            .header("etag")
            .map(|e| e.to_string())
            .ok_or_else(|| QcloudError::decode(format!("part {} of {} returned no ETag", part_index + 1, key)))
    }

    /// Complete with the part ETags in upload order; parts are numbered 1..n.
    pub async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_etags: &[String],
    ) -> QcloudResult<()> {
        let body = CompleteMultipartUpload {
            parts: part_etags
                .iter()
                .enumerate()
                .map(|(i, etag)| CompletedPart {
                    part_number: i as u32 + 1,
                    etag: etag.clone(),
                })
                .collect(),
        };
        let request = CosRequest::new(Method::Post, self.bucket_host(bucket), key)
            .query("uploadId", upload_id)
            .xml_body(quick_xml::se::to_string(&body)?);
        self.call(request).await.map(|_| ())
    }

    pub async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str) -> QcloudResult<()> {
        let request = CosRequest::new(Method::Delete, self.bucket_host(bucket), key).query("uploadId", upload_id);
        self.call(request).await.map(|_| ())
    }

    /// Every pending upload, following key / upload-id markers.
    pub async fn list_multipart_uploads(&self, bucket: &str) -> QcloudResult<Vec<MultipartUpload>> {
        let mut uploads = Vec::new();
        let mut key_marker = String::new();
        let mut upload_id_marker = String::new();
        loop {
            retry::check_cancelled(self.client.cancellation_token())?;
            let request = CosRequest::new(Method::Get, self.bucket_host(bucket), "")
                .query("uploads", "")
                .query_opt("key-marker", &key_marker)
                .query_opt("upload-id-marker", &upload_id_marker);
            let response = self.call(request).await?;
            let page: ListMultipartUploadsResult = quick_xml::de::from_str(&response.text())?;
            uploads.extend(page.uploads.into_iter().map(|u| MultipartUpload {
                key: u.key,
                upload_id: u.upload_id,
                initiator: u.initiator.display_name,
                initiated: u.initiated,
            }));
            if !page.is_truncated {
                break;
            }
            let stalled = (page.next_key_marker.is_empty() && page.next_upload_id_marker.is_empty())
                || (page.next_key_marker == key_marker && page.next_upload_id_marker == upload_id_marker);
            if stalled {
                log::error!(
                    "upload listing of {} is truncated but markers did not advance after {} uploads",
                    bucket,
                    uploads.len()
                );
                return Err(QcloudError::vendor(
                    ErrorKind::Unknown,
                    "MarkerNotAdvanced",
                    &format!("truncated upload listing without new markers (key-marker {:?})", key_marker),
                )
                .with_service(COS_SERVICE)
                .with_action("GET /?uploads"));
            }
            key_marker = page.next_key_marker;
            upload_id_marker = page.next_upload_id_marker;
        }
        Ok(uploads)
    }
}

impl QcloudClient {
    /// Object-storage client for a region or zone.
    pub fn cos(&self, location: &str) -> CosClient {
        CosClient::new(self.clone(), location)
    }
}
