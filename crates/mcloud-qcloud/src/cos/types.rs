//! XML documents exchanged with COS.

use serde::{Deserialize, Serialize};

// ── Service ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListAllMyBucketsResult {
    #[serde(rename = "Owner", default)]
    pub owner: Owner,
    #[serde(rename = "Buckets", default)]
    pub buckets: BucketList,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Owner {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "DisplayName", default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketList {
    #[serde(rename = "Bucket", default)]
    pub items: Vec<BucketEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEntry {
    /// Wire name, `<name>-<app-id>`.
    #[serde(rename = "Name")]
    pub name: String,
    /// Region id, or zone id for zonal buckets.
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "CreationDate", default)]
    pub creation_date: String,
}

// ── Objects ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListBucketResult {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "Marker", default)]
    pub marker: String,
    #[serde(rename = "NextMarker", default)]
    pub next_marker: String,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ObjectEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Size", default)]
    pub size: u64,
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
}

// ── Multipart ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "Bucket", default)]
    pub bucket: String,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListMultipartUploadsResult {
    #[serde(rename = "NextKeyMarker", default)]
    pub next_key_marker: String,
    #[serde(rename = "NextUploadIdMarker", default)]
    pub next_upload_id_marker: String,
    #[serde(rename = "IsTruncated", default)]
    pub is_truncated: bool,
    #[serde(rename = "Upload", default)]
    pub uploads: Vec<UploadEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadEntry {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "UploadId", default)]
    pub upload_id: String,
    #[serde(rename = "Initiator", default)]
    pub initiator: Owner,
    #[serde(rename = "Initiated", default)]
    pub initiated: String,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: String,
}

// ── Tagging ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "Tagging")]
pub struct Tagging {
    #[serde(rename = "TagSet", default)]
    pub tag_set: TagSet,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(rename = "Tag", default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

// ── ACL ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessControlPolicy {
    #[serde(rename = "Owner", default)]
    pub owner: Owner,
    #[serde(rename = "AccessControlList", default)]
    pub access_control_list: AccessControlList,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessControlList {
    #[serde(rename = "Grant", default)]
    pub grants: Vec<Grant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grant {
    #[serde(rename = "Grantee", default)]
    pub grantee: Grantee,
    /// `FULL_CONTROL`, `READ` or `WRITE`.
    #[serde(rename = "Permission", default)]
    pub permission: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Grantee {
    #[serde(rename = "ID", default)]
    pub id: String,
    /// Set for group grantees only.
    #[serde(rename = "URI", default)]
    pub uri: String,
}

// ── Copy ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyObjectResult {
    #[serde(rename = "ETag", default)]
    pub etag: String,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
}

// ── Website ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "WebsiteConfiguration")]
pub struct WebsiteConfiguration {
    #[serde(rename = "IndexDocument", default)]
    pub index_document: IndexDocument,
    #[serde(rename = "ErrorDocument", default, skip_serializing_if = "Option::is_none")]
    pub error_document: Option<WebsiteErrorDocument>,
    #[serde(rename = "RedirectAllRequestsTo", default, skip_serializing_if = "Option::is_none")]
    pub redirect_all_requests_to: Option<RedirectAllRequestsTo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(rename = "Suffix", default)]
    pub suffix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebsiteErrorDocument {
    #[serde(rename = "Key", default)]
    pub key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedirectAllRequestsTo {
    /// `http` or `https`.
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
}

// ── CORS ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "CORSConfiguration")]
pub struct CorsConfiguration {
    #[serde(rename = "CORSRule", default)]
    pub rules: Vec<CorsRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsRule {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "AllowedOrigin", default)]
    pub allowed_origins: Vec<String>,
    #[serde(rename = "AllowedMethod", default)]
    pub allowed_methods: Vec<String>,
    #[serde(rename = "AllowedHeader", default)]
    pub allowed_headers: Vec<String>,
    #[serde(rename = "ExposeHeader", default)]
    pub expose_headers: Vec<String>,
    #[serde(rename = "MaxAgeSeconds", default)]
    pub max_age_seconds: u32,
}

// ── Referer ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "RefererConfiguration")]
pub struct RefererConfiguration {
    /// `Enabled` or `Disabled`.
    #[serde(rename = "Status")]
    pub status: String,
    /// `White-List` or `Black-List`.
    #[serde(rename = "RefererType")]
    pub referer_type: String,
    #[serde(rename = "DomainList", default)]
    pub domain_list: DomainList,
    /// `Allow` or `Deny` requests without a Referer.
    #[serde(rename = "EmptyReferConfiguration", default)]
    pub empty_refer_configuration: String,
}

impl Default for RefererConfiguration {
    fn default() -> Self {
        Self {
            status: "Disabled".to_string(),
            referer_type: "White-List".to_string(),
            domain_list: DomainList::default(),
            empty_refer_configuration: "Allow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainList {
    #[serde(rename = "Domain", default)]
    pub domains: Vec<String>,
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Body of a non-2xx COS response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDocument {
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}
