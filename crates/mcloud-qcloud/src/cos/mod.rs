//! COS object storage.
//!
//! The data path runs beside the control plane rather than through it:
//! requests are REST calls against per-bucket virtual hosts, signed with
//! the COS `q-sign-algorithm=sha1` authorization header, with XML bodies.
//! They still go out through the client's checked transport, so read-only
//! gating and permission observation apply to them as well.
//!
//! ```text
//! Bucket (public name) ──► wire name `<name>-<app-id>`
//!                              │
//!                              ▼
//!   https://<wire>.cos.<region>.myqcloud.com/<key>?<sub-resource>
//! ```

pub mod bucket;
pub mod client;
pub mod signing;
pub mod types;

pub use bucket::{Bucket, BucketAccessUrl, BucketAcl};
pub use client::{
    BucketReferer, BucketWebsite, CopySource, CosClient, MultipartUpload, ObjectListing, ObjectMeta,
    PutObjectOptions,
};
pub use signing::CosSigner;

/// Top-level domain of every object-storage endpoint.
pub const COS_TLD: &str = "myqcloud.com";

/// Account-scoped endpoint used to enumerate buckets.
pub const SERVICE_ENDPOINT: &str = "https://service.cos.myqcloud.com/";

/// `cos.<region>.myqcloud.com`
pub fn endpoint(region_id: &str) -> String {
    format!("cos.{}.{}", region_id, COS_TLD)
}

/// `cos-website.<region>.myqcloud.com`
pub fn website_endpoint(region_id: &str) -> String {
    format!("cos-website.{}.{}", region_id, COS_TLD)
}

/// Virtual host of a bucket, from its wire name.
pub fn bucket_host(wire_name: &str, region_id: &str) -> String {
    format!("{}.{}", wire_name, endpoint(region_id))
}

/// Wire name of `name` for `app_id`; names that already carry the suffix
/// are left alone.
pub fn wire_name(name: &str, app_id: &str) -> String {
    let suffix = format!("-{}", app_id);
    if app_id.is_empty() || name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

/// Split a wire name on its last `-` into `(public name, app id)`.
pub fn split_wire_name(wire: &str) -> (&str, &str) {
    match wire.rsplit_once('-') {
        Some((name, app_id)) => (name, app_id),
        None => (wire, ""),
    }
}
