//! # mcloud-qcloud – Tencent Cloud (QCloud) provider adapter
//!
//! Signs and dispatches control-plane actions against the TC3 API, retries
//! transient failures, walks paginated listings, polls asynchronous tasks,
//! normalises tags and drives COS object storage over its own signed REST
//! path.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Resource families                                       │
//! │  vpc · instance · disk · eip · secgroup · loadbalancer   │
//! │  mysql · redis · dnszone · cdn · account · cos::bucket   │
//! ├──────────────────────────────────────────────────────────┤
//! │  QcloudRegion (region.rs)     Catalog (catalog.rs)       │
//! │  └── <family>_request         regions · zones · buckets  │
//! ├──────────────────────────────────────────────────────────┤
//! │  pagination.rs · waiter.rs · tags.rs                     │
//! ├──────────────────────────────────────────────────────────┤
//! │  QcloudClient (client.rs)                                │
//! │  ├── request      TC3 envelope + retry (retry.rs)        │
//! │  └── send_raw     COS data path (cos/)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │  CheckedTransport (permission.rs)                        │
//! │  └── read-only gate · permission observer                │
//! ├──────────────────────────────────────────────────────────┤
//! │  HttpTransport (transport.rs)                            │
//! │  └── ReqwestTransport · ScriptedTransport                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Signing schemes
//!
//! | Path          | Scheme                     | Body            |
//! |---------------|----------------------------|-----------------|
//! | Control plane | TC3-HMAC-SHA256            | form-encoded    |
//! | COS           | `q-sign-algorithm=sha1`    | XML / raw bytes |

// ── Sub-modules ─────────────────────────────────────────────────────────

pub mod config;
pub mod endpoint;
pub mod error;
pub mod params;
pub mod payload;
pub mod signing;
pub mod transport;

pub mod catalog;
pub mod client;
pub mod pagination;
pub mod permission;
pub mod region;
pub mod retry;
pub mod tags;
pub mod waiter;

// Resource families
pub mod account;
pub mod capabilities;
pub mod cdn;
pub mod cos;
pub mod disk;
pub mod dnszone;
pub mod eip;
pub mod instance;
pub mod listener;
pub mod loadbalancer;
pub mod mysql;
pub mod redis;
pub mod secgroup;
pub mod vpc;

// ── Re-exports for ergonomic access ─────────────────────────────────────

pub use capabilities::Capability;
pub use client::QcloudClient;
pub use config::{QcloudClientConfig, QcloudCredential, RetryConfig};
pub use endpoint::Service;
pub use error::{ErrorKind, QcloudError, QcloudResult};
pub use params::Params;
pub use payload::Payload;
pub use region::{QcloudRegion, RegionInfo};
pub use tags::{QcloudTags, Resource, TaggedResource};
pub use transport::{HttpTransport, ScriptedTransport};
