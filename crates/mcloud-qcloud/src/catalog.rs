//! Per-client caches: regions, zones per region, buckets and owner identity.
//!
//! Each list is published as an immutable `Arc<[T]>`; readers clone the
//! `Arc` and never hold a lock across I/O of their own.

use crate::cos::Bucket;
use crate::error::QcloudResult;
use crate::region::{RegionInfo, ZoneInfo};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// One lazily-filled list, replaceable and invalidatable.
pub struct CachedList<T> {
    slot: tokio::sync::Mutex<Option<Arc<[T]>>>,
}

impl<T> Default for CachedList<T> {
    fn default() -> Self {
        Self {
            slot: tokio::sync::Mutex::new(None),
        }
    }
}

impl<T> CachedList<T> {
    /// Cached list, or the result of `fetch` stored for next time.
    ///
    /// Concurrent callers wait for the first fetch instead of racing it.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> QcloudResult<Arc<[T]>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QcloudResult<Vec<T>>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(ref items) = *slot {
            return Ok(items.clone());
        }
        let items: Arc<[T]> = fetch().await?.into();
        *slot = Some(items.clone());
        Ok(items)
    }

    pub async fn replace(&self, items: Vec<T>) -> Arc<[T]> {
        let items: Arc<[T]> = items.into();
        *self.slot.lock().await = Some(items.clone());
        items
    }

    pub async fn cached(&self) -> Option<Arc<[T]>> {
        self.slot.lock().await.clone()
    }

    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

#[derive(Default)]
pub struct Catalog {
    pub regions: CachedList<RegionInfo>,
    pub buckets: CachedList<Bucket>,
    zones: Mutex<HashMap<String, Arc<CachedList<ZoneInfo>>>>,
    owner_id: OnceCell<String>,
}

impl Catalog {
    /// Zone list slot of one region, created empty on first use.
    pub async fn zones(&self, region_id: &str) -> Arc<CachedList<ZoneInfo>> {
        self.zones
            .lock()
            .await
            .entry(region_id.to_string())
            .or_default()
            .clone()
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.get().map(|s| s.as_str())
    }

    /// Discovered account id, fetched once.
    pub async fn owner_id_or_fetch<F, Fut>(&self, fetch: F) -> QcloudResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QcloudResult<String>>,
    {
        self.owner_id.get_or_try_init(fetch).await.cloned()
    }

    /// Record an account id learnt as a side effect (e.g. the COS owner).
    pub fn remember_owner_id(&self, id: &str) {
        if !id.is_empty() {
            let _ = self.owner_id.set(id.to_string());
        }
    }
}

/// Resolve a location that may be a region id or a zone id.
///
/// Region ids are tried first; otherwise a trailing `-<digits>` is stripped
/// and the remainder is looked up as the parent region of a zone.
pub fn locate<'a>(regions: &'a [RegionInfo], location: &str) -> Option<(&'a RegionInfo, Option<String>)> {
    if let Some(region) = regions.iter().find(|r| r.id == location) {
        return Some((region, None));
    }
    let (prefix, suffix) = location.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    regions
        .iter()
        .find(|r| r.id == prefix)
        .map(|r| (r, Some(location.to_string())))
}
