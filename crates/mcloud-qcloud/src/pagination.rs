//! Offset/limit page iteration.
//!
//! Every paged describe action follows the same loop: ask for `Limit` items
//! at `Offset = items so far`, stop once the reported total is reached or a
//! page comes back empty. Only the list and total paths differ per action.

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::{QcloudError, QcloudResult};
use crate::params::Params;
use crate::retry;
use serde::de::DeserializeOwned;
use std::future::Future;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PAGE_LIMIT: usize = 50;

/// Largest `Limit` a service accepts.
pub fn max_page_limit(service: Service) -> usize {
    match service {
        Service::Tag => 1000,
        Service::Dns => 3000,
        Service::Redis => 1000,
        _ => 100,
    }
}

/// Where a paged action keeps its items and its total.
#[derive(Debug, Clone)]
pub struct PageSpec {
    pub service: Service,
    pub action: &'static str,
    pub items_path: &'static str,
    pub total_path: &'static str,
    pub limit: usize,
}

impl PageSpec {
    pub fn new(service: Service, action: &'static str, items_path: &'static str) -> Self {
        Self {
            service,
            action,
            items_path,
            total_path: "TotalCount",
            limit: DEFAULT_PAGE_LIMIT.min(max_page_limit(service)),
        }
    }

    pub fn total_at(mut self, path: &'static str) -> Self {
        self.total_path = path;
        self
    }

    /// Requested page size, clamped to the service maximum.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, max_page_limit(self.service));
        self
    }
}

/// Drive `fetch(offset, limit) -> (page, total)` until exhausted.
pub async fn collect_pages<T, F, Fut>(
    limit: usize,
    cancel: &CancellationToken,
    mut fetch: F,
) -> QcloudResult<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = QcloudResult<(Vec<T>, usize)>>,
{
    let mut items = Vec::new();
    loop {
        retry::check_cancelled(cancel)?;
        let (page, total) = fetch(items.len(), limit).await?;
        let received = page.len();
        items.extend(page);
        if received == 0 || items.len() >= total {
            break;
        }
    }
    Ok(items)
}

/// Exactly one match for a lookup by unique id.
pub fn expect_single<T>(mut items: Vec<T>, what: &str, id: &str) -> QcloudResult<T> {
    match items.len() {
        0 => Err(QcloudError::not_found(format!("{} {}", what, id))),
        1 => Ok(items.remove(0)),
        n => Err(QcloudError::duplicate_id(format!("{} {} matched {} records", what, id, n))),
    }
}

impl QcloudClient {
    /// Fetch every page of `spec` in `region`.
    pub async fn list_all<T: DeserializeOwned>(
        &self,
        spec: &PageSpec,
        params: Params,
        region: Option<&str>,
    ) -> QcloudResult<Vec<T>> {
        collect_pages(spec.limit, self.cancellation_token(), |offset, limit| {
            let mut page_params = params.clone();
            page_params.set("Offset", offset).set("Limit", limit);
            async move {
                let payload = self
                    .request(spec.service, spec.action, page_params, region)
                    .await?;
                let items = payload.list(spec.items_path)?;
                let total = payload.total_count(spec.total_path)?;
                Ok((items, total))
            }
        })
        .await
    }

    /// One page of `spec` starting at `offset`, with the reported total.
    pub async fn list_page<T: DeserializeOwned>(
        &self,
        spec: &PageSpec,
        mut params: Params,
        region: Option<&str>,
        offset: usize,
    ) -> QcloudResult<(Vec<T>, usize)> {
        params.set("Offset", offset).set("Limit", spec.limit);
        let payload = self.request(spec.service, spec.action, params, region).await?;
        Ok((payload.list(spec.items_path)?, payload.total_count(spec.total_path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::scripted_client;
    use crate::error::ErrorKind;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn two_pages_by_offset() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Items": ["a", "b"], "TotalCount": 3})).await;
        wire.push_json(json!({"Items": ["c"], "TotalCount": 3})).await;

        let spec = PageSpec::new(Service::Cvm, "DescribeInstances", "Items").limit(2);
        let items: Vec<String> = client
            .list_all(&spec, Params::new(), Some("ap-beijing"))
            .await
            .unwrap();
        assert_eq!(items, vec!["a", "b", "c"]);

        let reqs = wire.requests().await;
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].param("Offset").as_deref(), Some("0"));
        assert_eq!(reqs[1].param("Offset").as_deref(), Some("2"));
        assert_eq!(reqs[1].param("Limit").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn empty_page_stops_even_if_total_lies() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"DiskSet": [{"DiskId": "disk-1"}], "TotalCount": "10"})).await;
        wire.push_json(json!({"DiskSet": [], "TotalCount": "10"})).await;
        let spec = PageSpec::new(Service::Cbs, "DescribeDisks", "DiskSet");
        let items: Vec<Value> = client.list_all(&spec, Params::new(), None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(wire.request_count().await, 2);
    }

    #[tokio::test]
    async fn null_total_is_zero() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"DomainList": null, "DomainCountInfo": {"AllTotal": null}})).await;
        let spec = PageSpec::new(Service::Dns, "DescribeDomainList", "DomainList")
            .total_at("DomainCountInfo.AllTotal");
        let items: Vec<Value> = client.list_all(&spec, Params::new(), None).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(wire.request_count().await, 1);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageSpec::new(Service::Vpc, "DescribeVpcs", "VpcSet").limit(500).limit, 100);
        assert_eq!(PageSpec::new(Service::Tag, "DescribeProjects", "Projects").limit(1000).limit, 1000);
        assert_eq!(PageSpec::new(Service::Cvm, "DescribeInstances", "InstanceSet").limit(0).limit, 1);
    }

    #[tokio::test]
    async fn iterations_are_bounded() {
        let cancel = CancellationToken::new();
        let total = 7;
        let mut calls = 0;
        let items = collect_pages(3, &cancel, |offset, limit| {
            calls += 1;
            let page: Vec<usize> = (offset..(offset + limit).min(total)).collect();
            async move { Ok((page, total)) }
        })
        .await
        .unwrap();
        assert_eq!(items, (0..7).collect::<Vec<_>>());
        assert!(calls <= total.div_ceil(3) + 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_page() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = collect_pages::<u8, _, _>(10, &cancel, |_, _| async { Ok((vec![1], 5)) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }

    #[test]
    fn single_match_cardinality() {
        assert_eq!(expect_single(vec![1], "vpc", "v").unwrap(), 1);
        assert_eq!(
            expect_single::<u8>(vec![], "vpc", "v").unwrap_err().kind,
            ErrorKind::NotFound
        );
        assert_eq!(
            expect_single(vec![1, 2], "vpc", "v").unwrap_err().kind,
            ErrorKind::DuplicateId
        );
    }
}
