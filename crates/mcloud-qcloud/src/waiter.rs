//! Long-running task observation.
//!
//! Create/delete style actions hand back either an `AsyncRequestId` (the
//! database family) or a `TaskId` (VPC, load balancer, Redis). Each protocol
//! implements [`PollTask`]; [`wait_task`] drives any of them to a terminal
//! state with an interval and a deadline.

use crate::client::QcloudClient;
use crate::endpoint::Service;
use crate::error::{ErrorKind, QcloudError, QcloudResult};
use crate::params::Params;
use crate::retry;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Done,
    Failed(String),
    Running,
}

/// Poll interval and overall deadline for one wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitSpec {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitSpec {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    pub const fn secs(interval: u64, timeout: u64) -> Self {
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }
}

/// One pollable remote task.
#[async_trait::async_trait]
pub trait PollTask: Send + Sync {
    /// Label used in logs and errors.
    fn describe(&self) -> String;

    async fn poll(&self) -> QcloudResult<TaskState>;
}

/// Poll `task` until it is done, failed or past its deadline.
///
/// The remote task is never cancelled on timeout.
pub async fn wait_task<P: PollTask + ?Sized>(
    task: &P,
    spec: WaitSpec,
    cancel: &CancellationToken,
) -> QcloudResult<()> {
    let deadline = Instant::now() + spec.timeout;
    loop {
        retry::check_cancelled(cancel)?;
        match task.poll().await? {
            TaskState::Done => return Ok(()),
            TaskState::Failed(message) => {
                return Err(QcloudError::vendor(ErrorKind::Unknown, "TaskFailed", &message)
                    .with_action(&task.describe()))
            }
            TaskState::Running => {
                log::debug!("{} still running", task.describe());
            }
        }
        if Instant::now() + spec.interval > deadline {
            return Err(QcloudError::timeout(format!(
                "{} not finished after {}s",
                task.describe(),
                spec.timeout.as_secs()
            )));
        }
        retry::pause(spec.interval, cancel).await?;
    }
}

/// Poll `check` until it reports true, e.g. a freshly created resource
/// becoming visible to describe calls.
pub async fn wait_until<F, Fut>(
    what: &str,
    spec: WaitSpec,
    cancel: &CancellationToken,
    mut check: F,
) -> QcloudResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QcloudResult<bool>>,
{
    let deadline = Instant::now() + spec.timeout;
    loop {
        retry::check_cancelled(cancel)?;
        if check().await? {
            return Ok(());
        }
        if Instant::now() + spec.interval > deadline {
            return Err(QcloudError::timeout(format!(
                "{} not reached after {}s",
                what,
                spec.timeout.as_secs()
            )));
        }
        retry::pause(spec.interval, cancel).await?;
    }
}

/// Re-run `call` while it fails with one of `codes`, e.g. an order already
/// being processed for the account.
pub async fn retry_on_codes<T, F, Fut>(
    codes: &[&str],
    spec: WaitSpec,
    cancel: &CancellationToken,
    mut call: F,
) -> QcloudResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QcloudResult<T>>,
{
    let deadline = Instant::now() + spec.timeout;
    loop {
        retry::check_cancelled(cancel)?;
        match call().await {
            Err(e) if e.is_code(codes) && Instant::now() + spec.interval <= deadline => {
                log::warn!("{} - retrying in {}s", e, spec.interval.as_secs());
                retry::pause(spec.interval, cancel).await?;
            }
            other => return other,
        }
    }
}

// ── Task protocols ──────────────────────────────────────────────────────

/// Map a reported task state, compared case-insensitively, onto [`TaskState`].
/// Anything unrecognised keeps the waiter polling.
pub fn reported_state(reported: &str) -> TaskState {
    match reported.trim().to_ascii_uppercase().as_str() {
        "SUCCESS" | "SUCCEED" | "0" => TaskState::Done,
        "FAILED" | "KILLED" | "REMOVED" | "PAUSED" | "ERROR" | "1" => {
            TaskState::Failed(reported.to_string())
        }
        _ => TaskState::Running,
    }
}

/// Database-family `DescribeAsyncRequestInfo` (`Status`, `Info`).
pub struct AsyncRequestTask {
    client: QcloudClient,
    service: Service,
    region: String,
    request_id: String,
}

impl AsyncRequestTask {
    /// Default pacing for instance creation.
    pub const WAIT: WaitSpec = WaitSpec::secs(10, 20 * 60);

    pub fn new(client: &QcloudClient, service: Service, region: &str, request_id: &str) -> Self {
        Self {
            client: client.clone(),
            service,
            region: region.to_string(),
            request_id: request_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for AsyncRequestTask {
    fn describe(&self) -> String {
        format!("async request {}", self.request_id)
    }

    async fn poll(&self) -> QcloudResult<TaskState> {
        let params = Params::new().with("AsyncRequestId", &self.request_id);
        let payload = self
            .client
            .request(self.service, "DescribeAsyncRequestInfo", params, Some(&self.region))
            .await?;
        let status = payload.string("Status").unwrap_or_default();
        let info = payload.string("Info").unwrap_or_default();
        Ok(match reported_state(&status) {
            TaskState::Failed(_) => TaskState::Failed(format!("{}: {}", status, info)),
            state => state,
        })
    }
}

/// VPC-family `DescribeTaskResult` (`Result`).
pub struct VpcTask {
    client: QcloudClient,
    region: String,
    task_id: String,
}

impl VpcTask {
    pub const WAIT: WaitSpec = WaitSpec::secs(5, 3 * 60);

    pub fn new(client: &QcloudClient, region: &str, task_id: &str) -> Self {
        Self {
            client: client.clone(),
            region: region.to_string(),
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for VpcTask {
    fn describe(&self) -> String {
        format!("vpc task {}", self.task_id)
    }

    async fn poll(&self) -> QcloudResult<TaskState> {
        let params = Params::new().with("TaskId", &self.task_id);
        let payload = self
            .client
            .request(Service::Vpc, "DescribeTaskResult", params, Some(&self.region))
            .await?;
        let result = payload.string("Result").unwrap_or_default();
        Ok(match reported_state(&result) {
            TaskState::Failed(_) => TaskState::Failed(format!("task {} {}", self.task_id, result)),
            state => state,
        })
    }
}

/// Load balancer `DescribeTaskStatus` (`Status`: 0 done, 1 failed, 2 running).
pub struct ClbTask {
    client: QcloudClient,
    region: String,
    task_id: String,
}

impl ClbTask {
    pub const WAIT: WaitSpec = WaitSpec::secs(5, 2 * 60);

    pub fn new(client: &QcloudClient, region: &str, task_id: &str) -> Self {
        Self {
            client: client.clone(),
            region: region.to_string(),
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for ClbTask {
    fn describe(&self) -> String {
        format!("clb task {}", self.task_id)
    }

    async fn poll(&self) -> QcloudResult<TaskState> {
        let params = Params::new().with("TaskId", &self.task_id);
        let payload = self
            .client
            .request(Service::Clb, "DescribeTaskStatus", params, Some(&self.region))
            .await?;
        Ok(match reported_state(&payload.string("Status").unwrap_or_default()) {
            TaskState::Failed(_) => TaskState::Failed(format!("task {} failed", self.task_id)),
            state => state,
        })
    }
}

/// Redis `DescribeTaskInfo` (`Status`: succeed / failed / error).
pub struct RedisTask {
    client: QcloudClient,
    region: String,
    task_id: String,
}

impl RedisTask {
    pub const WAIT: WaitSpec = WaitSpec::secs(5, 15 * 60);

    pub fn new(client: &QcloudClient, region: &str, task_id: &str) -> Self {
        Self {
            client: client.clone(),
            region: region.to_string(),
            task_id: task_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl PollTask for RedisTask {
    fn describe(&self) -> String {
        format!("redis task {}", self.task_id)
    }

    async fn poll(&self) -> QcloudResult<TaskState> {
        let params = Params::new().with("TaskId", &self.task_id);
        let payload = self
            .client
            .request(Service::Redis, "DescribeTaskInfo", params, Some(&self.region))
            .await?;
        let status = payload.string("Status").unwrap_or_default();
        Ok(match reported_state(&status) {
            TaskState::Failed(_) => TaskState::Failed(format!("task {} {}", self.task_id, status)),
            state => state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::scripted_client;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn async_request_running_twice_then_success() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Status": "RUNNING", "Info": ""})).await;
        wire.push_json(json!({"Status": "RUNNING", "Info": ""})).await;
        wire.push_json(json!({"Status": "SUCCESS", "Info": "ok"})).await;

        let task = AsyncRequestTask::new(&client, Service::Cdb, "ap-beijing", "r-1");
        let start = Instant::now();
        wait_task(&task, AsyncRequestTask::WAIT, client.cancellation_token())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(20));

        let reqs = wire.requests().await;
        assert_eq!(reqs.len(), 3);
        assert!(reqs.iter().all(|r| r.action() == Some("DescribeAsyncRequestInfo")));
        assert_eq!(reqs[0].param("AsyncRequestId").as_deref(), Some("r-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_surfaces_message() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Status": "KILLED", "Info": "quota exceeded"})).await;
        let task = AsyncRequestTask::new(&client, Service::Cdb, "ap-beijing", "r-2");
        let err = wait_task(&task, AsyncRequestTask::WAIT, client.cancellation_token())
            .await
            .unwrap_err();
        assert!(err.message.contains("quota exceeded"));
        assert_eq!(err.code, "TaskFailed");
    }

    #[tokio::test(start_paused = true)]
    async fn async_request_error_state_fails_first_poll() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Status": "error", "Info": "create failed"})).await;
        for _ in 0..5 {
            wire.push_json(json!({"Status": "RUNNING", "Info": ""})).await;
        }
        let task = AsyncRequestTask::new(&client, Service::Cdb, "ap-beijing", "r-3");
        let start = Instant::now();
        let err = wait_task(&task, AsyncRequestTask::WAIT, client.cancellation_token())
            .await
            .unwrap_err();
        assert_eq!(err.code, "TaskFailed");
        assert!(err.message.contains("create failed"));
        assert_eq!(wire.request_count().await, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn vpc_task_knows_every_failed_name() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Result": "RUNNING"})).await;
        wire.push_json(json!({"Result": "killed"})).await;
        let task = VpcTask::new(&client, "ap-guangzhou", "t-9");
        let err = wait_task(&task, VpcTask::WAIT, client.cancellation_token())
            .await
            .unwrap_err();
        assert_eq!(err.code, "TaskFailed");
        assert_eq!(wire.request_count().await, 2);
    }

    #[test]
    fn reported_states() {
        assert_eq!(reported_state("SUCCESS"), TaskState::Done);
        assert_eq!(reported_state("succeed"), TaskState::Done);
        assert_eq!(reported_state("0"), TaskState::Done);
        for failed in ["FAILED", "Killed", "REMOVED", "paused", "error", "1"] {
            assert!(matches!(reported_state(failed), TaskState::Failed(_)), "{}", failed);
        }
        assert_eq!(reported_state("RUNNING"), TaskState::Running);
        assert_eq!(reported_state("2"), TaskState::Running);
        assert_eq!(reported_state(""), TaskState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn clb_numeric_states() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Status": 2})).await;
        wire.push_json(json!({"Status": 0})).await;
        let task = ClbTask::new(&client, "ap-guangzhou", "t-1");
        wait_task(&task, ClbTask::WAIT, client.cancellation_token())
            .await
            .unwrap();
        assert_eq!(wire.request_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn redis_error_is_failure() {
        let (client, wire, _) = scripted_client(false);
        wire.push_json(json!({"Status": "error"})).await;
        let task = RedisTask::new(&client, "ap-guangzhou", "42");
        let err = wait_task(&task, RedisTask::WAIT, client.cancellation_token())
            .await
            .unwrap_err();
        assert_eq!(err.code, "TaskFailed");
    }

    struct Forever(AtomicUsize);

    #[async_trait::async_trait]
    impl PollTask for Forever {
        fn describe(&self) -> String {
            "forever".to_string()
        }

        async fn poll(&self) -> QcloudResult<TaskState> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(TaskState::Running)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_gives_timeout() {
        let task = Forever(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let err = wait_task(&task, WaitSpec::secs(5, 60), &cancel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(task.0.load(Ordering::SeqCst), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_shortens_sleep() {
        let task = Forever(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        let err = wait_task(&task, WaitSpec::secs(10, 600), &cancel).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_visible() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        wait_until("disk visible", WaitSpec::secs(2, 30), &cancel, || async {
            Ok(calls.fetch_add(1, Ordering::SeqCst) >= 2)
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_on_codes_until_clear() {
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let out = retry_on_codes(
            &["OperationDenied.OtherOderInProcess"],
            WaitSpec::secs(20, 600),
            &cancel,
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(QcloudError::vendor(
                        ErrorKind::Unknown,
                        "OperationDenied.OtherOderInProcess",
                        "busy",
                    ))
                } else {
                    Ok(7)
                }
            },
        )
        .await
        .unwrap();
        assert_eq!(out, 7);
    }
}
