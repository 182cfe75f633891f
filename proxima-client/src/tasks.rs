//! Task endpoints and the task status poller
//!
//! Mutating cluster calls return the UPID of a background task. The poller
//! re-fetches that task's status until it stops, the wait times out, or the
//! caller's context fires.

use std::time::Duration;

use async_trait::async_trait;
use proxima_core::dto::task::TaskLogQuery;
use proxima_core::{TaskLogLine, TaskStatus, Upid};
use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::context::CallContext;
use crate::error::{ClientError, Result};
use crate::retry::{Operation, RetryError};
use crate::ApiClient;

/// Granularity of the poller's sleep; cancellation is observed within one slice
pub const POLL_SLICE: Duration = Duration::from_millis(200);

/// Default time to wait for a dispatched task
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default interval between status fetches
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Anything that can report the status of a task by UPID
#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    /// Fetch the current status snapshot of a task
    async fn fetch_task_status(&self, upid: &str) -> Result<TaskStatus>;
}

/// Tweaks to how a finished task is judged and how fetch errors are handled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Treat `WARNINGS: n` exit statuses without errors as success
    pub ignore_warnings: bool,
    /// API status codes that mean "not visible yet" rather than failure
    pub tolerated_statuses: Vec<u16>,
}

impl WaitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_warnings(mut self) -> Self {
        self.ignore_warnings = true;
        self
    }

    /// Keep polling when a status fetch fails with this HTTP status
    ///
    /// A task may not be visible through the status endpoint right after
    /// creation; the server answers 400 until it is.
    pub fn tolerate_status(mut self, status: u16) -> Self {
        if !self.tolerated_statuses.contains(&status) {
            self.tolerated_statuses.push(status);
        }
        self
    }

    fn tolerates(&self, err: &ClientError) -> bool {
        err.status()
            .is_some_and(|status| self.tolerated_statuses.contains(&status))
    }

    /// Judge the exit status of a task that is no longer running
    fn check_exit(&self, upid: &str, status: &TaskStatus) -> Result<()> {
        if status.is_ok() || (self.ignore_warnings && status.has_only_warnings()) {
            return Ok(());
        }

        Err(ClientError::TaskFailed {
            upid: upid.to_string(),
            exit_status: status.exit_status().to_string(),
        })
    }
}

/// Wait until a task stops running
///
/// Status is fetched immediately and then on every `poll_interval` boundary.
/// Between fetches the poller sleeps in [`POLL_SLICE`] steps raced against
/// `ctx`. A fetch in flight is raced against `ctx` and `timeout` too. Fetch
/// errors are returned immediately unless their status code is tolerated by
/// `options`.
///
/// # Errors
/// * [`ClientError::TaskFailed`] if the task stopped with a non-`OK` exit status
/// * [`ClientError::TaskTimeout`] if it was still running after `timeout`
/// * [`ClientError::Cancelled`] or [`ClientError::DeadlineExceeded`] if `ctx` fired
pub async fn wait_for_task<S>(
    source: &S,
    ctx: &CallContext,
    upid: &str,
    timeout: Duration,
    poll_interval: Duration,
    options: &WaitOptions,
) -> Result<()>
where
    S: TaskStatusSource + ?Sized,
{
    let timed_out = || ClientError::TaskTimeout {
        upid: upid.to_string(),
        timeout,
    };

    // `None` means "never": the instant is beyond what the clock can represent
    let start = Instant::now();
    let give_up_at = start.checked_add(timeout);
    let mut next_poll = Some(start);

    loop {
        ctx.check()?;

        let now = Instant::now();
        if give_up_at.is_some_and(|at| now >= at) {
            return Err(timed_out());
        }

        if next_poll.is_some_and(|at| now >= at) {
            next_poll = now.checked_add(poll_interval);

            // A hung fetch must not outlive the caller or the wait itself
            let fetched = tokio::select! {
                biased;
                interrupt = ctx.done() => return Err(interrupt.into()),
                _ = sleep_until(give_up_at) => return Err(timed_out()),
                fetched = source.fetch_task_status(upid) => fetched,
            };

            match fetched {
                Ok(status) if !status.is_running() => {
                    debug!(%upid, exit_status = status.exit_status(), "task stopped");
                    return options.check_exit(upid, &status);
                }
                Ok(_) => trace!(%upid, "task still running"),
                Err(err) if options.tolerates(&err) => {
                    debug!(%upid, error = %err, "task status not available yet");
                }
                Err(err) => return Err(err),
            }
        }

        ctx.sleep(POLL_SLICE).await?;
    }
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// A mutating call that starts a task, plus how to wait for it
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub wait_options: WaitOptions,
}

impl TaskRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            timeout: DEFAULT_TASK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            wait_options: WaitOptions::default(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_wait_options(mut self, options: WaitOptions) -> Self {
        self.wait_options = options;
        self
    }
}

#[async_trait]
impl TaskStatusSource for ApiClient {
    async fn fetch_task_status(&self, upid: &str) -> Result<TaskStatus> {
        let url = self.task_url(upid, Some("status"))?;
        self.get_data::<_, ()>(url, None).await
    }
}

impl ApiClient {
    // =============================================================================
    // Task Operations
    // =============================================================================

    /// Wait for a task owned by any node of the cluster
    pub async fn wait_for_task(
        &self,
        ctx: &CallContext,
        upid: &str,
        timeout: Duration,
        poll_interval: Duration,
        options: &WaitOptions,
    ) -> Result<()> {
        wait_for_task(self, ctx, upid, timeout, poll_interval, options).await
    }

    /// Read the first `limit` lines of a task's log
    pub async fn task_log(&self, upid: &str, limit: u32) -> Result<Vec<TaskLogLine>> {
        let url = self.task_url(upid, Some("log"))?;
        let query = TaskLogQuery {
            limit,
            ..TaskLogQuery::default()
        };

        self.get_data(url, Some(&query)).await
    }

    /// Stop a running task, or remove a finished one from the task list
    ///
    /// A task that no longer exists counts as deleted.
    pub async fn delete_task(&self, upid: &str) -> Result<()> {
        let url = self.task_url(upid, None)?;

        match self.send::<Value, ()>(Method::DELETE, url, None).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Issue the mutating call of a task request
    ///
    /// Returns the UPID of the started task, or `None` when the server had
    /// nothing to start.
    pub async fn dispatch_task(&self, request: &TaskRequest) -> Result<Option<String>> {
        let upid: Option<String> = self
            .request(request.method.clone(), &request.path, request.body.as_ref())
            .await?;

        if let Some(upid) = &upid {
            // Reject garbage early instead of polling a path that cannot exist
            Upid::parse(upid)?;
            info!(%upid, path = %request.path, "task started");
        }

        Ok(upid)
    }

    /// Dispatch a task under `op`'s retry policy and wait for it to finish
    pub async fn execute_task(
        &self,
        ctx: &CallContext,
        op: &Operation,
        request: TaskRequest,
    ) -> std::result::Result<(), RetryError<ClientError>> {
        let timeout = request.timeout;
        let poll_interval = request.poll_interval;
        let options = &request.wait_options;

        op.do_task(
            ctx,
            || self.dispatch_task(&request),
            |upid| async move {
                wait_for_task(self, ctx, &upid, timeout, poll_interval, options).await
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const UPID: &str = "UPID:pve:00061CB3:010BA69C:64EFECB0:qmcreate:100:root@pam:";

    /// Replays scripted responses, then reports the task as running forever
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<TaskStatus>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<TaskStatus>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TaskStatusSource for ScriptedSource {
        async fn fetch_task_status(&self, _upid: &str) -> Result<TaskStatus> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(running()))
        }
    }

    fn status(status: &str, exit_status: Option<&str>) -> TaskStatus {
        TaskStatus {
            pid: Some(400563),
            status: status.to_string(),
            exit_status: exit_status.map(str::to_string),
            upid: Some(UPID.to_string()),
            node: Some("pve".to_string()),
            kind: Some("qmcreate".to_string()),
            user: Some("root@pam".to_string()),
        }
    }

    fn running() -> TaskStatus {
        status("running", None)
    }

    fn stopped(exit_status: &str) -> TaskStatus {
        status("stopped", Some(exit_status))
    }

    async fn wait(source: &ScriptedSource, ctx: &CallContext, options: &WaitOptions) -> Result<()> {
        wait_for_task(
            source,
            ctx,
            UPID,
            Duration::from_secs(30),
            Duration::from_secs(1),
            options,
        )
        .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_when_task_stops_ok() {
        let source = ScriptedSource::new(vec![Ok(running()), Ok(running()), Ok(stopped("OK"))]);
        let start = Instant::now();

        wait(&source, &CallContext::new(), &WaitOptions::default())
            .await
            .unwrap();

        assert_eq!(source.fetches(), 3);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_exit_status() {
        let source = ScriptedSource::new(vec![Ok(stopped(
            "command 'qm start 100' failed: exit code 1",
        ))]);

        let err = wait(&source, &CallContext::new(), &WaitOptions::default())
            .await
            .unwrap_err();

        match err {
            ClientError::TaskFailed { upid, exit_status } => {
                assert_eq!(upid, UPID);
                assert_eq!(exit_status, "command 'qm start 100' failed: exit code 1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_warnings() {
        let source = ScriptedSource::new(vec![Ok(stopped("WARNINGS: 2"))]);
        let err = wait(&source, &CallContext::new(), &WaitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::TaskFailed { .. }));

        let options = WaitOptions::new().ignore_warnings();

        let source = ScriptedSource::new(vec![Ok(stopped("WARNINGS: 2"))]);
        assert!(wait(&source, &CallContext::new(), &options).await.is_ok());

        let source = ScriptedSource::new(vec![Ok(stopped("WARNINGS: 1 ERROR: disk busy"))]);
        assert!(wait(&source, &CallContext::new(), &options).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_while_running() {
        let source = ScriptedSource::new(vec![]);
        let start = Instant::now();

        let err = wait_for_task(
            &source,
            &CallContext::new(),
            UPID,
            Duration::from_secs(3),
            Duration::from_secs(1),
            &WaitOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ClientError::TaskTimeout { ref upid, timeout }
                if upid == UPID && timeout == Duration::from_secs(3)
        ));
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!((3..=4).contains(&source.fetches()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_propagates_immediately() {
        let source = ScriptedSource::new(vec![
            Ok(running()),
            Err(ClientError::api_error(500, "Internal Server Error")),
        ]);

        let err = wait(&source, &CallContext::new(), &WaitOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::ApiError { status: 500, .. }));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tolerated_status_keeps_polling() {
        let source = ScriptedSource::new(vec![
            Err(ClientError::api_error(400, "no such task")),
            Err(ClientError::api_error(400, "no such task")),
            Ok(stopped("OK")),
        ]);
        let options = WaitOptions::new().tolerate_status(400).tolerate_status(400);
        assert_eq!(options.tolerated_statuses, vec![400]);

        wait(&source, &CallContext::new(), &options).await.unwrap();
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_observed_within_one_slice() {
        let source = ScriptedSource::new(vec![]);
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = wait(&source, &ctx, &WaitOptions::default()).await.unwrap_err();

        assert!(matches!(err, ClientError::Cancelled));
        assert!(start.elapsed() <= Duration::from_millis(1500) + POLL_SLICE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_context_deadline() {
        let source = ScriptedSource::new(vec![]);
        let ctx = CallContext::new().with_timeout(Duration::from_secs(2));

        let err = wait(&source, &ctx, &WaitOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_already_cancelled_context_does_not_fetch() {
        let source = ScriptedSource::new(vec![Ok(stopped("OK"))]);
        let ctx = CallContext::new();
        ctx.cancel();

        let err = wait(&source, &ctx, &WaitOptions::default()).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert_eq!(source.fetches(), 0);
    }

    #[test]
    fn test_task_request_builder() {
        let request = TaskRequest::post("nodes/pve/qemu/100/clone")
            .with_body(serde_json::json!({ "newid": 101 }))
            .with_timeout(Duration::from_secs(600))
            .with_poll_interval(Duration::from_secs(1))
            .with_wait_options(WaitOptions::new().ignore_warnings());

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "nodes/pve/qemu/100/clone");
        assert_eq!(request.body, Some(serde_json::json!({ "newid": 101 })));
        assert_eq!(request.timeout, Duration::from_secs(600));
        assert_eq!(request.poll_interval, Duration::from_secs(1));
        assert!(request.wait_options.ignore_warnings);

        let request = TaskRequest::delete("nodes/pve/qemu/100");
        assert_eq!(request.method, Method::DELETE);
        assert_eq!(request.timeout, DEFAULT_TASK_TIMEOUT);
        assert_eq!(request.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(TaskRequest::put("nodes/pve/qemu/100/resize").method, Method::PUT);
    }

    #[tokio::test]
    async fn test_invalid_upid_is_rejected_before_any_request() {
        let client = ApiClient::new(crate::ClientConfig::new("https://pve.invalid:8006")).unwrap();

        let err = client.fetch_task_status("not-a-upid").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpid(_)));

        let err = client.task_log("UPID:pve", 50).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpid(_)));
    }

    /// Answers only after every reasonable wait has given up
    struct HungSource;

    #[async_trait]
    impl TaskStatusSource for HungSource {
        async fn fetch_task_status(&self, _upid: &str) -> Result<TaskStatus> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(running())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_times_out() {
        let start = Instant::now();

        let err = wait_for_task(
            &HungSource,
            &CallContext::new(),
            UPID,
            Duration::from_secs(3),
            Duration::from_secs(1),
            &WaitOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::TaskTimeout { .. }));
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_fetch_observes_cancellation() {
        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = wait_for_task(
            &HungSource,
            &ctx,
            UPID,
            Duration::from_secs(30),
            Duration::from_secs(1),
            &WaitOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_intervals_do_not_overflow() {
        let source = ScriptedSource::new(vec![]);
        let ctx = CallContext::new().with_timeout(Duration::from_secs(2));

        let err = wait_for_task(
            &source,
            &ctx,
            UPID,
            Duration::MAX,
            Duration::MAX,
            &WaitOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ClientError::DeadlineExceeded));
        assert_eq!(source.fetches(), 1);
    }

    // =============================================================================
    // HTTP round trips against a canned server
    // =============================================================================

    const NO_WORKER_BODY: &str =
        r#"{"data":null,"message":"got no worker upid - start worker failed\n"}"#;

    const MISSING_CONFIG_BODY: &str =
        r#"{"data":{"status":"stopped","exitstatus":"unable to find configuration file"}}"#;

    /// Serve one canned `(status, body)` response per connection, in order
    ///
    /// Returns the endpoint and the `METHOD /path?query` line of every request
    /// received.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request_line = read_request(&mut stream).await;
                log.lock().unwrap().push(request_line);

                let response = format!(
                    "HTTP/1.1 {status} Canned\r\ncontent-type: application/json\r\n\
                     content-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (endpoint, seen)
    }

    /// Read a whole request and return its method and target
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let body_len = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + body_len {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }

        let mut request_line = head.split_whitespace();
        let method = request_line.next().unwrap_or_default();
        let target = request_line.next().unwrap_or_default();
        format!("{method} {target}")
    }

    fn client(endpoint: String) -> ApiClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        ApiClient::with_client(crate::ClientConfig::new(endpoint), http)
    }

    fn start_vm() -> TaskRequest {
        TaskRequest::post("nodes/pve/qemu/100/status/start")
            .with_timeout(Duration::from_secs(10))
            .with_poll_interval(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_execute_task_redispatches_after_no_worker() {
        let started: &'static str = format!(r#"{{"data":"{UPID}"}}"#).leak();
        let (endpoint, seen) = serve(vec![
            (500, NO_WORKER_BODY),
            (200, started),
            (200, r#"{"data":{"status":"stopped","exitstatus":"OK"}}"#),
        ])
        .await;
        let op = Operation::task("start VM 100").with_base_delay(Duration::from_millis(10));

        client(endpoint)
            .execute_task(&CallContext::new(), &op, start_vm())
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], "POST /api2/json/nodes/pve/qemu/100/status/start");
        assert_eq!(seen[1], seen[0]);
        assert!(seen[2].starts_with("GET /api2/json/nodes/pve/tasks/UPID:pve:00061CB3:"));
        assert!(seen[2].ends_with("/status"));
    }

    #[tokio::test]
    async fn test_execute_task_without_upid_skips_wait() {
        let (endpoint, seen) = serve(vec![(200, r#"{"data":null}"#)]).await;
        let op = Operation::task("start VM 100").with_base_delay(Duration::from_millis(10));

        client(endpoint)
            .execute_task(&CallContext::new(), &op, start_vm())
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_task_reports_failed_task_without_redispatch() {
        let started: &'static str = format!(r#"{{"data":"{UPID}"}}"#).leak();
        let (endpoint, seen) = serve(vec![
            (200, started),
            (200, MISSING_CONFIG_BODY),
        ])
        .await;
        let op = Operation::task("start VM 100").with_base_delay(Duration::from_millis(10));

        let err = client(endpoint)
            .execute_task(&CallContext::new(), &op, start_vm())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RetryError::Failed(ClientError::TaskFailed { ref exit_status, .. })
                if exit_status == "unable to find configuration file"
        ));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_garbage_upid() {
        let (endpoint, _) = serve(vec![(200, r#"{"data":"not a upid"}"#)]).await;

        let err = client(endpoint).dispatch_task(&start_vm()).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidUpid(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_task_is_ok() {
        let (endpoint, seen) = serve(vec![(404, "")]).await;

        client(endpoint).delete_task(UPID).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("DELETE /api2/json/nodes/pve/tasks/UPID:pve:"));
    }

    #[tokio::test]
    async fn test_task_log_sends_limit() {
        let (endpoint, seen) = serve(vec![(200, r#"{"data":[{"n":1,"t":"starting"}]}"#)]).await;

        let lines = client(endpoint).task_log(UPID, 20).await.unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "starting");
        let seen = seen.lock().unwrap().clone();
        assert!(seen[0].contains("/log?"));
        assert!(seen[0].contains("limit=20"));
    }
}
