//! ServiceClient - リトライ・フェイルオーバー・タイムアウトの実行器
//!
//! adapter は 1 回のリモート呼び出しをクロージャで渡し、
//! `RequestOptions` に従って何回・どのエンドポイントに送るかはここで決まります。
//!
//! # 設計原則
//! - リトライはこの層だけで行う（adapter / store では行わない）
//! - `maximum_execution_time` はリトライを含めた 1 呼び出し全体の上限
//! - secondary が設定されていなければ、全ての試行は primary に送る

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::domain::{RemoteError, StorageError, StorageResult};

use super::options::{Location, OperationContext, RequestKind, RequestOptions};

/// ServiceClient は 1 つのストレージサービスへの接続ハンドル
///
/// `S` は store の実装（通常は `Arc<dyn QueueStore>` など）。
pub struct ServiceClient<S> {
    service: &'static str,
    primary: S,
    secondary: Option<S>,
    options: RequestOptions,
}

impl<S: Send + Sync> ServiceClient<S> {
    pub fn new(service: &'static str, primary: S, options: RequestOptions) -> Self {
        Self {
            service,
            primary,
            secondary: None,
            options,
        }
    }

    /// Read replica used by `LocationMode::PrimaryThenSecondary`.
    pub fn with_secondary(mut self, secondary: S) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn primary(&self) -> &S {
        &self.primary
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    fn endpoint(&self, location: Location) -> (&S, Location) {
        match (location, &self.secondary) {
            (Location::Secondary, Some(secondary)) => (secondary, Location::Secondary),
            _ => (&self.primary, Location::Primary),
        }
    }

    /// Run `call` under the client's own options with a fresh context.
    pub async fn execute<'a, T, F>(
        &'a self,
        operation: &'static str,
        kind: RequestKind,
        call: F,
    ) -> StorageResult<T>
    where
        T: Send,
        F: FnMut(&'a S) -> BoxFuture<'a, Result<T, RemoteError>> + Send,
    {
        let context = OperationContext::new();
        self.execute_with(&self.options, &context, operation, kind, call)
            .await
    }

    /// Run `call` under explicit options, retrying retryable failures.
    ///
    /// # フロー
    /// 1. `location_mode` で今回の試行先を決める
    /// 2. 成功 → 返す
    /// 3. リトライ不可 or 上限到達 → `StorageError::Remote` をそのまま返す
    /// 4. それ以外 → backoff して 1 へ
    ///
    /// 全体が `maximum_execution_time` を超えたら `StorageError::Timeout`。
    pub async fn execute_with<'a, T, F>(
        &'a self,
        options: &RequestOptions,
        context: &OperationContext,
        operation: &'static str,
        kind: RequestKind,
        mut call: F,
    ) -> StorageResult<T>
    where
        T: Send,
        F: FnMut(&'a S) -> BoxFuture<'a, Result<T, RemoteError>> + Send,
    {
        let service = self.service;
        let attempts = async {
            let mut retries: u32 = 0;
            loop {
                let (store, location) = self.endpoint(options.location_mode.location_for(retries, kind));
                debug!(
                    service,
                    operation,
                    %location,
                    attempt = retries + 1,
                    client_request_id = %context.client_request_id,
                    "sending request"
                );

                let error = match call(store).await {
                    Ok(value) => return Ok(value),
                    Err(error) => error,
                };

                let Some(policy) = options.retry_policy.as_ref() else {
                    return Err(StorageError::Remote(error));
                };
                if !error.is_retryable() || retries >= policy.max_retries {
                    return Err(StorageError::Remote(error));
                }

                retries += 1;
                let delay = policy.delay_for(retries);
                warn!(
                    service,
                    operation,
                    %location,
                    retry = retries,
                    max_retries = policy.max_retries,
                    ?delay,
                    client_request_id = %context.client_request_id,
                    error = %error,
                    "retryable failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        };

        match options.maximum_execution_time {
            Some(limit) => tokio::time::timeout(limit, attempts)
                .await
                .map_err(|_| StorageError::Timeout { operation, limit })?,
            None => attempts.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ExponentialRetry, LocationMode};
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays scripted answers shared by both endpoints and records which
    /// endpoint answered each attempt.
    #[derive(Clone)]
    struct ScriptedEndpoint {
        label: &'static str,
        script: Arc<Mutex<VecDeque<Result<u32, RemoteError>>>>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedEndpoint {
        fn call(&self) -> BoxFuture<'_, Result<u32, RemoteError>> {
            async move {
                self.calls.lock().unwrap().push(self.label);
                self.script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(RemoteError::server_busy("script exhausted")))
            }
            .boxed()
        }
    }

    struct Harness {
        client: ServiceClient<ScriptedEndpoint>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    fn harness(
        script: Vec<Result<u32, RemoteError>>,
        options: RequestOptions,
        with_secondary: bool,
    ) -> Harness {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let calls = Arc::new(Mutex::new(Vec::new()));
        let endpoint = |label| ScriptedEndpoint {
            label,
            script: script.clone(),
            calls: calls.clone(),
        };
        let mut client = ServiceClient::new("test", endpoint("primary"), options);
        if with_secondary {
            client = client.with_secondary(endpoint("secondary"));
        }
        Harness { client, calls }
    }

    fn retrying() -> RequestOptions {
        RequestOptions::default()
            .with_retry_policy(ExponentialRetry::new(Duration::from_millis(100), 4))
            .with_location_mode(LocationMode::PrimaryThenSecondary)
    }

    fn busy() -> Result<u32, RemoteError> {
        Err(RemoteError::server_busy("try later"))
    }

    #[tokio::test(start_paused = true)]
    async fn reads_fail_over_between_primary_and_secondary() {
        let h = harness(vec![busy(), busy(), Ok(7)], retrying(), true);

        let value = h
            .client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(*h.calls.lock().unwrap(), vec!["primary", "secondary", "primary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_stay_on_primary() {
        let h = harness(vec![busy(), busy(), Ok(7)], retrying(), true);

        h.client
            .execute("write", RequestKind::Write, |s| s.call())
            .await
            .unwrap();

        assert_eq!(*h.calls.lock().unwrap(), vec!["primary", "primary", "primary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_stay_on_primary_without_a_secondary() {
        let h = harness(vec![busy(), Ok(1)], retrying(), false);

        h.client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap();

        assert_eq!(*h.calls.lock().unwrap(), vec!["primary", "primary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let h = harness(Vec::new(), retrying(), true);

        let err = h
            .client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap_err();

        assert_eq!(err.remote().and_then(|e| e.status), Some(503));
        // initial call + 4 retries
        assert_eq!(h.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_errors_are_not_retried() {
        let not_found = RemoteError::not_found("QueueNotFound", "no such queue");
        let h = harness(vec![Err(not_found.clone())], retrying(), true);

        let err = h
            .client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap_err();

        assert_eq!(err.remote(), Some(&not_found));
        assert_eq!(h.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_options_make_a_single_attempt() {
        let h = harness(vec![busy(), Ok(1)], RequestOptions::default(), true);

        let err = h
            .client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap_err();

        assert!(err.remote().is_some_and(RemoteError::is_retryable));
        assert_eq!(*h.calls.lock().unwrap(), vec!["primary"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded_by_maximum_execution_time() {
        let h = harness(Vec::new(), RequestOptions::resilient(), true);

        let err = h
            .client
            .execute("read", RequestKind::Read, |s| s.call())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::Timeout { operation: "read", limit } if limit == Duration::from_secs(20)
        ));
        // backoffs of roughly 3s, 6s and 12s straddle the 20s limit
        let calls = h.calls.lock().unwrap().len();
        assert!((2..=4).contains(&calls), "calls = {calls}");
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_options_override_client_defaults() {
        let h = harness(vec![busy(), Ok(3)], RequestOptions::default(), true);
        let context = OperationContext::with_client_request_id("req-1");

        let value = h
            .client
            .execute_with(&retrying(), &context, "read", RequestKind::Read, |s| s.call())
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(*h.calls.lock().unwrap(), vec!["primary", "secondary"]);
    }
}
