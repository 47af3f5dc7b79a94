//! AdapterBuilder - adapter の構築とワイヤリング
//!
//! # 設計原則
//! - 接続文字列・リクエストオプション・secondary store を 1 か所で組み立てる
//! - 起動時検証（Fail-fast 設計）: 不正な設定は `build()` で `BuildError` になる
//! - サービスごとの既定値（blob はリトライなし、queue / table は resilient）

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::info;

use crate::app::{BlobStorageAdapter, QueueStorageAdapter, TableStorageAdapter};
use crate::client::{LocationMode, RequestOptions, ServiceClient};
use crate::config::{Service, StorageAccount};
use crate::domain::{DEFAULT_SAS_EXPIRY_MINUTES, StorageError};
use crate::ports::{BlobStore, Clock, QueueStore, SystemClock, TableStore};

/// BuildError は adapter 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid storage account: {0}")]
    Account(#[from] StorageError),

    #[error("default SAS expiry must be at least one minute")]
    InvalidSasExpiry,

    #[error("maximum execution time must be greater than zero")]
    InvalidExecutionTime,

    #[error("retry multiplier must be at least 1.0, got {0}")]
    InvalidRetryMultiplier(f64),

    #[error("a secondary store was configured but the location mode is PrimaryOnly")]
    UnusedSecondary,
}

/// AdapterBuilder は adapter を構築
///
/// `S` は store の trait object 型（`dyn BlobStore` など）で、
/// どの adapter を組み立てるかを決めます。
///
/// # 使用例
/// ```ignore
/// let queues = QueueStorageAdapter::builder("UseDevelopmentStorage=true")
///     .secondary(Arc::new(store.replica()))
///     .build(Arc::new(store))?;
/// ```
pub struct AdapterBuilder<S: ?Sized> {
    connection_string: String,
    request_options: Option<RequestOptions>,
    secondary: Option<Arc<S>>,
    auto_create_container: bool,
    default_sas_expiry_minutes: u32,
    clock: Arc<dyn Clock>,
    _store: PhantomData<fn() -> Box<S>>,
}

impl<S: ?Sized> AdapterBuilder<S> {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            request_options: None,
            secondary: None,
            auto_create_container: true,
            default_sas_expiry_minutes: DEFAULT_SAS_EXPIRY_MINUTES,
            clock: Arc::new(SystemClock),
            _store: PhantomData,
        }
    }

    /// Replace the service's default retry / failover / timeout policy.
    pub fn request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = Some(options);
        self
    }

    /// Read replica used when the location mode allows failover.
    pub fn secondary(mut self, store: Arc<S>) -> Self {
        self.secondary = Some(store);
        self
    }

    /// 共通の検証と ServiceClient の組み立て
    fn client(
        &mut self,
        service: Service,
        primary: Arc<S>,
        defaults: RequestOptions,
    ) -> Result<(Arc<StorageAccount>, ServiceClient<Arc<S>>), BuildError>
    where
        S: Send + Sync,
    {
        let account = StorageAccount::parse(&self.connection_string)?;
        let endpoint = account.endpoint(service)?.primary.clone();
        let options = self.request_options.take().unwrap_or(defaults);

        if options.maximum_execution_time.is_some_and(|limit| limit.is_zero()) {
            return Err(BuildError::InvalidExecutionTime);
        }
        if let Some(policy) = &options.retry_policy
            && policy.multiplier < 1.0
        {
            return Err(BuildError::InvalidRetryMultiplier(policy.multiplier));
        }
        if self.secondary.is_some() && options.location_mode == LocationMode::PrimaryOnly {
            return Err(BuildError::UnusedSecondary);
        }

        info!(
            service = service.name(),
            endpoint = %endpoint,
            location_mode = ?options.location_mode,
            retries = options.retry_policy.as_ref().map_or(0, |p| p.max_retries),
            "storage adapter ready"
        );

        let mut client = ServiceClient::new(service.name(), primary, options);
        if let Some(secondary) = self.secondary.take() {
            client = client.with_secondary(secondary);
        }
        Ok((Arc::new(account), client))
    }
}

impl AdapterBuilder<dyn BlobStore> {
    /// Fail uploads into missing containers instead of creating them.
    pub fn prevent_auto_creation(mut self) -> Self {
        self.auto_create_container = false;
        self
    }

    /// Lifetime of the access tokens returned by uploads.
    pub fn default_sas_expiry_minutes(mut self, minutes: u32) -> Self {
        self.default_sas_expiry_minutes = minutes;
        self
    }

    /// Clock used to compute token expiry.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Blob は既定でリトライなし・primary のみ
    pub fn build(mut self, store: Arc<dyn BlobStore>) -> Result<BlobStorageAdapter, BuildError> {
        if self.default_sas_expiry_minutes == 0 {
            return Err(BuildError::InvalidSasExpiry);
        }
        let (account, client) = self.client(Service::Blob, store, RequestOptions::default())?;
        Ok(BlobStorageAdapter::new(
            account,
            client,
            self.auto_create_container,
            self.default_sas_expiry_minutes,
            self.clock,
        ))
    }
}

impl AdapterBuilder<dyn QueueStore> {
    pub fn build(mut self, store: Arc<dyn QueueStore>) -> Result<QueueStorageAdapter, BuildError> {
        let (_, client) = self.client(Service::Queue, store, RequestOptions::resilient())?;
        Ok(QueueStorageAdapter::new(client))
    }
}

impl AdapterBuilder<dyn TableStore> {
    pub fn build(mut self, store: Arc<dyn TableStore>) -> Result<TableStorageAdapter, BuildError> {
        let (_, client) = self.client(Service::Table, store, RequestOptions::resilient())?;
        Ok(TableStorageAdapter::new(client))
    }
}
