//! BlobStorageAdapter - コンテナと blob の操作
//!
//! # 設計原則
//! - 既定では上書きしない（先に書いた方が勝つ）。判定は条件付き put で原子的に行う
//! - アップロードのたびに読み取り専用の SAS を新しく発行する（保存しない）
//! - 不在はエラーではなく値（`bool` / `Option`）
//!
//! # 使用例
//! ```ignore
//! let blobs = BlobStorageAdapter::builder(connection_string).build(store)?;
//! let url = blobs
//!     .upload("images", "cat.png", bytes.into(), "image/png", UploadOptions::default())
//!     .await?;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use url::Url;

use crate::app::absent_on_not_found;
use crate::app::builder::AdapterBuilder;
use crate::client::{OperationContext, RequestKind, RequestOptions, ServiceClient};
use crate::config::StorageAccount;
use crate::domain::sas::sign_blob_token;
use crate::domain::{
    AccessCondition, BlobName, BlobPayload, BlobProperties, ContainerName, DeleteSnapshots,
    SharedAccessPolicy, StorageError, StorageResult,
};
use crate::ports::{BlobStore, Clock};

/// Whether an upload returns a tokenized URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SasRequest {
    /// A token with the adapter's default lifetime.
    #[default]
    AdapterDefault,
    ExpiresInMinutes(u32),
    /// The bare blob URL.
    Omit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Replace an existing blob instead of leaving it untouched.
    pub overwrite: bool,
    pub sas: SasRequest,
}

impl UploadOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }

    pub fn with_sas_expiry_minutes(mut self, minutes: u32) -> Self {
        self.sas = SasRequest::ExpiresInMinutes(minutes);
        self
    }

    pub fn without_sas(mut self) -> Self {
        self.sas = SasRequest::Omit;
        self
    }
}

/// Options for `destroy_with`.
#[derive(Debug, Clone, Default)]
pub struct DeleteBlobOptions {
    pub snapshots: DeleteSnapshots,
    pub condition: AccessCondition,
    /// Overrides the adapter's request options for this call.
    pub request_options: Option<RequestOptions>,
    pub context: Option<OperationContext>,
}

/// BlobStorageAdapter は任意のコンテナの blob を扱う
#[derive(Clone)]
pub struct BlobStorageAdapter {
    account: Arc<StorageAccount>,
    client: Arc<ServiceClient<Arc<dyn BlobStore>>>,
    auto_create_container: bool,
    default_sas_expiry_minutes: u32,
    clock: Arc<dyn Clock>,
}

impl BlobStorageAdapter {
    pub fn builder(connection_string: impl Into<String>) -> AdapterBuilder<dyn BlobStore> {
        AdapterBuilder::new(connection_string)
    }

    pub(crate) fn new(
        account: Arc<StorageAccount>,
        client: ServiceClient<Arc<dyn BlobStore>>,
        auto_create_container: bool,
        default_sas_expiry_minutes: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            account,
            client: Arc::new(client),
            auto_create_container,
            default_sas_expiry_minutes,
            clock,
        }
    }

    pub fn request_options(&self) -> &RequestOptions {
        self.client.options()
    }

    /// An adapter bound to one container.
    pub fn container(&self, container: &str) -> StorageResult<BlobContainerAdapter> {
        Ok(BlobContainerAdapter {
            blobs: self.clone(),
            container: ContainerName::parse(container)?,
        })
    }

    // ========================================
    // コンテナ
    // ========================================

    pub async fn create_container(&self, container: &str) -> StorageResult<()> {
        self.create_container_named(&ContainerName::parse(container)?).await
    }

    async fn create_container_named(&self, container: &ContainerName) -> StorageResult<()> {
        let created = self
            .client
            .execute("create_container", RequestKind::Write, |s| {
                s.create_container_if_not_exists(container)
            })
            .await?;
        if created {
            info!(%container, "container created");
        }
        Ok(())
    }

    /// Delete the container and everything in it; absence is success.
    pub async fn delete_container(&self, container: &str) -> StorageResult<()> {
        self.delete_container_named(&ContainerName::parse(container)?).await
    }

    async fn delete_container_named(&self, container: &ContainerName) -> StorageResult<()> {
        let deleted = self
            .client
            .execute("delete_container", RequestKind::Write, |s| {
                s.delete_container_if_exists(container)
            })
            .await?;
        info!(%container, deleted, "container delete requested");
        Ok(())
    }

    pub async fn container_exists(&self, container: &str) -> StorageResult<bool> {
        self.container_exists_named(&ContainerName::parse(container)?).await
    }

    async fn container_exists_named(&self, container: &ContainerName) -> StorageResult<bool> {
        self.client
            .execute("container_exists", RequestKind::Read, |s| {
                s.container_exists(container)
            })
            .await
    }

    // ========================================
    // Blob
    // ========================================

    /// Upload a blob and return its URL, with a fresh read-only token unless
    /// `options.sas` is `Omit`.
    ///
    /// Without `overwrite`, an existing blob is left untouched and the call
    /// still succeeds.
    pub async fn upload(
        &self,
        container: &str,
        name: &str,
        payload: BlobPayload,
        content_type: &str,
        options: UploadOptions,
    ) -> StorageResult<Url> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.upload_named(&container, &name, payload, content_type, options)
            .await
    }

    async fn upload_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
        payload: BlobPayload,
        content_type: &str,
        options: UploadOptions,
    ) -> StorageResult<Url> {
        let data = payload.into_bytes()?;
        let sas_minutes = self.sas_minutes(options.sas)?;
        if sas_minutes.is_some() {
            self.account.shared_key()?;
        }

        if self.auto_create_container {
            self.create_container_named(container).await?;
        }

        let condition = if options.overwrite {
            AccessCondition::default()
        } else {
            AccessCondition::if_not_exists()
        };
        let written = self
            .client
            .execute("upload", RequestKind::Write, |s| {
                s.put_blob(container, name, data.clone(), content_type, &condition)
            })
            .await;
        match written {
            Ok(properties) => {
                debug!(
                    %container,
                    blob = %name,
                    etag = %properties.etag,
                    bytes = properties.content_length,
                    "blob uploaded"
                );
            }
            Err(StorageError::Remote(e))
                if !options.overwrite && (e.is_conflict() || e.is_precondition_failed()) =>
            {
                info!(%container, blob = %name, "blob already exists, upload skipped");
            }
            Err(e) => return Err(e),
        }

        match sas_minutes {
            Some(minutes) => self.signed_url(container, name, minutes),
            None => self.account.blob_url(container, name),
        }
    }

    /// A fresh read-only URL for a blob, without contacting the store.
    pub fn access_url(
        &self,
        container: &str,
        name: &str,
        expiry_minutes: Option<u32>,
    ) -> StorageResult<Url> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.access_url_named(&container, &name, expiry_minutes)
    }

    fn access_url_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
        expiry_minutes: Option<u32>,
    ) -> StorageResult<Url> {
        let minutes = expiry_minutes.unwrap_or(self.default_sas_expiry_minutes);
        self.signed_url(container, name, minutes)
    }

    /// Delete the blob if present; absence is success.
    pub async fn destroy(&self, container: &str, name: &str) -> StorageResult<()> {
        self.destroy_with(container, name, DeleteBlobOptions::default())
            .await
    }

    /// Delete with a snapshot policy and access conditions. Unmet
    /// conditions and snapshot conflicts propagate.
    pub async fn destroy_with(
        &self,
        container: &str,
        name: &str,
        options: DeleteBlobOptions,
    ) -> StorageResult<()> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.destroy_named(&container, &name, options).await
    }

    async fn destroy_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
        options: DeleteBlobOptions,
    ) -> StorageResult<()> {
        let request_options = options
            .request_options
            .as_ref()
            .unwrap_or_else(|| self.client.options());
        let context = options.context.unwrap_or_default();
        let snapshots = options.snapshots;
        let condition = &options.condition;

        let deleted = self
            .client
            .execute_with(request_options, &context, "destroy", RequestKind::Write, |s| {
                s.delete_blob_if_exists(container, name, snapshots, condition)
            })
            .await?;
        info!(
            %container,
            blob = %name,
            deleted,
            client_request_id = %context.client_request_id,
            "blob delete requested"
        );
        Ok(())
    }

    pub async fn exists(&self, container: &str, name: &str) -> StorageResult<bool> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        Ok(self.properties_named(&container, &name).await?.is_some())
    }

    /// Blob contents, or `None` when the blob or its container is absent.
    pub async fn download(&self, container: &str, name: &str) -> StorageResult<Option<Bytes>> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.download_named(&container, &name).await
    }

    async fn download_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> StorageResult<Option<Bytes>> {
        let blob = absent_on_not_found(
            self.client
                .execute("download", RequestKind::Read, |s| s.get_blob(container, name))
                .await,
        )?;
        Ok(blob.map(|b| b.data))
    }

    pub async fn properties(
        &self,
        container: &str,
        name: &str,
    ) -> StorageResult<Option<BlobProperties>> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.properties_named(&container, &name).await
    }

    async fn properties_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> StorageResult<Option<BlobProperties>> {
        absent_on_not_found(
            self.client
                .execute("properties", RequestKind::Read, |s| {
                    s.blob_properties(container, name)
                })
                .await,
        )
    }

    /// Take a read-only snapshot and return its id.
    pub async fn snapshot(&self, container: &str, name: &str) -> StorageResult<String> {
        let container = ContainerName::parse(container)?;
        let name = BlobName::parse(name)?;
        self.snapshot_named(&container, &name).await
    }

    async fn snapshot_named(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> StorageResult<String> {
        let id = self
            .client
            .execute("snapshot", RequestKind::Write, |s| {
                s.snapshot_blob(container, name)
            })
            .await?;
        info!(%container, blob = %name, snapshot = %id, "snapshot taken");
        Ok(id)
    }

    fn sas_minutes(&self, request: SasRequest) -> StorageResult<Option<u32>> {
        let minutes = match request {
            SasRequest::AdapterDefault => self.default_sas_expiry_minutes,
            SasRequest::ExpiresInMinutes(minutes) => minutes,
            SasRequest::Omit => return Ok(None),
        };
        if minutes == 0 {
            return Err(StorageError::invalid_argument(
                "shared access expiry must be at least one minute",
            ));
        }
        Ok(Some(minutes))
    }

    fn signed_url(
        &self,
        container: &ContainerName,
        name: &BlobName,
        minutes: u32,
    ) -> StorageResult<Url> {
        let (account_name, key) = self.account.shared_key()?;
        let policy = SharedAccessPolicy::read_only(self.clock.now(), minutes)?;
        let token = sign_blob_token(account_name, key, container, name, &policy)?;

        let mut url = self.account.blob_url(container, name)?;
        url.set_query(Some(token.as_query()));
        debug!(
            %container,
            blob = %name,
            expires_on = %token.expires_on(),
            "access token issued"
        );
        Ok(url)
    }
}

/// BlobContainerAdapter は 1 つのコンテナに束縛された adapter
#[derive(Clone)]
pub struct BlobContainerAdapter {
    blobs: BlobStorageAdapter,
    container: ContainerName,
}

impl BlobContainerAdapter {
    pub fn name(&self) -> &ContainerName {
        &self.container
    }

    pub async fn create(&self) -> StorageResult<()> {
        self.blobs.create_container_named(&self.container).await
    }

    pub async fn delete(&self) -> StorageResult<()> {
        self.blobs.delete_container_named(&self.container).await
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        self.blobs.container_exists_named(&self.container).await
    }

    pub async fn upload(
        &self,
        name: &str,
        payload: BlobPayload,
        content_type: &str,
        options: UploadOptions,
    ) -> StorageResult<Url> {
        let name = BlobName::parse(name)?;
        self.blobs
            .upload_named(&self.container, &name, payload, content_type, options)
            .await
    }

    pub async fn destroy(&self, name: &str) -> StorageResult<()> {
        self.destroy_with(name, DeleteBlobOptions::default()).await
    }

    pub async fn destroy_with(&self, name: &str, options: DeleteBlobOptions) -> StorageResult<()> {
        let name = BlobName::parse(name)?;
        self.blobs.destroy_named(&self.container, &name, options).await
    }

    pub async fn blob_exists(&self, name: &str) -> StorageResult<bool> {
        let name = BlobName::parse(name)?;
        Ok(self
            .blobs
            .properties_named(&self.container, &name)
            .await?
            .is_some())
    }

    pub async fn download(&self, name: &str) -> StorageResult<Option<Bytes>> {
        let name = BlobName::parse(name)?;
        self.blobs.download_named(&self.container, &name).await
    }

    pub async fn properties(&self, name: &str) -> StorageResult<Option<BlobProperties>> {
        let name = BlobName::parse(name)?;
        self.blobs.properties_named(&self.container, &name).await
    }

    pub async fn snapshot(&self, name: &str) -> StorageResult<String> {
        let name = BlobName::parse(name)?;
        self.blobs.snapshot_named(&self.container, &name).await
    }

    pub fn access_url(&self, name: &str, expiry_minutes: Option<u32>) -> StorageResult<Url> {
        let name = BlobName::parse(name)?;
        self.blobs
            .access_url_named(&self.container, &name, expiry_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ETag, RemoteError};
    use crate::impls::InMemoryBlobStore;
    use crate::ports::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    const CONNECTION_STRING: &str =
        "DefaultEndpointsProtocol=https;AccountName=myaccount;AccountKey=c2VjcmV0";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn setup() -> (BlobStorageAdapter, InMemoryBlobStore) {
        let store = InMemoryBlobStore::new();
        let adapter = BlobStorageAdapter::builder(CONNECTION_STRING)
            .clock(FixedClock::new(start()))
            .build(Arc::new(store.clone()))
            .unwrap();
        (adapter, store)
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    fn text(s: &str) -> BlobPayload {
        BlobPayload::from(s.as_bytes())
    }

    #[tokio::test]
    async fn first_upload_wins_without_overwrite() {
        let (blobs, _) = setup();

        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();
        blobs
            .upload("docs", "x.txt", text("B"), "text/plain", UploadOptions::default())
            .await
            .unwrap();

        let data = blobs.download("docs", "x.txt").await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"A")));
    }

    #[tokio::test]
    async fn overwrite_replaces_existing_blob() {
        let (blobs, _) = setup();

        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();
        blobs
            .upload("docs", "x.txt", text("B"), "text/csv", UploadOptions::overwrite())
            .await
            .unwrap();

        assert_eq!(
            blobs.download("docs", "x.txt").await.unwrap(),
            Some(Bytes::from_static(b"B"))
        );
        let props = blobs.properties("docs", "x.txt").await.unwrap().unwrap();
        assert_eq!(props.content_type, "text/csv");
    }

    #[tokio::test]
    async fn upload_returns_url_with_read_only_token() {
        let (blobs, _) = setup();

        let url = blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(url.host_str(), Some("myaccount.blob.core.windows.net"));
        assert_eq!(url.path(), "/docs/x.txt");
        let params = query(&url);
        assert_eq!(params["sp"], "r");
        assert_eq!(params["se"], "2024-01-01T12:30:00Z");
        assert!(params.contains_key("sig"));
    }

    #[tokio::test]
    async fn token_expiry_can_be_overridden_or_omitted() {
        let (blobs, _) = setup();

        let url = blobs
            .upload(
                "docs",
                "x.txt",
                text("A"),
                "text/plain",
                UploadOptions::default().with_sas_expiry_minutes(5),
            )
            .await
            .unwrap();
        assert_eq!(query(&url)["se"], "2024-01-01T12:05:00Z");

        let bare = blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default().without_sas())
            .await
            .unwrap();
        assert_eq!(bare.query(), None);
    }

    #[tokio::test]
    async fn adapter_default_expiry_is_configurable() {
        let store = InMemoryBlobStore::new();
        let blobs = BlobStorageAdapter::builder(CONNECTION_STRING)
            .clock(FixedClock::new(start()))
            .default_sas_expiry_minutes(60)
            .build(Arc::new(store))
            .unwrap();

        let url = blobs.access_url("docs", "x.txt", None).unwrap();
        assert_eq!(query(&url)["se"], "2024-01-01T13:00:00Z");

        let err = blobs.access_url("docs", "x.txt", Some(0)).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn base64_payloads_are_decoded() {
        let (blobs, _) = setup();

        blobs
            .upload("docs", "hello.txt", BlobPayload::base64("aGVsbG8="), "text/plain", UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(
            blobs.download("docs", "hello.txt").await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_any_remote_call() {
        let (blobs, store) = setup();

        let err = blobs
            .upload("docs", "x.txt", BlobPayload::base64("%%%"), "text/plain", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = blobs
            .upload("Bad_Container", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        let err = blobs
            .upload(
                "docs",
                "x.txt",
                text("A"),
                "text/plain",
                UploadOptions::default().with_sas_expiry_minutes(0),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));

        assert_eq!(store.faults().calls(), 0);
    }

    #[tokio::test]
    async fn keyless_account_cannot_issue_tokens() {
        let store = InMemoryBlobStore::new();
        let blobs = BlobStorageAdapter::builder("AccountName=myaccount")
            .build(Arc::new(store.clone()))
            .unwrap();

        let err = blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert_eq!(store.faults().calls(), 0);

        let url = blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default().without_sas())
            .await
            .unwrap();
        assert_eq!(url.as_str(), "https://myaccount.blob.core.windows.net/docs/x.txt");
    }

    #[tokio::test]
    async fn upload_creates_the_container_unless_prevented() {
        let (blobs, _) = setup();
        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();
        assert!(blobs.container_exists("docs").await.unwrap());

        let strict = BlobStorageAdapter::builder(CONNECTION_STRING)
            .prevent_auto_creation()
            .build(Arc::new(InMemoryBlobStore::new()))
            .unwrap();
        let err = strict
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_not_found));
    }

    #[tokio::test]
    async fn deleting_absent_resources_succeeds() {
        let (blobs, _) = setup();

        blobs.destroy("docs", "x.txt").await.unwrap();
        blobs.delete_container("docs").await.unwrap();

        assert!(!blobs.exists("docs", "x.txt").await.unwrap());
        assert!(!blobs.container_exists("docs").await.unwrap());
        assert_eq!(blobs.download("docs", "x.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn destroy_removes_the_blob() {
        let (blobs, _) = setup();
        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();

        blobs.destroy("docs", "x.txt").await.unwrap();
        assert!(!blobs.exists("docs", "x.txt").await.unwrap());
        assert!(blobs.container_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn destroy_with_snapshot_policy() {
        let (blobs, _) = setup();
        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();
        blobs.snapshot("docs", "x.txt").await.unwrap();

        let err = blobs.destroy("docs", "x.txt").await.unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_conflict));

        let options = DeleteBlobOptions {
            snapshots: DeleteSnapshots::Include,
            context: Some(OperationContext::with_client_request_id("cleanup-1")),
            ..DeleteBlobOptions::default()
        };
        blobs.destroy_with("docs", "x.txt", options).await.unwrap();
        assert!(!blobs.exists("docs", "x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn destroy_with_stale_etag_fails() {
        let (blobs, _) = setup();
        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();

        let options = DeleteBlobOptions {
            condition: AccessCondition::if_match(ETag::new("\"stale\"")),
            ..DeleteBlobOptions::default()
        };
        let err = blobs.destroy_with("docs", "x.txt", options).await.unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_precondition_failed));

        let current = blobs.properties("docs", "x.txt").await.unwrap().unwrap();
        let options = DeleteBlobOptions {
            condition: AccessCondition::if_match(current.etag),
            ..DeleteBlobOptions::default()
        };
        blobs.destroy_with("docs", "x.txt", options).await.unwrap();
        assert!(!blobs.exists("docs", "x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn blob_calls_are_not_retried_by_default() {
        let (blobs, store) = setup();
        store.faults().push(RemoteError::server_busy("busy"));

        let err = blobs.container_exists("docs").await.unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_retryable));
        assert_eq!(store.faults().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn per_call_request_options_enable_retries() {
        let (blobs, store) = setup();
        blobs
            .upload("docs", "x.txt", text("A"), "text/plain", UploadOptions::default())
            .await
            .unwrap();
        store.faults().push_many(RemoteError::server_busy("busy"), 2);

        let options = DeleteBlobOptions {
            request_options: Some(RequestOptions::resilient()),
            ..DeleteBlobOptions::default()
        };
        blobs.destroy_with("docs", "x.txt", options).await.unwrap();
        assert!(!blobs.exists("docs", "x.txt").await.unwrap());
    }

    #[tokio::test]
    async fn container_adapter_scopes_every_call() {
        let (blobs, _) = setup();
        let docs = blobs.container("docs").unwrap();
        assert_eq!(docs.name().as_str(), "docs");

        docs.create().await.unwrap();
        let url = docs
            .upload("reports/2024.csv", text("a,b"), "text/csv", UploadOptions::default().without_sas())
            .await
            .unwrap();
        assert_eq!(url.path(), "/docs/reports/2024.csv");
        assert!(docs.blob_exists("reports/2024.csv").await.unwrap());
        assert_eq!(
            docs.download("reports/2024.csv").await.unwrap(),
            Some(Bytes::from_static(b"a,b"))
        );

        let signed = docs.access_url("reports/2024.csv", Some(10)).unwrap();
        assert_eq!(query(&signed)["se"], "2024-01-01T12:10:00Z");

        docs.destroy("reports/2024.csv").await.unwrap();
        assert!(docs.properties("reports/2024.csv").await.unwrap().is_none());

        docs.delete().await.unwrap();
        assert!(!docs.exists().await.unwrap());
        assert!(blobs.container("Not_Valid").is_err());
    }

    #[tokio::test]
    async fn snapshot_of_missing_blob_is_not_found() {
        let (blobs, _) = setup();
        blobs.create_container("docs").await.unwrap();
        let err = blobs.snapshot("docs", "missing.txt").await.unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_not_found));
    }
}
