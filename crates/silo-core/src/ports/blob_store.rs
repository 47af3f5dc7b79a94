//! BlobStore port - オブジェクトストレージ
//!
//! 不在は値として返します（`bool` / `Option`）。put と delete の条件評価は
//! ストア側で原子的に行われます。

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    AccessCondition, Blob, BlobName, BlobProperties, ContainerName, DeleteSnapshots, RemoteError,
};

/// BlobStore はコンテナ単位の blob 操作を提供
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// `true` when the container was created by this call.
    async fn create_container_if_not_exists(
        &self,
        container: &ContainerName,
    ) -> Result<bool, RemoteError>;

    /// `true` when the container existed and was deleted.
    async fn delete_container_if_exists(
        &self,
        container: &ContainerName,
    ) -> Result<bool, RemoteError>;

    async fn container_exists(&self, container: &ContainerName) -> Result<bool, RemoteError>;

    /// Write the blob if `condition` holds.
    ///
    /// A missing container is a 404. `If-None-Match: *` against an existing
    /// blob is a 409 `BlobAlreadyExists`; any other unmet condition is a 412.
    async fn put_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
        data: Bytes,
        content_type: &str,
        condition: &AccessCondition,
    ) -> Result<BlobProperties, RemoteError>;

    async fn get_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<Option<Blob>, RemoteError>;

    async fn blob_properties(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<Option<BlobProperties>, RemoteError>;

    /// Take a read-only snapshot; returns the snapshot id.
    async fn snapshot_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<String, RemoteError>;

    /// `true` when the blob existed.
    async fn delete_blob_if_exists(
        &self,
        container: &ContainerName,
        name: &BlobName,
        snapshots: DeleteSnapshots,
        condition: &AccessCondition,
    ) -> Result<bool, RemoteError>;
}
