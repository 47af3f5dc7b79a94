//! InMemoryBlobStore - 開発用の blob ストア
//!
//! # 実装詳細
//! - コンテナ名 → (blob 名 → blob) の 2 段の BTreeMap
//! - 条件付き put / delete はロックの中で評価する（原子的）
//! - `replica()` は状態を共有し、失敗注入だけ独立したハンドルを返す

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::SecondsFormat;
use tokio::sync::Mutex;

use crate::domain::{
    AccessCondition, Blob, BlobName, BlobProperties, ContainerName, DeleteSnapshots, RemoteError,
};
use crate::impls::FaultInjector;
use crate::ports::{BlobStore, Clock, IdGenerator, SystemClock, UlidGenerator};

struct StoredBlob {
    data: Bytes,
    properties: BlobProperties,
    /// snapshot id → (data, properties at snapshot time)
    snapshots: BTreeMap<String, Blob>,
}

impl StoredBlob {
    fn to_blob(&self) -> Blob {
        Blob {
            data: self.data.clone(),
            properties: self.properties.clone(),
        }
    }
}

#[derive(Default)]
struct State {
    containers: HashMap<String, BTreeMap<String, StoredBlob>>,
}

fn container_not_found(container: &ContainerName) -> RemoteError {
    RemoteError::not_found(
        "ContainerNotFound",
        format!("The specified container {container} does not exist."),
    )
}

fn blob_not_found(name: &BlobName) -> RemoteError {
    RemoteError::not_found("BlobNotFound", format!("The specified blob {name} does not exist."))
}

fn condition_not_met() -> RemoteError {
    RemoteError::precondition_failed(
        "ConditionNotMet",
        "The condition specified using HTTP conditional header(s) is not met.",
    )
}

#[derive(Clone)]
pub struct InMemoryBlobStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    faults: FaultInjector,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock: Arc::new(clock),
            faults: FaultInjector::default(),
        }
    }

    /// A handle on the same data with its own fault injector.
    pub fn replica(&self) -> Self {
        Self {
            faults: FaultInjector::default(),
            ..self.clone()
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Snapshot ids of a blob, oldest first.
    pub async fn snapshot_ids(&self, container: &ContainerName, name: &BlobName) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .containers
            .get(container.as_str())
            .and_then(|blobs| blobs.get(name.as_str()))
            .map(|blob| blob.snapshots.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn create_container_if_not_exists(
        &self,
        container: &ContainerName,
    ) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        if state.containers.contains_key(container.as_str()) {
            return Ok(false);
        }
        state
            .containers
            .insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn delete_container_if_exists(
        &self,
        container: &ContainerName,
    ) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        Ok(state.containers.remove(container.as_str()).is_some())
    }

    async fn container_exists(&self, container: &ContainerName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        Ok(state.containers.contains_key(container.as_str()))
    }

    async fn put_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
        data: Bytes,
        content_type: &str,
        condition: &AccessCondition,
    ) -> Result<BlobProperties, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        let blobs = state
            .containers
            .get_mut(container.as_str())
            .ok_or_else(|| container_not_found(container))?;

        let existing = blobs.get(name.as_str());
        if !condition.is_satisfied_by(existing.map(|b| &b.properties)) {
            if existing.is_some() && condition.if_none_match.as_ref().is_some_and(|e| e.is_any()) {
                return Err(RemoteError::conflict(
                    "BlobAlreadyExists",
                    "The specified blob already exists.",
                ));
            }
            return Err(condition_not_met());
        }

        let properties = BlobProperties {
            content_type: content_type.to_string(),
            content_length: data.len() as u64,
            etag: self.ids.generate_etag(),
            last_modified: self.clock.now(),
        };
        let snapshots = blobs
            .remove(name.as_str())
            .map(|previous| previous.snapshots)
            .unwrap_or_default();
        blobs.insert(
            name.to_string(),
            StoredBlob {
                data,
                properties: properties.clone(),
                snapshots,
            },
        );
        Ok(properties)
    }

    async fn get_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<Option<Blob>, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        let blobs = state
            .containers
            .get(container.as_str())
            .ok_or_else(|| container_not_found(container))?;
        Ok(blobs.get(name.as_str()).map(StoredBlob::to_blob))
    }

    async fn blob_properties(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<Option<BlobProperties>, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        let blobs = state
            .containers
            .get(container.as_str())
            .ok_or_else(|| container_not_found(container))?;
        Ok(blobs.get(name.as_str()).map(|b| b.properties.clone()))
    }

    async fn snapshot_blob(
        &self,
        container: &ContainerName,
        name: &BlobName,
    ) -> Result<String, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        let blob = state
            .containers
            .get_mut(container.as_str())
            .ok_or_else(|| container_not_found(container))?
            .get_mut(name.as_str())
            .ok_or_else(|| blob_not_found(name))?;

        let mut taken_at = self.clock.now();
        let mut id = taken_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        while blob.snapshots.contains_key(&id) {
            taken_at += chrono::Duration::nanoseconds(1);
            id = taken_at.to_rfc3339_opts(SecondsFormat::Nanos, true);
        }
        let copy = blob.to_blob();
        blob.snapshots.insert(id.clone(), copy);
        Ok(id)
    }

    async fn delete_blob_if_exists(
        &self,
        container: &ContainerName,
        name: &BlobName,
        snapshots: DeleteSnapshots,
        condition: &AccessCondition,
    ) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        let Some(blobs) = state.containers.get_mut(container.as_str()) else {
            return Ok(false);
        };
        let Some(blob) = blobs.get_mut(name.as_str()) else {
            return Ok(false);
        };
        if !condition.is_satisfied_by(Some(&blob.properties)) {
            return Err(condition_not_met());
        }

        match snapshots {
            DeleteSnapshots::None if !blob.snapshots.is_empty() => Err(RemoteError::conflict(
                "SnapshotsPresent",
                "This operation is not permitted because the blob has snapshots.",
            )),
            DeleteSnapshots::None | DeleteSnapshots::Include => {
                blobs.remove(name.as_str());
                Ok(true)
            }
            DeleteSnapshots::Only => {
                blob.snapshots.clear();
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ETag;

    fn names() -> (ContainerName, BlobName) {
        (
            ContainerName::parse("images").unwrap(),
            BlobName::parse("cat.png").unwrap(),
        )
    }

    async fn store_with_blob() -> (InMemoryBlobStore, ContainerName, BlobName, BlobProperties) {
        let store = InMemoryBlobStore::new();
        let (container, name) = names();
        store.create_container_if_not_exists(&container).await.unwrap();
        let props = store
            .put_blob(
                &container,
                &name,
                Bytes::from_static(b"A"),
                "text/plain",
                &AccessCondition::default(),
            )
            .await
            .unwrap();
        (store, container, name, props)
    }

    #[tokio::test]
    async fn container_lifecycle() {
        let store = InMemoryBlobStore::new();
        let (container, _) = names();

        assert!(store.create_container_if_not_exists(&container).await.unwrap());
        assert!(!store.create_container_if_not_exists(&container).await.unwrap());
        assert!(store.container_exists(&container).await.unwrap());
        assert!(store.delete_container_if_exists(&container).await.unwrap());
        assert!(!store.delete_container_if_exists(&container).await.unwrap());
        assert!(!store.container_exists(&container).await.unwrap());
    }

    #[tokio::test]
    async fn put_into_missing_container_is_not_found() {
        let store = InMemoryBlobStore::new();
        let (container, name) = names();

        let err = store
            .put_blob(&container, &name, Bytes::new(), "text/plain", &AccessCondition::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn if_none_match_any_conflicts_with_existing_blob() {
        let (store, container, name, _) = store_with_blob().await;

        let err = store
            .put_blob(
                &container,
                &name,
                Bytes::from_static(b"B"),
                "text/plain",
                &AccessCondition::if_not_exists(),
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let blob = store.get_blob(&container, &name).await.unwrap().unwrap();
        assert_eq!(blob.data, Bytes::from_static(b"A"));
    }

    #[tokio::test]
    async fn stale_etag_fails_the_precondition() {
        let (store, container, name, _) = store_with_blob().await;

        let err = store
            .put_blob(
                &container,
                &name,
                Bytes::from_static(b"B"),
                "text/plain",
                &AccessCondition::if_match(ETag::new("\"stale\"")),
            )
            .await
            .unwrap_err();
        assert!(err.is_precondition_failed());
    }

    #[tokio::test]
    async fn every_write_gets_a_new_etag() {
        let (store, container, name, first) = store_with_blob().await;

        let second = store
            .put_blob(
                &container,
                &name,
                Bytes::from_static(b"BB"),
                "text/csv",
                &AccessCondition::if_match(first.etag.clone()),
            )
            .await
            .unwrap();

        assert_ne!(first.etag, second.etag);
        assert_eq!(second.content_length, 2);
        assert_eq!(second.content_type, "text/csv");
    }

    #[tokio::test]
    async fn snapshots_block_plain_delete() {
        let (store, container, name, _) = store_with_blob().await;
        store.snapshot_blob(&container, &name).await.unwrap();
        store.snapshot_blob(&container, &name).await.unwrap();
        assert_eq!(store.snapshot_ids(&container, &name).await.len(), 2);

        let err = store
            .delete_blob_if_exists(&container, &name, DeleteSnapshots::None, &AccessCondition::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "SnapshotsPresent");

        assert!(
            store
                .delete_blob_if_exists(&container, &name, DeleteSnapshots::Only, &AccessCondition::default())
                .await
                .unwrap()
        );
        assert!(store.snapshot_ids(&container, &name).await.is_empty());
        assert!(store.get_blob(&container, &name).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_with_snapshots_removes_everything() {
        let (store, container, name, _) = store_with_blob().await;
        store.snapshot_blob(&container, &name).await.unwrap();

        assert!(
            store
                .delete_blob_if_exists(&container, &name, DeleteSnapshots::Include, &AccessCondition::default())
                .await
                .unwrap()
        );
        assert!(store.get_blob(&container, &name).await.unwrap().is_none());
        assert!(
            !store
                .delete_blob_if_exists(&container, &name, DeleteSnapshots::Include, &AccessCondition::default())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn delete_in_missing_container_reports_absence() {
        let store = InMemoryBlobStore::new();
        let (container, name) = names();
        assert!(
            !store
                .delete_blob_if_exists(&container, &name, DeleteSnapshots::None, &AccessCondition::default())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn replica_shares_data_but_not_faults() {
        let (store, container, name, _) = store_with_blob().await;
        let replica = store.replica();
        store.faults().push(RemoteError::server_busy("primary down"));

        assert!(replica.get_blob(&container, &name).await.unwrap().is_some());
        assert!(store.get_blob(&container, &name).await.is_err());
    }
}
