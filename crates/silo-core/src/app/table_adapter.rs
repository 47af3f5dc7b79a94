//! TableStorageAdapter - エンティティテーブルの操作
//!
//! # 書き込みの意味論
//! - `insert(.., throw_on_existing = true)`: 条件付き insert（既存キーは `DuplicateKey`）
//! - `insert(.., throw_on_existing = false)`: insert-or-replace（後勝ち）
//! - `batch_write`: 1 パーティション・最大 100 件の原子的バッチ。制約の検証はストア側
//!
//! # 全件取得
//! `get_all` は continuation token を最後まで辿り、全ページをメモリに載せます。
//! 小〜中規模のテーブル向けです。

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::absent_on_not_found;
use crate::app::builder::AdapterBuilder;
use crate::client::{RequestKind, RequestOptions, ServiceClient};
use crate::domain::{DynamicEntity, EntityKey, StorageError, StorageResult, TableEntity, TableName};
use crate::ports::{TableOperation, TableStore};

#[derive(Clone)]
pub struct TableStorageAdapter {
    client: Arc<ServiceClient<Arc<dyn TableStore>>>,
}

impl TableStorageAdapter {
    pub fn builder(connection_string: impl Into<String>) -> AdapterBuilder<dyn TableStore> {
        AdapterBuilder::new(connection_string)
    }

    pub(crate) fn new(client: ServiceClient<Arc<dyn TableStore>>) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn request_options(&self) -> &RequestOptions {
        self.client.options()
    }

    pub async fn create_table(&self, table: &str) -> StorageResult<()> {
        let table = TableName::parse(table)?;
        let created = self
            .client
            .execute("create_table", RequestKind::Write, |s| {
                s.create_table_if_not_exists(&table)
            })
            .await?;
        if created {
            info!(%table, "table created");
        }
        Ok(())
    }

    /// Delete the table and its entities; absence is success.
    pub async fn delete_table(&self, table: &str) -> StorageResult<()> {
        let table = TableName::parse(table)?;
        let deleted = self
            .client
            .execute("delete_table", RequestKind::Write, |s| {
                s.delete_table_if_exists(&table)
            })
            .await?;
        info!(%table, deleted, "table delete requested");
        Ok(())
    }

    pub async fn exists(&self, table: &str) -> StorageResult<bool> {
        let table = TableName::parse(table)?;
        self.client
            .execute("table_exists", RequestKind::Read, |s| s.table_exists(&table))
            .await
    }

    /// Write one entity in a single atomic call.
    ///
    /// With `throw_on_existing`, a taken key fails with
    /// `StorageError::DuplicateKey` and the stored entity is left untouched.
    /// Otherwise the entity replaces whatever is stored under its key.
    pub async fn insert<T: TableEntity>(
        &self,
        table: &str,
        entity: &T,
        throw_on_existing: bool,
    ) -> StorageResult<()> {
        let table = TableName::parse(table)?;
        let dynamic = DynamicEntity::from_entity(entity)?;
        let key = dynamic.key.clone();

        let written = self
            .client
            .execute("insert", RequestKind::Write, |s| {
                let operation = if throw_on_existing {
                    TableOperation::Insert(dynamic.clone())
                } else {
                    TableOperation::InsertOrReplace(dynamic.clone())
                };
                s.execute(&table, operation)
            })
            .await;

        match written {
            Ok(()) => {
                debug!(
                    %table,
                    partition_key = %key.partition_key,
                    row_key = %key.row_key,
                    "entity written"
                );
                Ok(())
            }
            Err(StorageError::Remote(e)) if throw_on_existing && e.is_conflict() => {
                Err(StorageError::DuplicateKey {
                    table: table.to_string(),
                    partition_key: key.partition_key,
                    row_key: key.row_key,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Write all entities in one atomic batch, merged into or replacing the
    /// stored entities. An empty slice is a no-op.
    pub async fn batch_write<T: TableEntity>(
        &self,
        table: &str,
        entities: &[T],
        merge: bool,
    ) -> StorageResult<()> {
        let table = TableName::parse(table)?;
        if entities.is_empty() {
            debug!(%table, "empty batch, nothing to write");
            return Ok(());
        }

        let operations = entities
            .iter()
            .map(|entity| {
                let dynamic = DynamicEntity::from_entity(entity)?;
                Ok(if merge {
                    TableOperation::InsertOrMerge(dynamic)
                } else {
                    TableOperation::InsertOrReplace(dynamic)
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;
        let count = operations.len();

        self.client
            .execute("batch_write", RequestKind::Write, |s| {
                s.execute_batch(&table, operations.clone())
            })
            .await?;
        debug!(%table, count, merge, "batch written");
        Ok(())
    }

    /// The entity stored under the key, or `None` when it (or the table) is
    /// absent.
    pub async fn retrieve<T: TableEntity>(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<T>> {
        self.retrieve_dynamic(table, partition_key, row_key)
            .await?
            .map(DynamicEntity::into_entity)
            .transpose()
    }

    pub async fn retrieve_dynamic(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> StorageResult<Option<DynamicEntity>> {
        let table = TableName::parse(table)?;
        let key = EntityKey::new(partition_key, row_key);
        key.validate()?;

        absent_on_not_found(
            self.client
                .execute("retrieve", RequestKind::Read, |s| s.retrieve(&table, &key))
                .await,
        )
    }

    /// Every entity in the table, in key order. All pages are buffered.
    pub async fn get_all<T: TableEntity>(&self, table: &str) -> StorageResult<Vec<T>> {
        self.get_all_dynamic(table)
            .await?
            .into_iter()
            .map(DynamicEntity::into_entity)
            .collect()
    }

    pub async fn get_all_dynamic(&self, table: &str) -> StorageResult<Vec<DynamicEntity>> {
        let table = TableName::parse(table)?;
        let mut entities = Vec::new();
        let mut continuation = None;
        let mut pages = 0usize;

        loop {
            let segment = self
                .client
                .execute("get_all", RequestKind::Read, |s| {
                    s.query_segment(&table, continuation.clone())
                })
                .await?;
            pages += 1;
            entities.extend(segment.entities);
            match segment.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        debug!(%table, pages, count = entities.len(), "table scanned");
        Ok(entities)
    }
}
