//! TableStore port - エンティティテーブル
//!
//! 単一操作・バッチ・セグメント単位のクエリを提供します。
//! バッチは原子的（全て成功するか、何も適用されない）。

use async_trait::async_trait;

use crate::domain::{DynamicEntity, EntityKey, RemoteError, TableName};

/// A single write against one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum TableOperation {
    /// Fails with 409 `EntityAlreadyExists` when the key is taken.
    Insert(DynamicEntity),
    /// Requires an existing entity; honours the entity's ETag when set.
    Replace(DynamicEntity),
    /// Requires an existing entity; honours the entity's ETag when set.
    Merge(DynamicEntity),
    InsertOrReplace(DynamicEntity),
    InsertOrMerge(DynamicEntity),
    Delete(EntityKey),
}

impl TableOperation {
    pub fn key(&self) -> &EntityKey {
        match self {
            TableOperation::Insert(e)
            | TableOperation::Replace(e)
            | TableOperation::Merge(e)
            | TableOperation::InsertOrReplace(e)
            | TableOperation::InsertOrMerge(e) => &e.key,
            TableOperation::Delete(key) => key,
        }
    }
}

/// Opaque cursor to the next page of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySegment {
    pub entities: Vec<DynamicEntity>,
    pub continuation: Option<ContinuationToken>,
}

/// TableStore は (PartitionKey, RowKey) でキー付けされたエンティティを管理
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn create_table_if_not_exists(&self, table: &TableName) -> Result<bool, RemoteError>;

    async fn delete_table_if_exists(&self, table: &TableName) -> Result<bool, RemoteError>;

    async fn table_exists(&self, table: &TableName) -> Result<bool, RemoteError>;

    async fn execute(&self, table: &TableName, operation: TableOperation)
    -> Result<(), RemoteError>;

    /// All-or-nothing. Batch constraints (one partition, at most 100
    /// operations, each key once) are the store's to enforce.
    async fn execute_batch(
        &self,
        table: &TableName,
        operations: Vec<TableOperation>,
    ) -> Result<(), RemoteError>;

    async fn retrieve(
        &self,
        table: &TableName,
        key: &EntityKey,
    ) -> Result<Option<DynamicEntity>, RemoteError>;

    /// Entities in key order, starting at `continuation` when given.
    async fn query_segment(
        &self,
        table: &TableName,
        continuation: Option<ContinuationToken>,
    ) -> Result<QuerySegment, RemoteError>;
}
