//! InMemoryTableStore - 開発用のエンティティテーブル
//!
//! # 実装詳細
//! - テーブル名 → BTreeMap<EntityKey, DynamicEntity>（キー順）
//! - 書き込みのたびに Timestamp と ETag を割り当てる
//! - バッチは複製したテーブルに適用し、全て成功したときだけ差し替える
//! - クエリは `page_size` 件ずつのセグメントで返す

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{DynamicEntity, ETag, EntityKey, RemoteError, TableName};
use crate::impls::FaultInjector;
use crate::ports::{
    Clock, ContinuationToken, IdGenerator, QuerySegment, SystemClock, TableOperation, TableStore,
    UlidGenerator,
};

/// Entities per query segment unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Most operations one batch may carry.
pub const MAX_BATCH_OPERATIONS: usize = 100;

type Rows = BTreeMap<EntityKey, DynamicEntity>;

/// Tables keyed by case-folded name: `Customers` and `customers` are one table.
#[derive(Default)]
struct State {
    tables: HashMap<String, Rows>,
}

fn table_key(table: &TableName) -> String {
    table.as_str().to_ascii_lowercase()
}

fn table_not_found(table: &TableName) -> RemoteError {
    RemoteError::not_found(
        "TableNotFound",
        format!("The table specified ({table}) does not exist."),
    )
}

fn entity_not_found() -> RemoteError {
    RemoteError::not_found("ResourceNotFound", "The specified resource does not exist.")
}

fn invalid_batch(code: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::bad_request(code, message)
}

#[derive(Clone)]
pub struct InMemoryTableStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    faults: FaultInjector,
    page_size: usize,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    pub fn with_clock<C: Clock + Clone + 'static>(clock: C) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            clock: Arc::new(clock),
            faults: FaultInjector::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Segment size for queries; at least one entity per segment.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// A handle on the same tables with its own fault injector.
    pub fn replica(&self) -> Self {
        Self {
            faults: FaultInjector::default(),
            ..self.clone()
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn stamp(&self, mut entity: DynamicEntity, now: DateTime<Utc>) -> DynamicEntity {
        entity.timestamp = Some(now);
        entity.etag = Some(self.ids.generate_etag());
        entity
    }

    /// Apply one operation to `rows`; leaves `rows` untouched on error.
    fn apply(
        &self,
        rows: &mut Rows,
        operation: TableOperation,
        now: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        match operation {
            TableOperation::Insert(entity) => {
                if rows.contains_key(&entity.key) {
                    return Err(RemoteError::conflict(
                        "EntityAlreadyExists",
                        "The specified entity already exists.",
                    ));
                }
                let entity = self.stamp(entity, now);
                rows.insert(entity.key.clone(), entity);
            }
            TableOperation::Replace(entity) => {
                let existing = rows.get(&entity.key).ok_or_else(entity_not_found)?;
                check_etag(entity.etag.as_ref(), existing)?;
                let entity = self.stamp(entity, now);
                rows.insert(entity.key.clone(), entity);
            }
            TableOperation::Merge(entity) => {
                let existing = rows.get(&entity.key).ok_or_else(entity_not_found)?;
                check_etag(entity.etag.as_ref(), existing)?;
                let merged = self.stamp(entity.merge_into(existing), now);
                rows.insert(merged.key.clone(), merged);
            }
            TableOperation::InsertOrReplace(entity) => {
                let entity = self.stamp(entity, now);
                rows.insert(entity.key.clone(), entity);
            }
            TableOperation::InsertOrMerge(entity) => {
                let entity = match rows.get(&entity.key) {
                    Some(existing) => entity.merge_into(existing),
                    None => entity,
                };
                let entity = self.stamp(entity, now);
                rows.insert(entity.key.clone(), entity);
            }
            TableOperation::Delete(key) => {
                rows.remove(&key).ok_or_else(entity_not_found)?;
            }
        }
        Ok(())
    }
}

impl Default for InMemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

/// `If-Match`: an entity carrying an ETag only updates that exact version.
fn check_etag(expected: Option<&ETag>, existing: &DynamicEntity) -> Result<(), RemoteError> {
    match expected {
        Some(etag) if !etag.is_any() && Some(etag) != existing.etag.as_ref() => {
            Err(RemoteError::precondition_failed(
                "UpdateConditionNotSatisfied",
                "The update condition specified in the request was not satisfied.",
            ))
        }
        _ => Ok(()),
    }
}

fn validate_batch(operations: &[TableOperation]) -> Result<(), RemoteError> {
    if operations.is_empty() {
        return Err(invalid_batch("InvalidInput", "A batch must contain at least one operation."));
    }
    if operations.len() > MAX_BATCH_OPERATIONS {
        return Err(invalid_batch(
            "InvalidInput",
            format!(
                "A batch may contain at most {MAX_BATCH_OPERATIONS} operations, got {}.",
                operations.len()
            ),
        ));
    }
    let partition = &operations[0].key().partition_key;
    if operations.iter().any(|op| op.key().partition_key != *partition) {
        return Err(invalid_batch(
            "CommandsInBatchActOnDifferentPartitions",
            "All commands in a batch must operate on the same partition.",
        ));
    }
    let mut seen = HashSet::new();
    if !operations.iter().all(|op| seen.insert(op.key())) {
        return Err(invalid_batch(
            "InvalidDuplicateRow",
            "The batch request contains multiple changes with the same row key.",
        ));
    }
    Ok(())
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table_if_not_exists(&self, table: &TableName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        if state.tables.contains_key(&table_key(table)) {
            return Ok(false);
        }
        state.tables.insert(table_key(table), Rows::new());
        Ok(true)
    }

    async fn delete_table_if_exists(&self, table: &TableName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        Ok(state.tables.remove(&table_key(table)).is_some())
    }

    async fn table_exists(&self, table: &TableName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        Ok(state.tables.contains_key(&table_key(table)))
    }

    async fn execute(
        &self,
        table: &TableName,
        operation: TableOperation,
    ) -> Result<(), RemoteError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let rows = state
            .tables
            .get_mut(&table_key(table))
            .ok_or_else(|| table_not_found(table))?;
        self.apply(rows, operation, now)
    }

    async fn execute_batch(
        &self,
        table: &TableName,
        operations: Vec<TableOperation>,
    ) -> Result<(), RemoteError> {
        self.faults.check()?;
        validate_batch(&operations)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let rows = state
            .tables
            .get_mut(&table_key(table))
            .ok_or_else(|| table_not_found(table))?;

        let mut staged = rows.clone();
        for (index, operation) in operations.into_iter().enumerate() {
            self.apply(&mut staged, operation, now).map_err(|e| RemoteError {
                message: format!("{index}:{}", e.message),
                ..e
            })?;
        }
        *rows = staged;
        Ok(())
    }

    async fn retrieve(
        &self,
        table: &TableName,
        key: &EntityKey,
    ) -> Result<Option<DynamicEntity>, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        let rows = state
            .tables
            .get(&table_key(table))
            .ok_or_else(|| table_not_found(table))?;
        Ok(rows.get(key).cloned())
    }

    async fn query_segment(
        &self,
        table: &TableName,
        continuation: Option<ContinuationToken>,
    ) -> Result<QuerySegment, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        let rows = state
            .tables
            .get(&table_key(table))
            .ok_or_else(|| table_not_found(table))?;

        let start = continuation
            .map(|token| EntityKey::new(token.next_partition_key, token.next_row_key))
            .unwrap_or_else(|| EntityKey::new("", ""));
        let mut remaining = rows.range(start..);
        let entities: Vec<DynamicEntity> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(_, entity)| entity.clone())
            .collect();
        let continuation = remaining.next().map(|(key, _)| ContinuationToken {
            next_partition_key: key.partition_key.clone(),
            next_row_key: key.row_key.clone(),
        });
        Ok(QuerySegment {
            entities,
            continuation,
        })
    }
}
