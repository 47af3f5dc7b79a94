//! QueueStorageAdapter - メッセージキューの操作
//!
//! # 配送保証
//! - `dequeue` は lease 付きで取得してから削除する（at-least-once）
//! - 削除の前に失敗した場合、lease が切れるとメッセージは再び見える
//! - `length` は近似値（不可視のメッセージも数える）

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::app::builder::AdapterBuilder;
use crate::client::{RequestKind, RequestOptions, ServiceClient};
use crate::domain::{
    MessageId, PopReceipt, QueueMessage, QueueName, RemoteError, StorageError, StorageResult,
};
use crate::ports::QueueStore;

/// Lease taken by `update_content`, also the visibility window it sets.
pub const UPDATE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(20);

/// Lease taken by `dequeue` before the message is deleted.
pub const DEQUEUE_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct QueueStorageAdapter {
    client: Arc<ServiceClient<Arc<dyn QueueStore>>>,
}

impl QueueStorageAdapter {
    pub fn builder(connection_string: impl Into<String>) -> AdapterBuilder<dyn QueueStore> {
        AdapterBuilder::new(connection_string)
    }

    pub(crate) fn new(client: ServiceClient<Arc<dyn QueueStore>>) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn request_options(&self) -> &RequestOptions {
        self.client.options()
    }

    pub async fn create_queue(&self, queue: &str) -> StorageResult<()> {
        let queue = QueueName::parse(queue)?;
        let created = self
            .client
            .execute("create_queue", RequestKind::Write, |s| {
                s.create_queue_if_not_exists(&queue)
            })
            .await?;
        if created {
            info!(%queue, "queue created");
        }
        Ok(())
    }

    /// Delete the queue and its messages; absence is success.
    pub async fn delete_queue(&self, queue: &str) -> StorageResult<()> {
        let queue = QueueName::parse(queue)?;
        let deleted = self
            .client
            .execute("delete_queue", RequestKind::Write, |s| {
                s.delete_queue_if_exists(&queue)
            })
            .await?;
        info!(%queue, deleted, "queue delete requested");
        Ok(())
    }

    pub async fn exists(&self, queue: &str) -> StorageResult<bool> {
        let queue = QueueName::parse(queue)?;
        self.client
            .execute("queue_exists", RequestKind::Read, |s| s.queue_exists(&queue))
            .await
    }

    /// Append a message; the queue must exist.
    pub async fn enqueue(&self, queue: &str, content: &str) -> StorageResult<MessageId> {
        let queue = QueueName::parse(queue)?;
        let message = self
            .client
            .execute("enqueue", RequestKind::Write, |s| {
                s.add_message(&queue, content)
            })
            .await?;
        debug!(%queue, id = %message.id, "message enqueued");
        Ok(message.id)
    }

    /// The oldest visible message, left in place.
    pub async fn peek(&self, queue: &str) -> StorageResult<Option<QueueMessage>> {
        let queue = QueueName::parse(queue)?;
        self.client
            .execute("peek", RequestKind::Read, |s| s.peek_message(&queue))
            .await
    }

    pub async fn peek_text(&self, queue: &str) -> StorageResult<Option<String>> {
        Ok(self.peek(queue).await?.map(|m| m.content))
    }

    /// Replace the content of the oldest visible message and hide it for
    /// `UPDATE_VISIBILITY_TIMEOUT`. `false` when the queue is empty.
    pub async fn update_content(&self, queue: &str, content: &str) -> StorageResult<bool> {
        let queue = QueueName::parse(queue)?;
        let Some(message) = self
            .client
            .execute("update_content", RequestKind::Write, |s| {
                s.get_message(&queue, UPDATE_VISIBILITY_TIMEOUT)
            })
            .await?
        else {
            debug!(%queue, "queue empty, nothing to update");
            return Ok(false);
        };
        let pop_receipt = leased_receipt(&message)?;

        self.client
            .execute("update_content", RequestKind::Write, |s| {
                s.update_message(
                    &queue,
                    &message.id,
                    pop_receipt,
                    Some(content),
                    UPDATE_VISIBILITY_TIMEOUT,
                )
            })
            .await?;
        debug!(%queue, id = %message.id, "message content updated");
        Ok(true)
    }

    /// Take the oldest visible message off the queue. `None` when the queue
    /// is empty.
    pub async fn dequeue(&self, queue: &str) -> StorageResult<Option<QueueMessage>> {
        let queue = QueueName::parse(queue)?;
        let Some(message) = self
            .client
            .execute("dequeue", RequestKind::Write, |s| {
                s.get_message(&queue, DEQUEUE_VISIBILITY_TIMEOUT)
            })
            .await?
        else {
            return Ok(None);
        };
        let pop_receipt = leased_receipt(&message)?;

        self.client
            .execute("dequeue", RequestKind::Write, |s| {
                s.delete_message(&queue, &message.id, pop_receipt)
            })
            .await?;
        debug!(
            %queue,
            id = %message.id,
            dequeue_count = message.dequeue_count,
            "message dequeued"
        );
        Ok(Some(message))
    }

    /// Approximate number of messages, including ones currently leased.
    pub async fn length(&self, queue: &str) -> StorageResult<u64> {
        let queue = QueueName::parse(queue)?;
        self.client
            .execute("length", RequestKind::Read, |s| {
                s.approximate_message_count(&queue)
            })
            .await
    }
}

fn leased_receipt(message: &QueueMessage) -> StorageResult<&PopReceipt> {
    message.pop_receipt.as_ref().ok_or_else(|| {
        StorageError::Remote(RemoteError::new(
            500,
            "MissingPopReceipt",
            format!("message {} was leased without a pop receipt", message.id),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExponentialRetry;
    use crate::impls::InMemoryQueueStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    const DEV: &str = "UseDevelopmentStorage=true";

    async fn setup() -> (QueueStorageAdapter, InMemoryQueueStore, FixedClock) {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let store = InMemoryQueueStore::with_clock(clock.clone());
        let queues = QueueStorageAdapter::builder(DEV)
            .build(Arc::new(store.clone()))
            .unwrap();
        queues.create_queue("orders").await.unwrap();
        (queues, store, clock)
    }

    #[tokio::test]
    async fn peek_leaves_the_message_and_dequeue_removes_it() {
        let (queues, _, _) = setup().await;
        queues.enqueue("orders", "hello").await.unwrap();

        assert_eq!(queues.peek_text("orders").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(queues.peek_text("orders").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(queues.length("orders").await.unwrap(), 1);

        let message = queues.dequeue("orders").await.unwrap().unwrap();
        assert_eq!(message.as_str(), "hello");
        assert_eq!(message.dequeue_count, 1);
        assert_eq!(queues.length("orders").await.unwrap(), 0);
        assert!(queues.peek("orders").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_come_out_in_order() {
        let (queues, _, _) = setup().await;
        let first = queues.enqueue("orders", "one").await.unwrap();
        queues.enqueue("orders", "two").await.unwrap();

        let dequeued = queues.dequeue("orders").await.unwrap().unwrap();
        assert_eq!(dequeued.id, first);
        assert_eq!(queues.peek_text("orders").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn empty_queue_reads_are_values() {
        let (queues, _, _) = setup().await;

        assert!(queues.peek("orders").await.unwrap().is_none());
        assert!(queues.dequeue("orders").await.unwrap().is_none());
        assert!(!queues.update_content("orders", "new").await.unwrap());
        assert_eq!(queues.length("orders").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_content_rewrites_and_hides_the_message() {
        let (queues, _, clock) = setup().await;
        queues.enqueue("orders", "v1").await.unwrap();

        assert!(queues.update_content("orders", "v2").await.unwrap());
        assert!(queues.peek("orders").await.unwrap().is_none());
        assert_eq!(queues.length("orders").await.unwrap(), 1);

        clock.advance(chrono::Duration::seconds(20));
        let message = queues.peek("orders").await.unwrap().unwrap();
        assert_eq!(message.content, "v2");
        assert_eq!(message.dequeue_count, 1);
    }

    #[tokio::test]
    async fn queue_lifecycle_is_idempotent() {
        let (queues, _, _) = setup().await;

        queues.create_queue("orders").await.unwrap();
        assert!(queues.exists("orders").await.unwrap());

        queues.delete_queue("orders").await.unwrap();
        queues.delete_queue("orders").await.unwrap();
        assert!(!queues.exists("orders").await.unwrap());
    }

    #[tokio::test]
    async fn enqueue_into_missing_queue_fails_without_retrying() {
        let (queues, store, _) = setup().await;
        let before = store.faults().calls();

        let err = queues.enqueue("missing", "hello").await.unwrap_err();
        assert!(err.remote().is_some_and(|e| e.code == "QueueNotFound"));
        assert_eq!(store.faults().calls() - before, 1);
    }

    #[tokio::test]
    async fn invalid_queue_name_is_rejected_locally() {
        let (queues, store, _) = setup().await;
        let before = store.faults().calls();

        let err = queues.enqueue("Bad_Queue", "hello").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
        assert_eq!(store.faults().calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let (queues, store, _) = setup().await;
        queues.enqueue("orders", "hello").await.unwrap();
        store.faults().push_many(RemoteError::server_busy("busy"), 2);
        let before = store.faults().calls();

        assert_eq!(queues.length("orders").await.unwrap(), 1);
        assert_eq!(store.faults().calls() - before, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_fail_over_to_the_secondary() {
        let store = InMemoryQueueStore::new();
        let replica = store.replica();
        let queues = QueueStorageAdapter::builder(DEV)
            .secondary(Arc::new(replica.clone()))
            .build(Arc::new(store.clone()))
            .unwrap();
        queues.create_queue("orders").await.unwrap();
        queues.enqueue("orders", "hello").await.unwrap();

        store.faults().push(RemoteError::network("primary unreachable"));
        let replica_calls = replica.faults().calls();

        assert_eq!(queues.peek_text("orders").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(replica.faults().calls() - replica_calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failures_hit_the_execution_time_limit() {
        let (queues, store, _) = setup().await;
        store.faults().push_many(RemoteError::server_busy("busy"), 10);

        let err = queues.length("orders").await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout { operation: "length", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_configurable() {
        let store = InMemoryQueueStore::new();
        let options = RequestOptions::default()
            .with_retry_policy(ExponentialRetry::new(Duration::from_millis(10), 1));
        let queues = QueueStorageAdapter::builder(DEV)
            .request_options(options)
            .build(Arc::new(store.clone()))
            .unwrap();
        store.faults().push_many(RemoteError::server_busy("busy"), 2);

        let err = queues.exists("orders").await.unwrap_err();
        assert!(err.remote().is_some_and(RemoteError::is_retryable));
        assert_eq!(store.faults().calls(), 2);
    }
}
