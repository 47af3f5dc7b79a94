//! QueueStore port - メッセージキュー
//!
//! 存在しないキューへの操作は 404 `QueueNotFound` になります。
//! 空のキューは `None` で表します（エラーではない）。

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageId, PopReceipt, QueueMessage, QueueName, RemoteError};

/// QueueStore はメッセージの配送を提供
///
/// # 設計原則
/// - get はメッセージを削除せず、visibility timeout の間だけ隠す（lease）
/// - lease 中の更新・削除には最新の pop receipt が必要
/// - lease が切れたメッセージは再び見えるようになる（at-least-once）
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, RemoteError>;

    async fn delete_queue_if_exists(&self, queue: &QueueName) -> Result<bool, RemoteError>;

    async fn queue_exists(&self, queue: &QueueName) -> Result<bool, RemoteError>;

    async fn add_message(&self, queue: &QueueName, content: &str)
    -> Result<QueueMessage, RemoteError>;

    /// Oldest visible message, without changing its visibility.
    async fn peek_message(&self, queue: &QueueName) -> Result<Option<QueueMessage>, RemoteError>;

    /// Oldest visible message, hidden for `visibility_timeout`.
    async fn get_message(
        &self,
        queue: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, RemoteError>;

    /// Replace the content (when given) and reset visibility; returns the new
    /// pop receipt.
    async fn update_message(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        content: Option<&str>,
        visibility_timeout: Duration,
    ) -> Result<PopReceipt, RemoteError>;

    async fn delete_message(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), RemoteError>;

    /// Approximate number of messages, invisible ones included.
    async fn approximate_message_count(&self, queue: &QueueName) -> Result<u64, RemoteError>;
}
