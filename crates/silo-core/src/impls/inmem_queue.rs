//! InMemoryQueueStore - 開発用のメッセージキュー
//!
//! # 実装詳細
//! - キュー名 → VecDeque<メッセージ>（挿入順）
//! - 可視性は `visible_on` で表し、Clock で判定する
//! - 期限切れ（既定 7 日）のメッセージはアクセスのたびに捨てる
//! - pop receipt は get / update のたびに更新する

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{MessageId, PopReceipt, QueueMessage, QueueName, RemoteError};
use crate::impls::FaultInjector;
use crate::ports::{Clock, IdGenerator, QueueStore, SystemClock, UlidGenerator};

/// Time-to-live applied to every added message.
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest visibility timeout the store accepts.
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

struct StoredMessage {
    id: MessageId,
    pop_receipt: PopReceipt,
    content: String,
    dequeue_count: u32,
    inserted_on: DateTime<Utc>,
    expires_on: DateTime<Utc>,
    visible_on: DateTime<Utc>,
}

impl StoredMessage {
    fn peeked(&self) -> QueueMessage {
        QueueMessage {
            id: self.id.clone(),
            pop_receipt: None,
            content: self.content.clone(),
            dequeue_count: self.dequeue_count,
            inserted_on: self.inserted_on,
            expires_on: self.expires_on,
            next_visible_on: None,
        }
    }

    fn leased(&self) -> QueueMessage {
        QueueMessage {
            pop_receipt: Some(self.pop_receipt.clone()),
            next_visible_on: Some(self.visible_on),
            ..self.peeked()
        }
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<StoredMessage>>,
}

impl State {
    /// The queue with expired messages dropped.
    fn queue_mut(
        &mut self,
        queue: &QueueName,
        now: DateTime<Utc>,
    ) -> Result<&mut VecDeque<StoredMessage>, RemoteError> {
        let messages = self.queues.get_mut(queue.as_str()).ok_or_else(|| {
            RemoteError::not_found(
                "QueueNotFound",
                format!("The specified queue {queue} does not exist."),
            )
        })?;
        messages.retain(|m| m.expires_on > now);
        Ok(messages)
    }
}

fn to_chrono(timeout: Duration) -> Result<chrono::Duration, RemoteError> {
    if timeout > MAX_VISIBILITY_TIMEOUT {
        return Err(RemoteError::bad_request(
            "OutOfRangeQueryParameterValue",
            format!("visibility timeout {timeout:?} exceeds 7 days"),
        ));
    }
    chrono::Duration::from_std(timeout).map_err(|e| {
        RemoteError::bad_request("OutOfRangeQueryParameterValue", e.to_string())
    })
}

#[derive(Clone)]
pub struct InMemoryQueueStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    faults: FaultInjector,
}

impl InMemoryQueueStore {
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

    /// A handle on the same queues with its own fault injector.
    pub fn replica(&self) -> Self {
        Self {
            faults: FaultInjector::default(),
            ..self.clone()
        }
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn find<'q>(
        messages: &'q mut VecDeque<StoredMessage>,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(usize, &'q mut StoredMessage), RemoteError> {
        let (index, message) = messages
            .iter_mut()
            .enumerate()
            .find(|(_, m)| m.id == *id)
            .ok_or_else(|| {
                RemoteError::not_found(
                    "MessageNotFound",
                    format!("The specified message {id} does not exist."),
                )
            })?;
        if message.pop_receipt != *pop_receipt {
            return Err(RemoteError::bad_request(
                "PopReceiptMismatch",
                "The specified pop receipt did not match the pop receipt for a dequeued message.",
            ));
        }
        Ok((index, message))
    }
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn create_queue_if_not_exists(&self, queue: &QueueName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        if state.queues.contains_key(queue.as_str()) {
            return Ok(false);
        }
        state.queues.insert(queue.to_string(), VecDeque::new());
        Ok(true)
    }

    async fn delete_queue_if_exists(&self, queue: &QueueName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let mut state = self.state.lock().await;
        Ok(state.queues.remove(queue.as_str()).is_some())
    }

    async fn queue_exists(&self, queue: &QueueName) -> Result<bool, RemoteError> {
        self.faults.check()?;
        let state = self.state.lock().await;
        Ok(state.queues.contains_key(queue.as_str()))
    }

    async fn add_message(
        &self,
        queue: &QueueName,
        content: &str,
    ) -> Result<QueueMessage, RemoteError> {
        self.faults.check()?;
        let now = self.clock.now();
        let ttl = to_chrono(DEFAULT_MESSAGE_TTL)?;
        let mut state = self.state.lock().await;
        let messages = state.queue_mut(queue, now)?;

        let message = StoredMessage {
            id: self.ids.generate_message_id(),
            pop_receipt: self.ids.generate_pop_receipt(),
            content: content.to_string(),
            dequeue_count: 0,
            inserted_on: now,
            expires_on: now + ttl,
            visible_on: now,
        };
        let added = message.leased();
        messages.push_back(message);
        Ok(added)
    }

    async fn peek_message(&self, queue: &QueueName) -> Result<Option<QueueMessage>, RemoteError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let messages = state.queue_mut(queue, now)?;
        Ok(messages
            .iter()
            .find(|m| m.visible_on <= now)
            .map(StoredMessage::peeked))
    }

    async fn get_message(
        &self,
        queue: &QueueName,
        visibility_timeout: Duration,
    ) -> Result<Option<QueueMessage>, RemoteError> {
        self.faults.check()?;
        let lease = to_chrono(visibility_timeout)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let messages = state.queue_mut(queue, now)?;

        let Some(message) = messages.iter_mut().find(|m| m.visible_on <= now) else {
            return Ok(None);
        };
        message.dequeue_count += 1;
        message.pop_receipt = self.ids.generate_pop_receipt();
        message.visible_on = now + lease;
        Ok(Some(message.leased()))
    }

    async fn update_message(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
        content: Option<&str>,
        visibility_timeout: Duration,
    ) -> Result<PopReceipt, RemoteError> {
        self.faults.check()?;
        let lease = to_chrono(visibility_timeout)?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let messages = state.queue_mut(queue, now)?;

        let (_, message) = Self::find(messages, id, pop_receipt)?;
        if let Some(content) = content {
            message.content = content.to_string();
        }
        message.pop_receipt = self.ids.generate_pop_receipt();
        message.visible_on = now + lease;
        Ok(message.pop_receipt.clone())
    }

    async fn delete_message(
        &self,
        queue: &QueueName,
        id: &MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), RemoteError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let messages = state.queue_mut(queue, now)?;

        let (index, _) = Self::find(messages, id, pop_receipt)?;
        messages.remove(index);
        Ok(())
    }

    async fn approximate_message_count(&self, queue: &QueueName) -> Result<u64, RemoteError> {
        self.faults.check()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        Ok(state.queue_mut(queue, now)?.len() as u64)
    }
}
