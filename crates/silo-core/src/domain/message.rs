//! Queue message model.
//!
//! Message ids and pop receipts are opaque strings assigned by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of the current lease on a message. Required to update or delete it;
/// invalidated by every get or update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopReceipt(String);

impl PopReceipt {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as seen by a reader.
///
/// Peeked messages carry no pop receipt; messages fetched with a lease do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: MessageId,
    pub pop_receipt: Option<PopReceipt>,
    pub content: String,
    /// How many times the message has been fetched with a lease.
    pub dequeue_count: u32,
    pub inserted_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub next_visible_on: Option<DateTime<Utc>>,
}

impl QueueMessage {
    pub fn as_str(&self) -> &str {
        &self.content
    }
}
