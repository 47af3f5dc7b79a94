//! Blob model: payloads, properties and conditional-access predicates.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::errors::{StorageError, StorageResult};

/// Entity tag assigned by the store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The `*` wildcard (matches any existing resource).
    pub fn any() -> Self {
        Self("*".to_string())
    }

    pub fn is_any(&self) -> bool {
        self.0 == "*"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload payload: raw bytes, or base64 text decoded before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobPayload {
    Bytes(Bytes),
    Base64(String),
}

impl BlobPayload {
    pub fn base64(text: impl Into<String>) -> Self {
        Self::Base64(text.into())
    }

    /// Decode into the bytes that will be stored.
    pub fn into_bytes(self) -> StorageResult<Bytes> {
        match self {
            BlobPayload::Bytes(bytes) => Ok(bytes),
            BlobPayload::Base64(text) => BASE64_STANDARD
                .decode(text.trim())
                .map(Bytes::from)
                .map_err(|e| StorageError::InvalidArgument(format!("payload is not valid base64: {e}"))),
        }
    }
}

impl From<Bytes> for BlobPayload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BlobPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for BlobPayload {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(bytes))
    }
}

/// System properties of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobProperties {
    pub content_type: String,
    pub content_length: u64,
    pub etag: ETag,
    pub last_modified: DateTime<Utc>,
}

/// Payload plus properties, as returned by a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Bytes,
    pub properties: BlobProperties,
}

/// What happens to snapshots when their base blob is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteSnapshots {
    /// Delete the blob only; fails with a conflict when snapshots exist.
    #[default]
    None,
    /// Delete the blob together with all of its snapshots.
    Include,
    /// Delete the snapshots and keep the base blob.
    Only,
}

/// Conditional-access predicates (`If-Match`, `If-None-Match`,
/// `If-Modified-Since`, `If-Unmodified-Since`).
///
/// An empty condition is always satisfied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessCondition {
    pub if_match: Option<ETag>,
    pub if_none_match: Option<ETag>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
}

impl AccessCondition {
    /// Satisfied only when the blob does not exist yet.
    pub fn if_not_exists() -> Self {
        Self {
            if_none_match: Some(ETag::any()),
            ..Self::default()
        }
    }

    pub fn if_match(etag: ETag) -> Self {
        Self {
            if_match: Some(etag),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Evaluate against the current state of the target (`None` = absent).
    pub fn is_satisfied_by(&self, current: Option<&BlobProperties>) -> bool {
        if let Some(expected) = &self.if_match {
            match current {
                Some(props) if expected.is_any() || *expected == props.etag => {}
                _ => return false,
            }
        }
        if let Some(unexpected) = &self.if_none_match
            && let Some(props) = current
            && (unexpected.is_any() || *unexpected == props.etag)
        {
            return false;
        }
        if let Some(since) = self.if_modified_since
            && let Some(props) = current
            && props.last_modified <= since
        {
            return false;
        }
        if let Some(since) = self.if_unmodified_since
            && let Some(props) = current
            && props.last_modified > since
        {
            return false;
        }
        true
    }
}
