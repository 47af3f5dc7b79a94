//! Domain model (names, blobs, messages, entities, tokens, errors).
//!
//! リモートストアにもアダプタにも依存しない値型だけを置きます。

mod attributes;
pub mod blob;
pub mod entity;
pub mod errors;
pub mod message;
pub mod names;
pub mod sas;

pub use blob::{AccessCondition, Blob, BlobPayload, BlobProperties, DeleteSnapshots, ETag};
pub use entity::{DynamicEntity, EntityKey, EntityProperty, TableEntity};
pub use errors::{ErrorKind, RemoteError, StorageError, StorageResult};
pub use message::{MessageId, PopReceipt, QueueMessage};
pub use names::{BlobName, ContainerName, QueueName, ResourceName, TableName};
pub use sas::{DEFAULT_SAS_EXPIRY_MINUTES, SharedAccessPolicy, SharedAccessToken};
