//! silo-core
//!
//! Blob, queue and table storage adapters with built-in existence checks,
//! retry and failover policy, and expiring read-only access tokens.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（names, blob, message, entity, sas, errors）
//! - **ports**: 抽象化レイヤー（BlobStore, QueueStore, TableStore, Clock, IdGenerator）
//! - **client**: リトライ・フェイルオーバー・タイムアウト（RequestOptions, ServiceClient）
//! - **config**: 接続文字列（StorageAccount）
//! - **app**: adapter（BlobStorageAdapter, QueueStorageAdapter, TableStorageAdapter）と builder
//! - **impls**: 実装（InMemoryBlobStore など開発用）

pub mod app;
pub mod client;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{
    AdapterBuilder, BlobContainerAdapter, BlobStorageAdapter, BuildError, DeleteBlobOptions,
    QueueStorageAdapter, SasRequest, TableStorageAdapter, UploadOptions,
};
pub use client::{ExponentialRetry, LocationMode, OperationContext, RequestOptions};
pub use config::StorageAccount;
pub use domain::{
    AccessCondition, BlobPayload, BlobProperties, DeleteSnapshots, DynamicEntity, ETag,
    EntityProperty, QueueMessage, RemoteError, StorageError, StorageResult, TableEntity,
};
