//! App - adapter 層
//!
//! 呼び出し元が使う 3 つの adapter（blob / queue / table）と、
//! それらを組み立てる `AdapterBuilder` を提供します。
//!
//! # 設計原則
//! - adapter は状態を持たない（構築時の不変なクライアントだけを保持）
//! - 名前・エンティティの検証はリモート呼び出しの前に行う
//! - リモートエラーは加工せずにそのまま返す（not-found は値に変換する場合のみ例外）

pub mod blob_adapter;
pub mod builder;
pub mod queue_adapter;
pub mod table_adapter;

pub use blob_adapter::{
    BlobContainerAdapter, BlobStorageAdapter, DeleteBlobOptions, SasRequest, UploadOptions,
};
pub use builder::{AdapterBuilder, BuildError};
pub use queue_adapter::QueueStorageAdapter;
pub use table_adapter::TableStorageAdapter;

use crate::domain::{StorageError, StorageResult};

/// Turn a remote 404 into absence.
pub(crate) fn absent_on_not_found<T>(result: StorageResult<Option<T>>) -> StorageResult<Option<T>> {
    match result {
        Err(StorageError::Remote(e)) if e.is_not_found() => Ok(None),
        other => other,
    }
}
