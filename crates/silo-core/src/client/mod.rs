//! Client - リモート呼び出しのポリシー層
//!
//! - `RequestOptions`: リトライ・ロケーション・タイムアウトの宣言
//! - `ExponentialRetry`: backoff の計算
//! - `ServiceClient`: 上記に従ってリモート呼び出しを実行

pub mod options;
pub mod retry;
pub mod service;

pub use options::{Location, LocationMode, OperationContext, RequestKind, RequestOptions};
pub use retry::ExponentialRetry;
pub use service::ServiceClient;
