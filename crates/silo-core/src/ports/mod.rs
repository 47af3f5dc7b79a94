//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait はリモートのストレージサービス（blob / queue / table）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ストア自体の耐久性・複製・整合性はストア側の責務
//! - リトライ・フェイルオーバー・タイムアウトは `client::ServiceClient` の責務
//! - ポートは 1 回のリモート呼び出しだけを表す

pub mod blob_store;
pub mod clock;
pub mod id_generator;
pub mod queue_store;
pub mod table_store;

// 主要な trait を再エクスポート
pub use self::blob_store::BlobStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue_store::QueueStore;
pub use self::table_store::{ContinuationToken, QuerySegment, TableOperation, TableStore};
