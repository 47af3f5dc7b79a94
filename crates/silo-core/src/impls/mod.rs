//! Impls - ports の実装
//!
//! in-memory のストアは開発・テスト用です。`replica()` で同じデータを見る
//! 別ハンドルを作れるので、secondary エンドポイントの代わりにも使えます。

pub mod faults;
pub mod inmem_blob;
pub mod inmem_queue;
pub mod inmem_table;

pub use faults::FaultInjector;
pub use inmem_blob::InMemoryBlobStore;
pub use inmem_queue::InMemoryQueueStore;
pub use inmem_table::InMemoryTableStore;
