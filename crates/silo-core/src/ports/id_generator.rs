//! IdGenerator port - ID 生成の抽象化
//!
//! ストアが割り当てる不透明な識別子（message id, pop receipt, ETag）を
//! 生成します。in-memory 実装が使います。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース

use crate::domain::{ETag, MessageId, PopReceipt};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はストア側の識別子を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;

    fn generate_pop_receipt(&self) -> PopReceipt;

    fn generate_etag(&self) -> ETag;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// これにより、テスト時に FixedClock を使って timestamp 部分を固定できます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        MessageId::new(self.next_ulid().to_string().to_lowercase())
    }

    fn generate_pop_receipt(&self) -> PopReceipt {
        PopReceipt::new(self.next_ulid().to_string())
    }

    fn generate_etag(&self) -> ETag {
        ETag::new(format!("\"0x{:032X}\"", self.next_ulid().0))
    }
}
