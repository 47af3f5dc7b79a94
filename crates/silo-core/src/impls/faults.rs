//! FaultInjector - in-memory store に失敗を注入する
//!
//! store の各操作は最初に `check()` を呼び、積まれた失敗があれば
//! それを 1 つ取り出して返します。リトライ・フェイルオーバーのテスト用。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::RemoteError;

#[derive(Debug, Clone, Default)]
pub struct FaultInjector {
    pending: Arc<Mutex<VecDeque<RemoteError>>>,
    calls: Arc<AtomicUsize>,
}

impl FaultInjector {
    /// Fail the next call with `error`. Queued failures are served in order.
    pub fn push(&self, error: RemoteError) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(error);
    }

    pub fn push_many(&self, error: RemoteError, times: usize) {
        for _ in 0..times {
            self.push(error.clone());
        }
    }

    /// Count the call and pop the next queued failure, if any.
    pub fn check(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Calls seen so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_are_served_in_order_then_calls_succeed() {
        let faults = FaultInjector::default();
        faults.push(RemoteError::server_busy("first"));
        faults.push(RemoteError::network("second"));

        assert_eq!(faults.check().unwrap_err().message, "first");
        assert_eq!(faults.check().unwrap_err().message, "second");
        assert!(faults.check().is_ok());
        assert_eq!(faults.calls(), 3);
    }
}
