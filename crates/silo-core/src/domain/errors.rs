//! Errors - エラー型と分類
//!
//! - `RemoteError`: ストレージサービス（port の向こう側）が返した失敗
//! - `StorageError`: adapter の呼び出し元に返すエラー
//!
//! not-found はエラーではなく値（`Option` / `bool`）として返すため、
//! ここには not-found 専用の variant はありません。

use std::time::Duration;

use thiserror::Error;

/// ErrorKind は remote エラーの分類
///
/// - Transient: 一時的なエラー（リトライ推奨: throttling, 5xx, timeout）
/// - Permanent: 恒久的なエラー（リトライ無意味: 4xx）
/// - Infrastructure: HTTP 応答が得られなかった（ネットワーク障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// A failure reported by the remote storage service.
///
/// `status` is `None` when the request never got an HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} (status {}): {message}", .status.map_or_else(|| "none".to_string(), |s| s.to_string()))]
pub struct RemoteError {
    pub status: Option<u16>,
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Connection reset, DNS failure, dropped socket, ...
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: "NetworkFailure".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(404, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(409, code, message)
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(400, code, message)
    }

    pub fn precondition_failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(412, code, message)
    }

    pub fn server_busy(message: impl Into<String>) -> Self {
        Self::new(503, "ServerBusy", message)
    }

    pub fn kind(&self) -> ErrorKind {
        match self.status {
            None => ErrorKind::Infrastructure,
            Some(408) | Some(429) => ErrorKind::Transient,
            Some(501) | Some(505) => ErrorKind::Permanent,
            Some(status) if status >= 500 => ErrorKind::Transient,
            Some(_) => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Infrastructure)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }

    pub fn is_precondition_failed(&self) -> bool {
        self.status == Some(412)
    }
}

/// StorageError は adapter 操作のエラー
#[derive(Debug, Error)]
pub enum StorageError {
    /// Rejected locally, before any remote call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "entity (PartitionKey={partition_key}, RowKey={row_key}) already exists in table {table}"
    )]
    DuplicateKey {
        table: String,
        partition_key: String,
        row_key: String,
    },

    #[error("{operation} exceeded the maximum execution time of {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl StorageError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The remote failure behind this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            StorageError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::network(RemoteError::network("connection reset"), true)]
    #[case::server_busy(RemoteError::server_busy("slow down"), true)]
    #[case::request_timeout(RemoteError::new(408, "OperationTimedOut", ""), true)]
    #[case::throttled(RemoteError::new(429, "TooManyRequests", ""), true)]
    #[case::internal(RemoteError::new(500, "InternalError", ""), true)]
    #[case::not_implemented(RemoteError::new(501, "NotImplemented", ""), false)]
    #[case::bad_version(RemoteError::new(505, "HttpVersionNotSupported", ""), false)]
    #[case::not_found(RemoteError::not_found("QueueNotFound", ""), false)]
    #[case::conflict(RemoteError::conflict("EntityAlreadyExists", ""), false)]
    #[case::forbidden(RemoteError::new(403, "AuthenticationFailed", ""), false)]
    fn retry_classification(#[case] error: RemoteError, #[case] retryable: bool) {
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn network_failures_are_infrastructure_errors() {
        let error = RemoteError::network("dns lookup failed");
        assert_eq!(error.kind(), ErrorKind::Infrastructure);
        assert_eq!(error.to_string(), "NetworkFailure (status none): dns lookup failed");
    }

    #[test]
    fn remote_errors_convert_unmodified() {
        let remote = RemoteError::not_found("QueueNotFound", "The specified queue does not exist.");
        let error: StorageError = remote.clone().into();
        assert_eq!(error.remote(), Some(&remote));
        assert_eq!(
            error.to_string(),
            "QueueNotFound (status 404): The specified queue does not exist."
        );
    }
}
