//! Request options: the declarative retry / failover / timeout policy a
//! client is built with.

use std::fmt;
use std::time::Duration;

use ulid::Ulid;

use super::retry::ExponentialRetry;

/// Which regional endpoint a request attempt targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Primary,
    Secondary,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Primary => f.write_str("primary"),
            Location::Secondary => f.write_str("secondary"),
        }
    }
}

/// Whether a request may be served by a read replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

/// How attempts are spread across the primary and secondary endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LocationMode {
    #[default]
    PrimaryOnly,
    /// Reads alternate primary, secondary, primary, ... across retries.
    /// Writes always go to the primary.
    PrimaryThenSecondary,
}

impl LocationMode {
    /// Target of the attempt made after `retries` retries.
    pub fn location_for(self, retries: u32, kind: RequestKind) -> Location {
        match (self, kind) {
            (LocationMode::PrimaryThenSecondary, RequestKind::Read) if retries % 2 == 1 => {
                Location::Secondary
            }
            _ => Location::Primary,
        }
    }
}

/// RequestOptions はクライアント構築時に一度だけ渡すポリシー
///
/// `Default` はリトライなし・primary のみ・時間制限なし。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub retry_policy: Option<ExponentialRetry>,
    pub location_mode: LocationMode,
    /// Bound on one remote call including all of its retries.
    pub maximum_execution_time: Option<Duration>,
}

impl RequestOptions {
    /// Exponential backoff (3s base, 4 retries), primary-then-secondary
    /// failover, 20 seconds per call.
    pub fn resilient() -> Self {
        Self {
            retry_policy: Some(ExponentialRetry::default()),
            location_mode: LocationMode::PrimaryThenSecondary,
            maximum_execution_time: Some(Duration::from_secs(20)),
        }
    }

    pub fn with_retry_policy(mut self, policy: ExponentialRetry) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_location_mode(mut self, mode: LocationMode) -> Self {
        self.location_mode = mode;
        self
    }

    pub fn with_maximum_execution_time(mut self, limit: Duration) -> Self {
        self.maximum_execution_time = Some(limit);
        self
    }
}

/// Per-call correlation data, carried into every log event of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub client_request_id: String,
}

impl OperationContext {
    pub fn new() -> Self {
        Self {
            client_request_id: Ulid::new().to_string().to_lowercase(),
        }
    }

    pub fn with_client_request_id(id: impl Into<String>) -> Self {
        Self {
            client_request_id: id.into(),
        }
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
