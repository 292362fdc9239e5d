//! Errors of RPC calls

use core::time::Duration;

/// Why an RPC call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The endpoint could not be reached.
    #[error("connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },
    /// The endpoint did not answer in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The endpoint answered with an HTTP server error.
    #[error("server error: HTTP {status}")]
    Server { status: u16 },
    /// The endpoint is throttling us.
    #[error("rate limited by the endpoint")]
    RateLimited,
    /// The node reported an internal JSON-RPC error.
    #[error("internal node error {code}: {message}")]
    Internal { code: i64, message: String },
    /// The request itself is malformed, retrying cannot help.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The node understood the request and refused it.
    #[error("rejected by the node with code {code}: {message}")]
    Rejected { code: i64, message: String },
    /// The response did not have the expected shape.
    #[error("failed to decode the response: {0}")]
    Decode(String),
    /// Every endpoint used up its attempts.
    #[error("gave up after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: u32, last: Box<RpcError> },
}

impl RpcError {
    /// Returns `true` if the same request may succeed when sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout(_)
                | Self::Server { .. }
                | Self::RateLimited
                | Self::Internal { .. }
        )
    }

    /// Returns `true` if the failure is transient, including a call that
    /// exhausted its retries on transient failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Exhausted { last, .. } => last.is_transient(),
            other => other.is_retryable(),
        }
    }
}
