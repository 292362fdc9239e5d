//! A single JSON-RPC request against a single endpoint

use crate::RpcError;
use async_trait::async_trait;
use core::sync::atomic::{
    AtomicU64,
    Ordering,
};
use serde_json::{
    Value,
    json,
};
use std::sync::Arc;
use url::Url;

/// Sends one request to one endpoint and classifies the failure, if any.
#[cfg_attr(any(test, feature = "test-helpers"), mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Calls `method` with `params` at `url` and returns the `result` member
    /// of the response.
    async fn request(
        &self,
        url: &Url,
        method: &str,
        params: &Value,
    ) -> Result<Value, RpcError>;
}

/// JSON-RPC 2.0 over HTTP.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport with its own connection pool. Cookies are kept so
    /// that load balancers with sticky sessions route us consistently.
    pub fn new() -> reqwest::Result<Self> {
        let cookie = Arc::new(reqwest::cookie::Jar::default());
        Ok(Self {
            client: reqwest::Client::builder()
                .cookie_provider(cookie)
                .build()?,
            next_id: AtomicU64::new(1),
        })
    }
}

#[derive(serde::Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    error: Option<ResponseError>,
}

#[derive(serde::Deserialize)]
struct ResponseError {
    code: i64,
    message: String,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        url: &Url,
        method: &str,
        params: &Value,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| RpcError::Connection {
                url: url.to_string(),
                reason: err.to_string(),
            })?;

        let status = response.status();
        if let Some(error) = classify_status(status.as_u16()) {
            return Err(error)
        }

        let response: Response = response
            .json()
            .await
            .map_err(|err| RpcError::Decode(err.to_string()))?;

        match response.error {
            Some(error) => Err(classify_rpc_error(error.code, error.message)),
            None => Ok(response.result),
        }
    }
}

fn classify_status(status: u16) -> Option<RpcError> {
    match status {
        429 => Some(RpcError::RateLimited),
        500..=599 => Some(RpcError::Server { status }),
        400..=499 => Some(RpcError::InvalidRequest(format!("HTTP {status}"))),
        _ => None,
    }
}

/// Maps a JSON-RPC error object onto [`RpcError`].
pub(crate) fn classify_rpc_error(code: i64, message: String) -> RpcError {
    const PARSE_ERROR: i64 = -32700;
    const INVALID_REQUEST: i64 = -32600;
    const METHOD_NOT_FOUND: i64 = -32601;
    const INVALID_PARAMS: i64 = -32602;
    const INTERNAL_ERROR: i64 = -32603;
    const LIMIT_EXCEEDED: i64 = -32005;

    let lowercase = message.to_lowercase();
    match code {
        PARSE_ERROR | INVALID_REQUEST | METHOD_NOT_FOUND | INVALID_PARAMS => {
            RpcError::InvalidRequest(message)
        }
        INTERNAL_ERROR => RpcError::Internal { code, message },
        LIMIT_EXCEEDED => RpcError::RateLimited,
        _ if lowercase.contains("rate limit")
            || lowercase.contains("too many requests") =>
        {
            RpcError::RateLimited
        }
        _ => RpcError::Rejected { code, message },
    }
}
