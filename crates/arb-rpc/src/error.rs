//! Error taxonomy for the RPC layer.
//!
//! Two classes matter to callers: [`RpcError::RateLimited`] (retry on a new
//! endpoint) and [`RpcError::Transport`] (network or timeout). The client
//! itself never retries; retry policy belongs to the caller.

use thiserror::Error;

/// Errors surfaced by [`crate::RpcClient`].
#[derive(Debug, Error)]
pub enum RpcError {
    /// The endpoint told us to slow down: HTTP 429 or a rate-limit marker
    /// in the response error text. The client has already rotated.
    #[error("rate limited by {endpoint}")]
    RateLimited {
        /// Endpoint that rejected the request.
        endpoint: String,
    },

    /// Network failure or timeout. No rotation happened.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error object.
    ///
    /// `data` carries the raw revert payload for `eth_call` failures, which
    /// the executor decodes into a structured reason.
    #[error("rpc error {code}: {message}")]
    JsonRpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message from the node.
        message: String,
        /// Optional error data (hex revert bytes for call failures).
        data: Option<String>,
    },

    /// The response body was not the JSON shape we asked for.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcError {
    /// True for failures worth retrying on a rotated endpoint.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::RateLimited { .. } => true,
            RpcError::Transport(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}
