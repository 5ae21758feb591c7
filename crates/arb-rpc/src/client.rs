//! JSON-RPC over HTTP with endpoint rotation.
//!
//! The client keeps an ordered endpoint list and a current index. After
//! [`RpcClient::rotate_after`] consecutive successes the index advances;
//! a rate-limit signal (HTTP 429, or a marker in the response error text)
//! forces an immediate advance. Timeouts are plain transport failures and
//! do not rotate. The index only ever moves forward, one slot per signal.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use eyre::{eyre, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::RpcError;

/// Transport timeout applied to every POST.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful requests between scheduled endpoint rotations.
pub const DEFAULT_ROTATE_AFTER: u32 = 20;

/// Substrings that mark a response as a rate-limit rejection.
const RATE_LIMIT_MARKERS: [&str; 3] = ["rate limit", "too many", "429"];

/// JSON-RPC client with endpoint rotation and rate-limit detection.
pub struct RpcClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    current: AtomicUsize,
    streak: AtomicU32,
    rotate_after: u32,
}

impl RpcClient {
    /// Builds a client over an ordered, non-empty endpoint list.
    ///
    /// # Errors
    /// Returns error if the list is empty or the HTTP client cannot be built.
    pub fn new(endpoints: Vec<String>, rotate_after: u32) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(eyre!("at least one RPC endpoint is required"));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| eyre!("failed to build HTTP client: {err}"))?;

        Ok(Self {
            http,
            endpoints,
            current: AtomicUsize::new(0),
            streak: AtomicU32::new(0),
            rotate_after,
        })
    }

    /// The endpoint the next request will hit.
    pub fn endpoint(&self) -> &str {
        let index = self.current.load(Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[index]
    }

    /// Advisory rotation requested by a caller (e.g. the scan loop cadence
    /// or a retry after timeout).
    pub fn force_rotate(&self) {
        self.advance();
    }

    fn advance(&self) {
        let next = (self.current.load(Ordering::Relaxed) + 1) % self.endpoints.len();
        self.current.store(next, Ordering::Relaxed);
        self.streak.store(0, Ordering::Relaxed);
        debug!(endpoint = %self.endpoints[next], "rotated RPC endpoint");
    }

    fn note_success(&self) {
        let streak = self.streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak >= self.rotate_after {
            self.advance();
        }
    }

    fn is_rate_limit_text(text: &str) -> bool {
        let lowered = text.to_ascii_lowercase();
        RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
    }

    /// POSTs one JSON-RPC request object or an array (batch) and returns the
    /// parsed response verbatim.
    ///
    /// # Errors
    /// [`RpcError::RateLimited`] on a 429 or marker hit (already rotated),
    /// [`RpcError::Transport`] on network failure or timeout (not rotated),
    /// [`RpcError::Decode`] when the body is not JSON.
    pub async fn post(&self, body: &Value) -> Result<Value, RpcError> {
        let endpoint = self.endpoint().to_string();

        let response = self
            .http
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(RpcError::Transport)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint = %endpoint, "HTTP 429 from endpoint");
            self.advance();
            return Err(RpcError::RateLimited { endpoint });
        }

        let text = response.text().await.map_err(RpcError::Transport)?;
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                // Nodes behind proxies sometimes answer rate limits with
                // plain-text bodies; only unparseable text is scanned so hex
                // result payloads can never trip the markers.
                if Self::is_rate_limit_text(&text) {
                    self.advance();
                    return Err(RpcError::RateLimited { endpoint });
                }
                return Err(RpcError::Decode(format!("invalid JSON response: {err}")));
            }
        };

        if let Some(message) = value
            .as_object()
            .and_then(|object| object.get("error"))
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            if Self::is_rate_limit_text(message) {
                warn!(endpoint = %endpoint, message, "rate-limit marker in error body");
                self.advance();
                return Err(RpcError::RateLimited { endpoint });
            }
        }

        self.note_success();
        Ok(value)
    }

    /// Issues a single JSON-RPC request and unwraps its `result` member.
    ///
    /// A JSON-RPC error object becomes [`RpcError::JsonRpc`] with the `data`
    /// member preserved for revert decoding.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let value = self.post(&body).await?;
        let object = value
            .as_object()
            .ok_or_else(|| RpcError::Decode(format!("{method}: expected object response")))?;

        if let Some(error) = object.get("error") {
            return Err(RpcError::JsonRpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                data: error.get("data").map(|data| match data.as_str() {
                    Some(text) => text.to_string(),
                    None => data.to_string(),
                }),
            });
        }

        object
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Decode(format!("{method}: response missing result")))
    }

    /// `eth_call` against `latest`, returning the raw return data.
    pub async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, RpcError> {
        let result = self
            .request(
                "eth_call",
                json!([{"to": format!("{to}"), "data": format!("{data}")}, "latest"]),
            )
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_call: result is not a string".into()))?;
        hex.parse::<Bytes>()
            .map_err(|err| RpcError::Decode(format!("eth_call: bad return data: {err}")))
    }
}
