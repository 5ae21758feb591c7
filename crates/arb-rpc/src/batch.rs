//! Batched `eth_call` fan-out with halving on failure.
//!
//! Logical calls are packed into one JSON-RPC array with ascending ids and
//! paired with their responses by position. A batch that yields nothing
//! usable is split in half and the halves retried in parallel, up to three
//! levels deep, which isolates a single bad address that would otherwise
//! poison the whole batch.

use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::RpcClient;
use crate::error::RpcError;

/// Attempts per batch before giving up (or splitting).
pub const MAX_RETRIES: u32 = 3;
/// Halving recursion limit.
const MAX_SPLIT_DEPTH: u32 = 3;
/// Batches at or below this size are never split further.
const MIN_SPLIT_SIZE: usize = 2;
/// Backoff ceiling between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// One logical `eth_call` in a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EthCall {
    /// Call target.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
}

/// Groups `eth_call`s into array payloads and recovers from partial failure.
pub struct BatchFetcher<'a> {
    client: &'a RpcClient,
}

impl<'a> BatchFetcher<'a> {
    /// Wraps a client; the fetcher adds retry and splitting policy on top.
    pub fn new(client: &'a RpcClient) -> Self {
        Self { client }
    }

    /// Executes `calls`, returning per-call results aligned with the input
    /// order. Unusable elements (errors, empty `0x` returns) are `None`.
    pub async fn fetch(&self, calls: &[EthCall]) -> Vec<Option<Bytes>> {
        self.fetch_at_depth(calls, 0).await
    }

    fn fetch_at_depth<'b>(
        &'b self,
        calls: &'b [EthCall],
        depth: u32,
    ) -> BoxFuture<'b, Vec<Option<Bytes>>> {
        async move {
            if calls.is_empty() {
                return Vec::new();
            }

            for attempt in 0..MAX_RETRIES {
                match self.send_batch(calls).await {
                    Ok(results) => {
                        if results.iter().any(Option::is_some) {
                            return results;
                        }
                        // Well-formed response, nothing usable: retrying the
                        // same payload will not help, splitting might.
                        break;
                    }
                    Err(err) if err.is_retryable() => {
                        let backoff = retry_backoff(attempt);
                        debug!(
                            attempt = attempt + 1,
                            backoff_s = backoff.as_secs_f64(),
                            error = %err,
                            "batch rejected, backing off"
                        );
                        if matches!(err, RpcError::Transport(_)) {
                            // Rate limits already rotated inside the client.
                            self.client.force_rotate();
                        }
                        tokio::time::sleep(backoff).await;
                    }
                    Err(err) => {
                        warn!(calls = calls.len(), error = %err, "batch failed");
                        break;
                    }
                }
            }

            if calls.len() > MIN_SPLIT_SIZE && depth < MAX_SPLIT_DEPTH {
                let mid = calls.len() / 2;
                let (left, right) = calls.split_at(mid);
                debug!(
                    from = calls.len(),
                    to = mid,
                    depth = depth + 1,
                    "splitting failed batch"
                );
                let (mut left_results, right_results) = tokio::join!(
                    self.fetch_at_depth(left, depth + 1),
                    self.fetch_at_depth(right, depth + 1)
                );
                left_results.extend(right_results);
                return left_results;
            }

            vec![None; calls.len()]
        }
        .boxed()
    }

    /// Sends one array payload and pairs responses with requests by position.
    async fn send_batch(&self, calls: &[EthCall]) -> Result<Vec<Option<Bytes>>, RpcError> {
        let payload: Vec<Value> = calls
            .iter()
            .enumerate()
            .map(|(index, call)| {
                json!({
                    "jsonrpc": "2.0",
                    "id": index + 1,
                    "method": "eth_call",
                    "params": [
                        {"to": format!("{}", call.to), "data": format!("{}", call.data)},
                        "latest",
                    ],
                })
            })
            .collect();

        let response = self.client.post(&Value::Array(payload)).await?;
        match response {
            Value::Array(elements) => {
                let mut results = vec![None; calls.len()];
                for (slot, element) in results.iter_mut().zip(elements.iter()) {
                    *slot = decode_element(element);
                }
                Ok(results)
            }
            Value::Object(ref object) if object.contains_key("error") => {
                debug!(calls = calls.len(), "whole-batch error object");
                Ok(vec![None; calls.len()])
            }
            other => Err(RpcError::Decode(format!(
                "unexpected batch response shape: {other}"
            ))),
        }
    }
}

fn decode_element(element: &Value) -> Option<Bytes> {
    element
        .get("result")
        .and_then(Value::as_str)
        .and_then(|hex| hex.parse::<Bytes>().ok())
        .filter(|bytes| !bytes.is_empty())
}

/// `min(2 * 2^attempt, 10)` seconds, matching the rate-limit posture the
/// upstreams tolerate.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs_f64((2.0 * 2f64.powi(attempt as i32)).min(MAX_BACKOFF.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_caps_at_ten_seconds() {
        assert_eq!(retry_backoff(0), Duration::from_secs(2));
        assert_eq!(retry_backoff(1), Duration::from_secs(4));
        assert_eq!(retry_backoff(2), Duration::from_secs(8));
        assert_eq!(retry_backoff(3), Duration::from_secs(10));
        assert_eq!(retry_backoff(10), Duration::from_secs(10));
    }

    #[test]
    fn decode_element_filters_empty_and_missing() {
        assert_eq!(
            decode_element(&json!({"jsonrpc": "2.0", "id": 1, "result": "0x0102"})),
            Some(Bytes::from(vec![0x01, 0x02]))
        );
        assert_eq!(
            decode_element(&json!({"jsonrpc": "2.0", "id": 1, "result": "0x"})),
            None
        );
        assert_eq!(
            decode_element(&json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000}})),
            None
        );
    }
}
