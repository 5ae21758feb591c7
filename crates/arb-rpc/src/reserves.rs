//! Batched `getReserves()` fan-out across a set of pair addresses.

use std::collections::HashMap;
use std::time::Duration;

use alloy::primitives::{Address, Bytes};
use alloy::sol;
use alloy::sol_types::SolCall;
use tracing::{debug, info};

use crate::batch::{BatchFetcher, EthCall};
use crate::client::RpcClient;
use crate::types::PairReserves;

sol! {
    interface IUniswapV2Pair {
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}

/// Pairs per batch. A property of the rate-limit posture, not of the call
/// semantics; 30 is the size the free upstream tiers tolerate.
pub const DEFAULT_BATCH_SIZE: usize = 30;
/// Pause between batch groups.
const GROUP_GAP: Duration = Duration::from_secs(1);

/// Reads reserves for many pairs through the batch fetcher.
pub struct ReservesFetcher {
    batch_size: usize,
}

impl Default for ReservesFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ReservesFetcher {
    /// Fetcher with a custom batch size (minimum 1).
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Fetches reserves for every pair in `pairs` (deduplicated), returning
    /// a map holding only pairs whose batch produced a well-formed result
    /// with both reserves strictly positive.
    ///
    /// Batches are submitted sequentially with a one-second gap between
    /// groups to stay under upstream rate limits.
    pub async fn fetch(
        &self,
        client: &RpcClient,
        pairs: &[Address],
    ) -> HashMap<Address, PairReserves> {
        let mut unique = Vec::with_capacity(pairs.len());
        let mut seen = std::collections::HashSet::with_capacity(pairs.len());
        for &pair in pairs {
            if seen.insert(pair) {
                unique.push(pair);
            }
        }

        if unique.is_empty() {
            return HashMap::new();
        }
        let groups = unique.len().div_ceil(self.batch_size);
        debug!(pairs = unique.len(), groups, "fetching reserves");

        let fetcher = BatchFetcher::new(client);
        let calldata = Bytes::from(IUniswapV2Pair::getReservesCall {}.abi_encode());
        let mut reserves = HashMap::with_capacity(unique.len());

        for (index, chunk) in unique.chunks(self.batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(GROUP_GAP).await;
            }

            let calls: Vec<EthCall> = chunk
                .iter()
                .map(|pair| EthCall {
                    to: *pair,
                    data: calldata.clone(),
                })
                .collect();

            let returns = fetcher.fetch(&calls).await;
            for (pair, data) in chunk.iter().zip(returns) {
                if let Some(record) = data.as_deref().and_then(|data| decode_reserves(*pair, data))
                {
                    reserves.insert(*pair, record);
                }
            }

            debug!(
                group = index + 1,
                groups,
                loaded = reserves.len(),
                "reserves progress"
            );
        }

        info!(
            loaded = reserves.len(),
            requested = unique.len(),
            "reserves fetch complete"
        );
        reserves
    }
}

/// Decodes a `getReserves()` return, keeping only live pools.
pub fn decode_reserves(pair: Address, data: &[u8]) -> Option<PairReserves> {
    let decoded = IUniswapV2Pair::getReservesCall::abi_decode_returns(data, true).ok()?;
    let reserve0 = decoded.reserve0.to::<u128>();
    let reserve1 = decoded.reserve1.to::<u128>();
    if reserve0 == 0 || reserve1 == 0 {
        return None;
    }
    Some(PairReserves {
        pair,
        reserve0,
        reserve1,
    })
}
