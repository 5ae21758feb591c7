//! Shared domain types for the scanner.

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// AMM flavor of a configured venue.
///
/// Only [`DexKind::V2`] venues are eligible for the sizing path; the
/// evaluator filters everything else out before quoting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DexKind {
    /// Constant-product pool with uniform fee and `getReserves()` semantics.
    V2,
    /// Concentrated-liquidity pool (Uniswap V3 style).
    V3,
    /// Algebra-style concentrated liquidity (QuickSwap V3 and forks).
    Algebra,
    /// Weighted pool behind the Balancer vault.
    Balancer,
    /// Anything the config could not classify.
    Unknown,
}

/// Static description of one DEX venue, keyed by name in the config table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DexDescriptor {
    /// Venue name as it appears in candidate files and logs. Filled from
    /// the config table key when omitted.
    #[serde(default)]
    pub name: String,
    /// AMM flavor.
    pub kind: DexKind,
    /// Router contract used for swap calldata and factory lookups.
    pub router: Address,
    /// Factory contract, when known up front.
    #[serde(default)]
    pub factory: Option<Address>,
    /// Pair-contract init code hash for CREATE2 derivation, when known.
    #[serde(default)]
    pub init_code_pair_hash: Option<B256>,
    /// Swap fee in basis points (30 = 0.3%).
    pub fee_bps: u32,
}

impl DexDescriptor {
    /// Swap fee as a fraction (30 bps -> 0.003).
    pub fn fee_fraction(&self) -> f64 {
        f64::from(self.fee_bps) / 10_000.0
    }
}

/// One side of a candidate: the venue name and the pair address the
/// candidate source claims for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLeg {
    /// Key into the DEX descriptor table.
    pub dex: String,
    /// Claimed pool address; unverified until the resolver has seen it.
    pub pair: Address,
}

/// A (base, trade, buy venue, sell venue) triangle before any on-chain
/// verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Intermediate token held only within the atomic transaction.
    pub trade: Address,
    /// Loan and profit denomination token.
    pub base: Address,
    /// Venue to buy TRADE on (cheaper side, before any direction flip).
    pub buy: CandidateLeg,
    /// Venue to sell TRADE on.
    pub sell: CandidateLeg,
}

/// Cycle-local snapshot of a V2 pool's reserves.
///
/// `token0`/`token1` are not part of the `getReserves()` return; orientation
/// comes from the resolver's side cache or the V2 sorted-address convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PairReserves {
    /// The pool these reserves were read from.
    pub pair: Address,
    /// Reserve of token0 (uint112 on chain).
    pub reserve0: u128,
    /// Reserve of token1.
    pub reserve1: u128,
}

impl PairReserves {
    /// Reserve for `token`, given the pool's token0.
    ///
    /// Returns `None` when `token` is on neither side.
    pub fn reserve_of(&self, token: Address, token0: Address, token1: Address) -> Option<u128> {
        if token == token0 {
            Some(self.reserve0)
        } else if token == token1 {
            Some(self.reserve1)
        } else {
            None
        }
    }
}

/// Sort two token addresses into the V2 `(token0, token1)` convention.
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn sort_tokens_orders_by_address() {
        let low = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
        let high = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        assert_eq!(sort_tokens(low, high), (low, high));
        assert_eq!(sort_tokens(high, low), (low, high));
    }

    #[test]
    fn reserve_of_matches_side() {
        let token0 = address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270");
        let token1 = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
        let other = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");
        let reserves = PairReserves {
            pair: Address::ZERO,
            reserve0: 10,
            reserve1: 20,
        };

        assert_eq!(reserves.reserve_of(token0, token0, token1), Some(10));
        assert_eq!(reserves.reserve_of(token1, token0, token1), Some(20));
        assert_eq!(reserves.reserve_of(other, token0, token1), None);
    }

    #[test]
    fn dex_kind_deserializes_lowercase() {
        let kind: DexKind = serde_json::from_str("\"algebra\"").expect("valid kind");
        assert_eq!(kind, DexKind::Algebra);
    }
}
