//! Pair-address resolution: CREATE2 derivation with factory fallback.
//!
//! The candidate source is a crawl that may name a pair by one venue when it
//! actually belongs to another. Resolution is a ladder: cache, then the
//! cheap deterministic CREATE2 derivation (accepted only when bytecode
//! exists at the derived address), then the authoritative
//! `router.factory()` / `factory.getPair()` round trip.

use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::sol;
use alloy::sol_types::SolCall;
use dashmap::DashMap;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::client::RpcClient;
use crate::error::RpcError;
use crate::types::{sort_tokens, DexDescriptor};

sol! {
    interface IUniswapV2Factory {
        function getPair(address tokenA, address tokenB) external view returns (address pair);
    }

    interface IUniswapV2Router {
        function factory() external view returns (address factory);
    }
}

/// Resolves `(dex, tokenA, tokenB)` to a verified pool address.
pub struct PairResolver {
    dexes: HashMap<String, DexDescriptor>,
    pairs: DashMap<(String, Address, Address), Address>,
    token0s: DashMap<Address, Address>,
}

impl PairResolver {
    /// Resolver over the configured venue table.
    pub fn new(dexes: HashMap<String, DexDescriptor>) -> Self {
        Self {
            dexes,
            pairs: DashMap::new(),
            token0s: DashMap::new(),
        }
    }

    /// Deterministic CREATE2 pair address:
    /// `keccak256(0xff ++ factory ++ keccak256(token0 ++ token1) ++ initCodeHash)[12..]`.
    pub fn derive_pair_address(
        factory: Address,
        init_code_pair_hash: B256,
        a: Address,
        b: Address,
    ) -> Address {
        let (token0, token1) = sort_tokens(a, b);

        let mut packed = [0u8; 40];
        packed[..20].copy_from_slice(token0.as_slice());
        packed[20..].copy_from_slice(token1.as_slice());
        let salt = keccak256(packed);

        let mut preimage = [0u8; 85];
        preimage[0] = 0xff;
        preimage[1..21].copy_from_slice(factory.as_slice());
        preimage[21..53].copy_from_slice(salt.as_slice());
        preimage[53..85].copy_from_slice(init_code_pair_hash.as_slice());

        Address::from_slice(&keccak256(preimage)[12..])
    }

    /// Canonical token0 of `pair`, when a prior resolution recorded it.
    pub fn token0_of(&self, pair: Address) -> Option<Address> {
        self.token0s.get(&pair).map(|entry| *entry)
    }

    /// Resolves the pool for `(dex, a, b)`, or `None` when the venue has no
    /// such pool. Successful resolutions are cached for the process lifetime.
    pub async fn resolve(
        &self,
        client: &RpcClient,
        dex: &str,
        a: Address,
        b: Address,
    ) -> Result<Option<Address>, RpcError> {
        let (token0, token1) = sort_tokens(a, b);
        let key = (dex.to_string(), token0, token1);
        if let Some(cached) = self.pairs.get(&key) {
            return Ok(Some(*cached));
        }

        let Some(descriptor) = self.dexes.get(dex) else {
            warn!(dex, "unknown dex in resolution request");
            return Ok(None);
        };

        if let (Some(factory), Some(init_hash)) =
            (descriptor.factory, descriptor.init_code_pair_hash)
        {
            let derived = Self::derive_pair_address(factory, init_hash, token0, token1);
            if self.has_code(client, derived).await? {
                debug!(dex, pair = %derived, "pair resolved via CREATE2");
                self.remember(key, derived, token0);
                return Ok(Some(derived));
            }
            debug!(dex, pair = %derived, "derived address has no code, falling back");
        }

        let Some(factory) = self.factory_of(client, descriptor).await? else {
            return Ok(None);
        };
        let Some(pair) = self.pair_from_factory(client, factory, token0, token1).await? else {
            return Ok(None);
        };

        debug!(dex, pair = %pair, "pair resolved via factory");
        self.remember(key, pair, token0);
        Ok(Some(pair))
    }

    /// Cross-checks a candidate-supplied pair address. Returns the address
    /// downstream evaluation should use: the freshly resolved one when it
    /// differs from the claim (logged), or `None` when the venue has no pool
    /// for the token pair at all.
    pub async fn verify_or_repair(
        &self,
        client: &RpcClient,
        dex: &str,
        a: Address,
        b: Address,
        claimed: Address,
    ) -> Result<Option<Address>, RpcError> {
        match self.resolve(client, dex, a, b).await? {
            Some(resolved) => {
                if resolved != claimed {
                    warn!(
                        dex,
                        claimed = %claimed,
                        resolved = %resolved,
                        "candidate pair address mismatch, substituting resolved address"
                    );
                }
                Ok(Some(resolved))
            }
            None => {
                warn!(dex, claimed = %claimed, "pair unresolvable on venue");
                Ok(None)
            }
        }
    }

    fn remember(&self, key: (String, Address, Address), pair: Address, token0: Address) {
        self.token0s.insert(pair, token0);
        self.pairs.insert(key, pair);
    }

    async fn has_code(&self, client: &RpcClient, address: Address) -> Result<bool, RpcError> {
        let result = client
            .request("eth_getCode", json!([format!("{address}"), "latest"]))
            .await?;
        let code = result
            .as_str()
            .ok_or_else(|| RpcError::Decode("eth_getCode: result is not a string".into()))?;
        Ok(code.len() > 2)
    }

    async fn factory_of(
        &self,
        client: &RpcClient,
        descriptor: &DexDescriptor,
    ) -> Result<Option<Address>, RpcError> {
        if let Some(factory) = descriptor.factory {
            return Ok(Some(factory));
        }

        let data = Bytes::from(IUniswapV2Router::factoryCall {}.abi_encode());
        let ret = client.call(descriptor.router, &data).await?;
        match IUniswapV2Router::factoryCall::abi_decode_returns(&ret, true) {
            Ok(decoded) if decoded.factory != Address::ZERO => Ok(Some(decoded.factory)),
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(dex = %descriptor.name, error = %err, "router.factory() decode failed");
                Ok(None)
            }
        }
    }

    async fn pair_from_factory(
        &self,
        client: &RpcClient,
        factory: Address,
        token0: Address,
        token1: Address,
    ) -> Result<Option<Address>, RpcError> {
        let data = Bytes::from(
            IUniswapV2Factory::getPairCall {
                tokenA: token0,
                tokenB: token1,
            }
            .abi_encode(),
        );
        let ret = client.call(factory, &data).await?;
        match IUniswapV2Factory::getPairCall::abi_decode_returns(&ret, true) {
            Ok(decoded) if decoded.pair != Address::ZERO => Ok(Some(decoded.pair)),
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(factory = %factory, error = %err, "factory.getPair() decode failed");
                Ok(None)
            }
        }
    }
}
