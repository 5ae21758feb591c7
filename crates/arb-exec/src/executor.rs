//! Pre-flight, signing, and submission of the atomic transaction.
//!
//! The executor never trusts the evaluator's numbers: pair addresses are
//! re-resolved through the venues' routers, reserves are re-read, and the
//! round trip is re-quoted before any calldata is built. The economic gate
//! (`expected out > repay`) is the final safety net behind all pipeline
//! filters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::hex;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use chrono::Utc;
use eyre::{eyre, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use arb_engine::amm;
use arb_engine::calldata::{self, SwapLeg, BALANCE_SENTINEL};
use arb_engine::Opportunity;
use arb_rpc::resolver::PairResolver;
use arb_rpc::reserves::ReservesFetcher;
use arb_rpc::types::DexDescriptor;
use arb_rpc::{RpcClient, RpcError};

/// Seconds of validity given to each swap deadline.
const SWAP_DEADLINE_SECS: i64 = 300;
/// Receipt polling interval.
const RECEIPT_POLL: Duration = Duration::from_secs(2);
/// Receipt waiting budget.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Static executor configuration.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Outer executor contract.
    pub contract: Address,
    /// Chain id for signing.
    pub chain_id: u64,
    /// Fixed outer gas cap.
    pub gas_limit: u64,
    /// Multiplier applied to `eth_gasPrice`.
    pub gas_price_multiplier: f64,
    /// Minimum gas price in wei (per-chain floor).
    pub gas_price_floor_wei: u128,
    /// Slippage fraction for minimum outputs (0.005 = 0.5%).
    pub slippage: f64,
    /// Flash-loan fee fraction.
    pub flash_fee: f64,
    /// Tokens the flash-loan provider supports.
    pub flash_assets: Vec<Address>,
    /// Stop after a successful pre-flight instead of submitting.
    pub simulation_mode: bool,
}

/// Terminal state of one execution attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Transaction landed with receipt status 1.
    Executed {
        /// Submitted transaction hash.
        tx_hash: String,
    },
    /// Pre-flight succeeded and simulation mode stopped there.
    Simulated,
    /// Neither base nor trade token is flash-loanable.
    NoFlashAsset,
    /// A pair could not be resolved or re-read on its claimed venue.
    Unresolvable,
    /// Fresh reserves no longer cover the repayment.
    EconomicAbort,
    /// Pre-flight or gas estimation reverted; nothing was submitted.
    Reverted {
        /// Decoded revert reason.
        reason: String,
    },
    /// Transaction landed with receipt status 0.
    Failed {
        /// Submitted transaction hash.
        tx_hash: String,
    },
    /// No receipt within the waiting budget; on-chain state unknown.
    ReceiptTimeout {
        /// Submitted transaction hash.
        tx_hash: String,
    },
}

/// One leg of the planned route with fresh, oriented reserves.
struct PlannedLeg<'a> {
    dex: &'a DexDescriptor,
    token_in: Address,
    token_out: Address,
    reserve_in: f64,
    reserve_out: f64,
}

/// Executes opportunities against live chain state.
pub struct Executor {
    client: Arc<RpcClient>,
    resolver: Arc<PairResolver>,
    reserves: ReservesFetcher,
    signer: Option<PrivateKeySigner>,
    config: ExecutorConfig,
}

impl Executor {
    /// Builds an executor. `signer` may be absent only in simulation mode;
    /// the config loader enforces that at startup.
    pub fn new(
        client: Arc<RpcClient>,
        resolver: Arc<PairResolver>,
        reserves: ReservesFetcher,
        signer: Option<PrivateKeySigner>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            client,
            resolver,
            reserves,
            signer,
            config,
        }
    }

    /// Runs one opportunity through verification, quoting, pre-flight and
    /// (outside simulation mode) submission.
    ///
    /// # Errors
    /// Only transport-level failures propagate; every economic or
    /// simulation outcome is a variant of [`Outcome`].
    pub async fn execute(
        &self,
        opportunity: &Opportunity,
        dexes: &HashMap<String, DexDescriptor>,
        decimals: &HashMap<Address, u8>,
    ) -> Result<Outcome> {
        let base = opportunity.base;
        let trade = opportunity.trade;

        // Flash-loan token choice: base if supported, else trade, else out.
        let loan_token = if self.config.flash_assets.contains(&base) {
            base
        } else if self.config.flash_assets.contains(&trade) {
            trade
        } else {
            debug!(base = %base, trade = %trade, "no flash-loanable token for route");
            return Ok(Outcome::NoFlashAsset);
        };

        let (Some(buy_dex), Some(sell_dex)) = (
            dexes.get(&opportunity.buy_dex),
            dexes.get(&opportunity.sell_dex),
        ) else {
            return Ok(Outcome::Unresolvable);
        };

        // Re-resolve through the routers so any address mismatch has been
        // repaired before quoting.
        let buy_pair = self
            .resolver
            .verify_or_repair(&self.client, &buy_dex.name, base, trade, opportunity.buy_pair)
            .await?;
        let sell_pair = self
            .resolver
            .verify_or_repair(
                &self.client,
                &sell_dex.name,
                base,
                trade,
                opportunity.sell_pair,
            )
            .await?;
        let (Some(buy_pair), Some(sell_pair)) = (buy_pair, sell_pair) else {
            return Ok(Outcome::Unresolvable);
        };

        let fresh = self
            .reserves
            .fetch(&self.client, &[buy_pair, sell_pair])
            .await;
        let (Some(buy_reserves), Some(sell_reserves)) =
            (fresh.get(&buy_pair), fresh.get(&sell_pair))
        else {
            warn!(buy_pair = %buy_pair, sell_pair = %sell_pair, "reserves unreadable at execution time");
            return Ok(Outcome::Unresolvable);
        };

        let d_base = decimals.get(&base).copied().unwrap_or(18);
        let d_trade = decimals.get(&trade).copied().unwrap_or(18);
        let orient = |pair: Address, reserves: &arb_rpc::types::PairReserves| {
            let token0 = self
                .resolver
                .token0_of(pair)
                .unwrap_or_else(|| arb_rpc::types::sort_tokens(base, trade).0);
            if token0 == base {
                Some((reserves.reserve0, reserves.reserve1))
            } else if token0 == trade {
                Some((reserves.reserve1, reserves.reserve0))
            } else {
                None
            }
        };
        let (Some((buy_base_raw, buy_trade_raw)), Some((sell_base_raw, sell_trade_raw))) =
            (orient(buy_pair, buy_reserves), orient(sell_pair, sell_reserves))
        else {
            return Ok(Outcome::Unresolvable);
        };

        let buy_base = amm::to_token_units(buy_base_raw, d_base);
        let buy_trade = amm::to_token_units(buy_trade_raw, d_trade);
        let sell_base = amm::to_token_units(sell_base_raw, d_base);
        let sell_trade = amm::to_token_units(sell_trade_raw, d_trade);

        // Route in loan-token terms. A base loan buys TRADE cheap and sells
        // it dear; a trade loan walks the same cycle from the other corner.
        let (loan_units, loan_decimals, legs) = if loan_token == base {
            (
                opportunity.optimal_size,
                d_base,
                [
                    PlannedLeg {
                        dex: buy_dex,
                        token_in: base,
                        token_out: trade,
                        reserve_in: buy_base,
                        reserve_out: buy_trade,
                    },
                    PlannedLeg {
                        dex: sell_dex,
                        token_in: trade,
                        token_out: base,
                        reserve_in: sell_trade,
                        reserve_out: sell_base,
                    },
                ],
            )
        } else {
            let sell_price = sell_base / sell_trade;
            (
                opportunity.optimal_size / sell_price,
                d_trade,
                [
                    PlannedLeg {
                        dex: sell_dex,
                        token_in: trade,
                        token_out: base,
                        reserve_in: sell_trade,
                        reserve_out: sell_base,
                    },
                    PlannedLeg {
                        dex: buy_dex,
                        token_in: base,
                        token_out: trade,
                        reserve_in: buy_base,
                        reserve_out: buy_trade,
                    },
                ],
            )
        };

        // Quote the path on the freshly-read reserves.
        let mid_out = amm::swap_out(
            loan_units,
            legs[0].reserve_in,
            legs[0].reserve_out,
            legs[0].dex.fee_fraction(),
        );
        let final_out = amm::swap_out(
            mid_out,
            legs[1].reserve_in,
            legs[1].reserve_out,
            legs[1].dex.fee_fraction(),
        );
        let repay_units = loan_units * (1.0 + self.config.flash_fee);

        if final_out <= repay_units {
            debug!(
                final_out,
                repay_units, "expected output does not cover repayment"
            );
            return Ok(Outcome::EconomicAbort);
        }

        let loan_raw = amm::to_raw_amount(loan_units, loan_decimals);
        let repay_raw = amm::to_raw_amount(repay_units, loan_decimals);
        let mid_decimals = if legs[0].token_out == base { d_base } else { d_trade };
        let slip = 1.0 - self.config.slippage;
        let mid_min_raw = amm::to_raw_amount(mid_out * slip, mid_decimals);
        let final_min_raw = amm::to_raw_amount(final_out * slip, loan_decimals);
        let min_final_output = final_min_raw.max(repay_raw + U256::from(1u8));

        let deadline = U256::from((Utc::now().timestamp() + SWAP_DEADLINE_SECS) as u64);
        let first = calldata::encode_swap(&SwapLeg {
            dex: legs[0].dex,
            token_in: legs[0].token_in,
            token_out: legs[0].token_out,
            amount_in: loan_raw,
            amount_out_min: mid_min_raw,
            recipient: self.config.contract,
            deadline,
        })?;
        let second = calldata::encode_swap(&SwapLeg {
            dex: legs[1].dex,
            token_in: legs[1].token_in,
            token_out: legs[1].token_out,
            // The contract substitutes its actual mid-token balance.
            amount_in: BALANCE_SENTINEL,
            amount_out_min: final_min_raw,
            recipient: self.config.contract,
            deadline,
        })?;

        let params = calldata::encode_executor_params(
            &[first, second],
            &[legs[0].dex.router, legs[1].dex.router],
            &[legs[0].token_in, legs[1].token_in],
            min_final_output,
        );
        let call_data = calldata::encode_execute_arbitrage(loan_token, loan_raw, params);

        info!(
            loan = %loan_raw,
            token = %loan_token,
            expected_out = final_out,
            buy_pair = %buy_pair,
            sell_pair = %sell_pair,
            "pre-flight simulation"
        );
        if let Some(outcome) = self.preflight(&call_data).await? {
            return Ok(outcome);
        }
        if self.config.simulation_mode {
            info!("simulation mode: stopping after successful pre-flight");
            return Ok(Outcome::Simulated);
        }

        let Some(gas_estimate) = self.estimate_gas(&call_data).await? else {
            return Ok(Outcome::Reverted {
                reason: "gas estimation reverted".to_string(),
            });
        };
        debug!(gas_estimate, cap = self.config.gas_limit, "gas estimated");

        self.submit(&call_data).await
    }

    fn sender(&self) -> Address {
        self.signer
            .as_ref()
            .map(|signer| signer.address())
            .unwrap_or(Address::ZERO)
    }

    /// `eth_call` the transaction against `latest`. `Ok(None)` means the
    /// call succeeded; `Ok(Some(outcome))` carries a decoded revert.
    async fn preflight(&self, call_data: &Bytes) -> Result<Option<Outcome>> {
        let params = json!([{
            "from": format!("{}", self.sender()),
            "to": format!("{}", self.config.contract),
            "data": format!("{call_data}"),
        }, "latest"]);

        match self.client.request("eth_call", params).await {
            Ok(_) => Ok(None),
            Err(RpcError::JsonRpc { message, data, .. }) => {
                let reason = data
                    .as_deref()
                    .and_then(crate::revert::revert_bytes)
                    .map(|bytes| crate::revert::decode_revert(&bytes))
                    .unwrap_or(message);
                warn!(reason, "pre-flight reverted");
                Ok(Some(Outcome::Reverted { reason }))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// `eth_estimateGas`, `None` when the node refuses the transaction.
    async fn estimate_gas(&self, call_data: &Bytes) -> Result<Option<u64>> {
        let params = json!([{
            "from": format!("{}", self.sender()),
            "to": format!("{}", self.config.contract),
            "data": format!("{call_data}"),
        }]);

        match self.client.request("eth_estimateGas", params).await {
            Ok(value) => Ok(Some(parse_quantity(&value)? as u64)),
            Err(RpcError::JsonRpc { message, data, .. }) => {
                let reason = data
                    .as_deref()
                    .and_then(crate::revert::revert_bytes)
                    .map(|bytes| crate::revert::decode_revert(&bytes))
                    .unwrap_or(message);
                warn!(reason, "gas estimation refused");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Signs a legacy transaction and submits it, then waits for a receipt.
    async fn submit(&self, call_data: &Bytes) -> Result<Outcome> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| eyre!("submission requires a signer"))?;

        let gas_price = self.gas_price().await?;
        let nonce = parse_quantity(
            &self
                .client
                .request(
                    "eth_getTransactionCount",
                    json!([format!("{}", signer.address()), "pending"]),
                )
                .await?,
        )? as u64;

        let mut tx = TxLegacy {
            chain_id: Some(self.config.chain_id),
            nonce,
            gas_price,
            gas_limit: self.config.gas_limit,
            to: TxKind::Call(self.config.contract),
            value: U256::ZERO,
            input: call_data.clone(),
        };
        let signature = signer.sign_transaction_sync(&mut tx)?;
        let signed = tx.into_signed(signature);
        let raw = format!("0x{}", hex::encode(signed.encoded_2718()));

        let result = self
            .client
            .request("eth_sendRawTransaction", json!([raw]))
            .await?;
        let tx_hash = result
            .as_str()
            .ok_or_else(|| eyre!("eth_sendRawTransaction returned a non-string"))?
            .to_string();
        info!(tx_hash, nonce, gas_price, "transaction submitted");

        self.wait_for_receipt(tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: String) -> Result<Outcome> {
        let wait = async {
            loop {
                let receipt = self
                    .client
                    .request("eth_getTransactionReceipt", json!([&tx_hash]))
                    .await?;
                if let Some(status) = receipt.get("status").and_then(Value::as_str) {
                    return Ok::<bool, RpcError>(status == "0x1");
                }
                tokio::time::sleep(RECEIPT_POLL).await;
            }
        };

        match tokio::time::timeout(RECEIPT_TIMEOUT, wait).await {
            Ok(Ok(true)) => {
                info!(tx_hash, "transaction confirmed");
                Ok(Outcome::Executed { tx_hash })
            }
            Ok(Ok(false)) => {
                warn!(tx_hash, "transaction failed on-chain");
                Ok(Outcome::Failed { tx_hash })
            }
            Ok(Err(err)) => Err(err.into()),
            Err(_) => {
                warn!(tx_hash, "no receipt within the waiting budget");
                Ok(Outcome::ReceiptTimeout { tx_hash })
            }
        }
    }

    async fn gas_price(&self) -> Result<u128> {
        let quoted = parse_quantity(&self.client.request("eth_gasPrice", json!([])).await?)?;
        let bumped = (quoted as f64 * self.config.gas_price_multiplier) as u128;
        Ok(bumped.max(self.config.gas_price_floor_wei))
    }
}

/// Parses a JSON-RPC hex quantity ("0x...") into an integer.
fn parse_quantity(value: &Value) -> Result<u128> {
    let text = value
        .as_str()
        .ok_or_else(|| eyre!("expected hex quantity, got {value}"))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u128::from_str_radix(digits, 16).map_err(|err| eyre!("bad hex quantity {text}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quantity_reads_hex() {
        assert_eq!(parse_quantity(&json!("0x0")).unwrap(), 0);
        assert_eq!(parse_quantity(&json!("0x1b")).unwrap(), 27);
        assert_eq!(parse_quantity(&json!("0x4a817c800")).unwrap(), 20_000_000_000);
        assert!(parse_quantity(&json!(12)).is_err());
        assert!(parse_quantity(&json!("0xzz")).is_err());
    }
}
