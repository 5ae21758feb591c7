//! The scan loop.
//!
//! One cycle in flight at a time: candidates are pulled, the reserves and
//! decimals fetches fan out together, evaluation runs on the cycle-local
//! snapshot, and up to three survivors reach the executor. Reserves never
//! cross the cycle boundary; the caches are warm for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use eyre::{eyre, Context, Result};
use tracing::{info, warn};

use arb_engine::{CycleStats, Evaluator, SizingGrid, Thresholds};
use arb_exec::{Executor, ExecutorConfig, Outcome};
use arb_rpc::decimals::DecimalsCache;
use arb_rpc::reserves::ReservesFetcher;
use arb_rpc::resolver::PairResolver;
use arb_rpc::types::DexDescriptor;
use arb_rpc::RpcClient;

use crate::candidates::JsonlCandidates;
use crate::config::AppConfig;

/// Forced endpoint rotation cadence, in cycles.
const ROTATE_EVERY_CYCLES: u64 = 5;

/// Lifetime counters across all cycles of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Completed scan cycles.
    pub cycles: u64,
    /// Merged evaluator drop counters.
    pub eval: CycleStats,
    /// Transactions confirmed with status 1.
    pub executed: u32,
    /// Successful pre-flights in simulation mode.
    pub simulated: u32,
    /// Routes with no flash-loanable token.
    pub no_flash_asset: u32,
    /// Pairs that could not be re-resolved or re-read.
    pub unresolvable: u32,
    /// Fresh quotes that no longer covered repayment.
    pub economic_abort: u32,
    /// Pre-flight reverts (nothing submitted).
    pub simulation_revert: u32,
    /// Transactions confirmed with status 0.
    pub tx_failed: u32,
    /// Submissions with no receipt inside the waiting budget.
    pub receipt_timeout: u32,
    /// Transport-level execution failures.
    pub transport_errors: u32,
}

impl RunStats {
    fn note(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Executed { .. } => self.executed += 1,
            Outcome::Simulated => self.simulated += 1,
            Outcome::NoFlashAsset => self.no_flash_asset += 1,
            Outcome::Unresolvable => self.unresolvable += 1,
            Outcome::EconomicAbort => self.economic_abort += 1,
            Outcome::Reverted { .. } => self.simulation_revert += 1,
            Outcome::Failed { .. } => self.tx_failed += 1,
            Outcome::ReceiptTimeout { .. } => self.receipt_timeout += 1,
        }
    }

    /// Shutdown summary rendered as a table.
    pub fn summary_table(&self) -> Table {
        let rows = [
            ("cycles", self.cycles.to_string()),
            ("candidates", self.eval.candidates.to_string()),
            ("opportunities", self.eval.emitted.to_string()),
            ("bad_reserves", self.eval.bad_reserves.to_string()),
            ("address_mismatch", self.eval.address_mismatch.to_string()),
            ("inverted", self.eval.inverted.to_string()),
            ("low_spread_onchain", self.eval.low_spread_onchain.to_string()),
            ("low_liquidity", self.eval.low_liquidity.to_string()),
            ("non_v2", self.eval.non_v2.to_string()),
            ("net_spread_zero", self.eval.net_spread_zero.to_string()),
            ("high_impact", self.eval.high_impact.to_string()),
            ("low_profit", self.eval.low_profit.to_string()),
            ("executed", self.executed.to_string()),
            ("simulated", self.simulated.to_string()),
            ("no_flash_asset", self.no_flash_asset.to_string()),
            ("unresolvable", self.unresolvable.to_string()),
            ("economic_abort", self.economic_abort.to_string()),
            ("simulation_revert", self.simulation_revert.to_string()),
            ("tx_failed", self.tx_failed.to_string()),
            ("receipt_timeout", self.receipt_timeout.to_string()),
            ("transport_errors", self.transport_errors.to_string()),
        ];

        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(["counter", "value"]);
        for (name, value) in rows {
            table.add_row([name.to_string(), value]);
        }
        table
    }
}

/// Owns every long-lived component and drives the cycle cadence.
pub struct Scanner {
    config: AppConfig,
    client: Arc<RpcClient>,
    resolver: Arc<PairResolver>,
    decimals: DecimalsCache,
    reserves: ReservesFetcher,
    grid: SizingGrid,
    dexes: HashMap<String, DexDescriptor>,
    usd_prices: HashMap<Address, f64>,
    thresholds: Thresholds,
    candidates: JsonlCandidates,
    executor: Executor,
    stats: RunStats,
}

impl Scanner {
    /// Builds the scanner from validated configuration. Any failure here is
    /// a startup error and terminates the process.
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let chain = config.chain();

        let client = Arc::new(RpcClient::new(
            config.rpc_endpoints.clone(),
            config.rotate_after,
        )?);
        let dexes = config.enabled_dex_table();
        let resolver = Arc::new(PairResolver::new(dexes.clone()));
        let decimals = DecimalsCache::load(&config.decimals_cache_file)?;
        let grid = SizingGrid::load(&config.sizing_grid_file)?;
        let candidates =
            JsonlCandidates::new(&config.candidates_file, dexes.keys().cloned());

        let signer = match &config.private_key {
            Some(key) => Some(
                key.parse::<PrivateKeySigner>()
                    .map_err(|err| eyre!("invalid private key: {err}"))?,
            ),
            None => None,
        };

        let executor = Executor::new(
            Arc::clone(&client),
            Arc::clone(&resolver),
            ReservesFetcher::new(config.batch_size),
            signer,
            ExecutorConfig {
                contract: config.contract_address.unwrap_or(Address::ZERO),
                chain_id: chain.id,
                gas_limit: config.gas_limit,
                gas_price_multiplier: config.gas_price_multiplier,
                gas_price_floor_wei: u128::from(chain.gas_price_floor_gwei) * 1_000_000_000,
                slippage: config.slippage(),
                flash_fee: config.flash_fee(),
                flash_assets: config.flash_loan_assets.clone(),
                simulation_mode: config.simulation_mode,
            },
        );

        if config.min_profit_usd < 0.0 {
            warn!(
                min_profit_usd = config.min_profit_usd,
                "profit threshold is negative (debug value); the profit gate passes everything"
            );
        } else {
            info!(min_profit_usd = config.min_profit_usd, "profit threshold");
        }
        info!(
            chain = %config.chain,
            endpoints = config.rpc_endpoints.len(),
            venues = dexes.len(),
            cached_decimals = decimals.len(),
            simulation = config.simulation_mode,
            "scanner initialized"
        );

        Ok(Self {
            usd_prices: config.usd_prices(),
            thresholds: config.thresholds(),
            reserves: ReservesFetcher::new(config.batch_size),
            config,
            client,
            resolver,
            decimals,
            grid,
            dexes,
            candidates,
            executor,
            stats: RunStats::default(),
        })
    }

    /// Runs cycles until interrupted (or once, with `once`). On shutdown
    /// the decimals cache is flushed and the run summary printed.
    pub async fn run(mut self, once: bool) -> Result<()> {
        let interval = Duration::from_secs(self.config.scan_interval_sec);

        loop {
            tokio::select! {
                result = self.cycle() => {
                    if let Err(err) = result {
                        warn!(error = %err, "scan cycle failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received during cycle, shutting down");
                    break;
                }
            }

            if once {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            }
        }

        self.decimals
            .flush()
            .wrap_err("failed to flush decimals cache on shutdown")?;
        println!("{}", self.stats.summary_table());
        Ok(())
    }

    async fn cycle(&mut self) -> Result<()> {
        let started = Instant::now();
        self.stats.cycles += 1;
        if self.stats.cycles % ROTATE_EVERY_CYCLES == 0 {
            self.client.force_rotate();
        }

        let candidates = self.candidates.load()?;
        if candidates.is_empty() {
            info!(cycle = self.stats.cycles, "no candidates to scan");
            return Ok(());
        }

        let mut pairs = Vec::with_capacity(candidates.len() * 2);
        let mut tokens = Vec::with_capacity(candidates.len() * 2);
        for candidate in &candidates {
            pairs.push(candidate.buy.pair);
            pairs.push(candidate.sell.pair);
            tokens.push(candidate.base);
            tokens.push(candidate.trade);
        }

        // The two fetches fan out together; their results die with this
        // cycle while the decimals cache itself stays warm.
        let (reserves, decimals) = tokio::join!(
            self.reserves.fetch(&self.client, &pairs),
            self.decimals.ensure(&self.client, &tokens)
        );

        let evaluator = Evaluator::new(&self.dexes, &self.grid, &self.usd_prices, self.thresholds);
        let resolver = Arc::clone(&self.resolver);
        let (opportunities, cycle_stats) =
            evaluator.evaluate(&candidates, &reserves, &decimals, move |pair| {
                resolver.token0_of(pair)
            });

        info!(
            cycle = self.stats.cycles,
            candidates = cycle_stats.candidates,
            opportunities = cycle_stats.emitted,
            bad_reserves = cycle_stats.bad_reserves,
            low_spread = cycle_stats.low_spread_onchain,
            low_liquidity = cycle_stats.low_liquidity,
            low_profit = cycle_stats.low_profit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle evaluated"
        );
        self.stats.eval.merge(&cycle_stats);

        for opportunity in opportunities
            .iter()
            .take(self.config.max_executions_per_cycle)
        {
            info!(
                buy_dex = %opportunity.buy_dex,
                sell_dex = %opportunity.sell_dex,
                spread_pct = opportunity.spread * 100.0,
                size = opportunity.optimal_size,
                expected_profit_usd = opportunity.expected_profit_usd,
                flipped = opportunity.flipped,
                "attempting execution"
            );
            match self
                .executor
                .execute(opportunity, &self.dexes, &decimals)
                .await
            {
                Ok(outcome) => {
                    info!(?outcome, "execution attempt finished");
                    let stop = matches!(outcome, Outcome::Executed { .. });
                    self.stats.note(&outcome);
                    if stop {
                        break;
                    }
                }
                Err(err) => {
                    self.stats.transport_errors += 1;
                    warn!(error = %err, "execution attempt failed");
                }
            }
        }

        self.decimals
            .flush()
            .wrap_err("failed to flush decimals cache")?;
        Ok(())
    }
}
