//! Per-candidate evaluation pipeline.
//!
//! Runs entirely on cycle-local data: reserve snapshots, the decimals cache,
//! and the sizing grid. Every drop reason has a named counter so a cycle's
//! outcome is observable without log scraping.

use std::collections::HashMap;

use alloy::primitives::Address;
use tracing::debug;

use arb_rpc::types::{sort_tokens, Candidate, DexDescriptor, DexKind, PairReserves};

use crate::amm::{self, PoolSide, RoundTripCosts};
use crate::sizing::SizingGrid;

/// Buy-side base reserves under this USD value are dust and drop regardless
/// of the configured liquidity threshold.
pub const MIN_BASE_RESERVE_USD: f64 = 500.0;

const DEFAULT_DECIMALS: u8 = 18;

/// Filter thresholds applied by the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    /// Minimum spread as a fraction (0.0075 = 0.75%).
    pub min_spread: f64,
    /// Minimum buy-side pool liquidity in USD (both reserves counted).
    pub min_liquidity_usd: f64,
    /// Minimum net profit in USD. May be negative (debug configurations).
    pub min_profit_usd: f64,
    /// Maximum tolerated buy-leg price impact in percent.
    pub max_price_impact_percent: f64,
    /// Flash-loan fee fraction.
    pub flash_fee: f64,
    /// Estimated gas cost of one execution in USD.
    pub gas_cost_usd: f64,
}

/// A candidate that cleared every filter, sized and priced.
#[derive(Clone, Debug)]
pub struct Opportunity {
    /// Intermediate token.
    pub trade: Address,
    /// Loan/profit token.
    pub base: Address,
    /// Venue to buy TRADE on (after any direction flip).
    pub buy_dex: String,
    /// Venue to sell TRADE on.
    pub sell_dex: String,
    /// Buy-side pool.
    pub buy_pair: Address,
    /// Sell-side pool.
    pub sell_pair: Address,
    /// On-chain mid-price on the buy side (BASE per TRADE).
    pub buy_price: f64,
    /// On-chain mid-price on the sell side.
    pub sell_price: f64,
    /// `(sell - buy) / buy`.
    pub spread: f64,
    /// Buy-side pool liquidity in USD.
    pub liquidity_usd: f64,
    /// Loan size in BASE token units.
    pub optimal_size: f64,
    /// Modeled net profit in USD.
    pub expected_profit_usd: f64,
    /// True when the candidate's buy/sell venues were swapped.
    pub flipped: bool,
}

/// Per-cycle drop counters, one per pipeline exit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Candidates examined.
    pub candidates: u32,
    /// Reserves missing from the cycle-local map.
    pub bad_reserves: u32,
    /// Pool tokens did not match the claimed base/trade.
    pub address_mismatch: u32,
    /// Prices equal on both venues even after the direction flip.
    pub inverted: u32,
    /// Spread under the configured minimum.
    pub low_spread_onchain: u32,
    /// Liquidity under the configured minimum (or the dust floor).
    pub low_liquidity: u32,
    /// A venue was not constant-product.
    pub non_v2: u32,
    /// The sizing grid returned zero.
    pub net_spread_zero: u32,
    /// Buy-leg price impact over the configured maximum.
    pub high_impact: u32,
    /// Modeled profit under the threshold.
    pub low_profit: u32,
    /// Opportunities emitted.
    pub emitted: u32,
}

impl CycleStats {
    /// Total candidates dropped this cycle.
    pub fn dropped(&self) -> u32 {
        self.candidates - self.emitted
    }

    /// Accumulates another cycle's counters into this one.
    pub fn merge(&mut self, other: &CycleStats) {
        self.candidates += other.candidates;
        self.bad_reserves += other.bad_reserves;
        self.address_mismatch += other.address_mismatch;
        self.inverted += other.inverted;
        self.low_spread_onchain += other.low_spread_onchain;
        self.low_liquidity += other.low_liquidity;
        self.non_v2 += other.non_v2;
        self.net_spread_zero += other.net_spread_zero;
        self.high_impact += other.high_impact;
        self.low_profit += other.low_profit;
        self.emitted += other.emitted;
    }
}

/// One venue of a candidate with oriented, unit-scaled reserves.
struct Side<'a> {
    dex: &'a str,
    pair: Address,
    base: f64,
    trade: f64,
}

/// The scan-and-decide pipeline over a cycle's candidates.
pub struct Evaluator<'a> {
    dexes: &'a HashMap<String, DexDescriptor>,
    grid: &'a SizingGrid,
    usd_prices: &'a HashMap<Address, f64>,
    thresholds: Thresholds,
}

impl<'a> Evaluator<'a> {
    /// Evaluator over the configured venue table, sizing grid, and USD
    /// price table.
    pub fn new(
        dexes: &'a HashMap<String, DexDescriptor>,
        grid: &'a SizingGrid,
        usd_prices: &'a HashMap<Address, f64>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            dexes,
            grid,
            usd_prices,
            thresholds,
        }
    }

    /// Runs the pipeline over `candidates`, returning surviving
    /// opportunities sorted by descending expected profit plus the cycle's
    /// drop counters.
    ///
    /// `token0_of` supplies the on-chain token0 for pools the resolver has
    /// verified; everything else falls back to the V2 sorted convention.
    pub fn evaluate<F>(
        &self,
        candidates: &[Candidate],
        reserves: &HashMap<Address, PairReserves>,
        decimals: &HashMap<Address, u8>,
        token0_of: F,
    ) -> (Vec<Opportunity>, CycleStats)
    where
        F: Fn(Address) -> Option<Address>,
    {
        let mut stats = CycleStats::default();
        let mut opportunities = Vec::new();

        for candidate in candidates {
            stats.candidates += 1;
            if let Some(opportunity) =
                self.evaluate_one(candidate, reserves, decimals, &token0_of, &mut stats)
            {
                stats.emitted += 1;
                opportunities.push(opportunity);
            }
        }

        opportunities.sort_by(|lhs, rhs| {
            rhs.expected_profit_usd
                .total_cmp(&lhs.expected_profit_usd)
        });
        (opportunities, stats)
    }

    fn evaluate_one<F>(
        &self,
        candidate: &Candidate,
        reserves: &HashMap<Address, PairReserves>,
        decimals: &HashMap<Address, u8>,
        token0_of: &F,
        stats: &mut CycleStats,
    ) -> Option<Opportunity>
    where
        F: Fn(Address) -> Option<Address>,
    {
        let (base, trade) = (candidate.base, candidate.trade);

        let Some(buy_reserves) = reserves.get(&candidate.buy.pair) else {
            stats.bad_reserves += 1;
            return None;
        };
        let Some(sell_reserves) = reserves.get(&candidate.sell.pair) else {
            stats.bad_reserves += 1;
            return None;
        };

        let Some((buy_base_raw, buy_trade_raw)) =
            oriented_reserves(buy_reserves, base, trade, token0_of(candidate.buy.pair))
        else {
            stats.address_mismatch += 1;
            return None;
        };
        let Some((sell_base_raw, sell_trade_raw)) =
            oriented_reserves(sell_reserves, base, trade, token0_of(candidate.sell.pair))
        else {
            stats.address_mismatch += 1;
            return None;
        };

        let d_base = decimals.get(&base).copied().unwrap_or(DEFAULT_DECIMALS);
        let d_trade = decimals.get(&trade).copied().unwrap_or(DEFAULT_DECIMALS);

        let mut buy = Side {
            dex: &candidate.buy.dex,
            pair: candidate.buy.pair,
            base: amm::to_token_units(buy_base_raw, d_base),
            trade: amm::to_token_units(buy_trade_raw, d_trade),
        };
        let mut sell = Side {
            dex: &candidate.sell.dex,
            pair: candidate.sell.pair,
            base: amm::to_token_units(sell_base_raw, d_base),
            trade: amm::to_token_units(sell_trade_raw, d_trade),
        };

        let mut buy_price = buy.base / buy.trade;
        let mut sell_price = sell.base / sell.trade;
        let mut flipped = false;

        if sell_price <= buy_price {
            std::mem::swap(&mut buy, &mut sell);
            std::mem::swap(&mut buy_price, &mut sell_price);
            flipped = true;
        }
        if sell_price <= buy_price {
            stats.inverted += 1;
            return None;
        }

        let spread = (sell_price - buy_price) / buy_price;
        if spread < self.thresholds.min_spread {
            stats.low_spread_onchain += 1;
            return None;
        }

        let base_usd = self.usd_prices.get(&base).copied().unwrap_or_else(|| {
            debug!(base = %base, "no USD price for base token, assuming 1.0");
            1.0
        });
        let base_reserve_usd = buy.base * base_usd;
        let liquidity_usd = 2.0 * base_reserve_usd;
        if base_reserve_usd < MIN_BASE_RESERVE_USD || liquidity_usd < self.thresholds.min_liquidity_usd
        {
            stats.low_liquidity += 1;
            return None;
        }

        let (Some(buy_dex), Some(sell_dex)) = (self.dexes.get(buy.dex), self.dexes.get(sell.dex))
        else {
            stats.non_v2 += 1;
            return None;
        };
        if buy_dex.kind != DexKind::V2 || sell_dex.kind != DexKind::V2 {
            stats.non_v2 += 1;
            return None;
        }
        if buy_dex.router == sell_dex.router {
            debug!(
                buy_pair = %buy.pair,
                sell_pair = %sell.pair,
                router = %buy_dex.router,
                "identical router on both venues"
            );
        }

        let optimal_size = self.grid.size(spread, buy.base, sell.base);
        if optimal_size <= 0.0 {
            stats.net_spread_zero += 1;
            return None;
        }

        let impact =
            amm::price_impact_percent(optimal_size, buy.base, buy.trade, buy_dex.fee_fraction());
        if impact > self.thresholds.max_price_impact_percent {
            stats.high_impact += 1;
            return None;
        }

        let costs = RoundTripCosts {
            flash_fee: self.thresholds.flash_fee,
            gas_base: self.thresholds.gas_cost_usd / base_usd,
        };
        let quote = amm::round_trip(
            optimal_size,
            &PoolSide {
                base: buy.base,
                trade: buy.trade,
                fee: buy_dex.fee_fraction(),
            },
            &PoolSide {
                base: sell.base,
                trade: sell.trade,
                fee: sell_dex.fee_fraction(),
            },
            &costs,
        );
        let expected_profit_usd = quote.net_base * base_usd;
        if expected_profit_usd < self.thresholds.min_profit_usd {
            stats.low_profit += 1;
            return None;
        }

        Some(Opportunity {
            trade,
            base,
            buy_dex: buy.dex.to_string(),
            sell_dex: sell.dex.to_string(),
            buy_pair: buy.pair,
            sell_pair: sell.pair,
            buy_price,
            sell_price,
            spread,
            liquidity_usd,
            optimal_size,
            expected_profit_usd,
            flipped,
        })
    }
}

/// Picks the (base, trade) reserve pair out of a pool snapshot.
///
/// `actual_token0` is the on-chain token0 when a resolution recorded it;
/// `None` falls back to the V2 sorted-address convention. A recorded token0
/// matching neither token means the pool belongs to a different pair.
fn oriented_reserves(
    reserves: &PairReserves,
    base: Address,
    trade: Address,
    actual_token0: Option<Address>,
) -> Option<(u128, u128)> {
    let (token0, token1) = match actual_token0 {
        Some(actual) => {
            if actual == base {
                (base, trade)
            } else if actual == trade {
                (trade, base)
            } else {
                return None;
            }
        }
        None => sort_tokens(base, trade),
    };

    let base_reserve = reserves.reserve_of(base, token0, token1)?;
    let trade_reserve = reserves.reserve_of(trade, token0, token1)?;
    Some((base_reserve, trade_reserve))
}
