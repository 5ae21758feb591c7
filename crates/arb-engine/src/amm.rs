//! Constant-product AMM math.
//!
//! All quantities are f64 token units (reserves divided by 10^decimals).
//! The model assumes atomic execution: both swap legs happen in one
//! transaction whose failure reverts all state, so intermediate balances
//! never exist outside the quote.

use alloy::primitives::U256;

/// Output of one V2 swap: `out = x(1-phi) * Rout / (Rin + x(1-phi))`.
pub fn swap_out(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    if amount_in <= 0.0 || reserve_in <= 0.0 || reserve_out <= 0.0 {
        return 0.0;
    }
    let in_with_fee = amount_in * (1.0 - fee);
    (in_with_fee * reserve_out) / (reserve_in + in_with_fee)
}

/// Execution-price impact in percent:
/// `100 * (Rout/Rin - out/x) / (Rout/Rin)`.
pub fn price_impact_percent(amount_in: f64, reserve_in: f64, reserve_out: f64, fee: f64) -> f64 {
    if amount_in <= 0.0 || reserve_in <= 0.0 || reserve_out <= 0.0 {
        return 0.0;
    }
    let spot = reserve_out / reserve_in;
    let executed = swap_out(amount_in, reserve_in, reserve_out, fee) / amount_in;
    100.0 * (spot - executed) / spot
}

/// One pool viewed from the round trip: reserves in token units plus fee.
#[derive(Clone, Copy, Debug)]
pub struct PoolSide {
    /// BASE reserve in token units.
    pub base: f64,
    /// TRADE reserve in token units.
    pub trade: f64,
    /// Swap fee fraction.
    pub fee: f64,
}

/// Costs applied on top of the two swaps.
#[derive(Clone, Copy, Debug)]
pub struct RoundTripCosts {
    /// Flash-loan fee fraction (repay = loan * (1 + fee)).
    pub flash_fee: f64,
    /// Gas cost expressed in BASE token units.
    pub gas_base: f64,
}

/// Quote for borrowing `loan` BASE, buying TRADE, selling it back.
#[derive(Clone, Copy, Debug)]
pub struct RoundTripQuote {
    /// TRADE acquired on the buy venue.
    pub trade_out: f64,
    /// BASE received on the sell venue.
    pub base_out: f64,
    /// Loan repayment including the flash fee.
    pub repay: f64,
    /// `base_out - repay - gas_base`.
    pub net_base: f64,
}

/// Runs the borrow-swap-swap-repay model end to end.
pub fn round_trip(loan: f64, buy: &PoolSide, sell: &PoolSide, costs: &RoundTripCosts) -> RoundTripQuote {
    let trade_out = swap_out(loan, buy.base, buy.trade, buy.fee);
    let base_out = swap_out(trade_out, sell.trade, sell.base, sell.fee);
    let repay = loan * (1.0 + costs.flash_fee);
    RoundTripQuote {
        trade_out,
        base_out,
        repay,
        net_base: base_out - repay - costs.gas_base,
    }
}

/// Raw (wei-style) integer amount to token units.
pub fn to_token_units(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(i32::from(decimals))
}

/// Token units back to a raw integer amount, floored. Non-finite and
/// non-positive inputs become zero.
pub fn to_raw_amount(amount: f64, decimals: u8) -> U256 {
    let scaled = amount * 10f64.powi(i32::from(decimals));
    if !scaled.is_finite() || scaled <= 0.0 {
        return U256::ZERO;
    }
    U256::from(scaled.min(u128::MAX as f64) as u128)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_out_matches_router_math() {
        // Mirrors getAmountOut(5e18, 2757113099049556297952, 5176991819833)
        // at the canonical 0.3% fee: 9343369893 from the router.
        let out = swap_out(5e18, 2757113099049556297952.0, 5176991819833.0, 0.003);
        assert!((out - 9343369893.0).abs() / 9343369893.0 < 1e-6);
    }

    #[test]
    fn swap_out_zero_on_degenerate_inputs() {
        assert_eq!(swap_out(0.0, 1.0, 1.0, 0.003), 0.0);
        assert_eq!(swap_out(1.0, 0.0, 1.0, 0.003), 0.0);
        assert_eq!(swap_out(1.0, 1.0, 0.0, 0.003), 0.0);
    }

    #[test]
    fn zero_fee_round_trip_recovers_input() {
        // Swapping out and back through the same refreshed pool with no fee
        // must return the input up to float precision.
        let (r_base, r_trade) = (1_000_000.0, 500.0);
        let input = 1_000.0;

        let out = swap_out(input, r_base, r_trade, 0.0);
        // Reserves refreshed after the first swap.
        let back = swap_out(out, r_trade - out, r_base + input, 0.0);
        assert!((back - input).abs() < 1e-6 * input);
    }

    #[test]
    fn impact_grows_with_size() {
        let small = price_impact_percent(100.0, 1_000_000.0, 500.0, 0.003);
        let large = price_impact_percent(100_000.0, 1_000_000.0, 500.0, 0.003);
        assert!(small > 0.0);
        assert!(large > small);
        // A trade of 10% of the input reserve moves the price on that order.
        assert!(large > 5.0 && large < 15.0);
    }

    #[test]
    fn round_trip_nets_out_costs() {
        let buy = PoolSide {
            base: 1_000_000.0,
            trade: 500.0,
            fee: 0.003,
        };
        let sell = PoolSide {
            base: 1_010_000.0,
            trade: 500.0,
            fee: 0.003,
        };
        let costs = RoundTripCosts {
            flash_fee: 0.0005,
            gas_base: 0.05,
        };

        let quote = round_trip(5_000.0, &buy, &sell, &costs);
        assert!(quote.trade_out > 0.0);
        assert_eq!(quote.repay, 5_000.0 * 1.0005);
        assert!((quote.net_base - (quote.base_out - quote.repay - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn raw_amount_conversions_round_trip() {
        let raw = 1_234_567_890u128;
        let units = to_token_units(raw, 6);
        assert!((units - 1234.56789).abs() < 1e-9);
        assert_eq!(to_raw_amount(units, 6), U256::from(raw));

        assert_eq!(to_raw_amount(-1.0, 18), U256::ZERO);
        assert_eq!(to_raw_amount(f64::NAN, 18), U256::ZERO);
    }
}
