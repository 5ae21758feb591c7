//! Integration tests for the evaluation pipeline.
//!
//! Tests verify:
//! - Every emitted opportunity satisfies the pipeline invariants (spread,
//!   liquidity, size, profit, V2-only venues)
//! - The direction flip swaps venues and marks the opportunity
//! - Drop counters account for every examined candidate

#[cfg(test)]
mod pipeline {
    use std::collections::HashMap;

    use alloy::primitives::{address, Address};

    use arb_engine::{Evaluator, SizingGrid, Thresholds};
    use arb_rpc::types::{Candidate, CandidateLeg, DexDescriptor, DexKind, PairReserves};

    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
    const WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");
    const QUICK_PAIR: Address = address!("853Ee4b2A13f8a742d64C8F088bE7bA2131f670d");
    const SUSHI_PAIR: Address = address!("34965ba0ac2451A34a0471F04CCa3F990b8dea27");

    fn make_dex(name: &str, kind: DexKind, router_suffix: u64) -> DexDescriptor {
        DexDescriptor {
            name: name.to_string(),
            kind,
            router: format!("0x{router_suffix:040x}").parse().unwrap(),
            factory: None,
            init_code_pair_hash: None,
            fee_bps: 30,
        }
    }

    fn dex_table() -> HashMap<String, DexDescriptor> {
        HashMap::from([
            (
                "quickswap".to_string(),
                make_dex("quickswap", DexKind::V2, 0xa1),
            ),
            (
                "sushiswap".to_string(),
                make_dex("sushiswap", DexKind::V2, 0xa2),
            ),
            (
                "balancer".to_string(),
                make_dex("balancer", DexKind::Balancer, 0xa3),
            ),
        ])
    }

    fn sizing_grid() -> SizingGrid {
        SizingGrid::new(
            vec![0.001, 0.05],
            vec![0.5, 1.0, 2.0],
            vec![vec![0.0, 0.0, 0.0], vec![0.004, 0.005, 0.004]],
        )
        .expect("grid is well-formed")
    }

    fn thresholds() -> Thresholds {
        Thresholds {
            min_spread: 0.0075,
            min_liquidity_usd: 500.0,
            min_profit_usd: -1.0,
            max_price_impact_percent: 80.0,
            flash_fee: 0.0005,
            gas_cost_usd: 0.05,
        }
    }

    /// BASE with 6 decimals, TRADE with 18: the §-scenario reserves.
    fn scenario_reserves(buy_usdc: u128, sell_usdc: u128) -> HashMap<Address, PairReserves> {
        HashMap::from([
            (
                QUICK_PAIR,
                PairReserves {
                    pair: QUICK_PAIR,
                    reserve0: buy_usdc * 10u128.pow(6),
                    reserve1: 500 * 10u128.pow(18),
                },
            ),
            (
                SUSHI_PAIR,
                PairReserves {
                    pair: SUSHI_PAIR,
                    reserve0: sell_usdc * 10u128.pow(6),
                    reserve1: 500 * 10u128.pow(18),
                },
            ),
        ])
    }

    fn candidate() -> Candidate {
        Candidate {
            trade: WETH,
            base: USDC,
            buy: CandidateLeg {
                dex: "quickswap".to_string(),
                pair: QUICK_PAIR,
            },
            sell: CandidateLeg {
                dex: "sushiswap".to_string(),
                pair: SUSHI_PAIR,
            },
        }
    }

    fn decimals() -> HashMap<Address, u8> {
        HashMap::from([(USDC, 6u8), (WETH, 18u8)])
    }

    #[test]
    fn emitted_opportunities_satisfy_all_invariants() {
        let dexes = dex_table();
        let grid = sizing_grid();
        let prices = HashMap::from([(USDC, 1.0)]);
        let thresholds = thresholds();
        let evaluator = Evaluator::new(&dexes, &grid, &prices, thresholds);

        // 1_000_000 vs 1_010_000 USDC against 500 WETH per side: 1% spread.
        let reserves = scenario_reserves(1_000_000, 1_010_000);
        let (opportunities, stats) =
            evaluator.evaluate(&[candidate()], &reserves, &decimals(), |_| None);

        assert_eq!(stats.candidates, 1);
        assert_eq!(stats.emitted, 1);

        for opportunity in &opportunities {
            assert!(opportunity.sell_price > opportunity.buy_price);
            assert!(opportunity.spread >= thresholds.min_spread);
            assert!(opportunity.liquidity_usd >= thresholds.min_liquidity_usd);
            assert!(opportunity.optimal_size > 0.0);
            assert!(opportunity.expected_profit_usd >= thresholds.min_profit_usd);
            assert_eq!(dexes[&opportunity.buy_dex].kind, DexKind::V2);
            assert_eq!(dexes[&opportunity.sell_dex].kind, DexKind::V2);
        }
    }

    #[test]
    fn flip_swaps_venues_and_is_marked() {
        let dexes = dex_table();
        let grid = sizing_grid();
        let prices = HashMap::from([(USDC, 1.0)]);
        let evaluator = Evaluator::new(&dexes, &grid, &prices, thresholds());

        // Same reserves, opposite orientation: the candidate's buy venue is
        // actually the expensive one.
        let reserves = scenario_reserves(1_010_000, 1_000_000);
        let (opportunities, stats) =
            evaluator.evaluate(&[candidate()], &reserves, &decimals(), |_| None);

        assert_eq!(stats.emitted, 1);
        let opportunity = &opportunities[0];
        assert!(opportunity.flipped);
        assert_eq!(opportunity.buy_dex, "sushiswap");
        assert_eq!(opportunity.sell_dex, "quickswap");
        assert_eq!(opportunity.buy_pair, SUSHI_PAIR);
        assert_eq!(opportunity.sell_pair, QUICK_PAIR);
        assert!(opportunity.sell_price > opportunity.buy_price);
    }

    #[test]
    fn counters_account_for_every_candidate() {
        let dexes = dex_table();
        let grid = sizing_grid();
        let prices = HashMap::from([(USDC, 1.0)]);
        let evaluator = Evaluator::new(&dexes, &grid, &prices, thresholds());

        // Candidate 1 survives, candidate 2 has no reserves, candidate 3
        // runs over a non-V2 venue.
        let reserves = scenario_reserves(1_000_000, 1_010_000);

        let mut missing = candidate();
        missing.buy.pair = address!("6e7a5FAFcec6BB1e78bAE2A1F0B612012BF14827");

        let mut weighted = candidate();
        weighted.sell.dex = "balancer".to_string();

        let (opportunities, stats) = evaluator.evaluate(
            &[candidate(), missing, weighted],
            &reserves,
            &decimals(),
            |_| None,
        );

        assert_eq!(opportunities.len(), 1);
        assert_eq!(stats.candidates, 3);
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.bad_reserves, 1);
        assert_eq!(stats.non_v2, 1);
        assert_eq!(stats.dropped(), 2);
    }

    #[test]
    fn equal_prices_drop_even_after_flip() {
        let dexes = dex_table();
        let grid = sizing_grid();
        let prices = HashMap::from([(USDC, 1.0)]);
        let evaluator = Evaluator::new(&dexes, &grid, &prices, thresholds());

        let reserves = scenario_reserves(1_000_000, 1_000_000);
        let (opportunities, stats) =
            evaluator.evaluate(&[candidate()], &reserves, &decimals(), |_| None);

        assert!(opportunities.is_empty());
        assert_eq!(stats.inverted, 1);
    }
}
