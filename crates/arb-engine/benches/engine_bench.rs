//! Benchmarks for the evaluator hot path.
//!
//! Uses synthetic reserve maps (no RPC) for reproducible measurements.
//! Run with: `cargo bench --package arb-engine`

use std::collections::HashMap;

use alloy::primitives::Address;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arb_engine::amm::{round_trip, PoolSide, RoundTripCosts};
use arb_engine::{Evaluator, SizingGrid, Thresholds};
use arb_rpc::types::{Candidate, CandidateLeg, DexDescriptor, DexKind, PairReserves};

fn addr(suffix: u64) -> Address {
    format!("0x{suffix:040x}").parse().expect("valid address")
}

fn descriptor(name: &str, router_suffix: u64) -> DexDescriptor {
    DexDescriptor {
        name: name.to_string(),
        kind: DexKind::V2,
        router: addr(router_suffix),
        factory: None,
        init_code_pair_hash: None,
        fee_bps: 30,
    }
}

/// Builds `n` candidates over distinct pair addresses with a ~1% spread.
fn fixture(n: u64) -> (Vec<Candidate>, HashMap<Address, PairReserves>) {
    let base = addr(0xbbbb);
    let trade = addr(0xcccc_0000);
    let mut candidates = Vec::new();
    let mut reserves = HashMap::new();

    for i in 0..n {
        let buy_pair = addr(0x1000_0000 + i);
        let sell_pair = addr(0x2000_0000 + i);
        candidates.push(Candidate {
            trade,
            base,
            buy: CandidateLeg {
                dex: "quickswap".to_string(),
                pair: buy_pair,
            },
            sell: CandidateLeg {
                dex: "sushiswap".to_string(),
                pair: sell_pair,
            },
        });
        reserves.insert(
            buy_pair,
            PairReserves {
                pair: buy_pair,
                reserve0: 1_000_000 * 10u128.pow(6),
                reserve1: 500 * 10u128.pow(18),
            },
        );
        reserves.insert(
            sell_pair,
            PairReserves {
                pair: sell_pair,
                reserve0: 1_010_000 * 10u128.pow(6),
                reserve1: 500 * 10u128.pow(18),
            },
        );
    }

    (candidates, reserves)
}

/// Benchmark: full pipeline over 100 candidates with warm caches.
fn bench_evaluate_100_candidates(c: &mut Criterion) {
    let base = addr(0xbbbb);
    let trade = addr(0xcccc_0000);

    let mut dexes = HashMap::new();
    dexes.insert("quickswap".to_string(), descriptor("quickswap", 0xaa));
    dexes.insert("sushiswap".to_string(), descriptor("sushiswap", 0xab));

    let grid = SizingGrid::new(
        vec![0.001, 0.05],
        vec![0.5, 1.0, 2.0],
        vec![vec![0.0, 0.0, 0.0], vec![0.004, 0.005, 0.004]],
    )
    .expect("valid grid");
    let usd_prices = HashMap::from([(base, 1.0)]);
    let thresholds = Thresholds {
        min_spread: 0.0075,
        min_liquidity_usd: 500.0,
        min_profit_usd: -1.0,
        max_price_impact_percent: 80.0,
        flash_fee: 0.0005,
        gas_cost_usd: 0.05,
    };

    let decimals = HashMap::from([(base, 6u8), (trade, 18u8)]);
    let (candidates, reserves) = fixture(100);
    let evaluator = Evaluator::new(&dexes, &grid, &usd_prices, thresholds);

    c.bench_function("evaluate_100_candidates", |b| {
        b.iter(|| {
            let (opportunities, stats) = evaluator.evaluate(
                black_box(&candidates),
                black_box(&reserves),
                black_box(&decimals),
                |_pair| None,
            );
            assert_eq!(stats.emitted, 100);
            opportunities
        })
    });
}

/// Benchmark: a single round-trip quote.
fn bench_round_trip_quote(c: &mut Criterion) {
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

    c.bench_function("round_trip_quote", |b| {
        b.iter(|| round_trip(black_box(1_000.0), &buy, &sell, &costs))
    });
}

criterion_group!(benches, bench_evaluate_100_candidates, bench_round_trip_quote);
criterion_main!(benches);
