//! Integration tests for the sizing oracle and the persistent caches.
//!
//! Tests verify:
//! - Grid lookups clamp at both axis edges and interpolate inside
//! - The decimals cache is durable across a process-style reload
//! - Reserve decoding keeps the input pair identity

#[cfg(test)]
mod sizing_cache {
    use alloy::primitives::{address, aliases::U112, Address};
    use alloy::sol;
    use alloy::sol_types::SolCall;

    use arb_engine::SizingGrid;
    use arb_rpc::decimals::DecimalsCache;
    use arb_rpc::reserves::decode_reserves;

    sol! {
        interface IUniswapV2Pair {
            function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
        }
    }

    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
    const WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");

    fn scenario_grid() -> SizingGrid {
        SizingGrid::new(
            vec![0.001, 0.01],
            vec![0.5, 1.0, 2.0],
            vec![vec![0.0, 0.0, 0.0], vec![0.1, 0.2, 0.1]],
        )
        .expect("grid is well-formed")
    }

    #[test]
    fn grid_midpoint_in_s_exact_row_in_r() {
        let grid = scenario_grid();
        let loanable = 12_345.0;

        // Midpoint of the spread axis at the exact r = 1.0 knot: the
        // interpolated fraction is (0.0 + 0.2) / 2.
        let size = grid.size(0.0055, loanable, 12_345.0);
        assert!((size - loanable * 0.1).abs() < 1e-9);
    }

    #[test]
    fn grid_clamps_at_both_edges() {
        let grid = scenario_grid();

        // Below the spread axis: the zero row.
        assert_eq!(grid.fraction(0.0001, 1.0), 0.0);
        // Above it: the top row exactly.
        assert_eq!(grid.fraction(0.5, 1.0), 0.2);
        // Ratio clamping within the top row.
        assert_eq!(grid.fraction(0.5, 0.001), 0.1);
        assert_eq!(grid.fraction(0.5, 50.0), 0.1);
    }

    #[test]
    fn grid_sizes_against_the_smaller_pool() {
        let grid = scenario_grid();
        // base_buy is the smaller side; ratio = 2.0 hits the last column.
        let size = grid.size(0.02, 1_000.0, 2_000.0);
        assert!((size - 1_000.0 * 0.1).abs() < 1e-9);
    }

    #[test]
    fn decimals_cache_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache").join("decimals.json");

        let cache = DecimalsCache::load(&path).expect("fresh cache loads");
        cache.insert(USDC, 6);
        cache.insert(WETH, 18);
        cache.flush().expect("flush succeeds");

        // Same file, new process.
        let reloaded = DecimalsCache::load(&path).expect("reload succeeds");
        assert_eq!(reloaded.get(USDC), Some(6));
        assert_eq!(reloaded.get(WETH), Some(18));

        // Loading twice more changes nothing.
        let again = DecimalsCache::load(&path).expect("second reload succeeds");
        assert_eq!(again.len(), reloaded.len());
        assert_eq!(again.get(USDC), reloaded.get(USDC));
    }

    #[test]
    fn reserve_records_keep_the_input_pair() {
        let pair = address!("853Ee4b2A13f8a742d64C8F088bE7bA2131f670d");
        let data = IUniswapV2Pair::getReservesCall::abi_encode_returns(&(
            U112::from(1_000_000u64),
            U112::from(2_000u64),
            0u32,
        ));

        let record = decode_reserves(pair, &data).expect("live pool decodes");
        assert_eq!(record.pair, pair);
        assert!(record.reserve0 > 0 && record.reserve1 > 0);

        let dead = IUniswapV2Pair::getReservesCall::abi_encode_returns(&(
            U112::from(0u64),
            U112::from(2_000u64),
            0u32,
        ));
        assert!(decode_reserves(pair, &dead).is_none());
    }
}
