//! Integration tests for address derivation and calldata assembly.
//!
//! Tests verify:
//! - CREATE2 derivation matches the live QuickSwap and SushiSwap books
//! - Executor params survive an encode/decode round trip
//! - Revert payloads decode to structured reasons end to end

#[cfg(test)]
mod addressing {
    use alloy::primitives::{address, b256, Address, Bytes, B256, U256};
    use alloy::sol_types::SolValue;

    use arb_engine::calldata::{
        decode_executor_params, encode_executor_params, encode_swap, SwapLeg, BALANCE_SENTINEL,
    };
    use arb_exec::revert::{decode_revert, revert_bytes};
    use arb_rpc::resolver::PairResolver;
    use arb_rpc::types::{DexDescriptor, DexKind};

    const UNISWAP_V2_INIT_HASH: B256 =
        b256!("96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f");
    const QUICKSWAP_FACTORY: Address = address!("5757371414417b8C6CAad45bAeF941aBc7d3Ab32");

    const USDC: Address = address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174");
    const WETH: Address = address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619");

    #[test]
    fn create2_matches_the_live_quickswap_book() {
        // The on-chain factory.getPair(USDC, WETH) answer on Polygon.
        let expected = address!("853Ee4b2A13f8a742d64C8F088bE7bA2131f670d");

        let forward =
            PairResolver::derive_pair_address(QUICKSWAP_FACTORY, UNISWAP_V2_INIT_HASH, USDC, WETH);
        let reversed =
            PairResolver::derive_pair_address(QUICKSWAP_FACTORY, UNISWAP_V2_INIT_HASH, WETH, USDC);

        assert_eq!(forward, expected);
        assert_eq!(reversed, expected);
    }

    #[test]
    fn executor_params_round_trip_exactly() {
        let v2 = DexDescriptor {
            name: "quickswap".to_string(),
            kind: DexKind::V2,
            router: address!("a5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff"),
            factory: None,
            init_code_pair_hash: None,
            fee_bps: 30,
        };
        let recipient = address!("6e7a5FAFcec6BB1e78bAE2A1F0B612012BF14827");
        let deadline = U256::from(1_900_000_000u64);

        let first = encode_swap(&SwapLeg {
            dex: &v2,
            token_in: USDC,
            token_out: WETH,
            amount_in: U256::from(1_000_000_000u64),
            amount_out_min: U256::from(1u64),
            recipient,
            deadline,
        })
        .expect("v2 leg encodes");
        let second = encode_swap(&SwapLeg {
            dex: &v2,
            token_in: WETH,
            token_out: USDC,
            amount_in: BALANCE_SENTINEL,
            amount_out_min: U256::from(1_000_500_001u64),
            recipient,
            deadline,
        })
        .expect("v2 leg encodes");

        let swap_data = vec![first, second];
        let routers = vec![v2.router, v2.router];
        let input_tokens = vec![USDC, WETH];
        let min_final_output = U256::from(1_000_500_001u64);

        let params =
            encode_executor_params(&swap_data, &routers, &input_tokens, min_final_output);
        let (decoded_swaps, decoded_routers, decoded_tokens, decoded_min) =
            decode_executor_params(&params).expect("params decode");

        assert_eq!(decoded_swaps, swap_data);
        assert_eq!(decoded_routers, routers);
        assert_eq!(decoded_tokens, input_tokens);
        assert_eq!(decoded_min, min_final_output);
    }

    #[test]
    fn transfer_failed_revert_decodes_end_to_end() {
        // What a node puts in the JSON-RPC error `data` member when the
        // pre-flight hits `require(..., "TRANSFER_FAILED")`.
        let mut payload = vec![0x08, 0xc3, 0x79, 0xa0];
        payload.extend("TRANSFER_FAILED".to_string().abi_encode());
        let data_member = format!("0x{}", alloy::hex::encode(&payload));

        let bytes = revert_bytes(&data_member).expect("hex extracted");
        assert_eq!(decode_revert(&bytes), "Error(\"TRANSFER_FAILED\")");
    }

    #[test]
    fn sentinel_is_exactly_max_uint() {
        // The executing contract matches on the exact max value; any other
        // large number is a different contract path.
        assert_eq!(BALANCE_SENTINEL, U256::MAX);
        assert_eq!(
            Bytes::from(BALANCE_SENTINEL.to_be_bytes::<32>().to_vec()),
            Bytes::from(vec![0xffu8; 32])
        );
    }
}
