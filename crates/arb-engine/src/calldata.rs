//! ABI calldata assembly for the atomic execution transaction.
//!
//! Compile-time `sol!` definitions cover the three router shapes the
//! executor contract understands (V2, V3, Algebra) plus the outer
//! `executeArbitrage` entry point. The second V2 leg carries the
//! `U256::MAX` sentinel: the contract substitutes its actual TRADE balance.
//! Any other large value is a different contract path, so the sentinel is
//! the exact max value.

use alloy::primitives::{
    aliases::{U160, U24},
    Address, Bytes, U256,
};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use eyre::{eyre, Result};

use arb_rpc::types::{DexDescriptor, DexKind};

sol! {
    interface IUniswapV2Router02 {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }

    interface ISwapRouterV3 {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }

    interface IAlgebraSwapRouter {
        struct AlgebraExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 limitSqrtPrice;
        }

        function exactInputSingle(AlgebraExactInputSingleParams calldata params) external payable returns (uint256 amountOut);
    }

    interface IFlashArbExecutor {
        function executeArbitrage(address asset, uint256 amount, bytes calldata params) external;
    }
}

/// Second-leg `amountIn` sentinel: the executing contract substitutes its
/// on-hand balance.
pub const BALANCE_SENTINEL: U256 = U256::MAX;

/// Everything one swap leg needs to be encoded.
#[derive(Clone, Debug)]
pub struct SwapLeg<'a> {
    /// Venue descriptor (selects the calldata shape and fee tier).
    pub dex: &'a DexDescriptor,
    /// Input token.
    pub token_in: Address,
    /// Output token.
    pub token_out: Address,
    /// Input amount, or [`BALANCE_SENTINEL`] for the second V2 leg.
    pub amount_in: U256,
    /// Slippage-bounded minimum output.
    pub amount_out_min: U256,
    /// Recipient of the output (the executor contract).
    pub recipient: Address,
    /// Unix deadline for the swap.
    pub deadline: U256,
}

/// Encodes one swap leg for its venue's router.
///
/// # Errors
/// Returns error for venue kinds with no calldata shape (Balancer, Unknown).
pub fn encode_swap(leg: &SwapLeg) -> Result<Bytes> {
    match leg.dex.kind {
        DexKind::V2 => Ok(encode_v2_swap(leg)),
        DexKind::V3 => Ok(encode_v3_swap(leg)),
        DexKind::Algebra => Ok(encode_algebra_swap(leg)),
        DexKind::Balancer | DexKind::Unknown => Err(eyre!(
            "no swap calldata shape for venue kind {:?} ({})",
            leg.dex.kind,
            leg.dex.name
        )),
    }
}

fn encode_v2_swap(leg: &SwapLeg) -> Bytes {
    IUniswapV2Router02::swapExactTokensForTokensCall {
        amountIn: leg.amount_in,
        amountOutMin: leg.amount_out_min,
        path: vec![leg.token_in, leg.token_out],
        to: leg.recipient,
        deadline: leg.deadline,
    }
    .abi_encode()
    .into()
}

fn encode_v3_swap(leg: &SwapLeg) -> Bytes {
    ISwapRouterV3::exactInputSingleCall {
        params: ISwapRouterV3::ExactInputSingleParams {
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
            // V3 fee tiers are hundredths of a bip: 30 bps -> 3000.
            fee: U24::from(leg.dex.fee_bps * 100),
            recipient: leg.recipient,
            deadline: leg.deadline,
            amountIn: leg.amount_in,
            amountOutMinimum: leg.amount_out_min,
            sqrtPriceLimitX96: U160::ZERO,
        },
    }
    .abi_encode()
    .into()
}

fn encode_algebra_swap(leg: &SwapLeg) -> Bytes {
    IAlgebraSwapRouter::exactInputSingleCall {
        params: IAlgebraSwapRouter::AlgebraExactInputSingleParams {
            tokenIn: leg.token_in,
            tokenOut: leg.token_out,
            recipient: leg.recipient,
            deadline: leg.deadline,
            amountIn: leg.amount_in,
            amountOutMinimum: leg.amount_out_min,
            limitSqrtPrice: U160::ZERO,
        },
    }
    .abi_encode()
    .into()
}

/// Inner executor params:
/// `abi.encode(bytes[] swapDataList, address[] routers, address[] inputTokens, uint256 minFinalOutput)`.
pub fn encode_executor_params(
    swap_data: &[Bytes],
    routers: &[Address],
    input_tokens: &[Address],
    min_final_output: U256,
) -> Bytes {
    (
        swap_data.to_vec(),
        routers.to_vec(),
        input_tokens.to_vec(),
        min_final_output,
    )
        .abi_encode()
        .into()
}

/// Inverse of [`encode_executor_params`]; used by tests and pre-flight
/// sanity checks.
pub fn decode_executor_params(
    data: &[u8],
) -> Result<(Vec<Bytes>, Vec<Address>, Vec<Address>, U256)> {
    <(Vec<Bytes>, Vec<Address>, Vec<Address>, U256)>::abi_decode(data, true)
        .map_err(|err| eyre!("executor params decode failed: {err}"))
}

/// Outer `executeArbitrage(asset, amount, params)` call.
pub fn encode_execute_arbitrage(asset: Address, amount: U256, params: Bytes) -> Bytes {
    IFlashArbExecutor::executeArbitrageCall {
        asset,
        amount,
        params,
    }
    .abi_encode()
    .into()
}
