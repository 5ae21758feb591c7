//! Static configuration: a JSON document with defaults for every key.
//!
//! Startup-time misconfiguration (missing signer outside simulation mode,
//! missing contract, unreadable sizing grid) is fatal; everything else has
//! a Polygon-ready default so a minimal config file works.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use alloy::primitives::{address, b256, Address};
use eyre::{ensure, eyre, Context, Result};
use serde::Deserialize;
use tracing::warn;

use arb_engine::Thresholds;
use arb_rpc::types::{DexDescriptor, DexKind};

/// Per-chain constants.
#[derive(Clone, Copy, Debug)]
pub struct ChainParams {
    /// Chain id used for signing.
    pub id: u64,
    /// Gas price floor in gwei (Polygon enforces 30).
    pub gas_price_floor_gwei: u64,
}

/// Looks up the constants for a configured chain name.
pub fn chain_params(name: &str) -> Option<ChainParams> {
    match name {
        "polygon" => Some(ChainParams {
            id: 137,
            gas_price_floor_gwei: 30,
        }),
        "amoy" => Some(ChainParams {
            id: 80_002,
            gas_price_floor_gwei: 25,
        }),
        "ethereum" => Some(ChainParams {
            id: 1,
            gas_price_floor_gwei: 1,
        }),
        _ => None,
    }
}

/// The recognized configuration document.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chain name selecting per-chain constants.
    pub chain: String,
    /// Ordered RPC endpoint list for rotation.
    pub rpc_endpoints: Vec<String>,
    /// Outer executor contract.
    pub contract_address: Option<Address>,
    /// Signer private key (hex). Required outside simulation mode.
    pub private_key: Option<String>,
    /// Minimum net profit in USD. Negative values are accepted for
    /// debugging runs.
    pub min_profit_usd: f64,
    /// Minimum pool liquidity in USD.
    pub min_liquidity_usd: f64,
    /// Minimum spread in percent.
    pub min_spread_percent: f64,
    /// Maximum buy-leg price impact in percent.
    pub max_price_impact_percent: f64,
    /// Inter-cycle delay in seconds.
    pub scan_interval_sec: u64,
    /// Venue whitelist. Empty means every configured venue.
    pub enabled_dexes: Vec<String>,
    /// Venue descriptor table.
    pub dex_config: HashMap<String, DexDescriptor>,
    /// Lowercase address -> USD price for base tokens.
    pub base_token_usd_prices: HashMap<String, f64>,
    /// Flash-loan fee in basis points.
    pub flash_loan_fee_bps: u32,
    /// Tokens the flash-loan provider supports.
    pub flash_loan_assets: Vec<Address>,
    /// Estimated gas cost of one execution in USD.
    pub gas_cost_usd: f64,
    /// Multiplier applied to the quoted gas price.
    pub gas_price_multiplier: f64,
    /// Fixed outer gas cap.
    pub gas_limit: u64,
    /// Slippage tolerance in percent for minimum outputs.
    pub slippage_percent: f64,
    /// Stop after successful pre-flight instead of submitting.
    pub simulation_mode: bool,
    /// Raise default log verbosity.
    pub debug_mode: bool,
    /// Newline-delimited candidate triangles.
    pub candidates_file: PathBuf,
    /// Precomputed sizing grid.
    pub sizing_grid_file: PathBuf,
    /// Persistent decimals cache.
    pub decimals_cache_file: PathBuf,
    /// Pairs per reserves batch.
    pub batch_size: usize,
    /// Successful requests between scheduled endpoint rotations.
    pub rotate_after: u32,
    /// Opportunities attempted per cycle.
    pub max_executions_per_cycle: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain: "polygon".to_string(),
            rpc_endpoints: vec!["https://polygon-rpc.com".to_string()],
            contract_address: None,
            private_key: None,
            min_profit_usd: -1.0,
            min_liquidity_usd: 500.0,
            min_spread_percent: 0.75,
            max_price_impact_percent: 80.0,
            scan_interval_sec: 15,
            enabled_dexes: Vec::new(),
            dex_config: default_dex_config(),
            base_token_usd_prices: default_usd_prices(),
            flash_loan_fee_bps: 5,
            flash_loan_assets: default_flash_assets(),
            gas_cost_usd: 0.05,
            gas_price_multiplier: 1.2,
            gas_limit: 1_200_000,
            slippage_percent: 0.5,
            simulation_mode: false,
            debug_mode: false,
            candidates_file: PathBuf::from("v2_combos.jsonl"),
            sizing_grid_file: PathBuf::from("lut_v2.json"),
            decimals_cache_file: PathBuf::from("cache/decimals.json"),
            batch_size: 30,
            rotate_after: 20,
            max_executions_per_cycle: 3,
        }
    }
}

impl AppConfig {
    /// Loads the config file, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))
    }

    /// Startup validation. Failures here terminate the process.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.rpc_endpoints.is_empty(),
            "rpc_endpoints must not be empty"
        );
        chain_params(&self.chain).ok_or_else(|| eyre!("unknown chain {:?}", self.chain))?;

        if !self.simulation_mode {
            ensure!(
                self.contract_address.is_some(),
                "contract_address is required outside simulation mode"
            );
            ensure!(
                self.private_key.is_some(),
                "private_key is required outside simulation mode"
            );
        }

        for name in &self.enabled_dexes {
            ensure!(
                self.dex_config.contains_key(name),
                "enabled dex {name:?} has no entry in dex_config"
            );
        }
        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.gas_price_multiplier >= 1.0, "gas_price_multiplier must be >= 1.0");
        Ok(())
    }

    /// Lighter validation for read-only subcommands that never sign.
    pub fn validate_endpoints_only(&self) -> Result<()> {
        ensure!(
            !self.rpc_endpoints.is_empty(),
            "rpc_endpoints must not be empty"
        );
        Ok(())
    }

    /// Chain constants for the configured chain.
    pub fn chain(&self) -> ChainParams {
        chain_params(&self.chain).expect("validated at startup")
    }

    /// Venue table restricted to the whitelist, with names filled in.
    pub fn enabled_dex_table(&self) -> HashMap<String, DexDescriptor> {
        self.dex_config
            .iter()
            .filter(|(name, _)| {
                self.enabled_dexes.is_empty() || self.enabled_dexes.contains(name)
            })
            .map(|(name, descriptor)| {
                let mut descriptor = descriptor.clone();
                if descriptor.name.is_empty() {
                    descriptor.name = name.clone();
                }
                (name.clone(), descriptor)
            })
            .collect()
    }

    /// USD price table keyed by parsed address.
    pub fn usd_prices(&self) -> HashMap<Address, f64> {
        let mut prices = HashMap::with_capacity(self.base_token_usd_prices.len());
        for (key, value) in &self.base_token_usd_prices {
            match key.parse::<Address>() {
                Ok(address) => {
                    prices.insert(address, *value);
                }
                Err(_) => warn!(key, "skipping malformed address in base_token_usd_prices"),
            }
        }
        prices
    }

    /// Evaluator thresholds derived from the percent-denominated keys.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_spread: self.min_spread_percent / 100.0,
            min_liquidity_usd: self.min_liquidity_usd,
            min_profit_usd: self.min_profit_usd,
            max_price_impact_percent: self.max_price_impact_percent,
            flash_fee: f64::from(self.flash_loan_fee_bps) / 10_000.0,
            gas_cost_usd: self.gas_cost_usd,
        }
    }

    /// Flash-loan fee as a fraction.
    pub fn flash_fee(&self) -> f64 {
        f64::from(self.flash_loan_fee_bps) / 10_000.0
    }

    /// Slippage as a fraction.
    pub fn slippage(&self) -> f64 {
        self.slippage_percent / 100.0
    }
}

/// Polygon venue table: the two V2 books the sizing path supports plus the
/// concentrated-liquidity venues the kind filter screens out.
fn default_dex_config() -> HashMap<String, DexDescriptor> {
    let mut table = HashMap::new();
    table.insert(
        "quickswap".to_string(),
        DexDescriptor {
            name: "quickswap".to_string(),
            kind: DexKind::V2,
            router: address!("a5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff"),
            factory: Some(address!("5757371414417b8C6CAad45bAeF941aBc7d3Ab32")),
            init_code_pair_hash: Some(b256!(
                "96e8ac4277198ff8b6f785478aa9a39f403cb768dd02cbee326c3e7da348845f"
            )),
            fee_bps: 30,
        },
    );
    table.insert(
        "sushiswap".to_string(),
        DexDescriptor {
            name: "sushiswap".to_string(),
            kind: DexKind::V2,
            router: address!("1b02dA8Cb0d097eB8D57A175b88c7D8b47997506"),
            factory: Some(address!("c35DADB65012eC5796536bD9864eD8773aBc74C4")),
            init_code_pair_hash: Some(b256!(
                "e18a34eb0e04b04f7a0ac29a6e80748dca96319b42c54d679cb821dca90c6303"
            )),
            fee_bps: 30,
        },
    );
    table.insert(
        "uniswap_v3".to_string(),
        DexDescriptor {
            name: "uniswap_v3".to_string(),
            kind: DexKind::V3,
            router: address!("E592427A0AEce92De3Edee1F18E0157C05861564"),
            factory: Some(address!("1F98431c8aD98523631AE4a59f267346ea31F984")),
            init_code_pair_hash: None,
            fee_bps: 30,
        },
    );
    table.insert(
        "quickswap_v3".to_string(),
        DexDescriptor {
            name: "quickswap_v3".to_string(),
            kind: DexKind::Algebra,
            router: address!("f5b509bB0909a69B1c207E495f687a596C168E12"),
            factory: Some(address!("411b0fAcC3489691f28ad58c47006AF5E3Ab3A28")),
            init_code_pair_hash: None,
            fee_bps: 30,
        },
    );
    table.insert(
        "balancer".to_string(),
        DexDescriptor {
            name: "balancer".to_string(),
            kind: DexKind::Balancer,
            router: address!("BA12222222228d8Ba445958a75a0704d566BF2C8"),
            factory: None,
            init_code_pair_hash: None,
            fee_bps: 30,
        },
    );
    table
}

fn default_usd_prices() -> HashMap<String, f64> {
    HashMap::from([
        // USDC
        ("0x2791bca1f2de4661ed88a30c99a7a9449aa84174".to_string(), 1.0),
        // USDT
        ("0xc2132d05d31c914a87c6611c10748aeb04b58e8f".to_string(), 1.0),
        // DAI
        ("0x8f3cf7ad23cd3cadbd9735aff958023239c6a063".to_string(), 1.0),
        // WMATIC
        ("0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270".to_string(), 0.72),
        // WETH
        ("0x7ceb23fd6bc0add59e62ac25578270cff1b9f619".to_string(), 3400.0),
    ])
}

/// Aave v3 Polygon reserve list (the subset this scanner trades).
fn default_flash_assets() -> Vec<Address> {
    vec![
        address!("2791Bca1f2de4661ED88A30C99A7a9449Aa84174"), // USDC
        address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"), // USDT
        address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"), // DAI
        address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"), // WMATIC
        address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"), // WETH
        address!("1BFD67037B42Cf73acF2047067bd4F2C47D9BfD6"), // WBTC
    ]
}
