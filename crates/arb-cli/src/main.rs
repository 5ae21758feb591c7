use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use arb_engine::SizingGrid;
use arb_rpc::resolver::PairResolver;
use arb_rpc::RpcClient;

use crate::config::AppConfig;
use crate::scan::Scanner;

mod candidates;
mod config;
mod scan;

#[derive(Parser, Debug)]
#[command(name = "arb-scan")]
#[command(about = "On-chain V2 arbitrage scanner for EVM networks")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Path to the JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scan loop.
    Run(RunArgs),
    /// Resolve a pair address on one venue.
    Resolve(ResolveArgs),
    /// Inspect the sizing grid.
    Grid(GridArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Stop after a single scan cycle.
    #[arg(long)]
    once: bool,

    /// Force simulation mode regardless of configuration.
    #[arg(long)]
    simulate: bool,
}

/// Arguments for the `resolve` subcommand.
///
/// Walks the full resolution ladder (cache, CREATE2 derivation, factory
/// lookup) exactly as the executor would.
#[derive(Args, Debug)]
struct ResolveArgs {
    /// Venue name from the dex table.
    #[arg(long)]
    dex: String,

    /// First token address.
    #[arg(long)]
    token_a: Address,

    /// Second token address.
    #[arg(long)]
    token_b: Address,
}

/// Arguments for the `grid` subcommand.
#[derive(Args, Debug)]
struct GridArgs {
    /// Spread to query; prints the whole table when omitted.
    #[arg(long)]
    spread: Option<f64>,

    /// Reserve ratio to query.
    #[arg(long)]
    ratio: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(cli.verbose.max(u8::from(config.debug_mode)), cli.quiet)?;

    match cli.command {
        Commands::Run(args) => handle_run(config, args).await,
        Commands::Resolve(args) => handle_resolve(config, args).await,
        Commands::Grid(args) => handle_grid(config, args),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn handle_run(mut config: AppConfig, args: RunArgs) -> Result<()> {
    if args.simulate {
        config.simulation_mode = true;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message("loading grid and caches");
    pb.enable_steady_tick(Duration::from_millis(100));

    let scanner = Scanner::new(config)?;
    pb.finish_with_message("scanner ready");

    scanner.run(args.once).await
}

async fn handle_resolve(config: AppConfig, args: ResolveArgs) -> Result<()> {
    config.validate_endpoints_only()?;
    let client = RpcClient::new(config.rpc_endpoints.clone(), config.rotate_after)?;
    let resolver = PairResolver::new(config.enabled_dex_table());

    match resolver
        .resolve(&client, &args.dex, args.token_a, args.token_b)
        .await?
    {
        Some(pair) => {
            info!(dex = %args.dex, pair = %pair, "pair resolved");
            println!("{pair}");
        }
        None => println!("no pool for this pair on {}", args.dex),
    }
    Ok(())
}

fn handle_grid(config: AppConfig, args: GridArgs) -> Result<()> {
    let grid = SizingGrid::load(&config.sizing_grid_file)?;

    if let (Some(spread), Some(ratio)) = (args.spread, args.ratio) {
        println!("{:.6}", grid.fraction(spread, ratio));
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    let mut header = vec!["spread \\ ratio".to_string()];
    header.extend(grid.ratio_axis().iter().map(|r| format!("{r:.3}")));
    table.set_header(header);
    for &spread in grid.spread_axis() {
        let mut row = vec![format!("{spread:.4}")];
        row.extend(
            grid.ratio_axis()
                .iter()
                .map(|&ratio| format!("{:.4}", grid.fraction(spread, ratio))),
        );
        table.add_row(row);
    }
    println!("{table}");
    Ok(())
}
