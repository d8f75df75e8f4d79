use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use mev_data::pool_store::PoolTokenStore;
use mev_data::rpc::{RpcClient, RpcConfig};
use mev_data::types::InspectionResult;
use mev_inspect::{to_json, InspectOptions, Inspector, ReportMode};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mev-inspect")]
#[command(about = "Detect arbitrage and sandwich MEV in mined blocks over plain JSON-RPC")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// JSON-RPC endpoint. Falls back to ALCHEMY_RPC_URL.
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Persistent pool-token store location.
    #[arg(long, global = true, default_value = "data/pool_tokens.sqlite")]
    pool_store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a single block.
    Block(BlockArgs),
    /// Analyze an inclusive block range.
    Range(RangeArgs),
}

#[derive(Args, Debug, Clone)]
struct AnalysisFlags {
    /// Also simulate missed (what-if) opportunities.
    #[arg(long)]
    what_if: bool,

    /// Write a JSON report to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Report verbosity: basic or full.
    #[arg(long, default_value = "full")]
    report_mode: ReportMode,

    /// Confidence floor for swap records.
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Minimum arbitrage round-trip gain.
    #[arg(long)]
    arb_epsilon: Option<f64>,
}

#[derive(Args, Debug)]
struct BlockArgs {
    /// Block number to analyze.
    block: u64,

    #[command(flatten)]
    flags: AnalysisFlags,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// First block (inclusive).
    start: u64,

    /// Last block (inclusive).
    end: u64,

    #[command(flatten)]
    flags: AnalysisFlags,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let rpc_url = cli
        .rpc_url
        .clone()
        .or_else(|| std::env::var("ALCHEMY_RPC_URL").ok())
        .ok_or_else(|| eyre!("no RPC endpoint: pass --rpc-url or set ALCHEMY_RPC_URL"))?;

    let inspector = build_inspector(&rpc_url, &cli.pool_store)?;
    match cli.command {
        Commands::Block(args) => handle_block(&inspector, args).await,
        Commands::Range(args) => handle_range(&inspector, args).await,
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

    // Progress and diagnostics go to stderr; stdout carries the summary.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_inspector(rpc_url: &str, pool_store_path: &Path) -> Result<Inspector> {
    if let Some(parent) = pool_store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let rpc = Arc::new(
        RpcClient::http(rpc_url, RpcConfig::default()).wrap_err("failed to build RPC client")?,
    );
    let pool_store =
        Arc::new(PoolTokenStore::open(pool_store_path).wrap_err("failed to open pool-token store")?);
    Ok(Inspector::new(rpc, pool_store))
}

fn options_from(flags: &AnalysisFlags) -> InspectOptions {
    let mut options = InspectOptions {
        what_if: flags.what_if,
        ..InspectOptions::default()
    };
    if let Some(min_confidence) = flags.min_confidence {
        options.min_confidence = min_confidence;
    }
    if let Some(epsilon) = flags.arb_epsilon {
        options.arb_epsilon = epsilon;
    }
    options
}

async fn handle_block(inspector: &Inspector, args: BlockArgs) -> Result<ExitCode> {
    let options = options_from(&args.flags);
    let result = inspector
        .analyze_block(args.block, &options)
        .await
        .wrap_err_with(|| format!("failed to analyze block {}", args.block))?;

    println!("{}", summary_table(&[&result]));
    write_report(&args.flags, &[result])?;
    Ok(ExitCode::SUCCESS)
}

async fn handle_range(inspector: &Inspector, args: RangeArgs) -> Result<ExitCode> {
    if args.start > args.end {
        return Err(eyre!(
            "invalid range: start block {} is greater than end block {}",
            args.start,
            args.end
        ));
    }

    let options = options_from(&args.flags);
    let pb = ProgressBar::new(args.end - args.start + 1);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} blocks")
            .wrap_err("failed to create progress style")?,
    );

    let mut results = Vec::new();
    let mut failures: Vec<(u64, String)> = Vec::new();
    for block_number in args.start..=args.end {
        match inspector.analyze_block(block_number, &options).await {
            Ok(result) => results.push(result),
            Err(err) => {
                tracing::error!(block_number, %err, "block analysis failed");
                failures.push((block_number, err.to_string()));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let refs: Vec<&InspectionResult> = results.iter().collect();
    println!("{}", summary_table(&refs));
    write_report(&args.flags, &results)?;

    info!(
        analyzed = results.len(),
        failed = failures.len(),
        "range run finished"
    );
    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for (block_number, message) in &failures {
            eprintln!("block {block_number}: {message}");
        }
        Ok(ExitCode::from(2))
    }
}

fn write_report(flags: &AnalysisFlags, results: &[InspectionResult]) -> Result<()> {
    let Some(path) = &flags.report else {
        return Ok(());
    };

    let rendered: Vec<serde_json::Value> = results
        .iter()
        .map(|result| to_json(result, flags.report_mode))
        .collect();
    // A single block writes one object, a range writes an array.
    let body = if rendered.len() == 1 {
        serde_json::to_string_pretty(&rendered[0])
    } else {
        serde_json::to_string_pretty(&rendered)
    }
    .wrap_err("failed to render report")?;

    std::fs::write(path, body).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), mode = %flags.report_mode, "report written");
    Ok(())
}

fn summary_table(results: &[&InspectionResult]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Block",
        "Txs",
        "OK",
        "Swaps",
        "Arbs",
        "Sandwiches",
        "What-ifs",
        "Net profit",
    ]);

    for result in results {
        let net: i128 = result
            .arbitrages
            .iter()
            .map(|a| a.net_profit_wei)
            .chain(result.sandwiches.iter().map(|s| s.net_profit_wei))
            .sum();
        table.add_row(vec![
            result.block_number.to_string(),
            result.transactions.len().to_string(),
            result.successful_transactions().to_string(),
            result.swaps.len().to_string(),
            result.arbitrages.len().to_string(),
            result.sandwiches.len().to_string(),
            result.whatif_opportunities.len().to_string(),
            format_eth_signed(net),
        ]);
    }
    table
}

/// Fixed six-decimal Wei → ETH rendering.
fn format_eth(wei: u128) -> String {
    const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;
    const SCALE: u128 = 1_000_000;

    let whole = wei / WEI_PER_ETH;
    let fractional = ((wei % WEI_PER_ETH) * SCALE) / WEI_PER_ETH;
    format!("{whole}.{fractional:06} ETH")
}

fn format_eth_signed(wei: i128) -> String {
    if wei < 0 {
        format!("-{}", format_eth(wei.unsigned_abs()))
    } else {
        format_eth(wei as u128)
    }
}
