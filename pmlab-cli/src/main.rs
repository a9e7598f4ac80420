//! PM Lab CLI: portfolio runs, standalone strategy backtests, contract listing.
//!
//! Commands:
//! - `run`: replay every configured portfolio manager over the market data
//! - `strategy`: backtest one strategy with a fixed risk budget
//! - `contracts`: print the contract table in effect

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pmlab_core::domain::InstrumentLookup;
use pmlab_core::signals::StrategyFamily;
use pmlab_runner::data_loader::synthetic_feed;
use pmlab_runner::{
    run_portfolio, run_standalone, AllocationStyle, PortfolioSummary, RunConfig, RunReport, StandaloneResult,
    StandaloneSource, StrategySpec,
};

#[derive(Parser)]
#[command(name = "pmlab", about = "PM Lab CLI: competing portfolio managers over futures strategies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured portfolio manager over the market data.
    Run {
        /// Path to a TOML run config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Use synthetic data instead of the market data directory.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Override the market data directory.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Override the macro indicator directory.
        #[arg(long)]
        indicator_dir: Option<PathBuf>,

        /// Only run these managers (repeatable): uniform, momentum, proportional_pnl,
        /// proportional_sharpe, proportional_sortino, mean_variance, regime.
        #[arg(long = "manager")]
        managers: Vec<String>,

        /// Print the report as JSON instead of tables.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Backtest one strategy with a fixed risk budget and no allocation loop.
    Strategy {
        /// Family: trend_following, mean_reversion, relative_value, pairs.
        #[arg(long)]
        family: String,

        /// Leg symbols, traded leg first (e.g. --legs ES NQ).
        #[arg(long, num_args = 1.., required = true)]
        legs: Vec<String>,

        /// Run config supplying family parameters and contract overrides.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of market data CSV files.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Use synthetic data.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Risk dollars per trade. Defaults to the config value.
        #[arg(long)]
        risk: Option<f64>,

        /// Print the result, including the trade log, as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the contract table, including config overrides.
    Contracts {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, synthetic, data_dir, indicator_dir, managers, json } => {
            run_portfolio_cmd(config, synthetic, data_dir, indicator_dir, managers, json)
        }
        Commands::Strategy { family, legs, config, data_dir, synthetic, risk, json } => {
            run_strategy_cmd(&family, legs, config, data_dir, synthetic, risk, json)
        }
        Commands::Contracts { config } => run_contracts_cmd(config),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<RunConfig> {
    match path {
        Some(path) => {
            RunConfig::from_file(&path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(RunConfig::default()),
    }
}

fn parse_style(name: &str) -> Result<AllocationStyle> {
    match AllocationStyle::ALL.iter().find(|s| s.name() == name) {
        Some(style) => Ok(*style),
        None => {
            let valid: Vec<&str> = AllocationStyle::ALL.iter().map(|s| s.name()).collect();
            bail!("unknown manager '{name}'. Valid: {}", valid.join(", "))
        }
    }
}

fn parse_family(name: &str) -> Result<StrategyFamily> {
    match StrategyFamily::ALL.iter().find(|f| f.name() == name) {
        Some(family) => Ok(*family),
        None => bail!("unknown family '{name}'. Valid: trend_following, mean_reversion, relative_value, pairs"),
    }
}

fn run_portfolio_cmd(
    config_path: Option<PathBuf>,
    synthetic: bool,
    data_dir: Option<PathBuf>,
    indicator_dir: Option<PathBuf>,
    managers: Vec<String>,
    json: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if synthetic {
        config.data.synthetic = true;
    }
    if let Some(dir) = data_dir {
        config.data.market_data_dir = dir;
    }
    if indicator_dir.is_some() {
        config.data.indicator_dir = indicator_dir;
    }
    if !managers.is_empty() {
        config.managers = managers.iter().map(|m| parse_style(m)).collect::<Result<_>>()?;
    }

    let report = run_portfolio(&config).context("portfolio run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_strategy_cmd(
    family: &str,
    legs: Vec<String>,
    config_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    synthetic: bool,
    risk: Option<f64>,
    json: bool,
) -> Result<()> {
    let family = parse_family(family)?;
    if legs.len() != family.leg_count() {
        bail!("{family} trades {} leg(s), got {}", family.leg_count(), legs.len());
    }
    let config = load_config(config_path)?;
    let contracts = config.contract_table()?;
    let params = config.strategies.family(family).params(family);
    let spec = StrategySpec { family, params, legs };
    let risk = risk.unwrap_or(config.risk_dollars_per_trade);
    if !(risk.is_finite() && risk > 0.0) {
        bail!("--risk must be positive, got {risk}");
    }

    let synthetic_bars;
    let dir;
    let source = if synthetic {
        synthetic_bars = synthetic_feed(&spec.legs, &config.data);
        StandaloneSource { csv_dir: None, bars: Some(&synthetic_bars) }
    } else {
        dir = data_dir.unwrap_or_else(|| config.data.market_data_dir.clone());
        StandaloneSource { csv_dir: Some(dir.as_path()), bars: None }
    };

    let result = run_standalone(&spec, &contracts, source, &config.data.file_pattern, risk)
        .with_context(|| format!("backtest of {family} on {} failed", spec.legs.join("/")))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_standalone(&result, synthetic);
    }
    Ok(())
}

fn run_contracts_cmd(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let table = config.contract_table()?;
    println!("{:<8} {:>14} {:>12}", "Symbol", "Min Increment", "Tick Value");
    println!("{}", "-".repeat(36));
    for symbol in table.symbols() {
        let instrument = table.lookup(symbol)?;
        println!(
            "{:<8} {:>14} {:>12.3}",
            instrument.symbol, instrument.min_price_increment, instrument.tick_value
        );
    }

    let disabled: Vec<&str> = StrategyFamily::ALL
        .iter()
        .filter(|f| !config.strategies.family(**f).is_enabled())
        .map(|f| f.name())
        .collect();
    if !disabled.is_empty() {
        println!();
        println!("Disabled families: {}", disabled.join(", "));
    }
    Ok(())
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "-".to_string(),
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("=== Portfolio Run ===");
    println!("Run ID:         {}", report.run_id);
    println!("Dataset:        {}", report.dataset_hash);
    for summary in &report.managers {
        print_manager(summary);
    }
    if report.has_synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}

fn print_manager(summary: &PortfolioSummary) {
    println!();
    println!("--- {} ---", summary.manager);
    println!(
        "{:<28} {:>14} {:>12} {:>9} {:>9} {:>14}",
        "Strategy", "Final PnL", "Mean/Day", "Sharpe", "Sortino", "Allocation"
    );
    println!("{}", "-".repeat(91));
    for s in &summary.strategies {
        println!(
            "{:<28} {:>14.2} {:>12} {:>9} {:>9} {:>14.2}",
            s.id,
            s.metrics.final_pnl,
            fmt_opt(s.metrics.stats.mean, 2),
            fmt_opt(s.metrics.stats.sharpe, 3),
            fmt_opt(s.metrics.stats.sortino, 3),
            s.final_allocation,
        );
    }
    println!("{}", "-".repeat(91));
    println!(
        "{:<28} {:>14.2} {:>12} {:>9} {:>9} {:>14.2}",
        "Portfolio",
        summary.final_pnl,
        fmt_opt(summary.stats.mean, 2),
        fmt_opt(summary.stats.sharpe, 3),
        fmt_opt(summary.stats.sortino, 3),
        summary.total_allocation(),
    );
    println!(
        "Recalibrations: {} ({} skipped)   Events: {}",
        summary.recalibrations, summary.skipped_recalibrations, summary.events
    );
}

fn print_standalone(result: &StandaloneResult, synthetic: bool) {
    let m = &result.metrics;
    println!();
    println!("=== Strategy Backtest ===");
    println!("Strategy:       {}", result.strategy_id);
    println!("Risk/Trade:     {:.2}", result.risk_dollars_per_trade);
    println!("Records:        {}", m.records);
    println!("Trades:         {}", m.trades);
    println!();
    println!("--- Performance ---");
    println!("Final PnL:      {:.2}", m.final_pnl);
    println!("Mean/Day:       {}", fmt_opt(m.stats.mean, 2));
    println!("Last Month:     {:.2}", m.trailing_month_pnl);
    println!("Sharpe:         {}", fmt_opt(m.stats.sharpe, 3));
    println!("Sortino:        {}", fmt_opt(m.stats.sortino, 3));
    println!("Digest:         {}", result.log_digest);
    if synthetic {
        println!();
        println!("WARNING: Results based on SYNTHETIC data");
    }
    println!();
}
