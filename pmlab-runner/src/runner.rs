//! Run orchestration: wires configuration, data, strategies and managers.
//!
//! Entry points:
//! - `run_portfolio()`: loads data and indicators, then runs every configured manager. Used by CLI.
//! - `run_managers()`: pre-loaded feed, one independent manager per style, in parallel.
//! - `run_standalone()`: one strategy with a fixed risk budget and no allocation loop.

use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use pmlab_core::data::{load_directory, FeedError, InMemoryFeed, PriceFeed};
use pmlab_core::domain::{InstrumentError, InstrumentLookup, TradeRecord};
use pmlab_core::engine::{ReplayScheduler, StrategyEngine, StrategyMetrics};
use pmlab_core::signals::{StrategyError, StrategyFamily};

use crate::allocation::build_policy;
use crate::config::{AllocationStyle, ConfigError, RunConfig, RunId, StrategySpec};
use crate::data_loader::load_feed;
use crate::macro_data::{IndicatorTable, MacroDataError};
use crate::manager::{ManagerError, PortfolioManager};
use crate::summary::PortfolioSummary;

/// Caller-signaled misuse of the standalone data source.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("both a CSV directory and in-memory bars were supplied")]
    Both,
    #[error("neither a CSV directory nor in-memory bars was supplied")]
    Neither,
}

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Feed(#[from] FeedError),
    #[error("macro indicator error: {0}")]
    MacroData(#[from] MacroDataError),
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),
    #[error(transparent)]
    Instrument(#[from] InstrumentError),
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error("data source: {0}")]
    DataSource(#[from] SourceError),
    #[error("{0} manager has no strategy with data to trade")]
    NoStrategies(AllocationStyle),
    #[error("symbol '{0}' not found in loaded data")]
    SymbolNotFound(String),
}

/// Current schema version for serialized reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Everything a portfolio run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    /// One summary per configured manager, in configuration order.
    pub managers: Vec<PortfolioSummary>,
}

/// Result of a standalone strategy backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandaloneResult {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub strategy_id: String,
    pub family: StrategyFamily,
    pub risk_dollars_per_trade: f64,
    pub dataset_hash: String,
    pub metrics: StrategyMetrics,
    pub log_digest: String,
    pub trades: Vec<TradeRecord>,
}

/// Where a standalone run reads bars from. Exactly one must be set.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneSource<'a> {
    pub csv_dir: Option<&'a Path>,
    pub bars: Option<&'a InMemoryFeed>,
}

/// Load everything `config` names and run every configured manager.
pub fn run_portfolio(config: &RunConfig) -> Result<RunReport, RunError> {
    let contracts = config.contract_table()?;
    let loaded = load_feed(&config.data, &config.symbols(), &contracts)?;
    let indicators = match &config.data.indicator_dir {
        Some(dir) => Some(IndicatorTable::load_dir(
            dir,
            config.portfolio.recalibration_period_days as usize,
            config.policies.max_missing_fraction,
        )?),
        None => None,
    };
    let managers = run_managers(config, &contracts, &loaded.feed, indicators.as_ref())?;
    Ok(RunReport {
        schema_version: SCHEMA_VERSION,
        run_id: config.fingerprint(),
        dataset_hash: loaded.dataset_hash.to_string(),
        has_synthetic: loaded.has_synthetic,
        managers,
    })
}

/// Run one manager per configured style over a shared read-only feed.
///
/// Managers share nothing mutable: each builds its own strategies and its
/// own scheduler. Results come back in configuration order.
pub fn run_managers(
    config: &RunConfig,
    contracts: &dyn InstrumentLookup,
    feed: &InMemoryFeed,
    indicators: Option<&IndicatorTable>,
) -> Result<Vec<PortfolioSummary>, RunError> {
    config.managers.par_iter().map(|style| run_manager(*style, config, contracts, feed, indicators)).collect()
}

/// Build and drain a single manager.
pub fn run_manager(
    style: AllocationStyle,
    config: &RunConfig,
    contracts: &dyn InstrumentLookup,
    feed: &InMemoryFeed,
    indicators: Option<&IndicatorTable>,
) -> Result<PortfolioSummary, RunError> {
    let mut manager = build_manager(style, config, contracts, feed, indicators)?;
    let symbols = manager.symbols();
    manager.run(ReplayScheduler::for_symbols(feed, &symbols))?;
    let summary = manager.summary();
    info!(
        manager = style.name(),
        strategies = summary.strategies.len(),
        final_pnl = summary.final_pnl,
        recalibrations = summary.recalibrations,
        "manager finished"
    );
    Ok(summary)
}

/// A manager with every configured strategy whose legs the feed can serve.
pub fn build_manager(
    style: AllocationStyle,
    config: &RunConfig,
    contracts: &dyn InstrumentLookup,
    feed: &dyn PriceFeed,
    indicators: Option<&IndicatorTable>,
) -> Result<PortfolioManager, RunError> {
    let policy = build_policy(style, &config.policies, indicators);
    let mut manager = PortfolioManager::new(config.portfolio.clone(), policy);
    for engine in build_strategies(&config.strategy_specs(), contracts, feed)? {
        manager.add_strategy(engine)?;
    }
    if manager.allocations().is_empty() {
        return Err(RunError::NoStrategies(style));
    }
    Ok(manager)
}

/// Fresh engines for `specs`. Specs with a leg the feed lacks are skipped.
pub fn build_strategies(
    specs: &[StrategySpec],
    contracts: &dyn InstrumentLookup,
    feed: &dyn PriceFeed,
) -> Result<Vec<StrategyEngine>, RunError> {
    let mut engines = Vec::with_capacity(specs.len());
    for spec in specs {
        if let Some(missing) = spec.legs.iter().find(|leg| feed.bars(leg).map_or(true, |b| b.is_empty())) {
            warn!(family = %spec.family, symbol = %missing, "no bars for leg, strategy skipped");
            continue;
        }
        let instruments = spec.legs.iter().map(|leg| contracts.lookup(leg)).collect::<Result<Vec<_>, _>>()?;
        engines.push(StrategyEngine::new(spec.family, spec.params.clone(), instruments)?);
    }
    Ok(engines)
}

/// Run one strategy with a fixed risk budget and no allocation loop.
pub fn run_standalone(
    spec: &StrategySpec,
    contracts: &dyn InstrumentLookup,
    source: StandaloneSource<'_>,
    file_pattern: &str,
    risk_dollars_per_trade: f64,
) -> Result<StandaloneResult, RunError> {
    let loaded;
    let feed = match (source.csv_dir, source.bars) {
        (Some(_), Some(_)) => return Err(SourceError::Both.into()),
        (None, None) => return Err(SourceError::Neither.into()),
        (Some(dir), None) => {
            loaded = load_directory(dir, file_pattern, &spec.legs, contracts)?;
            &loaded
        }
        (None, Some(bars)) => bars,
    };
    if let Some(missing) = spec.legs.iter().find(|leg| feed.bars(leg).is_none()) {
        return Err(RunError::SymbolNotFound(missing.clone()));
    }

    let instruments = spec.legs.iter().map(|leg| contracts.lookup(leg)).collect::<Result<Vec<_>, _>>()?;
    let mut engine = StrategyEngine::new(spec.family, spec.params.clone(), instruments)?;
    for event in ReplayScheduler::for_symbols(feed, &spec.legs) {
        engine.on_bar(event.bar, risk_dollars_per_trade);
    }

    Ok(StandaloneResult {
        schema_version: SCHEMA_VERSION,
        strategy_id: engine.id().to_string(),
        family: spec.family,
        risk_dollars_per_trade,
        dataset_hash: feed.restrict(&spec.legs).dataset_hash().to_string(),
        metrics: engine.metrics(),
        log_digest: engine.log_digest(),
        trades: engine.trades().to_vec(),
    })
}
