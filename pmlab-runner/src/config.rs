//! Serializable run configuration.
//!
//! One immutable `RunConfig` is loaded from TOML and handed to every
//! portfolio manager. Every table and field has a default, so an empty file
//! describes the full default run.

use chrono::NaiveDate;
use pmlab_core::domain::{ContractTable, Instrument, InstrumentError};
use pmlab_core::signals::{StrategyError, StrategyFamily, StrategyParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run configuration (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid portfolio setting {name}: {reason}")]
    Portfolio { name: &'static str, reason: String },

    #[error("invalid {family} strategy: {source}")]
    Strategy {
        family: StrategyFamily,
        #[source]
        source: StrategyError,
    },

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error("no portfolio managers configured")]
    NoManagers,
}

/// Allocation style a portfolio manager runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStyle {
    Uniform,
    Momentum,
    ProportionalPnl,
    ProportionalSharpe,
    ProportionalSortino,
    MeanVariance,
    Regime,
}

impl AllocationStyle {
    pub const ALL: [AllocationStyle; 7] = [
        AllocationStyle::Uniform,
        AllocationStyle::Momentum,
        AllocationStyle::ProportionalPnl,
        AllocationStyle::ProportionalSharpe,
        AllocationStyle::ProportionalSortino,
        AllocationStyle::MeanVariance,
        AllocationStyle::Regime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AllocationStyle::Uniform => "uniform",
            AllocationStyle::Momentum => "momentum",
            AllocationStyle::ProportionalPnl => "proportional_pnl",
            AllocationStyle::ProportionalSharpe => "proportional_sharpe",
            AllocationStyle::ProportionalSortino => "proportional_sortino",
            AllocationStyle::MeanVariance => "mean_variance",
            AllocationStyle::Regime => "regime",
        }
    }
}

impl std::fmt::Display for AllocationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capital limits and recalibration cadence shared by every manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioLimits {
    pub total_allocation: f64,
    pub min_allocation: f64,
    pub max_allocation: f64,
    /// Budget each strategy starts with.
    pub first_allocation: f64,
    pub recalibration_period_days: i64,
    pub weekend_adjustment_days: i64,
    /// Allowed relative drift of the allocation sum after rescaling.
    pub conservation_tolerance: f64,
}

impl Default for PortfolioLimits {
    fn default() -> Self {
        Self {
            total_allocation: 420_000.0,
            min_allocation: 1_000.0,
            max_allocation: 200_000.0,
            first_allocation: 10_000.0,
            recalibration_period_days: 28,
            weekend_adjustment_days: 8,
            conservation_tolerance: 0.01,
        }
    }
}

impl PortfolioLimits {
    /// Trade records a strategy needs before performance-based policies judge it.
    pub fn eligibility_threshold(&self) -> usize {
        2 * self.recalibration_period_days.max(0) as usize
    }

    pub fn clamp(&self, allocation: f64) -> f64 {
        allocation.clamp(self.min_allocation, self.max_allocation)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |name: &'static str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Portfolio { name, reason: format!("must be positive, got {v}") })
            }
        };
        positive("total_allocation", self.total_allocation)?;
        positive("min_allocation", self.min_allocation)?;
        positive("max_allocation", self.max_allocation)?;
        positive("first_allocation", self.first_allocation)?;
        positive("conservation_tolerance", self.conservation_tolerance)?;
        if self.min_allocation > self.max_allocation {
            return Err(ConfigError::Portfolio {
                name: "min_allocation",
                reason: format!("{} exceeds max_allocation {}", self.min_allocation, self.max_allocation),
            });
        }
        if self.recalibration_period_days < 1 {
            return Err(ConfigError::Portfolio {
                name: "recalibration_period_days",
                reason: format!("must be at least 1, got {}", self.recalibration_period_days),
            });
        }
        if self.weekend_adjustment_days < 0 {
            return Err(ConfigError::Portfolio {
                name: "weekend_adjustment_days",
                reason: format!("must not be negative, got {}", self.weekend_adjustment_days),
            });
        }
        Ok(())
    }
}

/// Tuning of the solver- and regression-backed policies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Points on the risk-aversion grid traced by the mean-variance policy.
    pub frontier_points: usize,
    /// L1 penalty of the regime regressor.
    pub lasso_alpha: f64,
    /// Trailing-return lags, in recalibration periods, used as regime features.
    pub return_lags: usize,
    /// Indicator columns missing more than this fraction of dates are dropped.
    pub max_missing_fraction: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { frontier_points: 100, lasso_alpha: 1.0, return_lags: 3, max_missing_fraction: 0.2 }
    }
}

/// Where bars come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub market_data_dir: PathBuf,
    /// File name template; `{symbol}` is replaced by each contract symbol.
    pub file_pattern: String,
    /// Directory of `Date,Value` macro indicator CSVs for the regime policy.
    pub indicator_dir: Option<PathBuf>,
    pub synthetic: bool,
    pub synthetic_bars: usize,
    pub synthetic_start: NaiveDate,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            market_data_dir: PathBuf::from("data"),
            file_pattern: "market_data_{symbol}.csv".to_string(),
            indicator_dir: None,
            synthetic: false,
            synthetic_bars: 1_260,
            synthetic_start: NaiveDate::from_ymd_opt(2012, 1, 3).unwrap_or_default(),
        }
    }
}

/// Per-family overrides. Unset fields fall back to the family's tuned defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyConfig {
    pub enabled: Option<bool>,
    pub ma_lookback_days: Option<usize>,
    pub loss_ticks_multiple: Option<f64>,
    pub net_change_multiple: Option<f64>,
    pub min_correlation: Option<f64>,
    /// Single-leg universe.
    pub instruments: Option<Vec<String>>,
    /// Two-leg universe; the first symbol is leg A.
    pub pairs: Option<Vec<(String, String)>>,
}

impl FamilyConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn params(&self, family: StrategyFamily) -> StrategyParams {
        let base = StrategyParams::for_family(family);
        StrategyParams {
            ma_lookback_days: self.ma_lookback_days.unwrap_or(base.ma_lookback_days),
            loss_ticks_multiple: self.loss_ticks_multiple.unwrap_or(base.loss_ticks_multiple),
            net_change_multiple: self.net_change_multiple.unwrap_or(base.net_change_multiple),
            min_correlation: self.min_correlation.unwrap_or(base.min_correlation),
        }
    }

    /// Leg lists for this family, one per strategy instance.
    pub fn universe(&self, family: StrategyFamily) -> Vec<Vec<String>> {
        if family.leg_count() == 1 {
            let symbols = self.instruments.clone().unwrap_or_else(default_instruments);
            symbols.into_iter().map(|s| vec![s]).collect()
        } else {
            let pairs = self.pairs.clone().unwrap_or_else(default_pairs);
            let mut legs: Vec<Vec<String>> = pairs.into_iter().map(|(a, b)| vec![a, b]).collect();
            // Relative value is directional: each pair runs both ways unless listed explicitly.
            if family == StrategyFamily::RelativeValue && self.pairs.is_none() {
                let reversed: Vec<Vec<String>> = legs.iter().map(|l| l.iter().rev().cloned().collect()).collect();
                legs.extend(reversed);
            }
            legs
        }
    }
}

/// Default single-leg universe: every built-in contract.
pub fn default_instruments() -> Vec<String> {
    ["ES", "NQ", "CL", "HO", "6E", "6B", "ZN", "ZB", "GC", "SI", "ZC", "ZW"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Default two-leg universe: related contracts within one sector.
pub fn default_pairs() -> Vec<(String, String)> {
    [("ES", "NQ"), ("CL", "HO"), ("6E", "6B"), ("ZN", "ZB"), ("GC", "SI"), ("ZC", "ZW")]
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub trend_following: FamilyConfig,
    pub mean_reversion: FamilyConfig,
    pub relative_value: FamilyConfig,
    pub pairs: FamilyConfig,
}

impl StrategiesConfig {
    pub fn family(&self, family: StrategyFamily) -> &FamilyConfig {
        match family {
            StrategyFamily::TrendFollowing => &self.trend_following,
            StrategyFamily::MeanReversion => &self.mean_reversion,
            StrategyFamily::RelativeValue => &self.relative_value,
            StrategyFamily::Pairs => &self.pairs,
        }
    }
}

/// One strategy instance to build: family, parameters, and leg symbols.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySpec {
    pub family: StrategyFamily,
    pub params: StrategyParams,
    pub legs: Vec<String>,
}

/// Complete configuration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub portfolio: PortfolioLimits,
    pub policies: PolicyConfig,
    pub data: DataConfig,
    pub strategies: StrategiesConfig,
    /// Overrides of, or additions to, the built-in contract table.
    pub contracts: Vec<Instrument>,
    /// Allocation styles to run, each as an independent manager.
    pub managers: Vec<AllocationStyle>,
    /// Fixed risk budget of the standalone strategy path.
    pub risk_dollars_per_trade: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            portfolio: PortfolioLimits::default(),
            policies: PolicyConfig::default(),
            data: DataConfig::default(),
            strategies: StrategiesConfig::default(),
            contracts: Vec::new(),
            managers: AllocationStyle::ALL.to_vec(),
            risk_dollars_per_trade: 1_000.0,
        }
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.portfolio.validate()?;
        if self.managers.is_empty() {
            return Err(ConfigError::NoManagers);
        }
        for family in StrategyFamily::ALL {
            let cfg = self.strategies.family(family);
            if cfg.is_enabled() {
                cfg.params(family).validate().map_err(|source| ConfigError::Strategy { family, source })?;
            }
        }
        // Table construction validates contract metadata.
        self.contract_table()?;
        Ok(())
    }

    /// Built-in futures table with the configured overrides applied.
    pub fn contract_table(&self) -> Result<ContractTable, ConfigError> {
        let mut table = ContractTable::futures();
        for contract in &self.contracts {
            table.insert(contract.clone())?;
        }
        Ok(table)
    }

    /// Every strategy instance of every enabled family, in family order.
    pub fn strategy_specs(&self) -> Vec<StrategySpec> {
        StrategyFamily::ALL
            .into_iter()
            .filter(|f| self.strategies.family(*f).is_enabled())
            .flat_map(|family| {
                let cfg = self.strategies.family(family);
                let params = cfg.params(family);
                cfg.universe(family)
                    .into_iter()
                    .map(move |legs| StrategySpec { family, params: params.clone(), legs })
            })
            .collect()
    }

    /// Sorted, de-duplicated symbols the enabled strategies trade.
    pub fn symbols(&self) -> Vec<String> {
        let set: BTreeSet<String> = self.strategy_specs().into_iter().flat_map(|s| s.legs).collect();
        set.into_iter().collect()
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form.
    ///
    /// Two runs with identical configuration share a fingerprint.
    pub fn fingerprint(&self) -> RunId {
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
