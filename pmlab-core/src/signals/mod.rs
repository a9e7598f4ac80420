//! Signal families.
//!
//! Every family feeds the same strategy state machine
//! ([`StrategyEngine`](crate::engine::StrategyEngine)). A family only decides
//! three things: how the deviation and its thresholds are measured from the
//! aligned bars, which way an entry goes relative to the deviation, and what
//! tick value sizes the trade. Positions, stops and PnL are the engine's job.

pub mod ma_deviation;
pub mod pairs;
pub mod relative_value;

pub use ma_deviation::MaDeviationModel;
pub use pairs::{HedgeRatio, PairsModel};
pub use relative_value::RelativeValueModel;

use crate::domain::{Bar, Instrument, LegQuote};
use crate::indicators::PriceSample;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    TrendFollowing,
    MeanReversion,
    RelativeValue,
    Pairs,
}

impl StrategyFamily {
    pub const ALL: [StrategyFamily; 4] = [
        StrategyFamily::TrendFollowing,
        StrategyFamily::MeanReversion,
        StrategyFamily::RelativeValue,
        StrategyFamily::Pairs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StrategyFamily::TrendFollowing => "trend_following",
            StrategyFamily::MeanReversion => "mean_reversion",
            StrategyFamily::RelativeValue => "relative_value",
            StrategyFamily::Pairs => "pairs",
        }
    }

    /// Number of instruments a strategy of this family trades.
    pub fn leg_count(self) -> usize {
        match self {
            StrategyFamily::TrendFollowing | StrategyFamily::MeanReversion => 1,
            StrategyFamily::RelativeValue | StrategyFamily::Pairs => 2,
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            StrategyFamily::TrendFollowing | StrategyFamily::RelativeValue => Direction::WithDeviation,
            StrategyFamily::MeanReversion | StrategyFamily::Pairs => Direction::AgainstDeviation,
        }
    }
}

impl fmt::Display for StrategyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which way an entry goes relative to the deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    WithDeviation,
    AgainstDeviation,
}

impl Direction {
    /// +1 for a long entry, -1 for a short entry.
    pub fn entry_sign(self, deviation: f64) -> i64 {
        let up = deviation > 0.0;
        match (self, up) {
            (Direction::WithDeviation, true) | (Direction::AgainstDeviation, false) => 1,
            _ => -1,
        }
    }
}

/// Per-strategy parameters.
///
/// Missing fields fall back to the generic defaults below; the runner's
/// configuration layer overrides them per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub ma_lookback_days: usize,
    pub loss_ticks_multiple: f64,
    pub net_change_multiple: f64,
    pub min_correlation: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self { ma_lookback_days: 40, loss_ticks_multiple: 5.0, net_change_multiple: 5.0, min_correlation: 0.75 }
    }
}

impl StrategyParams {
    /// Tuned defaults for each family.
    pub fn for_family(family: StrategyFamily) -> Self {
        match family {
            StrategyFamily::TrendFollowing => Self {
                ma_lookback_days: 40,
                loss_ticks_multiple: 0.1,
                net_change_multiple: 0.25,
                ..Self::default()
            },
            StrategyFamily::MeanReversion | StrategyFamily::Pairs => Self {
                ma_lookback_days: 40,
                loss_ticks_multiple: 0.2,
                net_change_multiple: 0.75,
                ..Self::default()
            },
            StrategyFamily::RelativeValue => Self {
                ma_lookback_days: 40,
                loss_ticks_multiple: 0.2,
                net_change_multiple: 0.75,
                min_correlation: 0.65,
            },
        }
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.ma_lookback_days < 2 {
            return Err(StrategyError::InvalidParam {
                name: "ma_lookback_days",
                value: self.ma_lookback_days as f64,
            });
        }
        for (name, value) in
            [("loss_ticks_multiple", self.loss_ticks_multiple), ("net_change_multiple", self.net_change_multiple)]
        {
            if !value.is_finite() || value <= 0.0 {
                return Err(StrategyError::InvalidParam { name, value });
            }
        }
        if !self.min_correlation.is_finite() || !(-1.0..=1.0).contains(&self.min_correlation) {
            return Err(StrategyError::InvalidParam { name: "min_correlation", value: self.min_correlation });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("{family} trades {expected} instrument(s), got {got}")]
    LegCount { family: StrategyFamily, expected: usize, got: usize },

    #[error("{family} legs must be distinct, got {symbol} twice")]
    DuplicateLeg { family: StrategyFamily, symbol: String },

    #[error("invalid strategy parameter {name}: {value}")]
    InvalidParam { name: &'static str, value: f64 },
}

/// What a family measured on one aligned set of bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    /// Prices of the traded instrument (the synthetic spread for pairs).
    pub price: PriceSample,
    pub deviation: f64,
    /// Entry threshold on |deviation|; half of it is the convergence exit.
    pub net_change: f64,
    /// Stop distance from entry, in ticks.
    pub loss_ticks: f64,
    /// Dollar value of one tick of the traded instrument, for sizing and stops.
    pub tick_value: f64,
    pub moving_average: f64,
    pub volatility: f64,
    pub projected_price: Option<f64>,
    pub correlation: Option<f64>,
    /// False when a family-specific gate (minimum correlation) blocks entries.
    pub entry_allowed: bool,
    /// Per-leg quotes for multi-leg positions; empty when the traded
    /// instrument is a single leg.
    pub legs: Vec<LegQuote>,
}

/// Result of feeding one aligned set of bars to a model.
#[derive(Debug, Clone, PartialEq)]
pub enum Observe {
    WarmingUp,
    /// Numerical failure; the engine leaves its state untouched.
    Skipped(&'static str),
    Ready(Observation),
}

/// Family-specific measurement.
///
/// # Invariants
/// - `observe()` receives exactly one bar per leg, in leg order, all on the same date
/// - `observe()` is deterministic for the same bar sequence
/// - models never see positions or allocations
pub trait SignalModel: Send + Sync + fmt::Debug {
    fn family(&self) -> StrategyFamily;

    fn direction(&self) -> Direction {
        self.family().direction()
    }

    fn observe(&mut self, bars: &[&Bar]) -> Observe;
}

/// Build the model for `family` over `instruments` (leg order matters for
/// relative value: the first leg is traded, the second drives it).
pub fn build_model(
    family: StrategyFamily,
    params: &StrategyParams,
    instruments: &[Instrument],
) -> Result<Box<dyn SignalModel>, StrategyError> {
    params.validate()?;
    if instruments.len() != family.leg_count() {
        return Err(StrategyError::LegCount { family, expected: family.leg_count(), got: instruments.len() });
    }
    let model: Box<dyn SignalModel> = match (family, instruments) {
        (StrategyFamily::TrendFollowing | StrategyFamily::MeanReversion, [inst]) => {
            Box::new(MaDeviationModel::new(family, inst.clone(), params.clone()))
        }
        (StrategyFamily::RelativeValue | StrategyFamily::Pairs, [a, b]) => {
            if a.symbol == b.symbol {
                return Err(StrategyError::DuplicateLeg { family, symbol: a.symbol.clone() });
            }
            if family == StrategyFamily::Pairs {
                Box::new(PairsModel::new(a.clone(), b.clone(), params.clone()))
            } else {
                Box::new(RelativeValueModel::new(a.clone(), params.clone()))
            }
        }
        _ => return Err(StrategyError::LegCount { family, expected: family.leg_count(), got: instruments.len() }),
    };
    Ok(model)
}
