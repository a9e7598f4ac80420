//! PnL statistics over a series of day-over-day deltas.

use crate::indicators::{downside_std_dev, mean, sample_std_dev};
use serde::{Deserialize, Serialize};

/// Number of trailing deltas summed for the "last month" PnL.
pub const TRAILING_MONTH_DAYS: usize = 29;

/// Summary statistics of a PnL delta series.
///
/// Ratios are `None` when the deviation is zero or there are fewer than two
/// deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PnlStatistics {
    pub count: usize,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
    pub downside_std_dev: Option<f64>,
    pub sharpe: Option<f64>,
    pub sortino: Option<f64>,
}

impl PnlStatistics {
    pub fn from_deltas(deltas: &[f64]) -> Self {
        let m = mean(deltas);
        let sd = sample_std_dev(deltas);
        let dsd = downside_std_dev(deltas);
        Self {
            count: deltas.len(),
            mean: m,
            std_dev: sd,
            downside_std_dev: dsd,
            sharpe: ratio(m, sd),
            sortino: ratio(m, dsd),
        }
    }
}

fn ratio(num: Option<f64>, den: Option<f64>) -> Option<f64> {
    let (n, d) = (num?, den?);
    (d > 0.0 && d.is_finite()).then(|| n / d)
}

/// Performance snapshot of one strategy, as the allocation policies see it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyMetrics {
    /// Records in the trade log (trading and no-op days).
    pub records: usize,
    /// Records that opened or closed a position.
    pub trades: usize,
    pub final_pnl: f64,
    pub trailing_month_pnl: f64,
    pub stats: PnlStatistics,
}

impl StrategyMetrics {
    pub fn new(records: usize, trades: usize, final_pnl: f64, deltas: &[f64]) -> Self {
        let tail = deltas.len().saturating_sub(TRAILING_MONTH_DAYS);
        Self {
            records,
            trades,
            final_pnl,
            trailing_month_pnl: deltas[tail..].iter().sum(),
            stats: PnlStatistics::from_deltas(deltas),
        }
    }
}
