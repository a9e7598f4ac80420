//! Regime-predictive allocation.
//!
//! For every strategy, a sparse linear model maps macro indicator levels and
//! the strategy's own trailing returns to its return over the next period.
//! Only days strictly before the recalibration date enter the training set
//! or the prediction row. Predicted losers are floored at the minimum; the
//! rest of the pool follows the predicted gains.

use super::lasso::Regressor;
use super::{AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot, StrategySnapshot};
use crate::config::AllocationStyle;
use crate::macro_data::IndicatorTable;
use chrono::NaiveDate;
use pmlab_core::domain::TradeRecord;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug)]
pub struct RegimePolicy {
    regressor: Box<dyn Regressor>,
    indicators: Option<IndicatorTable>,
    return_lags: usize,
}

/// Features and targets for one strategy, plus the row to predict from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<f64>,
    pub latest: Vec<f64>,
}

impl RegimePolicy {
    pub fn new(regressor: Box<dyn Regressor>, indicators: Option<IndicatorTable>, return_lags: usize) -> Self {
        Self { regressor, indicators, return_lags: return_lags.max(1) }
    }

    /// Assemble the training set on `calendar`, or `None` if a usable
    /// prediction row cannot be built.
    pub fn training_set(
        &self,
        trades: &[TradeRecord],
        calendar: &[NaiveDate],
        period: usize,
        unit: f64,
    ) -> Option<TrainingSet> {
        let pnl = forward_filled_pnl(trades, calendar);
        let last = calendar.len().checked_sub(1)?;
        let span = self.return_lags * period;

        let features = |t: usize| -> Option<Vec<f64>> {
            if t < span {
                return None;
            }
            let mut row = Vec::new();
            if let Some(table) = &self.indicators {
                for value in table.as_of(calendar[t])? {
                    row.push((*value)?);
                }
            }
            for k in 0..self.return_lags {
                let now = pnl[t - k * period]?;
                let before = pnl[t - (k + 1) * period]?;
                row.push((now - before) / unit);
            }
            Some(row)
        };

        let mut x = Vec::new();
        let mut y = Vec::new();
        for t in span..=last.saturating_sub(period) {
            if t + period > last {
                break;
            }
            let (Some(row), Some(future), Some(now)) = (features(t), pnl[t + period], pnl[t]) else {
                continue;
            };
            x.push(row);
            y.push((future - now) / unit);
        }
        Some(TrainingSet { x, y, latest: features(last)? })
    }

    fn predict(&self, strategy: &StrategySnapshot<'_>, calendar: &[NaiveDate], period: usize, unit: f64) -> Option<f64> {
        let set = self.training_set(strategy.trades, calendar, period, unit)?;
        if set.y.len() < 2 * period {
            return None;
        }
        match self.regressor.fit(&set.x, &set.y) {
            Ok(model) => Some(model.predict(&set.latest)).filter(|p| p.is_finite()),
            Err(e) => {
                debug!(error = %e, "regression skipped");
                None
            }
        }
    }
}

impl AllocationPolicy for RegimePolicy {
    fn style(&self) -> AllocationStyle {
        AllocationStyle::Regime
    }

    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
        let limits = snapshot.limits;
        let period = limits.recalibration_period_days.max(1) as usize;
        let calendar: Vec<NaiveDate> = snapshot
            .strategies
            .values()
            .flat_map(|s| s.trades.iter().map(|t| t.date))
            .filter(|d| *d < snapshot.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut out = AllocationMap::new();
        let mut pool = limits.total_allocation;
        let mut survivors = Vec::new();
        for (&id, strategy) in &snapshot.strategies {
            let prediction = if snapshot.is_eligible(id) {
                self.predict(strategy, &calendar, period, limits.first_allocation)
            } else {
                None
            };
            match prediction {
                None => pool -= snapshot.current(id),
                Some(p) if p < 0.0 => {
                    out.insert(id.clone(), limits.min_allocation);
                    pool -= limits.min_allocation;
                }
                Some(p) => survivors.push((id, p)),
            }
        }

        let total: f64 = survivors.iter().map(|(_, p)| p).sum();
        if total > 0.0 {
            for (id, p) in survivors {
                out.insert(id.clone(), (p / total * pool).min(limits.max_allocation));
            }
        }
        Ok(out)
    }
}

/// Cumulative PnL on each calendar day, carried forward between records.
/// `None` before the first record.
fn forward_filled_pnl(trades: &[TradeRecord], calendar: &[NaiveDate]) -> Vec<Option<f64>> {
    let mut next = 0;
    let mut last = None;
    calendar
        .iter()
        .map(|day| {
            while next < trades.len() && trades[next].date <= *day {
                last = Some(trades[next].pnl);
                next += 1;
            }
            last
        })
        .collect()
}
