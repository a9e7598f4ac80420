//! End-of-run summaries: per-strategy metrics and the combined portfolio
//! PnL series.

use crate::config::AllocationStyle;
use crate::manager::PortfolioManager;
use chrono::NaiveDate;
use pmlab_core::engine::{PnlStatistics, StrategyEngine, StrategyMetrics};
use pmlab_core::signals::StrategyFamily;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One day of the combined portfolio PnL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub id: String,
    pub family: StrategyFamily,
    pub final_allocation: f64,
    pub metrics: StrategyMetrics,
    /// BLAKE3 of the trade and allocation logs.
    pub log_digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub manager: String,
    pub style: AllocationStyle,
    pub events: usize,
    pub recalibrations: usize,
    pub skipped_recalibrations: usize,
    pub strategies: Vec<StrategySummary>,
    pub final_pnl: f64,
    pub stats: PnlStatistics,
    pub daily_pnl: Vec<DailyPnl>,
}

impl PortfolioSummary {
    pub fn build(manager: &PortfolioManager) -> Self {
        let strategies: Vec<StrategySummary> = manager
            .strategies()
            .map(|engine| StrategySummary {
                id: engine.id().to_string(),
                family: engine.family(),
                final_allocation: manager.allocations().get(engine.id()).copied().unwrap_or(0.0),
                metrics: engine.metrics(),
                log_digest: engine.log_digest(),
            })
            .collect();

        let daily_pnl = combined_pnl(manager.strategies());
        let deltas: Vec<f64> = daily_pnl.windows(2).map(|w| w[1].pnl - w[0].pnl).collect();

        Self {
            manager: manager.name().to_string(),
            style: manager.style(),
            events: manager.events(),
            recalibrations: manager.recalibrations(),
            skipped_recalibrations: manager.skipped_recalibrations(),
            strategies,
            final_pnl: daily_pnl.last().map_or(0.0, |d| d.pnl),
            stats: PnlStatistics::from_deltas(&deltas),
            daily_pnl,
        }
    }

    pub fn total_allocation(&self) -> f64 {
        self.strategies.iter().map(|s| s.final_allocation).sum()
    }
}

/// Sum of cumulative PnL across strategies on every day any of them
/// recorded. A strategy contributes its last known PnL on days it has no
/// record, and nothing before its first.
pub fn combined_pnl<'a>(strategies: impl IntoIterator<Item = &'a StrategyEngine>) -> Vec<DailyPnl> {
    let logs: Vec<&[pmlab_core::TradeRecord]> = strategies.into_iter().map(|s| s.trades()).collect();
    let dates: BTreeSet<NaiveDate> = logs.iter().flat_map(|log| log.iter().map(|t| t.date)).collect();

    let mut cursors = vec![0usize; logs.len()];
    let mut last = vec![0.0f64; logs.len()];
    dates
        .into_iter()
        .map(|date| {
            for (i, log) in logs.iter().enumerate() {
                while cursors[i] < log.len() && log[cursors[i]].date <= date {
                    last[i] = log[cursors[i]].pnl;
                    cursors[i] += 1;
                }
            }
            DailyPnl { date, pnl: last.iter().sum() }
        })
        .collect()
}
