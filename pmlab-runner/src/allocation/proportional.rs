//! Proportional-to-metric allocation: he who did better gets more.

use super::{AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot};
use crate::config::AllocationStyle;
use pmlab_core::engine::StrategyMetrics;

/// Shrink factor applied to strategies with a negative metric.
const LOSER_SHRINK: f64 = 0.9;

/// Performance measure the allocation is proportional to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProportionalMetric {
    /// Mean daily PnL.
    Pnl,
    Sharpe,
    Sortino,
}

impl ProportionalMetric {
    pub fn value(self, metrics: &StrategyMetrics) -> Option<f64> {
        match self {
            ProportionalMetric::Pnl => metrics.stats.mean,
            ProportionalMetric::Sharpe => metrics.stats.sharpe,
            ProportionalMetric::Sortino => metrics.stats.sortino,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProportionalPolicy {
    metric: ProportionalMetric,
}

impl ProportionalPolicy {
    pub fn new(metric: ProportionalMetric) -> Self {
        Self { metric }
    }
}

impl AllocationPolicy for ProportionalPolicy {
    fn style(&self) -> AllocationStyle {
        match self.metric {
            ProportionalMetric::Pnl => AllocationStyle::ProportionalPnl,
            ProportionalMetric::Sharpe => AllocationStyle::ProportionalSharpe,
            ProportionalMetric::Sortino => AllocationStyle::ProportionalSortino,
        }
    }

    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
        let limits = snapshot.limits;
        let mut out = AllocationMap::new();
        let mut pool = limits.total_allocation;
        let mut survivors = Vec::new();

        for (&id, strategy) in &snapshot.strategies {
            let current = snapshot.current(id);
            let metric = if snapshot.is_eligible(id) { self.metric.value(&strategy.metrics) } else { None };
            match metric {
                // Too young, or the metric is undefined: frozen.
                None => pool -= current,
                Some(m) if m < 0.0 => {
                    let shrunk = (current * LOSER_SHRINK).max(limits.min_allocation);
                    pool -= shrunk;
                    out.insert(id.clone(), shrunk);
                }
                Some(m) => survivors.push((id, m)),
            }
        }

        let total_metric: f64 = survivors.iter().map(|(_, m)| m).sum();
        if total_metric > 0.0 {
            for (id, m) in survivors {
                out.insert(id.clone(), limits.clamp(m * pool / total_metric));
            }
        }
        Ok(out)
    }
}
