//! Allocation policies: how a portfolio manager redistributes its risk budget.
//!
//! Every policy sees the same `PerformanceSnapshot` and returns new
//! allocations for the strategies it chose to move. Strategies it leaves out
//! keep their current allocation. The manager rescales the result to the
//! total budget and enforces conservation afterwards.

pub mod lasso;
pub mod mean_variance;
pub mod momentum;
pub mod proportional;
pub mod regime;
pub mod solver;
pub mod uniform;

pub use lasso::{LassoRegressor, LinearModel, RegressionError, Regressor};
pub use mean_variance::MeanVariancePolicy;
pub use momentum::MomentumPolicy;
pub use proportional::{ProportionalMetric, ProportionalPolicy};
pub use regime::RegimePolicy;
pub use solver::{efficient_frontier, optimal_weights, polyfit2, FrontierPoint, QuadraticSolver, SimplexProjectedGradient, SolverError};
pub use uniform::UniformPolicy;

use crate::config::{AllocationStyle, PolicyConfig, PortfolioLimits};
use crate::macro_data::IndicatorTable;
use chrono::NaiveDate;
use pmlab_core::domain::{StrategyId, TradeRecord};
use pmlab_core::engine::{StrategyEngine, StrategyMetrics};
use std::collections::BTreeMap;
use thiserror::Error;

/// Risk budget per strategy, iterated in strategy-id order.
pub type AllocationMap = BTreeMap<StrategyId, f64>;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("solver failed: {0}")]
    Solver(#[from] SolverError),

    #[error("regression failed: {0}")]
    Regression(#[from] RegressionError),

    #[error("not enough history: {0}")]
    InsufficientHistory(String),
}

/// One strategy's history as a policy sees it. Read-only.
#[derive(Debug, Clone)]
pub struct StrategySnapshot<'a> {
    pub trades: &'a [TradeRecord],
    pub allocations: &'a [f64],
    pub pct_pnl_change: &'a [f64],
    pub metrics: StrategyMetrics,
}

impl<'a> StrategySnapshot<'a> {
    pub fn from_engine(engine: &'a StrategyEngine) -> Self {
        Self {
            trades: engine.trades(),
            allocations: engine.allocations(),
            pct_pnl_change: engine.pct_pnl_change(),
            metrics: engine.metrics(),
        }
    }
}

/// Everything a policy may look at during one recalibration.
#[derive(Debug, Clone)]
pub struct PerformanceSnapshot<'a> {
    /// Simulated date of the recalibration. Policies must not use data dated on or after it.
    pub date: NaiveDate,
    pub limits: &'a PortfolioLimits,
    pub current: &'a AllocationMap,
    pub strategies: BTreeMap<&'a StrategyId, StrategySnapshot<'a>>,
}

impl<'a> PerformanceSnapshot<'a> {
    pub fn new(
        date: NaiveDate,
        limits: &'a PortfolioLimits,
        current: &'a AllocationMap,
        engines: &'a BTreeMap<StrategyId, StrategyEngine>,
    ) -> Self {
        let strategies = engines.iter().map(|(id, e)| (id, StrategySnapshot::from_engine(e))).collect();
        Self { date, limits, current, strategies }
    }

    pub fn current(&self, id: &StrategyId) -> f64 {
        self.current.get(id).copied().unwrap_or(0.0)
    }

    /// Whether the strategy has enough records to be judged on performance.
    pub fn is_eligible(&self, id: &StrategyId) -> bool {
        self.strategies
            .get(id)
            .is_some_and(|s| s.metrics.records >= self.limits.eligibility_threshold())
    }

    /// Eligible strategies, and the capital left once ineligible ones are frozen.
    pub fn eligible_pool(&self) -> (Vec<&'a StrategyId>, f64) {
        let mut pool = self.limits.total_allocation;
        let mut eligible = Vec::new();
        for &id in self.strategies.keys() {
            if self.is_eligible(id) {
                eligible.push(id);
            } else {
                pool -= self.current(id);
            }
        }
        (eligible, pool)
    }
}

/// A capital-allocation rule.
pub trait AllocationPolicy: Send {
    fn style(&self) -> AllocationStyle;

    /// New allocations for the strategies this policy moves.
    ///
    /// An error aborts only this period's rebalancing; the manager keeps the
    /// current allocations.
    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError>;
}

/// Construct the policy for a style.
pub fn build_policy(
    style: AllocationStyle,
    policies: &PolicyConfig,
    indicators: Option<&IndicatorTable>,
) -> Box<dyn AllocationPolicy> {
    match style {
        AllocationStyle::Uniform => Box::new(UniformPolicy),
        AllocationStyle::Momentum => Box::new(MomentumPolicy::default()),
        AllocationStyle::ProportionalPnl => Box::new(ProportionalPolicy::new(ProportionalMetric::Pnl)),
        AllocationStyle::ProportionalSharpe => Box::new(ProportionalPolicy::new(ProportionalMetric::Sharpe)),
        AllocationStyle::ProportionalSortino => Box::new(ProportionalPolicy::new(ProportionalMetric::Sortino)),
        AllocationStyle::MeanVariance => Box::new(MeanVariancePolicy::new(
            Box::new(SimplexProjectedGradient::default()),
            policies.frontier_points,
        )),
        AllocationStyle::Regime => Box::new(RegimePolicy::new(
            Box::new(LassoRegressor::new(policies.lasso_alpha)),
            indicators.cloned(),
            policies.return_lags,
        )),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-built snapshots for policy tests.

    use super::*;
    use pmlab_core::domain::Side;
    use pmlab_core::engine::StrategyMetrics;

    /// Owned backing storage a `PerformanceSnapshot` can borrow from.
    pub struct Fixture {
        pub ids: Vec<StrategyId>,
        pub trades: Vec<Vec<TradeRecord>>,
        pub pct: Vec<Vec<f64>>,
        pub metrics: Vec<StrategyMetrics>,
        pub current: AllocationMap,
        pub limits: PortfolioLimits,
    }

    pub fn record(day: u32, pnl: f64) -> TradeRecord {
        let date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Duration::days(day as i64);
        TradeRecord {
            date,
            side: Side::None,
            size: 0,
            price: 0.0,
            position: 0,
            pnl,
            volatility: 0.0,
            moving_average: 0.0,
            deviation: 0.0,
            high: 0.0,
            low: 0.0,
            projected_price: None,
            correlation: None,
        }
    }

    impl Fixture {
        /// One strategy per cumulative-PnL path; each starts at `first_allocation`.
        pub fn from_paths(paths: &[Vec<f64>]) -> Self {
            let limits = PortfolioLimits::default();
            let mut fx = Fixture {
                ids: Vec::new(),
                trades: Vec::new(),
                pct: Vec::new(),
                metrics: Vec::new(),
                current: AllocationMap::new(),
                limits,
            };
            for (i, path) in paths.iter().enumerate() {
                let id = StrategyId(format!("s{i:02}"));
                let trades: Vec<TradeRecord> =
                    path.iter().enumerate().map(|(d, p)| record(d as u32, *p)).collect();
                let deltas: Vec<f64> = path.windows(2).map(|w| w[1] - w[0]).collect();
                let pct: Vec<f64> = path
                    .windows(2)
                    .filter(|w| w[0] != 0.0)
                    .map(|w| 100.0 * (w[1] - w[0]) / w[0].abs())
                    .collect();
                fx.metrics.push(StrategyMetrics::new(trades.len(), 0, path.last().copied().unwrap_or(0.0), &deltas));
                fx.current.insert(id.clone(), fx.limits.first_allocation);
                fx.ids.push(id);
                fx.trades.push(trades);
                fx.pct.push(pct);
            }
            fx
        }

        pub fn snapshot(&self, date: NaiveDate) -> PerformanceSnapshot<'_> {
            let strategies = self
                .ids
                .iter()
                .enumerate()
                .map(|(i, id)| {
                    (
                        id,
                        StrategySnapshot {
                            trades: &self.trades[i],
                            allocations: &[],
                            pct_pnl_change: &self.pct[i],
                            metrics: self.metrics[i].clone(),
                        },
                    )
                })
                .collect();
            PerformanceSnapshot { date, limits: &self.limits, current: &self.current, strategies }
        }
    }

    /// A path of `len` records whose PnL grows by `step` per day.
    pub fn linear_path(len: usize, start: f64, step: f64) -> Vec<f64> {
        (0..len).map(|i| start + step * i as f64).collect()
    }
}
