//! Mean-variance allocation over the strategies' percent PnL changes.

use super::solver::{optimal_weights, QuadraticSolver};
use super::{AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot};
use crate::config::AllocationStyle;
use pmlab_core::indicators::{covariance, mean};

#[derive(Debug)]
pub struct MeanVariancePolicy {
    solver: Box<dyn QuadraticSolver>,
    frontier_points: usize,
}

impl MeanVariancePolicy {
    pub fn new(solver: Box<dyn QuadraticSolver>, frontier_points: usize) -> Self {
        Self { solver, frontier_points }
    }
}

impl AllocationPolicy for MeanVariancePolicy {
    fn style(&self) -> AllocationStyle {
        AllocationStyle::MeanVariance
    }

    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
        let (eligible, pool) = snapshot.eligible_pool();
        if eligible.is_empty() {
            return Ok(AllocationMap::new());
        }

        // Equal-length series: every one truncated to the shortest, keeping the
        // oldest observations. No date alignment, so index i of two series can
        // fall on different dates.
        let series: Vec<&[f64]> = eligible
            .iter()
            .map(|id| snapshot.strategies.get(id).map_or(&[][..], |s| s.pct_pnl_change))
            .collect();
        let len = series.iter().map(|s| s.len()).min().unwrap_or(0);
        if len < 2 {
            return Err(AllocationError::InsufficientHistory(format!(
                "{len} percent-change observations in the shortest series"
            )));
        }
        let series: Vec<&[f64]> = series.into_iter().map(|s| &s[..len]).collect();

        let expected: Vec<f64> = series.iter().map(|s| mean(s).unwrap_or(0.0)).collect();
        let cov: Vec<Vec<f64>> = series
            .iter()
            .map(|a| series.iter().map(|b| covariance(a, b).unwrap_or(0.0)).collect())
            .collect();

        let weights = optimal_weights(self.solver.as_ref(), &cov, &expected, self.frontier_points)?;
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(AllocationError::Solver(super::SolverError::NonFinite("weight sum")));
        }
        Ok(eligible
            .into_iter()
            .zip(weights)
            .map(|(id, w)| (id.clone(), w / total * pool))
            .collect())
    }
}
