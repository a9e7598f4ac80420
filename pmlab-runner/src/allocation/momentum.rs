//! Momentum scaling: triple last month's winners, cut losers to a third.

use super::{AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot};
use crate::config::AllocationStyle;

#[derive(Debug, Clone, Copy)]
pub struct MomentumPolicy {
    pub winner_scale: f64,
    pub loser_scale: f64,
}

impl Default for MomentumPolicy {
    fn default() -> Self {
        Self { winner_scale: 3.0, loser_scale: 1.0 / 3.0 }
    }
}

impl AllocationPolicy for MomentumPolicy {
    fn style(&self) -> AllocationStyle {
        AllocationStyle::Momentum
    }

    /// Scales eligible strategies and clamps them to the limits. The
    /// manager's rescale to the total budget does the renormalization.
    fn recalibrate(&mut self, snapshot: &PerformanceSnapshot<'_>) -> Result<AllocationMap, AllocationError> {
        let mut out = AllocationMap::new();
        for (&id, strategy) in &snapshot.strategies {
            if !snapshot.is_eligible(id) {
                continue;
            }
            let scale =
                if strategy.metrics.trailing_month_pnl > 0.0 { self.winner_scale } else { self.loser_scale };
            out.insert(id.clone(), snapshot.limits.clamp(snapshot.current(id) * scale));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn winners_triple_losers_shrink_young_untouched() {
        let fx = Fixture::from_paths(&[
            linear_path(60, 1.0, 10.0),
            linear_path(60, 1.0, -10.0),
            linear_path(20, 1.0, 10.0),
        ]);
        let snap = fx.snapshot(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let out = MomentumPolicy::default().recalibrate(&snap).unwrap();
        assert!((out[&fx.ids[0]] - 30_000.0).abs() < 1e-9);
        assert!((out[&fx.ids[1]] - 10_000.0 / 3.0).abs() < 1e-9);
        assert!(!out.contains_key(&fx.ids[2]));
    }

    #[test]
    fn clamps_to_limits() {
        let mut fx = Fixture::from_paths(&[linear_path(60, 1.0, 10.0), linear_path(60, 1.0, -10.0)]);
        fx.current.insert(fx.ids[0].clone(), 150_000.0);
        fx.current.insert(fx.ids[1].clone(), 2_000.0);
        let snap = fx.snapshot(NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        let out = MomentumPolicy::default().recalibrate(&snap).unwrap();
        assert_eq!(out[&fx.ids[0]], 200_000.0);
        assert_eq!(out[&fx.ids[1]], 1_000.0);
    }
}
