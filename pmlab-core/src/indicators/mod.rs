//! Rolling-window indicator math.
//!
//! Strategies keep bounded windows of recent samples and recompute the
//! moving average and range volatility on every accepted bar. Windows are
//! short (tens of entries), so plain recomputation is used instead of
//! running sums.

pub mod atr;
pub mod sma;
pub mod stats;
pub mod window;

pub use atr::average_range;
pub use sma::moving_average;
pub use stats::{correlation, covariance, downside_std_dev, mean, mean_abs, sample_std_dev};
pub use window::LookbackWindow;

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// The part of a bar the indicators look at.
///
/// Also used for synthetic instruments whose prices are derived from
/// several legs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl From<&Bar> for PriceSample {
    fn from(bar: &Bar) -> Self {
        Self { high: bar.high, low: bar.low, close: bar.close }
    }
}

/// Build samples from close prices for testing: high/low are close ± 1.
#[cfg(test)]
pub fn make_samples(closes: &[f64]) -> Vec<PriceSample> {
    closes.iter().map(|&close| PriceSample { high: close + 1.0, low: close - 1.0, close }).collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
