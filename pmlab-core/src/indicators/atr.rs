//! Range volatility.
//!
//! Mean of high − low over the window: the true-range style estimate the
//! strategies scale their entry and stop thresholds by. Previous-close gaps
//! are deliberately ignored.

use super::PriceSample;

/// Mean absolute high-low range; `None` for an empty window.
pub fn average_range(samples: &[PriceSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|s| (s.high - s.low).abs()).sum::<f64>() / samples.len() as f64)
}
