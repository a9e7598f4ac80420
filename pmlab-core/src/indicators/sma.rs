//! Simple moving average of closes over a window.

use super::PriceSample;

/// Mean close over `samples`; `None` for an empty window.
pub fn moving_average(samples: &[PriceSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().map(|s| s.close).sum::<f64>() / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_samples, DEFAULT_EPSILON};

    #[test]
    fn sma_basic() {
        let samples = make_samples(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_approx(moving_average(&samples).unwrap(), 12.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_empty_is_none() {
        assert!(moving_average(&[]).is_none());
    }
}
