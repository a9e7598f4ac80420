//! Sparse linear regression for the regime policy.

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegressionError {
    #[error("no training rows")]
    Empty,

    #[error("row {row} has {got} features, expected {expected}")]
    Dimension { row: usize, expected: usize, got: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Fitted `y = intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.intercept + self.coefficients.iter().zip(features).map(|(c, x)| c * x).sum::<f64>()
    }
}

pub trait Regressor: Send + Sync + Debug {
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<LinearModel, RegressionError>;
}

/// Coordinate-descent lasso with an unpenalized intercept.
///
/// Minimizes `1/(2n)·‖y − Xw − b‖² + α·‖w‖₁`.
#[derive(Debug, Clone, Copy)]
pub struct LassoRegressor {
    pub alpha: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl LassoRegressor {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, max_iterations: 1_000, tolerance: 1e-4 }
    }
}

impl Default for LassoRegressor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Regressor for LassoRegressor {
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<LinearModel, RegressionError> {
        let n = y.len();
        if n == 0 || x.len() != n {
            return Err(RegressionError::Empty);
        }
        let p = x[0].len();
        for (row, features) in x.iter().enumerate() {
            if features.len() != p {
                return Err(RegressionError::Dimension { row, expected: p, got: features.len() });
            }
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(RegressionError::NonFinite("training data"));
        }

        let nf = n as f64;
        let x_mean: Vec<f64> = (0..p).map(|j| x.iter().map(|r| r[j]).sum::<f64>() / nf).collect();
        let y_mean = y.iter().sum::<f64>() / nf;

        // Centered columns, so the intercept drops out of the descent.
        let cols: Vec<Vec<f64>> = (0..p).map(|j| x.iter().map(|r| r[j] - x_mean[j]).collect()).collect();
        let norms: Vec<f64> = cols.iter().map(|c| c.iter().map(|v| v * v).sum::<f64>() / nf).collect();
        let mut residual: Vec<f64> = y.iter().map(|v| v - y_mean).collect();
        let mut w = vec![0.0; p];

        for _ in 0..self.max_iterations {
            let mut max_step = 0.0_f64;
            let mut max_weight = 0.0_f64;
            for j in 0..p {
                if norms[j] == 0.0 {
                    continue;
                }
                let old = w[j];
                let rho = cols[j].iter().zip(&residual).map(|(c, r)| c * (r + c * old)).sum::<f64>() / nf;
                let new = soft_threshold(rho, self.alpha) / norms[j];
                if new != old {
                    for (r, c) in residual.iter_mut().zip(&cols[j]) {
                        *r -= c * (new - old);
                    }
                    w[j] = new;
                }
                max_step = max_step.max((new - old).abs());
                max_weight = max_weight.max(new.abs());
            }
            if max_step <= self.tolerance * max_weight.max(1e-12) || max_step == 0.0 {
                break;
            }
        }

        let intercept = y_mean - w.iter().zip(&x_mean).map(|(wj, m)| wj * m).sum::<f64>();
        if !intercept.is_finite() || w.iter().any(|v| !v.is_finite()) {
            return Err(RegressionError::NonFinite("coefficients"));
        }
        Ok(LinearModel { intercept, coefficients: w })
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}
