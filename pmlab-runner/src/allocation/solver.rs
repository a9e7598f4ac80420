//! Long-only mean-variance solver and the efficient-frontier pick.
//!
//! The quadratic program is
//!
//! ```text
//! minimize    ½·μ·wᵀΣw − pᵀw
//! subject to  w ≥ 0, Σw = 1
//! ```
//!
//! `SimplexProjectedGradient` solves it with accelerated projected gradient
//! steps onto the probability simplex. `optimal_weights` sweeps μ over a
//! log-spaced grid, fits `risk ≈ c2·r² + c1·r + c0` to the traced frontier
//! and re-solves at the curvature-implied `μ* = sqrt(c0 / c2)`.

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SolverError {
    #[error("empty problem")]
    Empty,

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("non-finite {0}")]
    NonFinite(&'static str),

    #[error("singular least-squares system")]
    Singular,
}

/// Solves the long-only mean-variance program for one risk aversion.
pub trait QuadraticSolver: Send + Sync + Debug {
    fn solve(&self, covariance: &[Vec<f64>], expected: &[f64], risk_aversion: f64) -> Result<Vec<f64>, SolverError>;
}

/// FISTA-style projected gradient over the probability simplex.
#[derive(Debug, Clone, Copy)]
pub struct SimplexProjectedGradient {
    pub max_iterations: usize,
    /// Stop when no weight moves by more than this in one step.
    pub tolerance: f64,
}

impl Default for SimplexProjectedGradient {
    fn default() -> Self {
        Self { max_iterations: 2_000, tolerance: 1e-10 }
    }
}

impl QuadraticSolver for SimplexProjectedGradient {
    fn solve(&self, covariance: &[Vec<f64>], expected: &[f64], risk_aversion: f64) -> Result<Vec<f64>, SolverError> {
        let n = expected.len();
        validate(covariance, expected)?;
        if !risk_aversion.is_finite() || risk_aversion < 0.0 {
            return Err(SolverError::NonFinite("risk aversion"));
        }

        // Gershgorin bound on the largest eigenvalue of μΣ.
        let lipschitz = risk_aversion
            * covariance.iter().map(|row| row.iter().map(|v| v.abs()).sum::<f64>()).fold(0.0, f64::max);
        if lipschitz <= f64::EPSILON {
            // Linear objective: all weight on the best expected return.
            let best = argmax(expected);
            return Ok((0..n).map(|i| if i == best { 1.0 } else { 0.0 }).collect());
        }
        let step = 1.0 / lipschitz;

        let mut x = vec![1.0 / n as f64; n];
        let mut y = x.clone();
        let mut t = 1.0_f64;
        for _ in 0..self.max_iterations {
            let moved: Vec<f64> = (0..n)
                .map(|i| {
                    let sigma_y: f64 = covariance[i].iter().zip(&y).map(|(c, w)| c * w).sum();
                    y[i] - step * (risk_aversion * sigma_y - expected[i])
                })
                .collect();
            let next = project_to_simplex(&moved);
            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let momentum = (t - 1.0) / t_next;
            let delta = next.iter().zip(&x).map(|(a, b)| (a - b).abs()).fold(0.0, f64::max);
            y = next.iter().zip(&x).map(|(a, b)| a + momentum * (a - b)).collect();
            x = next;
            t = t_next;
            if delta < self.tolerance {
                break;
            }
        }

        if x.iter().any(|w| !w.is_finite()) {
            return Err(SolverError::NonFinite("weights"));
        }
        Ok(x)
    }
}

/// Euclidean projection onto `{w ≥ 0, Σw = 1}`.
pub fn project_to_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }
    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// One point on the traced frontier.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierPoint {
    pub risk_aversion: f64,
    pub expected_return: f64,
    pub risk: f64,
    pub weights: Vec<f64>,
}

/// Solve across `μ = 10^(5t/points − 1)` for `t` in `0..points`.
pub fn efficient_frontier(
    solver: &dyn QuadraticSolver,
    covariance: &[Vec<f64>],
    expected: &[f64],
    points: usize,
) -> Result<Vec<FrontierPoint>, SolverError> {
    (0..points)
        .map(|t| -> Result<FrontierPoint, SolverError> {
            let mu = 10f64.powf(5.0 * t as f64 / points as f64 - 1.0);
            let weights = solver.solve(covariance, expected, mu)?;
            Ok(FrontierPoint {
                risk_aversion: mu,
                expected_return: dot(expected, &weights),
                risk: quadratic_form(covariance, &weights).max(0.0).sqrt(),
                weights,
            })
        })
        .collect()
}

/// Weights at the risk aversion implied by the frontier's curvature.
pub fn optimal_weights(
    solver: &dyn QuadraticSolver,
    covariance: &[Vec<f64>],
    expected: &[f64],
    points: usize,
) -> Result<Vec<f64>, SolverError> {
    validate(covariance, expected)?;
    if expected.len() == 1 {
        return Ok(vec![1.0]);
    }
    let frontier = efficient_frontier(solver, covariance, expected, points)?;
    let returns: Vec<f64> = frontier.iter().map(|p| p.expected_return).collect();
    let risks: Vec<f64> = frontier.iter().map(|p| p.risk).collect();
    let [c2, _, c0] = polyfit2(&returns, &risks)?;
    let mu = (c0 / c2).sqrt();
    if !mu.is_finite() {
        return Err(SolverError::NonFinite("risk aversion"));
    }
    solver.solve(covariance, expected, mu)
}

/// Least-squares fit `y ≈ c2·x² + c1·x + c0`, returned as `[c2, c1, c0]`.
///
/// `x` is standardized before solving the normal equations and the
/// coefficients are mapped back.
pub fn polyfit2(x: &[f64], y: &[f64]) -> Result<[f64; 3], SolverError> {
    if x.len() != y.len() {
        return Err(SolverError::Dimension(format!("{} x values, {} y values", x.len(), y.len())));
    }
    if x.len() < 3 {
        return Err(SolverError::Singular);
    }
    if x.iter().chain(y).any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite("fit input"));
    }
    let n = x.len() as f64;
    let m = x.iter().sum::<f64>() / n;
    let s = (x.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt();
    if s <= f64::EPSILON * m.abs().max(1.0) {
        return Err(SolverError::Singular);
    }

    let mut moments = [0.0; 5];
    let mut rhs = [0.0; 3];
    for (xi, yi) in x.iter().zip(y) {
        let z = (xi - m) / s;
        let mut p = 1.0;
        for (k, moment) in moments.iter_mut().enumerate() {
            *moment += p;
            if k < 3 {
                rhs[k] += p * yi;
            }
            p *= z;
        }
    }
    // Unknowns ordered [c, b, a] for y = a·z² + b·z + c.
    let system = vec![
        vec![moments[0], moments[1], moments[2]],
        vec![moments[1], moments[2], moments[3]],
        vec![moments[2], moments[3], moments[4]],
    ];
    let coef = solve_linear(system, rhs.to_vec()).ok_or(SolverError::Singular)?;
    let (c, b, a) = (coef[0], coef[1], coef[2]);

    let c2 = a / (s * s);
    let c1 = b / s - 2.0 * a * m / (s * s);
    let c0 = a * m * m / (s * s) - b * m / s + c;
    Ok([c2, c1, c0])
}

/// Gaussian elimination with partial pivoting. `None` when singular.
pub(crate) fn solve_linear(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = a.iter().flatten().map(|v| v.abs()).fold(0.0, f64::max);
    if scale == 0.0 {
        return None;
    }
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() <= 1e-12 * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn validate(covariance: &[Vec<f64>], expected: &[f64]) -> Result<(), SolverError> {
    let n = expected.len();
    if n == 0 {
        return Err(SolverError::Empty);
    }
    if covariance.len() != n || covariance.iter().any(|row| row.len() != n) {
        return Err(SolverError::Dimension(format!("covariance is not {n}x{n}")));
    }
    if expected.iter().chain(covariance.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(SolverError::NonFinite("problem data"));
    }
    Ok(())
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn quadratic_form(matrix: &[Vec<f64>], w: &[f64]) -> f64 {
    matrix.iter().zip(w).map(|(row, wi)| wi * dot(row, w)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_simplex(w: &[f64]) {
        assert!(w.iter().all(|v| *v >= 0.0));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn projection_lands_on_simplex() {
        let w = project_to_simplex(&[0.5, 2.0, -1.0]);
        assert_simplex(&w);
        assert_eq!(w, vec![0.0, 1.0, 0.0]);
        let w = project_to_simplex(&[0.2, 0.3, 0.5]);
        assert!((w[0] - 0.2).abs() < 1e-12 && (w[2] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn minimum_variance_for_independent_assets() {
        // Equal returns: the optimum is inverse-variance weighting.
        let cov = vec![vec![1.0, 0.0], vec![0.0, 4.0]];
        let w = SimplexProjectedGradient::default().solve(&cov, &[0.0, 0.0], 1.0).unwrap();
        assert_simplex(&w);
        assert!((w[0] - 0.8).abs() < 1e-6, "{w:?}");
    }

    #[test]
    fn low_risk_aversion_chases_return() {
        let cov = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let w = SimplexProjectedGradient::default().solve(&cov, &[1.0, 5.0], 0.1).unwrap();
        assert!((w[1] - 1.0).abs() < 1e-9);
        // Zero covariance is a linear program.
        let zero = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        assert_eq!(SimplexProjectedGradient::default().solve(&zero, &[1.0, 5.0], 1.0).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn polyfit_recovers_exact_parabola() {
        let x: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v * v - 3.0 * v + 7.0).collect();
        let [c2, c1, c0] = polyfit2(&x, &y).unwrap();
        assert!((c2 - 2.0).abs() < 1e-6);
        assert!((c1 + 3.0).abs() < 1e-3);
        assert!((c0 - 7.0).abs() < 1e-1);
    }

    #[test]
    fn polyfit_rejects_degenerate_input() {
        assert_eq!(polyfit2(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), Err(SolverError::Singular));
        assert_eq!(polyfit2(&[1.0, 2.0], &[1.0, 2.0]), Err(SolverError::Singular));
        assert!(matches!(polyfit2(&[1.0], &[1.0, 2.0]), Err(SolverError::Dimension(_))));
    }

    #[test]
    fn optimal_weights_stay_on_simplex() {
        let cov = vec![
            vec![4.0, 1.0, 0.5],
            vec![1.0, 2.0, 0.3],
            vec![0.5, 0.3, 1.0],
        ];
        let expected = [1.0, 0.6, 0.2];
        match optimal_weights(&SimplexProjectedGradient::default(), &cov, &expected, 100) {
            Ok(w) => assert_simplex(&w),
            Err(e) => assert!(matches!(e, SolverError::NonFinite(_) | SolverError::Singular)),
        }
        assert_eq!(optimal_weights(&SimplexProjectedGradient::default(), &[vec![2.0]], &[1.0], 100).unwrap(), vec![1.0]);
    }

    #[test]
    fn rejects_mismatched_problem() {
        let solver = SimplexProjectedGradient::default();
        assert_eq!(solver.solve(&[], &[], 1.0), Err(SolverError::Empty));
        assert!(matches!(solver.solve(&[vec![1.0]], &[1.0, 2.0], 1.0), Err(SolverError::Dimension(_))));
        assert_eq!(solver.solve(&[vec![f64::NAN]], &[1.0], 1.0), Err(SolverError::NonFinite("problem data")));
    }
}
