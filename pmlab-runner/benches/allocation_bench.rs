//! Criterion benchmarks for the allocation hot paths.
//!
//! Benchmarks:
//! 1. Mean-variance frontier sweep and optimal weights
//! 2. One manager replaying a synthetic universe end to end

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pmlab_core::data::generate_synthetic_bars;
use pmlab_core::domain::ContractTable;
use pmlab_core::InMemoryFeed;
use pmlab_runner::allocation::{optimal_weights, SimplexProjectedGradient};
use pmlab_runner::runner::run_manager;
use pmlab_runner::{AllocationStyle, RunConfig};

// ── Helpers ──────────────────────────────────────────────────────────

/// Diagonally dominant covariance with mild cross terms.
fn covariance(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let cov = (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 + 0.1 * i as f64 } else { 0.05 }).collect())
        .collect();
    let expected = (0..n).map(|i| 0.01 * (i % 7) as f64 - 0.02).collect();
    (cov, expected)
}

fn synthetic_setup(bars: usize) -> (RunConfig, InMemoryFeed) {
    let mut config = RunConfig::default();
    config.data.synthetic = true;
    config.data.synthetic_bars = bars;
    let mut feed = InMemoryFeed::new();
    for symbol in config.symbols() {
        feed.insert(symbol.clone(), generate_synthetic_bars(&symbol, config.data.synthetic_start, bars));
    }
    (config, feed)
}

// ── 1. Solver ────────────────────────────────────────────────────────

fn bench_solver(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_variance");
    let solver = SimplexProjectedGradient::default();
    for &n in &[4, 16, 48] {
        let (cov, expected) = covariance(n);
        group.bench_with_input(BenchmarkId::new("optimal_weights", n), &n, |b, _| {
            b.iter(|| optimal_weights(&solver, black_box(&cov), black_box(&expected), 100));
        });
    }
    group.finish();
}

// ── 2. Manager replay ────────────────────────────────────────────────

fn bench_managers(c: &mut Criterion) {
    let mut group = c.benchmark_group("manager_replay");
    group.sample_size(10);
    let (config, feed) = synthetic_setup(504);
    let contracts = ContractTable::futures();
    for style in [AllocationStyle::Uniform, AllocationStyle::ProportionalSharpe, AllocationStyle::MeanVariance] {
        group.bench_function(style.name(), |b| {
            b.iter(|| run_manager(style, &config, &contracts, black_box(&feed), None).map(|s| s.events));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_solver, bench_managers);
criterion_main!(benches);
