//! Criterion benchmarks for the simulation hot paths.
//!
//! Benchmarks:
//! 1. Replay scheduler merge over many sparse series
//! 2. Strategy engine throughput per family (scheduler + state machine)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pmlab_core::data::{generate_synthetic_bars, InMemoryFeed};
use pmlab_core::domain::{ContractTable, InstrumentLookup};
use pmlab_core::engine::{ReplayScheduler, StrategyEngine};
use pmlab_core::signals::{StrategyFamily, StrategyParams};

// ── Helpers ──────────────────────────────────────────────────────────

const SYMBOLS: [&str; 12] = ["6B", "6E", "CL", "ES", "GC", "HO", "NQ", "SI", "ZB", "ZC", "ZN", "ZW"];

fn make_feed(bars: usize) -> InMemoryFeed {
    let start = chrono::NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
    let mut feed = InMemoryFeed::new();
    for s in SYMBOLS {
        feed.insert(s, generate_synthetic_bars(s, start, bars));
    }
    feed
}

// ── 1. Scheduler ─────────────────────────────────────────────────────

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay_scheduler");
    for &bars in &[252, 1260, 2520] {
        let feed = make_feed(bars);
        group.bench_with_input(BenchmarkId::new("12_symbols", bars), &bars, |b, _| {
            b.iter(|| ReplayScheduler::new(black_box(&feed)).count());
        });
    }
    group.finish();
}

// ── 2. Strategy engine ───────────────────────────────────────────────

fn bench_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_engine");
    let feed = make_feed(2520);
    let contracts = ContractTable::futures();

    for family in StrategyFamily::ALL {
        let legs: Vec<_> = if family.leg_count() == 1 { vec!["ES"] } else { vec!["ES", "NQ"] };
        let instruments: Vec<_> = legs.iter().map(|s| contracts.lookup(s).unwrap()).collect();
        let symbols: Vec<String> = legs.iter().map(|s| s.to_string()).collect();

        group.bench_function(family.name(), |b| {
            b.iter(|| {
                let mut engine =
                    StrategyEngine::new(family, StrategyParams::for_family(family), instruments.clone()).unwrap();
                for event in ReplayScheduler::for_symbols(&feed, &symbols) {
                    engine.on_bar(event.bar, black_box(10_000.0));
                }
                engine.trades().len()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scheduler, bench_strategies);
criterion_main!(benches);
