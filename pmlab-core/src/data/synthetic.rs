//! Deterministic synthetic price series for demos, tests and benches.

use crate::domain::Bar;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate `count` weekday bars for `symbol` starting at `start`.
///
/// A random walk in tick units from 4000. The RNG is seeded from the
/// symbol's BLAKE3 hash, so every symbol gets a distinct but reproducible
/// path. Roughly one weekday in fifty is skipped as a holiday to give the
/// scheduler sparse calendars to merge.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, count: usize) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(count);
    let mut price = 4000.0_f64;
    let mut current = start;

    while bars.len() < count {
        let weekday = current.weekday();
        let holiday = rng.gen_bool(0.02);
        if weekday == Weekday::Sat || weekday == Weekday::Sun || holiday {
            current += Duration::days(1);
            continue;
        }

        let open = price;
        let close = (price + rng.gen_range(-40.0..40.0)).max(1.0);
        let high = open.max(close) + rng.gen_range(0.0..20.0);
        let low = (open.min(close) - rng.gen_range(0.0..20.0)).max(0.5);
        bars.push(Bar::new(symbol, current, open, high, low, close));

        price = close;
        current += Duration::days(1);
    }

    bars
}
