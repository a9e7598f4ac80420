//! Replay scheduler: merges per-instrument bar cursors into one
//! chronological event stream.
//!
//! Each instrument owns a cursor into its oldest-first bars. The scheduler
//! remembers the last delivered date and, on every call, hands out the first
//! cursor (in symbol order) whose next bar falls on or before that date. When
//! no cursor qualifies it rescans for the globally oldest pending date and
//! tries again. Dates therefore never go backwards, and instruments sharing a
//! date are delivered in lexicographic symbol order.

use crate::data::PriceFeed;
use crate::domain::Bar;
use chrono::NaiveDate;
use tracing::warn;

/// One delivered bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayEvent<'a> {
    pub symbol: &'a str,
    pub bar: &'a Bar,
}

impl ReplayEvent<'_> {
    pub fn date(&self) -> NaiveDate {
        self.bar.date
    }
}

/// Monotonically advancing position in one instrument's bars.
#[derive(Debug, Clone)]
pub struct FeedCursor<'a> {
    symbol: &'a str,
    bars: &'a [Bar],
    pos: usize,
}

impl<'a> FeedCursor<'a> {
    pub fn new(symbol: &'a str, bars: &'a [Bar]) -> Self {
        Self { symbol, bars, pos: 0 }
    }

    pub fn symbol(&self) -> &'a str {
        self.symbol
    }

    pub fn peek(&self) -> Option<&'a Bar> {
        self.bars.get(self.pos)
    }

    /// Advance and return the next bar; `None` once exhausted.
    pub fn next_tick(&mut self) -> Option<&'a Bar> {
        let bar = self.bars.get(self.pos)?;
        self.pos += 1;
        Some(bar)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.bars.len()
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }
}

/// Pull-based merge of instrument cursors. Also an [`Iterator`].
#[derive(Debug, Clone)]
pub struct ReplayScheduler<'a> {
    cursors: Vec<FeedCursor<'a>>,
    last_date: Option<NaiveDate>,
    emitted: usize,
}

impl<'a> ReplayScheduler<'a> {
    /// Replay every series of `feed`.
    pub fn new<F: PriceFeed + ?Sized>(feed: &'a F) -> Self {
        let symbols = feed.symbols();
        Self::for_symbols(feed, &symbols)
    }

    /// Replay only `symbols`; symbols the feed lacks are ignored.
    pub fn for_symbols<F: PriceFeed + ?Sized>(feed: &'a F, symbols: &[String]) -> Self {
        let mut series = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let Some(bars) = feed.bars(symbol) else { continue };
            // Borrow the symbol from the feed's own bars so cursors live as
            // long as the feed. Empty series never produce events.
            if let Some(first) = bars.first() {
                series.push((first.symbol.as_str(), bars));
            }
        }
        Self::from_series(series)
    }

    /// Build from explicit `(symbol, oldest-first bars)` pairs.
    pub fn from_series(series: impl IntoIterator<Item = (&'a str, &'a [Bar])>) -> Self {
        let mut cursors: Vec<FeedCursor<'a>> =
            series.into_iter().map(|(symbol, bars)| FeedCursor::new(symbol, bars)).collect();
        cursors.sort_by(|a, b| a.symbol.cmp(b.symbol));
        Self { cursors, last_date: None, emitted: 0 }
    }

    /// Next event in date order, or `None` once every cursor is exhausted.
    pub fn next_event(&mut self) -> Option<ReplayEvent<'a>> {
        loop {
            self.skip_stale();

            let candidate = match self.last_date {
                Some(date) => date,
                None => self.oldest_pending()?,
            };

            for cursor in &mut self.cursors {
                if cursor.peek().is_some_and(|bar| bar.date <= candidate) {
                    let bar = cursor.next_tick()?;
                    self.last_date = Some(bar.date);
                    self.emitted += 1;
                    return Some(ReplayEvent { symbol: cursor.symbol, bar });
                }
            }

            // Nothing left on the running date: move to the oldest pending one.
            self.last_date = Some(self.oldest_pending()?);
        }
    }

    /// Rewind every cursor to the start of its series.
    pub fn reset(&mut self) {
        for cursor in &mut self.cursors {
            cursor.rewind();
        }
        self.last_date = None;
        self.emitted = 0;
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.cursors.iter().map(|c| c.symbol)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursors.iter().all(FeedCursor::is_exhausted)
    }

    fn oldest_pending(&self) -> Option<NaiveDate> {
        self.cursors.iter().filter_map(|c| c.peek().map(|b| b.date)).min()
    }

    /// Bars older than what was already delivered would break monotonicity.
    fn skip_stale(&mut self) {
        let Some(last) = self.last_date else { return };
        for cursor in &mut self.cursors {
            while let Some(bar) = cursor.peek().filter(|b| b.date < last) {
                warn!(symbol = cursor.symbol, date = %bar.date, last = %last, "skipping out-of-order bar");
                cursor.next_tick();
            }
        }
    }
}

impl<'a> Iterator for ReplayScheduler<'a> {
    type Item = ReplayEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event()
    }
}
