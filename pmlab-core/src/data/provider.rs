//! PriceFeed trait, the materialized in-memory feed, and feed errors.

use crate::domain::{Bar, DatasetHash, InstrumentError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for feed loading.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no market data file for '{symbol}' at {path}")]
    MissingFile { symbol: String, path: PathBuf },

    #[error("no usable bars for '{symbol}'")]
    Empty { symbol: String },

    #[error(transparent)]
    Instrument(#[from] InstrumentError),
}

/// Source of per-instrument daily bars, oldest first.
///
/// Feeds are fully materialized before a replay starts; the scheduler only
/// borrows the slices.
pub trait PriceFeed: Send + Sync {
    /// Symbols this feed can serve, in lexicographic order.
    fn symbols(&self) -> Vec<String>;

    /// Oldest-first bars for `symbol`, or `None` if the feed has no such series.
    fn bars(&self, symbol: &str) -> Option<&[Bar]>;
}

/// Feed backed by in-memory series keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeed {
    series: BTreeMap<String, Vec<Bar>>,
}

impl InMemoryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a series.
    ///
    /// Bars are stamped with `symbol` and stably sorted by date, so every
    /// cursor over this feed is monotone.
    pub fn insert(&mut self, symbol: impl Into<String>, mut bars: Vec<Bar>) {
        let symbol = symbol.into();
        for bar in &mut bars {
            if bar.symbol != symbol {
                bar.symbol = symbol.clone();
            }
        }
        bars.sort_by_key(|b| b.date);
        self.series.insert(symbol, bars);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn total_bars(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// Copy of this feed restricted to `symbols`. Unknown symbols are ignored.
    pub fn restrict(&self, symbols: &[String]) -> Self {
        let series = self
            .series
            .iter()
            .filter(|(s, _)| symbols.contains(s))
            .map(|(s, b)| (s.clone(), b.clone()))
            .collect();
        Self { series }
    }

    /// BLAKE3 over every bar, in symbol order.
    pub fn dataset_hash(&self) -> DatasetHash {
        let mut hasher = blake3::Hasher::new();
        for (symbol, bars) in &self.series {
            hasher.update(symbol.as_bytes());
            for bar in bars {
                hasher.update(bar.date.to_string().as_bytes());
                hasher.update(&bar.open.to_le_bytes());
                hasher.update(&bar.high.to_le_bytes());
                hasher.update(&bar.low.to_le_bytes());
                hasher.update(&bar.close.to_le_bytes());
            }
        }
        DatasetHash(hasher.finalize().to_hex().to_string())
    }
}

impl PriceFeed for InMemoryFeed {
    fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn bars(&self, symbol: &str) -> Option<&[Bar]> {
        self.series.get(symbol).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(day: u32, close: f64) -> Bar {
        Bar::new("", NaiveDate::from_ymd_opt(2014, 1, day).unwrap(), close, close + 1.0, close - 1.0, close)
    }

    #[test]
    fn insert_sorts_and_stamps_symbol() {
        let mut feed = InMemoryFeed::new();
        feed.insert("ES", vec![bar(3, 3.0), bar(1, 1.0), bar(2, 2.0)]);
        let bars = feed.bars("ES").unwrap();
        assert_eq!(bars.iter().map(|b| b.close).collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert!(bars.iter().all(|b| b.symbol == "ES"));
        assert!(feed.bars("NQ").is_none());
    }

    #[test]
    fn dataset_hash_is_content_addressed() {
        let mut a = InMemoryFeed::new();
        a.insert("ES", vec![bar(1, 1.0)]);
        a.insert("NQ", vec![bar(1, 5.0)]);
        let mut b = InMemoryFeed::new();
        b.insert("NQ", vec![bar(1, 5.0)]);
        b.insert("ES", vec![bar(1, 1.0)]);
        assert_eq!(a.dataset_hash(), b.dataset_hash());

        b.insert("ES", vec![bar(1, 1.5)]);
        assert_ne!(a.dataset_hash(), b.dataset_hash());
    }

    #[test]
    fn restrict_keeps_requested_symbols() {
        let mut feed = InMemoryFeed::new();
        feed.insert("ES", vec![bar(1, 1.0)]);
        feed.insert("NQ", vec![bar(1, 1.0)]);
        let only = feed.restrict(&["NQ".to_string(), "ZZ".to_string()]);
        assert_eq!(only.symbols(), vec!["NQ".to_string()]);
        assert_eq!(only.total_bars(), 1);
    }
}
