//! Bar: the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily OHLC bar for a single symbol.
///
/// Prices are in tick units (raw price divided by the instrument's minimum
/// price increment), so arithmetic across instruments never mixes currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self { symbol: symbol.into(), date, open, high, low, close }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite())
    }

    /// A bar the strategy engine will accept: finite prices and high >= low.
    ///
    /// Close is not required to sit inside the range; vendor files carry a
    /// handful of such rows and dropping them would open calendar gaps.
    pub fn is_sane(&self) -> bool {
        !self.is_void() && self.high >= self.low
    }

    /// High minus low, the per-bar volatility sample.
    pub fn range(&self) -> f64 {
        (self.high - self.low).abs()
    }
}
