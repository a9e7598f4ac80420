use serde::{Deserialize, Serialize};

/// Closing quote of one leg of a multi-leg strategy, with the weight that
/// maps one unit of the traded spread onto that leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegQuote {
    pub close: f64,
    pub tick_value: f64,
    /// Signed leg quantity per unit of spread (long spread => +weight).
    pub weight: f64,
}

/// Quantity held in one leg, with its own entry price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegPosition {
    pub quantity: f64,
    pub vwap: f64,
    pub tick_value: f64,
}

impl LegPosition {
    pub fn unrealized_pnl(&self, close: f64) -> f64 {
        self.quantity * (close - self.vwap) * self.tick_value
    }
}

/// Position in the traded instrument (or synthetic spread).
///
/// `size` is signed: positive long, negative short, zero flat. Two-leg
/// strategies also carry per-leg holdings; PnL is then marked leg by leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub size: i64,
    pub vwap: f64,
    pub legs: Vec<LegPosition>,
    pub realized_pnl: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size == 0
    }

    pub fn is_long(&self) -> bool {
        self.size > 0
    }

    pub fn is_short(&self) -> bool {
        self.size < 0
    }

    /// Open a position at `price`, splitting it across legs when quotes are given.
    pub fn open(&mut self, size: i64, price: f64, legs: &[LegQuote]) {
        self.size = size;
        self.vwap = price;
        self.legs = legs
            .iter()
            .map(|q| LegPosition { quantity: size as f64 * q.weight, vwap: q.close, tick_value: q.tick_value })
            .collect();
    }

    /// Close out without touching realized PnL.
    pub fn flatten(&mut self) {
        self.size = 0;
        self.vwap = 0.0;
        self.legs.clear();
    }

    /// Worst move against the position during the bar, in ticks.
    pub fn adverse_excursion(&self, high: f64, low: f64) -> f64 {
        if self.is_long() {
            self.vwap - low
        } else if self.is_short() {
            high - self.vwap
        } else {
            0.0
        }
    }

    /// Mark-to-market PnL at `close`.
    ///
    /// Single-leg positions use `tick_value` of the traded instrument; multi-leg
    /// positions sum the legs against `leg_closes`.
    pub fn unrealized_pnl(&self, close: f64, tick_value: f64, leg_closes: &[f64]) -> f64 {
        if self.legs.is_empty() {
            self.size as f64 * (close - self.vwap) * tick_value
        } else {
            self.legs.iter().zip(leg_closes).map(|(leg, &c)| leg.unrealized_pnl(c)).sum()
        }
    }
}
