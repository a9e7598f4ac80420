use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Trade direction of a record. `None` marks a no-op day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
    None,
}

impl Side {
    pub fn is_trade(self) -> bool {
        !matches!(self, Side::None)
    }
}

/// One entry of a strategy's append-only log.
///
/// A record is written for every event that reaches a warmed-up strategy,
/// trade or not. `pnl` is realized PnL after the event, plus unrealized PnL
/// on no-op days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub side: Side,
    pub size: i64,
    pub price: f64,
    pub position: i64,
    pub pnl: f64,
    pub volatility: f64,
    pub moving_average: f64,
    pub deviation: f64,
    pub high: f64,
    pub low: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projected_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<f64>,
}
