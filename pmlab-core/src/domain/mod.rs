//! Domain types for the portfolio lab

pub mod bar;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use ids::{DatasetHash, StrategyId};
pub use instrument::{ContractTable, Instrument, InstrumentError, InstrumentLookup};
pub use position::{LegPosition, LegQuote, Position};
pub use trade::{Side, TradeRecord};

/// Symbol type alias
pub type Symbol = String;
