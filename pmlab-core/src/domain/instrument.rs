//! Instrument metadata and the contract lookup table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Futures contract metadata: minimum price increment and dollar value of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: String,
    pub min_price_increment: f64,
    pub tick_value: f64,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, min_price_increment: f64, tick_value: f64) -> Self {
        Self { symbol: symbol.into(), min_price_increment, tick_value }
    }

    /// Convert a raw price into tick units.
    pub fn to_ticks(&self, price: f64) -> f64 {
        price / self.min_price_increment
    }

    /// Dollar value of a move expressed in ticks.
    pub fn ticks_to_dollars(&self, ticks: f64) -> f64 {
        ticks * self.tick_value
    }

    fn validate(&self) -> Result<(), InstrumentError> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        if !ok(self.min_price_increment) || !ok(self.tick_value) {
            return Err(InstrumentError::InvalidContract {
                symbol: self.symbol.clone(),
                min_price_increment: self.min_price_increment,
                tick_value: self.tick_value,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("unknown contract symbol: {0}")]
    UnknownSymbol(String),

    #[error("contract {symbol} has invalid metadata (increment {min_price_increment}, tick value {tick_value})")]
    InvalidContract { symbol: String, min_price_increment: f64, tick_value: f64 },
}

/// Read-only symbol → instrument lookup.
pub trait InstrumentLookup: Send + Sync {
    fn lookup(&self, symbol: &str) -> Result<Instrument, InstrumentError>;
}

/// In-memory contract table keyed by symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractTable {
    contracts: BTreeMap<String, Instrument>,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The CME futures the default universe trades.
    pub fn futures() -> Self {
        let mut table = Self::new();
        for (symbol, increment, tick_value) in [
            ("ES", 0.25, 12.5),
            ("NQ", 0.25, 5.0),
            ("CL", 0.01, 10.0),
            ("HO", 0.01, 4.2),
            ("6E", 0.00005, 6.25),
            ("6B", 0.01, 6.25),
            ("ZN", 1.0 / 64.0, 15.625),
            ("ZB", 1.0 / 32.0, 31.25),
            ("SI", 0.005, 25.0),
            ("GC", 0.1, 10.0),
            ("ZC", 0.25, 12.5),
            ("ZW", 0.25, 12.5),
        ] {
            table.contracts.insert(symbol.to_string(), Instrument::new(symbol, increment, tick_value));
        }
        table
    }

    /// Insert or replace a contract definition.
    pub fn insert(&mut self, instrument: Instrument) -> Result<(), InstrumentError> {
        instrument.validate()?;
        self.contracts.insert(instrument.symbol.clone(), instrument);
        Ok(())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.contracts.values()
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

impl InstrumentLookup for ContractTable {
    fn lookup(&self, symbol: &str) -> Result<Instrument, InstrumentError> {
        self.contracts
            .get(symbol)
            .cloned()
            .ok_or_else(|| InstrumentError::UnknownSymbol(symbol.to_string()))
    }
}
