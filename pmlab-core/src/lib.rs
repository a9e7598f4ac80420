//! PM Lab Core: domain types, price feeds, replay scheduler, strategy engine.
//!
//! This crate contains the deterministic simulation core:
//! - Domain types (bars, instruments, positions, trade records)
//! - Price feeds (CSV ingestion, date canonicalization, synthetic series)
//! - Replay scheduler merging per-instrument series into one event stream
//! - Rolling-window indicator math
//! - One strategy state machine shared by four signal families

pub mod data;
pub mod domain;
pub mod engine;
pub mod indicators;
pub mod signals;

pub use data::{InMemoryFeed, PriceFeed};
pub use domain::{Bar, ContractTable, Instrument, InstrumentLookup, Side, StrategyId, TradeRecord};
pub use engine::{ReplayEvent, ReplayScheduler, StrategyEngine, UpdateOutcome};
pub use signals::{StrategyFamily, StrategyParams};
