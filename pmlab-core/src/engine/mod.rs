//! Simulation engine: the replay scheduler and the strategy state machine.
//!
//! The scheduler turns per-instrument series into one date-ordered event
//! stream. Each event is handed to the strategies trading that instrument;
//! a strategy waits until all of its legs sit on the same date, then runs
//! one step of its state machine.

pub mod performance;
pub mod scheduler;
pub mod strategy;

pub use performance::{PnlStatistics, StrategyMetrics, TRAILING_MONTH_DAYS};
pub use scheduler::{FeedCursor, ReplayEvent, ReplayScheduler};
pub use strategy::{trade_size, StrategyEngine, UpdateOutcome};
