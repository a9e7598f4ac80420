//! PM Lab Runner: configuration, allocation policies, portfolio managers.
//!
//! This crate builds on `pmlab-core` to provide:
//! - TOML run configuration with fingerprinting
//! - Data loading from CSV directories or the synthetic generator
//! - Allocation policies (uniform, momentum, proportional, mean-variance, regime)
//! - Portfolio managers enforcing capital conservation
//! - End-of-run summaries and the competing-managers runner

pub mod allocation;
pub mod config;
pub mod data_loader;
pub mod macro_data;
pub mod manager;
pub mod runner;
pub mod summary;

pub use allocation::{build_policy, AllocationError, AllocationMap, AllocationPolicy, PerformanceSnapshot};
pub use config::{AllocationStyle, ConfigError, PortfolioLimits, RunConfig, StrategySpec};
pub use data_loader::{load_feed, LoadedData};
pub use macro_data::{IndicatorTable, MacroDataError};
pub use manager::{ManagerError, PortfolioManager};
pub use runner::{
    run_managers, run_portfolio, run_standalone, RunError, RunReport, SourceError, StandaloneResult,
    StandaloneSource,
};
pub use summary::{combined_pnl, DailyPnl, PortfolioSummary, StrategySummary};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn portfolio_manager_is_send() {
        // Competing managers each move onto a rayon worker.
        assert_send::<PortfolioManager>();
    }

    #[test]
    fn summaries_are_send_sync() {
        assert_send::<PortfolioSummary>();
        assert_sync::<PortfolioSummary>();
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<StandaloneResult>();
        assert_sync::<StandaloneResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<IndicatorTable>();
        assert_sync::<IndicatorTable>();
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
