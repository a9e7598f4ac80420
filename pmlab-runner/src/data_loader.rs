//! Bar loading for the runner.
//!
//! Given the symbols a run needs, materializes an `InMemoryFeed` either from
//! the CSV market-data directory or, with `synthetic = true`, from the
//! deterministic random-walk generator. Synthetic runs are tagged so their
//! results are never mistaken for real ones.

use crate::config::DataConfig;
use pmlab_core::data::{generate_synthetic_bars, load_directory, FeedError, InMemoryFeed};
use pmlab_core::domain::{DatasetHash, InstrumentLookup};
use tracing::{info, warn};

/// A materialized feed with provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub feed: InMemoryFeed,
    /// BLAKE3 over all bar data, for fingerprinting.
    pub dataset_hash: DatasetHash,
    pub has_synthetic: bool,
}

/// Load bars for `symbols` according to `config`.
pub fn load_feed(
    config: &DataConfig,
    symbols: &[String],
    contracts: &dyn InstrumentLookup,
) -> Result<LoadedData, FeedError> {
    let feed = if config.synthetic {
        warn!(symbols = symbols.len(), "generating synthetic data; results are tagged as synthetic");
        synthetic_feed(symbols, config)
    } else {
        load_directory(&config.market_data_dir, &config.file_pattern, symbols, contracts)?
    };
    let dataset_hash = feed.dataset_hash();
    info!(
        symbols = feed.len(),
        bars = feed.total_bars(),
        dataset = %dataset_hash,
        synthetic = config.synthetic,
        "market data loaded"
    );
    Ok(LoadedData { feed, dataset_hash, has_synthetic: config.synthetic })
}

/// One synthetic series per symbol, all from the configured start date.
pub fn synthetic_feed(symbols: &[String], config: &DataConfig) -> InMemoryFeed {
    let mut feed = InMemoryFeed::new();
    for symbol in symbols {
        feed.insert(symbol.clone(), generate_synthetic_bars(symbol, config.synthetic_start, config.synthetic_bars));
    }
    feed
}
