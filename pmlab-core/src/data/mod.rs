//! Price feeds: date canonicalization, CSV ingestion, synthetic series.

pub mod csv_feed;
pub mod dates;
pub mod provider;
pub mod synthetic;

pub use csv_feed::{load_csv_file, load_directory, parse_bars, parse_price};
pub use dates::{days_between, parse_date, DateError, WEEKEND_ADJUSTMENT_DAYS};
pub use provider::{FeedError, InMemoryFeed, PriceFeed};
pub use synthetic::generate_synthetic_bars;
