//! Calendar handling.
//!
//! Vendor files mix `yyyy-mm-dd` and `mm-dd-yy`. Both are accepted here and
//! turned into a `NaiveDate` immediately; nothing downstream sees strings.

use chrono::NaiveDate;
use thiserror::Error;

/// Days subtracted from every calendar-day difference when measuring the
/// recalibration period.
pub const WEEKEND_ADJUSTMENT_DAYS: i64 = 8;

#[derive(Debug, Error, PartialEq)]
pub enum DateError {
    #[error("unrecognized date '{0}' (expected yyyy-mm-dd or mm-dd-yy)")]
    Unrecognized(String),
}

/// Parse either supported layout into a canonical date.
///
/// The layout is picked by the width of the first component, so `01-02-14`
/// can never be misread as year 1.
pub fn parse_date(raw: &str) -> Result<NaiveDate, DateError> {
    let s = raw.trim();
    let first = s.split('-').next().unwrap_or_default();
    let format = match first.len() {
        4 => "%Y-%m-%d",
        1 | 2 => "%m-%d-%y",
        _ => return Err(DateError::Unrecognized(raw.to_string())),
    };
    NaiveDate::parse_from_str(s, format).map_err(|_| DateError::Unrecognized(raw.to_string()))
}

/// Absolute day distance between two dates, less `weekend_adjustment`.
pub fn days_between(from: NaiveDate, to: NaiveDate, weekend_adjustment: i64) -> i64 {
    (to - from).num_days().abs() - weekend_adjustment
}
