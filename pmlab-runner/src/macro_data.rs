//! Macro indicator table for the regime policy.
//!
//! Each indicator is a `Date,Value` CSV. Columns are merged on the union of
//! their dates and forward-filled. Columns missing too many dates are
//! dropped. What remains is expressed as a clamped relative deviation from
//! its own trailing mean.

use chrono::NaiveDate;
use pmlab_core::data::{parse_date, DateError};
use pmlab_core::indicators::mean;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Deviations are clamped to `[-CLAMP, CLAMP]`.
const CLAMP: f64 = 2.0;

#[derive(Debug, Error)]
pub enum MacroDataError {
    #[error("cannot read indicator data {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} has no Date/Value header")]
    MissingHeader { path: PathBuf },

    #[error(transparent)]
    Date(#[from] DateError),
}

/// Transformed indicator values, one row per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorTable {
    names: Vec<String>,
    dates: Vec<NaiveDate>,
    rows: Vec<Vec<Option<f64>>>,
}

impl IndicatorTable {
    /// Load every `*.csv` in `dir`, in file-name order.
    pub fn load_dir(dir: &Path, window: usize, max_missing_fraction: f64) -> Result<Self, MacroDataError> {
        let entries = std::fs::read_dir(dir).map_err(|source| MacroDataError::Io { path: dir.to_path_buf(), source })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
            .collect();
        paths.sort();

        let mut columns = Vec::with_capacity(paths.len());
        for path in &paths {
            let name = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
            columns.push((name, read_indicator_csv(path)?));
        }
        let table = Self::from_columns(columns, window, max_missing_fraction);
        info!(dir = %dir.display(), files = paths.len(), kept = table.names.len(), dates = table.dates.len(), "loaded macro indicators");
        Ok(table)
    }

    /// Merge raw `(date, value)` columns into a transformed table.
    pub fn from_columns(columns: Vec<(String, Vec<(NaiveDate, f64)>)>, window: usize, max_missing_fraction: f64) -> Self {
        let dates: Vec<NaiveDate> =
            columns.iter().flat_map(|(_, obs)| obs.iter().map(|(d, _)| *d)).collect::<BTreeSet<_>>().into_iter().collect();
        if dates.is_empty() {
            return Self::default();
        }

        let mut names = Vec::new();
        let mut kept: Vec<Vec<Option<f64>>> = Vec::new();
        for (name, observations) in columns {
            let by_date: BTreeMap<NaiveDate, f64> = observations.into_iter().collect();
            let mut last = None;
            let filled: Vec<Option<f64>> = dates
                .iter()
                .map(|d| {
                    if let Some(v) = by_date.get(d) {
                        last = Some(*v);
                    }
                    last
                })
                .collect();
            let missing = filled.iter().filter(|v| v.is_none()).count() as f64 / dates.len() as f64;
            if missing > max_missing_fraction {
                debug!(indicator = %name, missing, "indicator dropped");
                continue;
            }
            names.push(name);
            kept.push(relative_deviation(&filled, window));
        }

        let rows = (0..dates.len()).map(|i| kept.iter().map(|col| col[i]).collect()).collect();
        Self { names, dates, rows }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty() || self.dates.is_empty()
    }

    /// Latest row dated on or before `date`.
    pub fn as_of(&self, date: NaiveDate) -> Option<&[Option<f64>]> {
        let idx = self.dates.partition_point(|d| *d <= date);
        idx.checked_sub(1).map(|i| self.rows[i].as_slice())
    }
}

/// `clamp((v − mean)/mean, −2, 2)` against the mean of up to `window`
/// previous values. The first observation only seeds the mean.
fn relative_deviation(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let mut history: VecDeque<f64> = VecDeque::with_capacity(window + 1);
    values
        .iter()
        .map(|v| {
            let v = (*v)?;
            let reference = mean(history.make_contiguous());
            history.push_back(v);
            while history.len() > window.max(1) {
                history.pop_front();
            }
            let m = reference?;
            (m != 0.0).then(|| ((v - m) / m).clamp(-CLAMP, CLAMP))
        })
        .collect()
}

/// Read one indicator file: locate the `Date` and `Value` columns, then
/// collect every row with both fields present.
fn read_indicator_csv(path: &Path) -> Result<Vec<(NaiveDate, f64)>, MacroDataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| MacroDataError::Csv { path: path.to_path_buf(), source })?;

    let mut columns: Option<(usize, usize)> = None;
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| MacroDataError::Csv { path: path.to_path_buf(), source })?;
        let Some((date_idx, value_idx)) = columns else {
            let date_idx = record.iter().position(|f| f == "Date");
            let value_idx = record.iter().position(|f| f == "Value");
            if let (Some(d), Some(v)) = (date_idx, value_idx) {
                columns = Some((d, v));
            }
            continue;
        };
        let (Some(date), Some(value)) = (record.get(date_idx), record.get(value_idx)) else {
            continue;
        };
        if date.is_empty() || value.is_empty() {
            continue;
        }
        let Ok(value) = value.parse::<f64>() else {
            warn!(path = %path.display(), value, "unparseable indicator value dropped");
            continue;
        };
        out.push((parse_date(date)?, value));
    }
    if columns.is_none() {
        return Err(MacroDataError::MissingHeader { path: path.to_path_buf() });
    }
    Ok(out)
}
