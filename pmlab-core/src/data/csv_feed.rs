//! CSV price files.
//!
//! One file per symbol, newest bar first, five columns:
//! `Date,Open,High,Low,Close`. Prices are decimal or treasury-style 32nds
//! (`112-16` is 112.5). Bad lines are dropped with a warning; a file only
//! fails as a whole when it cannot be opened or the reader itself fails.

use crate::data::dates::parse_date;
use crate::data::provider::{FeedError, InMemoryFeed};
use crate::domain::{Bar, Instrument, InstrumentLookup};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

const FIELDS_PER_LINE: usize = 5;

/// Parse a decimal or `whole-32nds` price.
pub fn parse_price(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let split = s.char_indices().skip(1).find(|&(_, c)| c == '-').map(|(i, _)| i);
    let value = match split {
        Some(i) => {
            let whole: f64 = s[..i].parse().ok()?;
            let thirty_seconds: f64 = s[i + 1..].parse().ok()?;
            whole + thirty_seconds / 32.0
        }
        None => s.parse().ok()?,
    };
    value.is_finite().then_some(value)
}

/// Parse CSV content into oldest-first bars in tick units of `instrument`.
///
/// I/O failures of the underlying reader abort with `FeedError::Csv`; every
/// other bad line is dropped.
pub fn parse_bars<R: Read>(reader: R, instrument: &Instrument) -> Result<Vec<Bar>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut bars = Vec::new();
    let mut dropped = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) if e.is_io_error() => return Err(FeedError::Csv(e)),
            Err(e) => {
                warn!(symbol = %instrument.symbol, line = line + 1, error = %e, "dropping unreadable line");
                dropped += 1;
                continue;
            }
        };
        if record.get(0).is_some_and(|f| f.eq_ignore_ascii_case("date")) {
            continue;
        }
        if record.len() != FIELDS_PER_LINE {
            warn!(symbol = %instrument.symbol, line = line + 1, fields = record.len(), "dropping line with wrong field count");
            dropped += 1;
            continue;
        }
        match parse_record(&record, instrument) {
            Some(bar) => bars.push(bar),
            None => {
                warn!(symbol = %instrument.symbol, line = line + 1, "dropping malformed line");
                dropped += 1;
            }
        }
    }

    // Files are newest first.
    bars.reverse();
    bars.sort_by_key(|b| b.date);
    debug!(symbol = %instrument.symbol, bars = bars.len(), dropped, "parsed price file");
    Ok(bars)
}

fn parse_record(record: &csv::StringRecord, instrument: &Instrument) -> Option<Bar> {
    let date = parse_date(record.get(0)?).ok()?;
    let mut prices = [0.0; 4];
    for (slot, field) in prices.iter_mut().zip(record.iter().skip(1)) {
        *slot = instrument.to_ticks(parse_price(field)?);
    }
    let [open, high, low, close] = prices;
    Some(Bar::new(instrument.symbol.clone(), date, open, high, low, close))
}

/// Load one symbol's file.
pub fn load_csv_file(path: &Path, instrument: &Instrument) -> Result<Vec<Bar>, FeedError> {
    let file = std::fs::File::open(path).map_err(|source| FeedError::Io { path: path.to_path_buf(), source })?;
    parse_bars(std::io::BufReader::new(file), instrument)
}

/// Load every symbol from `dir`, naming files by substituting `{symbol}` into `pattern`.
pub fn load_directory(
    dir: &Path,
    pattern: &str,
    symbols: &[String],
    contracts: &dyn InstrumentLookup,
) -> Result<InMemoryFeed, FeedError> {
    let mut feed = InMemoryFeed::new();
    for symbol in symbols {
        let instrument = contracts.lookup(symbol)?;
        let path = dir.join(pattern.replace("{symbol}", symbol));
        if !path.is_file() {
            return Err(FeedError::MissingFile { symbol: symbol.clone(), path });
        }
        let bars = load_csv_file(&path, &instrument)?;
        if bars.is_empty() {
            return Err(FeedError::Empty { symbol: symbol.clone() });
        }
        feed.insert(symbol.clone(), bars);
    }
    Ok(feed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContractTable;
    use chrono::NaiveDate;

    #[test]
    fn parses_decimal_and_32nds() {
        assert_eq!(parse_price("1800.25"), Some(1800.25));
        assert_eq!(parse_price("112-16"), Some(112.5));
        assert_eq!(parse_price(" 99-08 "), Some(99.25));
        assert_eq!(parse_price("-1.5"), Some(-1.5));
        assert_eq!(parse_price("abc"), None);
        assert_eq!(parse_price("1-x"), None);
    }

    #[test]
    fn parses_newest_first_file() {
        let es = Instrument::new("ES", 0.25, 12.5);
        let content = "Date,Open,High,Low,Close\n\
                       2014-01-03,1801.00,1802.00,1800.00,1801.50\n\
                       01-02-14,1800.00,1801.00,1799.00,1800.50\n";
        let bars = parse_bars(content.as_bytes(), &es).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2014, 1, 2).unwrap());
        assert_eq!(bars[0].close, 7202.0);
        assert_eq!(bars[1].high, 7208.0);
        assert_eq!(bars[1].symbol, "ES");
    }

    #[test]
    fn drops_malformed_lines() {
        let es = Instrument::new("ES", 0.25, 12.5);
        let content = "2014-01-06,1,2,0.5,1.5\n\
                       2014-01-05,1,2,0.5\n\
                       not-a-date,1,2,0.5,1.5\n\
                       2014-01-03,1,x,0.5,1.5\n\
                       2014-01-02,1,2,0.5,1.5,9\n\
                       2014-01-01,1,2,0.5,1.5\n";
        let bars = parse_bars(content.as_bytes(), &es).unwrap();
        let days: Vec<u32> = bars.iter().map(|b| chrono::Datelike::day(&b.date)).collect();
        assert_eq!(days, vec![1, 6]);
    }

    /// Yields one good line, then fails like a dropped network mount.
    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.served {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk went away"));
            }
            self.served = true;
            let line = b"2014-01-02,1800,1801,1799,1800.5\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn reader_failure_aborts_the_file() {
        let es = Instrument::new("ES", 0.25, 12.5);
        let result = parse_bars(FailingReader { served: false }, &es);
        assert!(matches!(result, Err(FeedError::Csv(ref e)) if e.is_io_error()));
    }

    #[test]
    fn treasury_prices_convert_to_ticks() {
        let zb = Instrument::new("ZB", 1.0 / 32.0, 31.25);
        let bars = parse_bars("2014-01-02,130-00,130-16,129-16,130-08\n".as_bytes(), &zb).unwrap();
        assert_eq!(bars[0].open, 4160.0);
        assert_eq!(bars[0].high, 4176.0);
        assert_eq!(bars[0].low, 4144.0);
        assert_eq!(bars[0].close, 4168.0);
    }

    #[test]
    fn load_directory_reads_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("market_data_ES.csv"), "2014-01-02,1800,1801,1799,1800.5\n").unwrap();
        let contracts = ContractTable::futures();
        let feed = load_directory(dir.path(), "market_data_{symbol}.csv", &["ES".to_string()], &contracts).unwrap();
        assert_eq!(feed.total_bars(), 1);

        let missing = load_directory(dir.path(), "market_data_{symbol}.csv", &["NQ".to_string()], &contracts);
        assert!(matches!(missing, Err(FeedError::MissingFile { .. })));

        let unknown = load_directory(dir.path(), "market_data_{symbol}.csv", &["XX".to_string()], &contracts);
        assert!(matches!(unknown, Err(FeedError::Instrument(_))));
    }
}
