//! Loading time-stamped price tables from CSV.

use crate::dataset::{Dataset, Values};
use crate::error::{Error, Result};
use crate::types::Label;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Column names used by the system price export.
pub const SETTLEMENT_DATE: &str = "Settlement Date";
pub const SETTLEMENT_PERIOD: &str = "Settlement Period";
pub const SYSTEM_SELL_PRICE: &str = "System Sell Price(£/MWh)";
pub const SYSTEM_BUY_PRICE: &str = "System Buy Price(£/MWh)";
pub const NET_IMBALANCE_VOLUME: &str = "Net Imbalance Volume(MWh)";

/// Output column names of [`load_system_prices`].
pub const SYSTEM_PRICE_COLUMN: &str = "system_price";
pub const NET_IMBALANCE_COLUMN: &str = "net_imbalance_volume";

/// Fallback names tried when the configured time column is absent.
const TIME_ALIASES: [&str; 8] = [
    "datetime", "Datetime", "timestamp", "Timestamp", "date", "Date", "time", "Time",
];

/// Data source configuration.
#[derive(Debug, Clone)]
pub struct DataConfig {
    /// Name of the time column; the output dataset uses this name.
    pub time_column: String,
    /// Date format string for parsing (e.g., "%Y-%m-%d %H:%M:%S").
    pub date_format: Option<String>,
    /// CSV delimiter character. If None, delimiter is auto-detected.
    pub delimiter: Option<u8>,
    /// Skip invalid rows instead of failing.
    pub skip_invalid: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            time_column: "datetime".to_string(),
            date_format: None,
            delimiter: None,
            skip_invalid: true,
        }
    }
}

impl DataConfig {
    pub fn with_time_column(mut self, name: impl Into<String>) -> Self {
        self.time_column = name.into();
        self
    }
}

/// Detect the CSV delimiter from the first few lines of the file.
///
/// Tries comma, tab, semicolon and pipe and keeps the one that splits every
/// line into the same number (at least two) of fields, preferring more fields.
fn detect_delimiter(path: &Path) -> Result<u8> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().take(5).filter_map(|l| l.ok()).collect();

    if lines.is_empty() {
        return Ok(b',');
    }

    let delimiters = [b',', b'\t', b';', b'|'];
    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in &delimiters {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| line.as_bytes().iter().filter(|&&b| b == delim).count() + 1)
            .collect();

        let first_count = counts[0];
        let all_consistent = counts.iter().all(|&c| c == first_count);
        if all_consistent && first_count >= 2 && first_count > best_score {
            best_score = first_count;
            best_delimiter = delim;
        }
    }

    debug!(
        "Detected delimiter {:?} with {} fields",
        best_delimiter as char, best_score
    );
    Ok(best_delimiter)
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_time(NaiveTime::default()))
}

/// Parse a timestamp, trying an explicit format first and then common
/// datetime, date-only and unix-seconds forms. Naive values are taken as UTC.
pub fn parse_datetime(s: &str, format: Option<&str>) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Some(fmt) = format {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(midnight(d));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%d-%m-%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&dt));
        }
    }

    let date_formats = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d-%m-%Y",
        "%d/%m/%Y",
        "%d-%b-%Y", // 15-Jan-2024
        "%d %b %Y", // 15 Jan 2024
    ];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(midnight(d));
        }
    }

    if let Ok(ts) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(ts, 0) {
            return Ok(dt);
        }
    }

    Err(Error::DataError(format!("Could not parse date: '{}'", s)))
}

/// Empty and unparsable cells are missing.
fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn open_reader(path: &Path, delimiter: Option<u8>) -> Result<csv::Reader<File>> {
    let delimiter = match delimiter {
        Some(d) => d,
        None => detect_delimiter(path)?,
    };
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?)
}

fn sort_and_report(data: Dataset, source: &Path) -> Result<Dataset> {
    if data.is_empty() {
        return Err(Error::NoData);
    }

    let data = if data.is_time_ordered() {
        data
    } else {
        debug!("Sorting {} rows by time", data.len());
        data.sorted_by_time()
    };

    let duplicates = data.timestamps().windows(2).filter(|w| w[0] == w[1]).count();
    if duplicates > 0 {
        warn!("{} duplicate timestamps in {}", duplicates, source.display());
    }

    info!(
        "Loaded {} rows from {} to {}",
        data.len(),
        data.timestamps()
            .first()
            .map(|t| t.to_string())
            .unwrap_or_default(),
        data.timestamps()
            .last()
            .map(|t| t.to_string())
            .unwrap_or_default()
    );
    Ok(data)
}

/// Load a time-stamped CSV table.
///
/// Every column other than the time column becomes a numeric column, except
/// columns whose non-empty cells are all label names, which are loaded as
/// label columns. Rows are sorted by time (stable for ties).
pub fn load_csv(path: impl AsRef<Path>, config: &DataConfig) -> Result<Dataset> {
    let path = path.as_ref();
    info!("Loading data from: {}", path.display());

    let mut reader = open_reader(path, config.delimiter)?;
    let headers = reader.headers()?.clone();

    let time_idx = column_index(&headers, &config.time_column)
        .or_else(|| TIME_ALIASES.iter().find_map(|a| column_index(&headers, a)))
        .ok_or_else(|| Error::ColumnNotFound(config.time_column.clone()))?;

    let mut timestamps = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    let mut skipped = 0;

    for (row_num, result) in reader.records().enumerate() {
        let record = match result {
            Ok(r) => r,
            Err(e) if config.skip_invalid => {
                debug!("Skipping row {}: {}", row_num + 1, e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(Error::CsvError(e)),
        };

        if record.iter().all(|f| f.trim().is_empty()) {
            skipped += 1;
            continue;
        }

        let timestamp =
            match parse_datetime(record.get(time_idx).unwrap_or(""), config.date_format.as_deref()) {
                Ok(ts) => ts,
                Err(e) if config.skip_invalid => {
                    debug!("Skipping row {} due to date parse error: {}", row_num + 1, e);
                    skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

        timestamps.push(timestamp);
        for (col, values) in cells.iter_mut().enumerate() {
            values.push(record.get(col).unwrap_or("").to_string());
        }
    }

    if skipped > 0 {
        warn!("Skipped {} invalid rows", skipped);
    }

    let mut data = Dataset::new(config.time_column.clone(), timestamps);
    for (col, name) in headers.iter().enumerate() {
        if col == time_idx {
            continue;
        }
        let raw = &cells[col];
        let non_empty: Vec<&String> = raw.iter().filter(|c| !c.trim().is_empty()).collect();
        let labels: Option<Vec<Label>> = non_empty.iter().map(|c| c.parse().ok()).collect();

        let is_label_column = !non_empty.is_empty()
            && labels.is_some()
            && non_empty.iter().all(|c| parse_number(c).is_none());
        if is_label_column {
            let column: Vec<Label> = raw
                .iter()
                .map(|c| c.parse().unwrap_or(Label::Unknown))
                .collect();
            data = data.with_label_column(name.trim(), column)?;
            continue;
        }

        let values: Values = raw.iter().map(|c| parse_number(c)).collect();
        data = data.with_column(name.trim(), values)?;
    }

    sort_and_report(data, path)
}

/// Load a system price export.
///
/// Each row's timestamp is its settlement date plus `Settlement Period`
/// half-hours. `system_price` is the mean of the sell and buy prices and
/// `net_imbalance_volume` is carried through. Entirely blank rows are
/// dropped.
pub fn load_system_prices(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    info!("Loading system prices from: {}", path.display());

    let mut reader = open_reader(path, None)?;
    let headers = reader.headers()?.clone();
    let required = |name: &str| {
        column_index(&headers, name).ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    };
    let date_idx = required(SETTLEMENT_DATE)?;
    let period_idx = required(SETTLEMENT_PERIOD)?;
    let sell_idx = required(SYSTEM_SELL_PRICE)?;
    let buy_idx = required(SYSTEM_BUY_PRICE)?;
    let niv_idx = column_index(&headers, NET_IMBALANCE_VOLUME);

    let mut timestamps = Vec::new();
    let mut prices: Values = Vec::new();
    let mut imbalance: Values = Vec::new();
    let mut blank = 0;

    for (row_num, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|f| f.trim().is_empty()) {
            blank += 1;
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("");
        let date = parse_datetime(field(date_idx), None)?;
        let period = parse_number(field(period_idx)).ok_or_else(|| {
            Error::DataError(format!(
                "Row {}: invalid settlement period '{}'",
                row_num + 1,
                field(period_idx)
            ))
        })?;

        timestamps.push(date + Duration::minutes((period * 30.0).round() as i64));
        prices.push(
            parse_number(field(sell_idx))
                .zip(parse_number(field(buy_idx)))
                .map(|(sell, buy)| (sell + buy) / 2.0),
        );
        imbalance.push(niv_idx.and_then(|i| parse_number(field(i))));
    }

    if blank > 0 {
        debug!("Dropped {} blank rows", blank);
    }

    let data = Dataset::new("datetime", timestamps)
        .with_column(SYSTEM_PRICE_COLUMN, prices)?
        .with_column(NET_IMBALANCE_COLUMN, imbalance)?;
    sort_and_report(data, path)
}

/// Load a cleaned day-ahead price table (a `datetime` column plus prices).
pub fn load_day_ahead_prices(path: impl AsRef<Path>) -> Result<Dataset> {
    load_csv(path, &DataConfig::default())
}

/// System prices joined with the most recent day-ahead price at or before
/// each settlement period.
pub fn load_merged_prices(
    system_path: impl AsRef<Path>,
    day_ahead_path: impl AsRef<Path>,
) -> Result<Dataset> {
    let system = load_system_prices(system_path)?;
    let day_ahead = load_day_ahead_prices(day_ahead_path)?;
    system.merge_asof(&day_ahead)
}
