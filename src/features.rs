//! Feature preparation for the walk-forward classifier.
//!
//! Three transforms, each returning a new [`Dataset`]:
//!
//! - **Calendar features**: `hour`, `month`, `dayofweek` (Monday = 0)
//! - **Min-max normalisation**: rescale columns to `[0, 1]`
//! - **Imputation**: replace missing values with zero
//!
//! # Example
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use heron::dataset::Dataset;
//! use heron::features::{prepare_features, FeatureConfig};
//!
//! let ts = vec![
//!     Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
//!     Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
//! ];
//! let data = Dataset::new("datetime", ts)
//!     .with_column("volume", vec![Some(10.0), None])
//!     .unwrap();
//!
//! let config = FeatureConfig {
//!     columns: vec!["volume".to_string()],
//!     ..Default::default()
//! };
//! let (prepared, names) = prepare_features(&data, &config).unwrap();
//! assert_eq!(names, vec!["volume", "hour", "month", "dayofweek"]);
//! assert_eq!(prepared.column("volume").unwrap(), &[Some(0.0), Some(0.0)]);
//! ```

use crate::dataset::{Dataset, Values};
use crate::error::Result;
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which transforms [`prepare_features`] applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Existing numeric columns to use as features.
    pub columns: Vec<String>,
    /// Add `hour`, `month` and `dayofweek`.
    pub calendar: bool,
    /// Min-max normalise every feature column.
    pub normalize: bool,
    /// Replace missing feature values with zero.
    pub impute: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            calendar: true,
            normalize: true,
            impute: true,
        }
    }
}

/// Add calendar columns derived from the time index.
///
/// Returns the new dataset and the names of the added columns.
pub fn add_calendar_features(data: &Dataset) -> Result<(Dataset, Vec<String>)> {
    let ts = data.timestamps();
    let hour: Values = ts.iter().map(|t| Some(t.hour() as f64)).collect();
    let month: Values = ts.iter().map(|t| Some(t.month() as f64)).collect();
    let dow: Values = ts
        .iter()
        .map(|t| Some(t.weekday().num_days_from_monday() as f64))
        .collect();

    let out = data
        .clone()
        .with_column("hour", hour)?
        .with_column("month", month)?
        .with_column("dayofweek", dow)?;
    Ok((
        out,
        vec!["hour".to_string(), "month".to_string(), "dayofweek".to_string()],
    ))
}

/// Rescale a column to `[0, 1]` using its non-missing minimum and maximum.
///
/// Missing values stay missing. A constant column maps to 0.0.
pub fn min_max_scale(values: &[Option<f64>]) -> Values {
    let finite = || values.iter().flatten().copied().filter(|v| v.is_finite());
    let min = finite().fold(f64::INFINITY, f64::min);
    let max = finite().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|v| {
            v.filter(|x| x.is_finite()).map(|x| {
                if range > 0.0 {
                    (x - min) / range
                } else {
                    0.0
                }
            })
        })
        .collect()
}

/// Min-max normalise each named column.
pub fn normalize_min_max(data: &Dataset, columns: &[&str]) -> Result<Dataset> {
    let mut out = data.clone();
    for &name in columns {
        let scaled = min_max_scale(data.column(name)?);
        out = out.with_column(name, scaled)?;
    }
    Ok(out)
}

/// Replace missing (or non-finite) values in each named column with 0.0.
pub fn impute_missing(data: &Dataset, columns: &[&str]) -> Result<Dataset> {
    let mut out = data.clone();
    for &name in columns {
        let values = data.column(name)?;
        let missing = values
            .iter()
            .filter(|v| !v.is_some_and(|x| x.is_finite()))
            .count();
        if missing > 0 {
            debug!("Imputing {} missing values in '{}'", missing, name);
        }
        let filled: Values = values
            .iter()
            .map(|v| Some(v.filter(|x| x.is_finite()).unwrap_or(0.0)))
            .collect();
        out = out.with_column(name, filled)?;
    }
    Ok(out)
}

/// Apply the configured transforms and return the feature column names.
///
/// Order: calendar columns are appended, then every feature column is
/// normalised, then imputed.
pub fn prepare_features(data: &Dataset, config: &FeatureConfig) -> Result<(Dataset, Vec<String>)> {
    let mut names = config.columns.clone();
    for name in &names {
        data.column(name)?;
    }

    let mut out = data.clone();
    if config.calendar {
        let (with_calendar, calendar) = add_calendar_features(&out)?;
        out = with_calendar;
        names.extend(calendar);
    }

    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    if config.normalize {
        out = normalize_min_max(&out, &refs)?;
    }
    if config.impute {
        out = impute_missing(&out, &refs)?;
    }

    debug!("Prepared {} feature columns: {:?}", names.len(), names);
    Ok((out, names))
}
