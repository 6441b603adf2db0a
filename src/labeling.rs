//! Forecast target construction.
//!
//! Every row is labelled from the price path over the next `horizon_periods`
//! rows: the largest fall and the largest rise relative to the row's own
//! price are compared against a negative and a positive threshold.
//!
//! | largest fall vs negative | largest rise vs positive | label |
//! |---|---|---|
//! | `>`  | `>=` | positive |
//! | `<=` | `<`  | negative |
//! | `<=` | `>=` | volatile |
//! | `>`  | `<`  | stable |
//!
//! Rows whose excursions are undefined (end of series, missing or zero
//! anchor price) are labelled [`Label::Unknown`] and dropped.
//!
//! # Example
//!
//! ```
//! use heron::dataset::Dataset;
//! use heron::labeling::construct_target;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let times = (0..4).map(|i| start + Duration::hours(i)).collect();
//! let data = Dataset::new("datetime", times)
//!     .with_dense_column("price", vec![100.0, 105.0, 96.0, 102.0])
//!     .unwrap();
//!
//! let labelled = construct_target(&data, "datetime", "price", 2, 0.03, -0.03).unwrap();
//! assert_eq!(labelled.len(), 2);
//! ```

use crate::dataset::{forward_fill, Dataset};
use crate::error::{Error, Result};
use crate::types::{label_counts, Label};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Default name of the label column added by [`construct_target`].
pub const DEFAULT_LABEL_COLUMN: &str = "forecast";

/// Target construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Price column to label.
    pub price_column: String,
    /// Number of future rows scanned per label.
    pub horizon_periods: usize,
    /// Minimum rise (e.g. 0.03 for +3%) that counts as a positive move.
    pub positive_threshold: f64,
    /// Fall (e.g. -0.03 for -3%) at or below which a move counts as negative.
    pub negative_threshold: f64,
    /// Name of the label column to add.
    pub label_column: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            price_column: "price".to_string(),
            horizon_periods: 24,
            positive_threshold: 0.03,
            negative_threshold: -0.03,
            label_column: DEFAULT_LABEL_COLUMN.to_string(),
        }
    }
}

impl TargetConfig {
    /// Create a config for a price column with symmetric thresholds.
    pub fn new(price_column: impl Into<String>, horizon_periods: usize, threshold: f64) -> Self {
        Self {
            price_column: price_column.into(),
            horizon_periods,
            positive_threshold: threshold.abs(),
            negative_threshold: -threshold.abs(),
            ..Default::default()
        }
    }

    /// Check the horizon and threshold signs.
    pub fn validate(&self) -> Result<()> {
        if self.horizon_periods == 0 {
            return Err(Error::InvalidHorizon(self.horizon_periods));
        }
        if !(self.positive_threshold >= 0.0) || !(self.negative_threshold <= 0.0) {
            return Err(Error::ConfigError(format!(
                "Thresholds must satisfy positive >= 0 and negative <= 0 (got {} and {})",
                self.positive_threshold, self.negative_threshold
            )));
        }
        Ok(())
    }
}

/// Minimum and maximum of a forward window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowExtrema {
    pub min: f64,
    pub max: f64,
}

/// Relative price excursions over a horizon window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Excursion {
    /// `window_min / anchor - 1`.
    pub min_fall: f64,
    /// `window_max / anchor - 1`.
    pub max_rise: f64,
}

impl Excursion {
    /// Both components undefined.
    pub const UNDEFINED: Excursion = Excursion {
        min_fall: f64::NAN,
        max_rise: f64::NAN,
    };

    /// Excursion of a window relative to an anchor price.
    ///
    /// Undefined when the anchor is missing, zero or NaN, or when the window
    /// is undefined.
    pub fn from_window(anchor: Option<f64>, window: Option<WindowExtrema>) -> Self {
        match (anchor, window) {
            (Some(a), Some(w)) if a != 0.0 && !a.is_nan() => Excursion {
                min_fall: w.min / a - 1.0,
                max_rise: w.max / a - 1.0,
            },
            _ => Self::UNDEFINED,
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.min_fall.is_nan() && !self.max_rise.is_nan()
    }

    /// Apply [`label_excursion`] to this pair.
    pub fn label(&self, negative_threshold: f64, positive_threshold: f64) -> Label {
        label_excursion(
            self.min_fall,
            self.max_rise,
            negative_threshold,
            positive_threshold,
        )
    }
}

/// Map a (largest fall, largest rise) pair to a label.
///
/// NaN in either component gives [`Label::Unknown`]; the check comes first
/// because every comparison with NaN is false.
pub fn label_excursion(
    min_fall: f64,
    max_rise: f64,
    negative_threshold: f64,
    positive_threshold: f64,
) -> Label {
    if min_fall.is_nan() || max_rise.is_nan() {
        return Label::Unknown;
    }

    let fell = min_fall <= negative_threshold;
    let rose = max_rise >= positive_threshold;
    match (fell, rose) {
        (false, true) => Label::Positive,
        (true, false) => Label::Negative,
        (true, true) => Label::Volatile,
        (false, false) => Label::Stable,
    }
}

/// Min and max over the `horizon` values strictly after each index.
///
/// Entry `i` covers `values[i + 1..=i + horizon]` and is `None` when fewer
/// than `horizon` values follow or any of them is missing. Runs in O(n) with
/// two monotonic deques.
pub fn forward_extrema(values: &[Option<f64>], horizon: usize) -> Vec<Option<WindowExtrema>> {
    let n = values.len();
    let mut out = vec![None; n];
    if horizon == 0 {
        return out;
    }

    let value = |j: usize| values[j].filter(|v| !v.is_nan());
    let mut mins: VecDeque<(usize, f64)> = VecDeque::with_capacity(horizon + 1);
    let mut maxs: VecDeque<(usize, f64)> = VecDeque::with_capacity(horizon + 1);
    let mut missing = 0usize;

    for end in 0..n {
        if end >= horizon {
            let leaving = end - horizon;
            if value(leaving).is_none() {
                missing -= 1;
            }
            if mins.front().is_some_and(|&(j, _)| j == leaving) {
                mins.pop_front();
            }
            if maxs.front().is_some_and(|&(j, _)| j == leaving) {
                maxs.pop_front();
            }
        }

        match value(end) {
            Some(v) => {
                while mins.back().is_some_and(|&(_, b)| b >= v) {
                    mins.pop_back();
                }
                mins.push_back((end, v));
                while maxs.back().is_some_and(|&(_, b)| b <= v) {
                    maxs.pop_back();
                }
                maxs.push_back((end, v));
            }
            None => missing += 1,
        }

        // Window is now end - horizon + 1 ..= end, anchored at end - horizon.
        if end >= horizon && missing == 0 {
            if let (Some(&(_, min)), Some(&(_, max))) = (mins.front(), maxs.front()) {
                out[end - horizon] = Some(WindowExtrema { min, max });
            }
        }
    }

    out
}

/// Label every row of a price series, `Unknown` rows included.
///
/// The prices are forward-filled first.
pub fn label_series(
    prices: &[Option<f64>],
    horizon_periods: usize,
    positive_threshold: f64,
    negative_threshold: f64,
) -> Result<Vec<Label>> {
    if horizon_periods == 0 {
        return Err(Error::InvalidHorizon(horizon_periods));
    }

    let filled = forward_fill(prices);
    let windows = forward_extrema(&filled, horizon_periods);

    Ok(filled
        .iter()
        .zip(windows)
        .map(|(&anchor, window)| {
            Excursion::from_window(anchor, window).label(negative_threshold, positive_threshold)
        })
        .collect())
}

/// Add a forecast label column and drop rows whose label is unknown.
///
/// Returns a new dataset whose `price_column` is forward-filled and which has
/// an extra `forecast` label column. Rows are put in time order first (ties
/// keep their order). The last `horizon_periods` rows never have a full
/// window and are always dropped.
pub fn construct_target(
    dataset: &Dataset,
    time_column: &str,
    price_column: &str,
    horizon_periods: usize,
    positive_threshold: f64,
    negative_threshold: f64,
) -> Result<Dataset> {
    let config = TargetConfig {
        price_column: price_column.to_string(),
        horizon_periods,
        positive_threshold,
        negative_threshold,
        label_column: DEFAULT_LABEL_COLUMN.to_string(),
    };
    construct_target_with(dataset, time_column, &config)
}

/// [`construct_target`] driven by a [`TargetConfig`].
pub fn construct_target_with(
    dataset: &Dataset,
    time_column: &str,
    config: &TargetConfig,
) -> Result<Dataset> {
    if config.horizon_periods == 0 {
        return Err(Error::InvalidHorizon(config.horizon_periods));
    }
    if dataset.time_column() != time_column {
        return Err(Error::ColumnNotFound(format!(
            "{} (dataset is indexed by '{}')",
            time_column,
            dataset.time_column()
        )));
    }

    let ordered = if dataset.is_time_ordered() {
        dataset.clone()
    } else {
        debug!("Sorting {} rows by {}", dataset.len(), time_column);
        dataset.sorted_by_time()
    };

    let filled = ordered.forward_filled(&config.price_column)?;
    let labels = label_series(
        filled.column(&config.price_column)?,
        config.horizon_periods,
        config.positive_threshold,
        config.negative_threshold,
    )?;

    let keep: Vec<usize> = labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_known())
        .map(|(i, _)| i)
        .collect();
    let kept_labels: Vec<Label> = keep.iter().map(|&i| labels[i]).collect();

    let labelled = filled
        .take(&keep)
        .with_label_column(config.label_column.clone(), kept_labels)?;

    let counts = label_counts(labelled.label_column(&config.label_column)?);
    info!(
        "Constructed {}-period target: kept {} of {} rows ({:?})",
        config.horizon_periods,
        labelled.len(),
        dataset.len(),
        counts
    );

    Ok(labelled)
}
