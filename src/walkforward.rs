//! Walk-forward (expanding window) evaluation of a probability model.
//!
//! Rows are grouped into time buckets of a fixed width. Each bucket is a test
//! fold whose training set is every row strictly before the bucket's earliest
//! timestamp, so a model never sees a row from its own fold or the future.
//! Buckets that start before the evaluation start date are skipped, but their
//! rows still train later folds.

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::model::ProbabilityModel;
use crate::scoring::{self, AucScore};
use crate::types::Label;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, info};

/// Width of a test fold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FoldWidth {
    /// Epoch-aligned blocks of `n` hours.
    Hours(u32),
    /// Calendar days.
    Day,
    /// ISO weeks (Monday start).
    Week,
    /// Calendar months.
    #[default]
    Month,
}

impl FoldWidth {
    /// Key shared by every timestamp in the same bucket. Keys increase with time.
    fn bucket_key(&self, timestamp: DateTime<Utc>) -> i64 {
        match self {
            FoldWidth::Hours(h) => {
                let interval_secs = (*h).max(1) as i64 * 3600;
                timestamp.timestamp().div_euclid(interval_secs)
            }
            FoldWidth::Day => timestamp.timestamp().div_euclid(86400),
            FoldWidth::Week => {
                let iso_week = timestamp.iso_week();
                iso_week.year() as i64 * 100 + iso_week.week() as i64
            }
            FoldWidth::Month => timestamp.year() as i64 * 12 + timestamp.month() as i64,
        }
    }

    /// Start of the bucket containing `timestamp`.
    pub fn bucket_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(Default::default()));
        match self {
            FoldWidth::Hours(h) => {
                let interval_secs = (*h).max(1) as i64 * 3600;
                let start = timestamp.timestamp().div_euclid(interval_secs) * interval_secs;
                DateTime::from_timestamp(start, 0).unwrap_or(timestamp)
            }
            FoldWidth::Day => midnight(timestamp.date_naive()),
            FoldWidth::Week => {
                let iso_week = timestamp.iso_week();
                let monday =
                    NaiveDate::from_isoywd_opt(iso_week.year(), iso_week.week(), chrono::Weekday::Mon)
                        .unwrap_or(timestamp.date_naive());
                midnight(monday)
            }
            FoldWidth::Month => {
                let first = NaiveDate::from_ymd_opt(timestamp.year(), timestamp.month(), 1)
                    .unwrap_or(timestamp.date_naive());
                midnight(first)
            }
        }
    }

    /// Human-readable fold id for the bucket containing `timestamp`.
    pub fn fold_id(&self, timestamp: DateTime<Utc>) -> String {
        match self {
            FoldWidth::Hours(_) => self
                .bucket_start(timestamp)
                .format("%Y-%m-%d %H:%M")
                .to_string(),
            FoldWidth::Day => timestamp.format("%Y-%m-%d").to_string(),
            FoldWidth::Week => {
                let iso_week = timestamp.iso_week();
                format!("{}-W{:02}", iso_week.year(), iso_week.week())
            }
            FoldWidth::Month => timestamp.format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for FoldWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldWidth::Hours(h) => write!(f, "{}h", h),
            FoldWidth::Day => write!(f, "day"),
            FoldWidth::Week => write!(f, "week"),
            FoldWidth::Month => write!(f, "month"),
        }
    }
}

impl FromStr for FoldWidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "month" | "monthly" => Ok(FoldWidth::Month),
            "week" | "weekly" => Ok(FoldWidth::Week),
            "day" | "daily" => Ok(FoldWidth::Day),
            "hour" | "hourly" => Ok(FoldWidth::Hours(1)),
            other => {
                let hours = other
                    .strip_suffix('h')
                    .and_then(|n| n.parse::<u32>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| {
                        Error::ConfigError(format!(
                            "Invalid fold width '{}' (expected month, week, day or <n>h)",
                            other
                        ))
                    })?;
                Ok(FoldWidth::Hours(hours))
            }
        }
    }
}

impl TryFrom<String> for FoldWidth {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FoldWidth> for String {
    fn from(width: FoldWidth) -> Self {
        width.to_string()
    }
}

/// First fold start evaluated by default: 2018-02-01 00:00 UTC.
pub fn default_eval_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 2, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Configuration for walk-forward evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    /// Width of each test fold.
    pub fold_width: FoldWidth,
    /// Folds whose earliest row is before this are skipped.
    pub eval_start: DateTime<Utc>,
    /// Minimum precision for the reported operating point.
    pub precision_threshold: f64,
    /// Class whose precision/recall is reported.
    pub positive_class: Label,
    /// Minimum training rows a fold needs.
    pub min_train_rows: usize,
    /// Evaluate folds in parallel.
    pub parallel: bool,
    /// Show a progress bar (sequential runs only).
    #[serde(default)]
    pub show_progress: bool,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            fold_width: FoldWidth::Month,
            eval_start: default_eval_start(),
            precision_threshold: 0.7,
            positive_class: Label::Positive,
            min_train_rows: 1,
            parallel: false,
            show_progress: false,
        }
    }
}

impl WalkForwardConfig {
    pub fn new(fold_width: FoldWidth, eval_start: DateTime<Utc>) -> Self {
        Self {
            fold_width,
            eval_start,
            ..Default::default()
        }
    }

    pub fn with_precision_threshold(mut self, threshold: f64) -> Self {
        self.precision_threshold = threshold;
        self
    }

    pub fn with_positive_class(mut self, label: Label) -> Self {
        self.positive_class = label;
        self
    }

    pub fn with_min_train_rows(mut self, rows: usize) -> Self {
        self.min_train_rows = rows;
        self
    }

    /// Evaluate folds in parallel with rayon.
    pub fn with_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.show_progress = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.precision_threshold) {
            return Err(Error::ConfigError(format!(
                "precision_threshold must be within [0, 1], got {}",
                self.precision_threshold
            )));
        }
        if !self.positive_class.is_known() {
            return Err(Error::ConfigError(
                "positive_class cannot be 'unknown'".to_string(),
            ));
        }
        if self.min_train_rows == 0 {
            return Err(Error::ConfigError(
                "min_train_rows must be at least 1".to_string(),
            ));
        }
        if self.fold_width == FoldWidth::Hours(0) {
            return Err(Error::ConfigError("fold width must be positive".to_string()));
        }
        Ok(())
    }
}

/// A contiguous time bucket of a time-ordered dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Fold {
    /// Position among all buckets, skipped ones included.
    pub index: usize,
    pub id: String,
    /// Start of the bucket period.
    pub start: DateTime<Utc>,
    /// Earliest row timestamp in the bucket.
    pub min_timestamp: DateTime<Utc>,
    /// Latest row timestamp in the bucket.
    pub max_timestamp: DateTime<Utc>,
    /// Row positions in the time-ordered dataset.
    pub rows: Range<usize>,
}

impl Fold {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Scores for one evaluated fold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    /// Fold id (e.g. `2018-02`).
    pub fold: String,
    pub start: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub auc: AucScore,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub threshold: Option<f64>,
}

/// Output of a walk-forward run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub config: WalkForwardConfig,
    /// Name of the model that produced the results.
    pub model: String,
    /// One record per evaluated fold, in ascending time order.
    pub results: Vec<FoldResult>,
    /// Ids of folds skipped for starting before `eval_start`.
    pub skipped: Vec<String>,
}

impl EvaluationReport {
    /// Mean AUC over folds where it is defined.
    pub fn mean_auc(&self) -> Option<f64> {
        let defined: Vec<f64> = self.results.iter().filter_map(|r| r.auc.value()).collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }

    /// Number of folds where AUC is undefined.
    pub fn undefined_auc_count(&self) -> usize {
        self.results.iter().filter(|r| !r.auc.is_defined()).count()
    }

    /// Number of folds with a qualifying precision/recall point.
    pub fn operating_point_count(&self) -> usize {
        self.results.iter().filter(|r| r.precision.is_some()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "Walk-Forward Evaluation Summary:\n\
             Model: {}\n\
             Folds evaluated: {}\n\
             Folds skipped: {}\n\
             Mean AUC: {}\n\
             Folds with precision >= {:.2}: {}",
            self.model,
            self.results.len(),
            self.skipped.len(),
            self.mean_auc()
                .map(|v| format!("{:.3}", v))
                .unwrap_or_else(|| "AUC undefined".to_string()),
            self.config.precision_threshold,
            self.operating_point_count()
        )
    }
}

/// Walk-forward evaluator.
pub struct WalkForwardEvaluator {
    config: WalkForwardConfig,
}

impl WalkForwardEvaluator {
    pub fn new(config: WalkForwardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WalkForwardConfig {
        &self.config
    }

    /// Group the rows of a time-ordered dataset into ascending buckets.
    pub fn partition(&self, dataset: &Dataset) -> Result<Vec<Fold>> {
        if !dataset.is_time_ordered() {
            return Err(Error::InvalidInput(
                "partition requires a dataset sorted by time".to_string(),
            ));
        }

        let width = self.config.fold_width;
        let ts = dataset.timestamps();
        let mut folds = Vec::new();
        let mut start = 0;
        while start < ts.len() {
            let key = width.bucket_key(ts[start]);
            let mut end = start + 1;
            while end < ts.len() && width.bucket_key(ts[end]) == key {
                end += 1;
            }
            folds.push(Fold {
                index: folds.len(),
                id: width.fold_id(ts[start]),
                start: width.bucket_start(ts[start]),
                min_timestamp: ts[start],
                max_timestamp: ts[end - 1],
                rows: start..end,
            });
            start = end;
        }
        Ok(folds)
    }

    /// Run the walk-forward evaluation.
    ///
    /// `model_factory` builds a fresh, unfitted model for every fold.
    /// Any fold failure aborts the run with an error naming the fold.
    pub fn evaluate<F>(
        &self,
        dataset: &Dataset,
        feature_columns: &[&str],
        target_column: &str,
        model_factory: F,
    ) -> Result<EvaluationReport>
    where
        F: Fn() -> Box<dyn ProbabilityModel> + Send + Sync,
    {
        self.config.validate()?;
        if feature_columns.is_empty() {
            return Err(Error::InvalidInput("No feature columns given".to_string()));
        }
        for &name in feature_columns {
            dataset.column(name)?;
        }
        dataset.label_column(target_column)?;
        if dataset.is_empty() {
            return Err(Error::NoData);
        }

        let sorted;
        let data = if dataset.is_time_ordered() {
            dataset
        } else {
            sorted = dataset.sorted_by_time();
            &sorted
        };

        let labels = data.label_column(target_column)?;
        if labels.contains(&Label::Unknown) {
            return Err(Error::DataError(format!(
                "Target column '{}' contains unknown labels",
                target_column
            )));
        }
        let features = data.feature_matrix(feature_columns)?;

        let folds = self.partition(data)?;
        let (active, skipped): (Vec<Fold>, Vec<Fold>) = folds
            .into_iter()
            .partition(|f| f.min_timestamp >= self.config.eval_start);
        for fold in &skipped {
            info!(
                "Skipping fold {}: starts {} before evaluation start {}",
                fold.id, fold.min_timestamp, self.config.eval_start
            );
        }

        info!(
            "Walk-forward evaluation: {} folds ({} skipped), fold width {}",
            active.len(),
            skipped.len(),
            self.config.fold_width
        );

        let task = FoldTask {
            config: &self.config,
            timestamps: data.timestamps(),
            features: &features,
            labels,
        };

        let results: Vec<FoldResult> = if self.config.parallel {
            active
                .par_iter()
                .map(|fold| task.run(fold, &model_factory))
                .collect::<Result<Vec<_>>>()?
        } else {
            let progress = if self.config.show_progress {
                let pb = ProgressBar::new(active.len() as u64);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} folds ({eta})")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                Some(pb)
            } else {
                None
            };

            let mut results = Vec::with_capacity(active.len());
            for fold in &active {
                results.push(task.run(fold, &model_factory)?);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
            }
            if let Some(pb) = progress {
                pb.finish_and_clear();
            }
            results
        };

        let model = model_factory().name().to_string();
        Ok(EvaluationReport {
            config: self.config.clone(),
            model,
            results,
            skipped: skipped.into_iter().map(|f| f.id).collect(),
        })
    }
}

/// Shared read-only inputs for evaluating single folds.
struct FoldTask<'a> {
    config: &'a WalkForwardConfig,
    timestamps: &'a [DateTime<Utc>],
    features: &'a [Vec<f64>],
    labels: &'a [Label],
}

impl FoldTask<'_> {
    fn run<F>(&self, fold: &Fold, model_factory: &F) -> Result<FoldResult>
    where
        F: Fn() -> Box<dyn ProbabilityModel>,
    {
        // Time-ordered rows: training is the prefix strictly before the fold.
        let train_end = self.timestamps.partition_point(|t| *t < fold.min_timestamp);
        if train_end < self.config.min_train_rows {
            return Err(Error::InsufficientTrainingData {
                fold: fold.id.clone(),
                rows: train_end,
                required: self.config.min_train_rows,
            });
        }

        debug!(
            "Fold {}: {} training rows, {} test rows",
            fold.id,
            train_end,
            fold.len()
        );

        let model_error = |e: Error| Error::Model {
            fold: fold.id.clone(),
            message: e.to_string(),
        };

        let mut model = model_factory();
        model
            .fit(&self.features[..train_end], &self.labels[..train_end])
            .map_err(model_error)?;

        let test_labels = &self.labels[fold.rows.clone()];
        let probabilities = model
            .predict_proba(&self.features[fold.rows.clone()])
            .map_err(model_error)?;

        let scores = scoring::score(
            &probabilities,
            test_labels,
            model.classes(),
            self.config.positive_class,
            model.class_index(self.config.positive_class),
            self.config.precision_threshold,
        );

        info!(
            "Fold {}: auc={} precision={:?} recall={:?} threshold={:?}",
            fold.id, scores.auc, scores.precision, scores.recall, scores.threshold
        );

        Ok(FoldResult {
            fold: fold.id.clone(),
            start: fold.start,
            train_rows: train_end,
            test_rows: fold.len(),
            auc: scores.auc,
            precision: scores.precision,
            recall: scores.recall,
            threshold: scores.threshold,
        })
    }
}
