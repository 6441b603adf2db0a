//! Configuration file support for evaluation runs.
//!
//! Allows loading an evaluation pipeline (data, target, features, folds and
//! model) from a TOML file for reproducibility.

use crate::data::{self, DataConfig};
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::features::{prepare_features, FeatureConfig};
use crate::labeling::{construct_target_with, TargetConfig, DEFAULT_LABEL_COLUMN};
use crate::model::{ForestConfig, MaxFeatures, ProbabilityModel, RandomForest};
use crate::types::Label;
use crate::walkforward::{EvaluationReport, FoldWidth, WalkForwardConfig, WalkForwardEvaluator};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Complete evaluation configuration loaded from a file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationFileConfig {
    /// Data sources.
    #[serde(default)]
    pub data: DataSettings,
    /// Label construction.
    #[serde(default)]
    pub target: TargetSettings,
    /// Feature preparation.
    #[serde(default)]
    pub features: FeatureSettings,
    /// Walk-forward settings.
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    /// Random forest settings.
    #[serde(default)]
    pub model: ModelSettings,
}

/// Data settings.
///
/// Either `path` (one CSV) or `system_prices` (optionally joined with
/// `day_ahead_prices`) must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSettings {
    /// Path to a time-stamped CSV.
    pub path: Option<String>,
    /// Path to a system price export.
    pub system_prices: Option<String>,
    /// Path to a cleaned day-ahead price CSV.
    pub day_ahead_prices: Option<String>,
    /// Name of the time column in `path`.
    #[serde(default = "default_time_column")]
    pub time_column: String,
    /// Date format in CSV.
    pub date_format: Option<String>,
}

fn default_time_column() -> String { "datetime".to_string() }

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            path: None,
            system_prices: None,
            day_ahead_prices: None,
            time_column: default_time_column(),
            date_format: None,
        }
    }
}

/// Target settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSettings {
    #[serde(default = "default_price_column")]
    pub price_column: String,
    #[serde(default = "default_horizon")]
    pub horizon_periods: usize,
    #[serde(default = "default_positive_threshold")]
    pub positive_threshold: f64,
    #[serde(default = "default_negative_threshold")]
    pub negative_threshold: f64,
    #[serde(default = "default_label_column")]
    pub label_column: String,
}

fn default_price_column() -> String { data::SYSTEM_PRICE_COLUMN.to_string() }
fn default_horizon() -> usize { 24 }
fn default_positive_threshold() -> f64 { 0.03 }
fn default_negative_threshold() -> f64 { -0.03 }
fn default_label_column() -> String { DEFAULT_LABEL_COLUMN.to_string() }

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            price_column: default_price_column(),
            horizon_periods: default_horizon(),
            positive_threshold: default_positive_threshold(),
            negative_threshold: default_negative_threshold(),
            label_column: default_label_column(),
        }
    }
}

/// Feature settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSettings {
    /// Numeric columns used as features.
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_true")]
    pub calendar: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default = "default_true")]
    pub impute: bool,
}

fn default_true() -> bool { true }

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            calendar: true,
            normalize: true,
            impute: true,
        }
    }
}

/// Walk-forward settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSettings {
    /// "month", "week", "day" or "<n>h".
    #[serde(default = "default_fold_width")]
    pub fold_width: String,
    /// First fold start evaluated (YYYY-MM-DD or a full timestamp).
    #[serde(default = "default_eval_start")]
    pub eval_start: String,
    #[serde(default = "default_precision_threshold")]
    pub precision_threshold: f64,
    #[serde(default = "default_positive_class")]
    pub positive_class: String,
    #[serde(default = "default_min_train_rows")]
    pub min_train_rows: usize,
    #[serde(default)]
    pub parallel: bool,
}

fn default_fold_width() -> String { "month".to_string() }
fn default_eval_start() -> String { "2018-02-01".to_string() }
fn default_precision_threshold() -> f64 { 0.7 }
fn default_positive_class() -> String { "positive".to_string() }
fn default_min_train_rows() -> usize { 1 }

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            fold_width: default_fold_width(),
            eval_start: default_eval_start(),
            precision_threshold: default_precision_threshold(),
            positive_class: default_positive_class(),
            min_train_rows: default_min_train_rows(),
            parallel: false,
        }
    }
}

/// Random forest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_trees")]
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Features per split; all features when false, sqrt when true.
    #[serde(default = "default_true")]
    pub sqrt_features: bool,
    #[serde(default = "default_true")]
    pub balanced: bool,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_trees() -> usize { 200 }
fn default_min_samples_split() -> usize { 2 }
fn default_min_samples_leaf() -> usize { 1 }
fn default_seed() -> u64 { 42 }

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            n_trees: default_trees(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            sqrt_features: true,
            balanced: true,
            seed: default_seed(),
        }
    }
}

impl EvaluationFileConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path)?;
        let config: EvaluationFileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::ConfigError(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn to_data_config(&self) -> DataConfig {
        DataConfig {
            time_column: self.data.time_column.clone(),
            date_format: self.data.date_format.clone(),
            ..Default::default()
        }
    }

    pub fn to_target_config(&self) -> Result<TargetConfig> {
        let config = TargetConfig {
            price_column: self.target.price_column.clone(),
            horizon_periods: self.target.horizon_periods,
            positive_threshold: self.target.positive_threshold,
            negative_threshold: self.target.negative_threshold,
            label_column: self.target.label_column.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            columns: self.features.columns.clone(),
            calendar: self.features.calendar,
            normalize: self.features.normalize,
            impute: self.features.impute,
        }
    }

    pub fn to_walkforward_config(&self) -> Result<WalkForwardConfig> {
        let settings = &self.evaluation;
        let fold_width: FoldWidth = settings.fold_width.parse()?;
        let eval_start = data::parse_datetime(&settings.eval_start, None).map_err(|_| {
            Error::ConfigError(format!("Invalid eval_start '{}'", settings.eval_start))
        })?;
        let positive_class: Label = settings.positive_class.parse()?;

        let config = WalkForwardConfig {
            fold_width,
            eval_start,
            precision_threshold: settings.precision_threshold,
            positive_class,
            min_train_rows: settings.min_train_rows,
            parallel: settings.parallel,
            show_progress: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn to_forest_config(&self) -> Result<ForestConfig> {
        let config = ForestConfig {
            n_trees: self.model.n_trees,
            max_depth: self.model.max_depth,
            min_samples_split: self.model.min_samples_split,
            min_samples_leaf: self.model.min_samples_leaf,
            max_features: if self.model.sqrt_features {
                MaxFeatures::Sqrt
            } else {
                MaxFeatures::All
            },
            balanced: self.model.balanced,
            bootstrap: true,
            seed: self.model.seed,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load the configured data source.
    pub fn load_data(&self) -> Result<Dataset> {
        match (&self.data.system_prices, &self.data.day_ahead_prices, &self.data.path) {
            (Some(system), Some(day_ahead), _) => data::load_merged_prices(system, day_ahead),
            (Some(system), None, _) => data::load_system_prices(system),
            (None, _, Some(path)) => data::load_csv(path, &self.to_data_config()),
            (None, _, None) => Err(Error::ConfigError(
                "[data] needs either 'path' or 'system_prices'".to_string(),
            )),
        }
    }

    /// Label, prepare features and evaluate an already loaded dataset.
    pub fn evaluate(&self, dataset: &Dataset, show_progress: bool) -> Result<EvaluationReport> {
        let target = self.to_target_config()?;
        let mut walkforward = self.to_walkforward_config()?;
        walkforward.show_progress = show_progress;
        let forest = self.to_forest_config()?;

        let labelled = construct_target_with(dataset, dataset.time_column(), &target)?;
        let (prepared, feature_names) = prepare_features(&labelled, &self.to_feature_config())?;
        let feature_refs: Vec<&str> = feature_names.iter().map(String::as_str).collect();

        WalkForwardEvaluator::new(walkforward).evaluate(
            &prepared,
            &feature_refs,
            &target.label_column,
            move || Box::new(RandomForest::new(forest.clone())) as Box<dyn ProbabilityModel>,
        )
    }

    /// Load the data and run the full pipeline.
    pub fn run(&self, show_progress: bool) -> Result<EvaluationReport> {
        let dataset = self.load_data()?;
        self.evaluate(&dataset, show_progress)
    }

    /// Generate an example configuration file content.
    pub fn example() -> String {
        r#"# Heron evaluation configuration

[data]
# A single CSV with a time column and numeric columns...
path = "data/prices.csv"
time_column = "datetime"
# date_format = "%Y-%m-%d %H:%M:%S"
# ...or a system price export, optionally joined with day-ahead prices
# system_prices = "data/system_prices.csv"
# day_ahead_prices = "data/n2ex_prices.csv"

[target]
price_column = "system_price"
horizon_periods = 24          # rows scanned ahead of each row
positive_threshold = 0.03     # +3% rise
negative_threshold = -0.03    # -3% fall
label_column = "forecast"

[features]
columns = ["net_imbalance_volume"]
calendar = true               # hour, month, dayofweek
normalize = true
impute = true

[evaluation]
fold_width = "month"          # month, week, day or <n>h
eval_start = "2018-02-01"
precision_threshold = 0.7
positive_class = "positive"
min_train_rows = 1
parallel = false

[model]
n_trees = 200
# max_depth = 12
min_samples_split = 2
min_samples_leaf = 1
sqrt_features = true
balanced = true
seed = 42
"#
        .to_string()
    }
}
