//! Heron - forecasting labels and walk-forward evaluation for price series.
//!
//! # Overview
//!
//! Heron turns an irregular, time-stamped price series into a four-class
//! forecasting target and measures how well a classifier predicts it with
//! expanding-window backtests:
//!
//! - **Labeling**: scan the next `h` rows of each row and label the price move
//!   `positive`, `negative`, `volatile` or `stable`
//! - **Walk-forward evaluation**: time-bucketed test folds, each trained on
//!   strictly earlier rows
//! - **Scoring**: macro one-vs-one AUC plus a precision-floor operating point
//!   for one class
//! - **Built-in model**: a balanced random forest, or any type implementing
//!   [`ProbabilityModel`]
//! - **Configuration files**: TOML-based configuration for reproducible runs
//!
//! # Quick Start
//!
//! ```no_run
//! use heron::data::{load_csv, DataConfig};
//! use heron::features::{prepare_features, FeatureConfig};
//! use heron::labeling::construct_target;
//! use heron::model::{ProbabilityModel, RandomForest};
//! use heron::walkforward::{WalkForwardConfig, WalkForwardEvaluator};
//!
//! let data = load_csv("data/prices.csv", &DataConfig::default()).unwrap();
//!
//! // Label each row from the next 24 rows with +/-3% thresholds
//! let labelled = construct_target(&data, "datetime", "price", 24, 0.03, -0.03).unwrap();
//!
//! let (prepared, features) = prepare_features(&labelled, &FeatureConfig::default()).unwrap();
//! let features: Vec<&str> = features.iter().map(String::as_str).collect();
//!
//! let evaluator = WalkForwardEvaluator::new(WalkForwardConfig::default());
//! let report = evaluator
//!     .evaluate(&prepared, &features, "forecast", || {
//!         Box::new(RandomForest::default_forest()) as Box<dyn ProbabilityModel>
//!     })
//!     .unwrap();
//!
//! for fold in &report.results {
//!     println!("{}: auc={} precision={:?}", fold.fold, fold.auc, fold.precision);
//! }
//! ```
//!
//! # The label rule
//!
//! ```
//! use heron::labeling::label_excursion;
//! use heron::types::Label;
//!
//! // Fell 4% and rose 5% within the window
//! assert_eq!(label_excursion(-0.04, 0.05, -0.03, 0.03), Label::Volatile);
//! assert_eq!(label_excursion(f64::NAN, 0.05, -0.03, 0.03), Label::Unknown);
//! ```
//!
//! # Modules
//!
//! - [`types`]: The [`Label`] enum
//! - [`dataset`]: Time-indexed table with missing values
//! - [`data`]: CSV loading, system and day-ahead price loaders
//! - [`labeling`]: Forward windows, excursions and target construction
//! - [`features`]: Calendar features, normalisation and imputation
//! - [`model`]: The [`ProbabilityModel`] trait and [`RandomForest`]
//! - [`scoring`]: AUC and precision/recall operating points
//! - [`walkforward`]: Fold partitioning and walk-forward evaluation
//! - [`analytics`]: Report tables and JSON/CSV export
//! - [`config`]: TOML configuration file support

pub mod analytics;
pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod features;
pub mod labeling;
pub mod model;
pub mod scoring;
pub mod types;
pub mod walkforward;

// Re-exports for convenience
pub use analytics::ResultFormatter;
pub use config::EvaluationFileConfig;
pub use dataset::Dataset;
pub use error::{Error, Result};
pub use labeling::{construct_target, construct_target_with, label_excursion, TargetConfig};
pub use model::{ForestConfig, ProbabilityModel, RandomForest};
pub use scoring::{score, AucScore, FoldScores};
pub use types::Label;
pub use walkforward::{
    EvaluationReport, Fold, FoldResult, FoldWidth, WalkForwardConfig, WalkForwardEvaluator,
};
