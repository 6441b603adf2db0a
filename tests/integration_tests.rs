//! Integration tests for labeling and walk-forward evaluation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use heron::config::EvaluationFileConfig;
use heron::data::{load_csv, load_merged_prices, DataConfig};
use heron::dataset::Dataset;
use heron::features::{prepare_features, FeatureConfig};
use heron::labeling::{construct_target, DEFAULT_LABEL_COLUMN};
use heron::model::{ForestConfig, ProbabilityModel, RandomForest};
use heron::scoring::AucScore;
use heron::types::Label;
use heron::walkforward::{FoldWidth, WalkForwardConfig, WalkForwardEvaluator};
use std::io::Write;
use tempfile::NamedTempFile;

/// Deterministic oscillating price every 6 hours from 2018-01-01.
fn create_synthetic_prices(rows: usize) -> Dataset {
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    let timestamps: Vec<DateTime<Utc>> = (0..rows)
        .map(|i| start + Duration::hours(6 * i as i64))
        .collect();
    let price: Vec<Option<f64>> = (0..rows)
        .map(|i| {
            let x = i as f64;
            Some(100.0 + 10.0 * (x / 8.0).sin() + 3.0 * (x * 1.7).cos())
        })
        .collect();
    let volume: Vec<Option<f64>> = (0..rows)
        .map(|i| if i % 17 == 0 { None } else { Some(((i * 37) % 100) as f64) })
        .collect();

    Dataset::new("datetime", timestamps)
        .with_column("price", price)
        .unwrap()
        .with_column("volume", volume)
        .unwrap()
}

fn small_forest() -> Box<dyn ProbabilityModel> {
    Box::new(RandomForest::new(ForestConfig {
        n_trees: 15,
        max_depth: Some(6),
        ..Default::default()
    }))
}

#[test]
fn test_full_pipeline_with_random_forest() {
    let data = create_synthetic_prices(360);
    let labelled = construct_target(&data, "datetime", "price", 4, 0.03, -0.03).unwrap();
    assert_eq!(labelled.len(), 360 - 4);

    let config = FeatureConfig {
        columns: vec!["volume".to_string()],
        ..Default::default()
    };
    let (prepared, names) = prepare_features(&labelled, &config).unwrap();
    let features: Vec<&str> = names.iter().map(String::as_str).collect();

    let evaluator = WalkForwardEvaluator::new(WalkForwardConfig::default());
    let report = evaluator
        .evaluate(&prepared, &features, DEFAULT_LABEL_COLUMN, small_forest)
        .unwrap();

    assert_eq!(report.skipped, vec!["2018-01"]);
    let folds: Vec<&str> = report.results.iter().map(|r| r.fold.as_str()).collect();
    assert_eq!(folds, vec!["2018-02", "2018-03"]);
    assert_eq!(report.model, "random_forest");
    // January is never tested but still trains February
    assert_eq!(report.results[0].train_rows, 31 * 4);

    for result in &report.results {
        if let AucScore::Value(auc) = result.auc {
            assert!((0.0..=1.0).contains(&auc));
        }
        if let Some(p) = result.precision {
            assert!(p >= 0.7);
            assert!(result.recall.is_some());
        }
    }
}

#[test]
fn test_training_never_overlaps_test_fold() {
    let data = create_synthetic_prices(360);
    let labelled = construct_target(&data, "datetime", "price", 2, 0.02, -0.02).unwrap();
    let (prepared, names) = prepare_features(&labelled, &FeatureConfig::default()).unwrap();
    let features: Vec<&str> = names.iter().map(String::as_str).collect();

    let config = WalkForwardConfig::new(
        FoldWidth::Week,
        Utc.with_ymd_and_hms(2018, 1, 15, 0, 0, 0).unwrap(),
    );
    let evaluator = WalkForwardEvaluator::new(config);
    let folds = evaluator.partition(&prepared).unwrap();
    let report = evaluator
        .evaluate(&prepared, &features, DEFAULT_LABEL_COLUMN, small_forest)
        .unwrap();

    let ts = prepared.timestamps();
    for result in &report.results {
        let fold = folds.iter().find(|f| f.id == result.fold).unwrap();
        assert!(fold.min_timestamp >= Utc.with_ymd_and_hms(2018, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(result.train_rows, fold.rows.start);
        assert!(ts[..result.train_rows].iter().all(|t| *t < fold.min_timestamp));
    }
    for id in &report.skipped {
        assert!(report.results.iter().all(|r| &r.fold != id));
    }
}

#[test]
fn test_label_scenario() {
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    let ts: Vec<DateTime<Utc>> = (0..4).map(|i| start + Duration::hours(i)).collect();
    let data = Dataset::new("datetime", ts.clone())
        .with_dense_column("price", vec![100.0, 105.0, 96.0, 102.0])
        .unwrap();

    let labelled = construct_target(&data, "datetime", "price", 2, 0.03, -0.03).unwrap();
    assert_eq!(labelled.timestamps(), &ts[..2]);
    assert_eq!(
        labelled.label_column("forecast").unwrap(),
        &[Label::Volatile, Label::Negative]
    );
}

#[test]
fn test_labelled_csv_roundtrip() {
    let data = create_synthetic_prices(40);
    let labelled = construct_target(&data, "datetime", "price", 3, 0.03, -0.03).unwrap();

    let file = NamedTempFile::with_suffix(".csv").unwrap();
    labelled.write_csv(file.path()).unwrap();
    let loaded = load_csv(file.path(), &DataConfig::default()).unwrap();

    assert_eq!(loaded.timestamps(), labelled.timestamps());
    assert_eq!(
        loaded.label_column("forecast").unwrap(),
        labelled.label_column("forecast").unwrap()
    );
    assert_eq!(loaded.column("volume").unwrap(), labelled.column("volume").unwrap());
}

fn write_system_prices(days: usize) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".csv").unwrap();
    writeln!(
        file,
        "Settlement Date,Settlement Period,System Sell Price(£/MWh),System Buy Price(£/MWh),Net Imbalance Volume(MWh)"
    )
    .unwrap();
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    for d in 0..days {
        let date = (start + Duration::days(d as i64)).format("%Y-%m-%d");
        for period in 1..=48 {
            let x = (d * 48 + period) as f64;
            let price = 50.0 + 8.0 * (x / 20.0).sin() + 2.0 * (x * 0.9).cos();
            let niv = 100.0 * (x / 7.0).cos();
            writeln!(file, "{},{},{:.2},{:.2},{:.1}", date, period, price, price + 1.0, niv).unwrap();
        }
    }
    file
}

fn write_day_ahead(days: usize) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".csv").unwrap();
    writeln!(file, "datetime,n2ex_price").unwrap();
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    for h in (0..days * 24).rev() {
        let ts = start + Duration::hours(h as i64);
        writeln!(file, "{},{:.2}", ts.format("%Y-%m-%d %H:%M:%S"), 45.0 + (h % 24) as f64).unwrap();
    }
    file
}

#[test]
fn test_merged_system_and_day_ahead_prices() {
    let system = write_system_prices(3);
    let day_ahead = write_day_ahead(3);
    let merged = load_merged_prices(system.path(), day_ahead.path()).unwrap();

    assert_eq!(merged.len(), 3 * 48);
    // 00:30 joins the 00:00 price, 01:00 joins the 01:00 price
    let n2ex = merged.column("n2ex_price").unwrap();
    assert_eq!(n2ex[0], Some(45.0));
    assert_eq!(n2ex[1], Some(46.0));
    assert_eq!(n2ex[2], Some(46.0));
}

#[test]
fn test_run_from_file_config() {
    let system = write_system_prices(45);
    let day_ahead = write_day_ahead(45);

    let mut config = EvaluationFileConfig::default();
    config.data.system_prices = Some(system.path().display().to_string());
    config.data.day_ahead_prices = Some(day_ahead.path().display().to_string());
    config.target.horizon_periods = 6;
    config.features.columns = vec!["net_imbalance_volume".to_string(), "n2ex_price".to_string()];
    config.evaluation.fold_width = "week".to_string();
    config.evaluation.eval_start = "2018-01-22".to_string();
    config.evaluation.parallel = true;
    config.model.n_trees = 10;
    config.model.max_depth = Some(5);

    let report = config.run(false).unwrap();
    assert!(!report.results.is_empty());
    assert!(!report.skipped.is_empty());
    assert!(report
        .results
        .windows(2)
        .all(|w| w[0].start < w[1].start));
}
