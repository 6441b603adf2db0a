//! Property-based tests using proptest for invariant testing.
//!
//! These tests verify that:
//! 1. Finite excursions always map to exactly one trainable label
//! 2. Target construction never emits unknown labels or the final horizon rows
//! 3. Sliding-window extrema agree with a direct scan
//! 4. AUC and precision/recall curves stay in range
//! 5. Walk-forward folds are contiguous and strictly ordered in time

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use heron::dataset::Dataset;
use heron::labeling::{construct_target, forward_extrema, label_excursion, label_series};
use heron::scoring::{precision_recall_curve, roc_auc_binary, roc_auc_ovo_macro, AucScore};
use heron::types::Label;
use heron::walkforward::{FoldWidth, WalkForwardConfig, WalkForwardEvaluator};

// ============================================================================
// Label Rule Property Tests
// ============================================================================

fn excursion_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-1.0..0.0f64, -0.5..2.0f64)
}

fn threshold_strategy() -> impl Strategy<Value = (f64, f64)> {
    (-0.2..0.0f64, 0.0..0.2f64)
}

proptest! {
    #[test]
    fn finite_excursions_get_a_known_label(
        (fall, rise) in excursion_strategy(),
        (neg, pos) in threshold_strategy(),
    ) {
        let label = label_excursion(fall, rise, neg, pos);
        prop_assert!(label.is_known());

        let fell = fall <= neg;
        let rose = rise >= pos;
        let expected = match (fell, rose) {
            (true, true) => Label::Volatile,
            (true, false) => Label::Negative,
            (false, true) => Label::Positive,
            (false, false) => Label::Stable,
        };
        prop_assert_eq!(label, expected);
    }

    #[test]
    fn nan_excursions_are_unknown(
        (fall, rise) in excursion_strategy(),
        (neg, pos) in threshold_strategy(),
    ) {
        prop_assert_eq!(label_excursion(f64::NAN, rise, neg, pos), Label::Unknown);
        prop_assert_eq!(label_excursion(fall, f64::NAN, neg, pos), Label::Unknown);
    }
}

// ============================================================================
// Target Construction Property Tests
// ============================================================================

/// Positive prices with roughly one in eight missing.
fn price_series_strategy() -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(
        prop_oneof![7 => (1.0..500.0f64).prop_map(Some), 1 => Just(None)],
        1..120,
    )
}

fn hourly_timestamps(n: usize) -> Vec<DateTime<Utc>> {
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    (0..n).map(|i| start + Duration::hours(i as i64)).collect()
}

proptest! {
    #[test]
    fn target_rows_are_known_and_exclude_tail(
        prices in price_series_strategy(),
        horizon in 1usize..20,
    ) {
        let n = prices.len();
        let ts = hourly_timestamps(n);
        let data = Dataset::new("datetime", ts.clone())
            .with_column("price", prices)
            .unwrap();

        let labelled = construct_target(&data, "datetime", "price", horizon, 0.03, -0.03).unwrap();
        let labels = labelled.label_column("forecast").unwrap();

        prop_assert!(labels.iter().all(|l| l.is_known()));
        prop_assert!(labelled.len() <= n.saturating_sub(horizon));
        if n > horizon {
            let last_allowed = ts[n - 1 - horizon];
            prop_assert!(labelled.timestamps().iter().all(|t| *t <= last_allowed));
        }
        prop_assert!(labelled.column("price").unwrap().iter().all(|v| v.is_some()));
    }

    #[test]
    fn label_series_marks_tail_unknown(
        prices in price_series_strategy(),
        horizon in 1usize..20,
    ) {
        let labels = label_series(&prices, horizon, 0.03, -0.03).unwrap();
        prop_assert_eq!(labels.len(), prices.len());
        let tail = prices.len().saturating_sub(horizon);
        prop_assert!(labels[tail..].iter().all(|l| *l == Label::Unknown));
    }

    #[test]
    fn forward_extrema_matches_direct_scan(
        values in prop::collection::vec(prop::option::weighted(0.9, -100.0..100.0f64), 0..80),
        horizon in 1usize..12,
    ) {
        let windows = forward_extrema(&values, horizon);
        prop_assert_eq!(windows.len(), values.len());

        for (i, window) in windows.iter().enumerate() {
            let expected = if i + horizon < values.len() {
                let slice = &values[i + 1..=i + horizon];
                if slice.iter().all(|v| v.is_some()) {
                    let vs: Vec<f64> = slice.iter().flatten().copied().collect();
                    Some((
                        vs.iter().copied().fold(f64::INFINITY, f64::min),
                        vs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    ))
                } else {
                    None
                }
            } else {
                None
            };
            prop_assert_eq!(window.map(|w| (w.min, w.max)), expected);
        }
    }
}

// ============================================================================
// Scoring Property Tests
// ============================================================================

fn scored_rows_strategy() -> impl Strategy<Value = (Vec<bool>, Vec<f64>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n),
            prop::collection::vec(0.0..1.0f64, n),
        )
    })
}

fn label_strategy() -> impl Strategy<Value = Label> {
    prop::sample::select(Label::CLASSES.to_vec())
}

proptest! {
    #[test]
    fn binary_auc_in_unit_interval((truth, scores) in scored_rows_strategy()) {
        let has_both = truth.iter().any(|&t| t) && truth.iter().any(|&t| !t);
        match roc_auc_binary(&truth, &scores) {
            Some(auc) => {
                prop_assert!(has_both);
                prop_assert!((0.0..=1.0).contains(&auc));
                let flipped: Vec<bool> = truth.iter().map(|t| !t).collect();
                let other = roc_auc_binary(&flipped, &scores).unwrap();
                prop_assert!((auc + other - 1.0).abs() < 1e-9);
            }
            None => prop_assert!(!has_both),
        }
    }

    #[test]
    fn macro_auc_defined_or_undefined(
        labels in prop::collection::vec(label_strategy(), 1..40),
        seed in 0u64..1000,
    ) {
        let probabilities: Vec<Vec<f64>> = (0..labels.len())
            .map(|i| {
                let raw: Vec<f64> = (0..4)
                    .map(|c| (((i as u64 * 31 + c * 17 + seed) % 97) as f64) + 1.0)
                    .collect();
                let total: f64 = raw.iter().sum();
                raw.iter().map(|r| r / total).collect()
            })
            .collect();

        let distinct = heron::types::distinct_labels(&labels).len();
        match roc_auc_ovo_macro(&probabilities, &labels, &Label::CLASSES) {
            AucScore::Value(auc) => {
                prop_assert!(distinct >= 2);
                prop_assert!((0.0..=1.0).contains(&auc));
            }
            AucScore::Undefined => prop_assert!(distinct < 2),
        }
    }

    #[test]
    fn pr_curve_shape((truth, scores) in scored_rows_strategy()) {
        let curve = precision_recall_curve(&truth, &scores);
        prop_assert_eq!(curve.precision.len(), curve.thresholds.len() + 1);
        prop_assert_eq!(curve.recall.len(), curve.thresholds.len() + 1);
        prop_assert!(curve.thresholds.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(curve.recall.windows(2).all(|w| w[0] >= w[1]));
        prop_assert!(curve.precision.iter().all(|p| (0.0..=1.0).contains(p)));
        prop_assert_eq!(*curve.precision.last().unwrap(), 1.0);
        prop_assert_eq!(*curve.recall.last().unwrap(), 0.0);
    }
}

// ============================================================================
// Walk-Forward Partition Property Tests
// ============================================================================

fn gap_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..(3 * 24 * 60), 1..200)
}

fn fold_width_strategy() -> impl Strategy<Value = FoldWidth> {
    prop_oneof![
        (1u32..12).prop_map(FoldWidth::Hours),
        Just(FoldWidth::Day),
        Just(FoldWidth::Week),
        Just(FoldWidth::Month),
    ]
}

proptest! {
    #[test]
    fn folds_cover_rows_in_order(gaps in gap_strategy(), width in fold_width_strategy()) {
        let mut t = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let ts: Vec<DateTime<Utc>> = gaps
            .iter()
            .map(|g| {
                t += Duration::minutes(*g);
                t
            })
            .collect();
        let n = ts.len();
        let data = Dataset::new("datetime", ts.clone())
            .with_dense_column("x", vec![0.0; n])
            .unwrap();

        let evaluator = WalkForwardEvaluator::new(WalkForwardConfig::new(
            width,
            Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap(),
        ));
        let folds = evaluator.partition(&data).unwrap();

        prop_assert_eq!(folds.first().unwrap().rows.start, 0);
        prop_assert_eq!(folds.last().unwrap().rows.end, n);
        for pair in folds.windows(2) {
            prop_assert_eq!(pair[0].rows.end, pair[1].rows.start);
            prop_assert!(pair[0].max_timestamp < pair[1].min_timestamp);
            prop_assert!(pair[0].start < pair[1].start);
        }
        for fold in &folds {
            prop_assert!(!fold.is_empty());
            for &ts_row in &ts[fold.rows.clone()] {
                prop_assert_eq!(width.bucket_start(ts_row), fold.start);
            }
        }
    }
}
