//! Performance benchmarks for labeling, scoring and the random forest.
//!
//! Run with: cargo bench

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use heron::dataset::Dataset;
use heron::labeling::{construct_target, forward_extrema};
use heron::model::{ForestConfig, ProbabilityModel, RandomForest};
use heron::scoring::score;
use heron::types::Label;

/// Synthetic half-hourly prices with occasional gaps.
fn generate_prices(count: usize) -> Vec<Option<f64>> {
    let mut price = 50.0;
    (0..count)
        .map(|i| {
            let noise = ((i as f64 * 0.7).sin() * 2.0 + (i as f64 * 1.3).cos()) * 0.5;
            price = (price + noise).max(5.0);
            if i % 97 == 0 {
                None
            } else {
                Some(price)
            }
        })
        .collect()
}

fn generate_dataset(count: usize) -> Dataset {
    let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
    let timestamps: Vec<DateTime<Utc>> = (0..count)
        .map(|i| start + Duration::minutes(30 * i as i64))
        .collect();
    Dataset::new("datetime", timestamps)
        .with_column("price", generate_prices(count))
        .unwrap()
}

/// Benchmark window extrema and full target construction.
fn bench_labeling(c: &mut Criterion) {
    let mut group = c.benchmark_group("labeling");

    let prices = generate_prices(10_000);
    for horizon in [6, 24, 96].iter() {
        group.bench_with_input(
            BenchmarkId::new("forward_extrema", horizon),
            horizon,
            |b, &horizon| b.iter(|| forward_extrema(black_box(&prices), horizon)),
        );
    }

    for size in [1_000, 10_000, 50_000].iter() {
        let data = generate_dataset(*size);
        group.bench_with_input(
            BenchmarkId::new("construct_target", size),
            &data,
            |b, data| {
                b.iter(|| construct_target(black_box(data), "datetime", "price", 24, 0.03, -0.03))
            },
        );
    }

    group.finish();
}

/// Benchmark fold scoring.
fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");

    for size in [500, 2_000, 10_000].iter() {
        let labels: Vec<Label> = (0..*size).map(|i| Label::CLASSES[i % 4]).collect();
        let probabilities: Vec<Vec<f64>> = (0..*size)
            .map(|i| {
                let raw: Vec<f64> = (0..4)
                    .map(|c| ((i * 7 + c * 13) % 29) as f64 + 1.0)
                    .collect();
                let total: f64 = raw.iter().sum();
                raw.iter().map(|r| r / total).collect()
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("score", size), size, |b, _| {
            b.iter(|| {
                score(
                    black_box(&probabilities),
                    black_box(&labels),
                    &Label::CLASSES,
                    Label::Positive,
                    Some(1),
                    0.7,
                )
            })
        });
    }

    group.finish();
}

/// Benchmark random forest fitting.
fn bench_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("forest");
    group.sample_size(10);

    let rows: Vec<Vec<f64>> = (0..2_000)
        .map(|i| {
            let x = i as f64;
            vec![(x * 0.1).sin(), (x * 0.37).cos(), (i % 24) as f64 / 23.0]
        })
        .collect();
    let labels: Vec<Label> = rows
        .iter()
        .map(|r| match (r[0] > 0.0, r[1] > 0.0) {
            (true, true) => Label::Volatile,
            (true, false) => Label::Positive,
            (false, true) => Label::Negative,
            (false, false) => Label::Stable,
        })
        .collect();

    group.bench_function("fit_fast_2000", |b| {
        b.iter(|| {
            let mut forest = RandomForest::new(ForestConfig::fast());
            forest.fit(black_box(&rows), black_box(&labels))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_labeling, bench_scoring, bench_forest);

criterion_main!(benches);
