use choropleth_dashboard::models::ColumnHistogram;
use choropleth_dashboard::services::{bin_histogram, feature_histogram, BinOptions};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

/// Deterministic pseudo-outcomes spread over roughly [-5, 15].
fn outcomes(count: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            unit * 20.0 - 5.0
        })
        .collect()
}

fn bench_bin_histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_histogram");

    // A full county table is about 3k rows per series.
    for size in [100usize, 1_000, 3_137] {
        let inactive = outcomes(size, 1);
        let active = outcomes(size, 2);
        group.bench_with_input(BenchmarkId::new("counties", size), &size, |b, _| {
            b.iter(|| {
                bin_histogram(
                    black_box(&inactive),
                    black_box(&active),
                    &BinOptions::default(),
                )
            });
        });
    }

    group.finish();
}

fn bench_bin_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("bin_counts");

    let inactive = outcomes(3_137, 3);
    let active = outcomes(3_137, 4);
    for bins in [10usize, 40, 200] {
        let options = BinOptions {
            negative_inactive: true,
            highlight_active: Some(active[0]),
            highlight_inactive: Some(inactive[0]),
            ..BinOptions::with_bins(bins)
        };
        group.bench_with_input(BenchmarkId::new("bins", bins), &options, |b, options| {
            b.iter(|| bin_histogram(black_box(&inactive), black_box(&active), options));
        });
    }

    group.finish();
}

fn bench_feature_histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_histogram");

    let edges: Vec<f64> = (0..=50).map(|i| i as f64).collect();
    let filtered = ColumnHistogram {
        counts: (0..50).map(|i| (i % 7) as f64).collect(),
        bin_edges: edges.clone(),
    };
    let full = ColumnHistogram {
        counts: (0..50).map(|i| (i * 13 % 101) as f64).collect(),
        bin_edges: edges,
    };

    group.bench_function("linear", |b| {
        b.iter(|| feature_histogram(black_box(&filtered), Some(black_box(&full)), false));
    });
    group.bench_function("log_scale", |b| {
        b.iter(|| feature_histogram(black_box(&filtered), Some(black_box(&full)), true));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_bin_histogram,
    bench_bin_counts,
    bench_feature_histogram
);
criterion_main!(benches);
