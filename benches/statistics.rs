//! Hypothesis test benchmarks on the σ columns
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jerez_telemetry::config::StudyConfig;
use jerez_telemetry::report::StudyTables;
use jerez_telemetry::stats::{cohens_d, ks_two_sample, levene_test, welch_t_test};
use jerez_telemetry::telemetry::{generate_dataset, Channel, Setup};

/// Benchmark each two-sample test on 10k vs 10k observations
fn bench_tests(c: &mut Criterion) {
    let ds = generate_dataset(&StudyConfig::default()).unwrap();
    let b = ds.column(Setup::Baseline, Channel::Volatility);
    let o = ds.column(Setup::Optimized, Channel::Volatility);

    let mut group = c.benchmark_group("sigma_tests");
    group.bench_function("welch", |bench| bench.iter(|| black_box(welch_t_test(b, o).unwrap())));
    group.bench_function("cohens_d", |bench| bench.iter(|| black_box(cohens_d(b, o).unwrap())));
    group.bench_function("levene", |bench| bench.iter(|| black_box(levene_test(b, o).unwrap())));
    group.bench_function("ks", |bench| bench.iter(|| black_box(ks_two_sample(b, o).unwrap())));
    group.finish();
}

/// Benchmark building every table
fn bench_tables(c: &mut Criterion) {
    let config = StudyConfig::default();
    let ds = generate_dataset(&config).unwrap();
    c.bench_function("study_tables", |bench| {
        bench.iter(|| {
            black_box(
                StudyTables::compute(&ds, config.samples_per_lap(), config.significance_level)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_tests, bench_tables);
criterion_main!(benches);
