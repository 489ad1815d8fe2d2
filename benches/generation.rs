//! Dataset generation and export benchmarks
//!
//! - Seeded generation at increasing lap counts
//! - CSV serialization
//! - MDF4 encoding
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jerez_telemetry::config::{Mdf4Metadata, StudyConfig};
use jerez_telemetry::mdf4::{encode_mdf4, Mdf4Header};
use jerez_telemetry::storage::csv_bytes;
use jerez_telemetry::telemetry::generate_dataset;

fn config(laps: u32) -> StudyConfig {
    StudyConfig::builder().laps_per_setup(laps).build()
}

/// Benchmark seeded dataset generation
fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_dataset");
    group.sample_size(20);

    for laps in [1_u32, 5, 10].iter() {
        let config = config(*laps);
        group.bench_with_input(BenchmarkId::from_parameter(laps), laps, |b, _| {
            b.iter(|| {
                let ds = generate_dataset(&config).unwrap();
                black_box(ds);
            });
        });
    }

    group.finish();
}

/// Benchmark CSV serialization of the published-size dataset
fn bench_csv(c: &mut Criterion) {
    let ds = generate_dataset(&config(10)).unwrap();
    c.bench_function("csv_bytes_20k_rows", |b| {
        b.iter(|| black_box(csv_bytes(&ds).unwrap()));
    });
}

/// Benchmark MDF4 encoding of the published-size dataset
fn bench_mdf4(c: &mut Criterion) {
    let ds = generate_dataset(&config(10)).unwrap();
    let start = Utc.with_ymd_and_hms(2025, 5, 4, 12, 0, 0).unwrap();
    let header = Mdf4Header::new(&Mdf4Metadata::default(), start);
    c.bench_function("encode_mdf4_20k_rows", |b| {
        b.iter(|| black_box(encode_mdf4(&ds, &header).unwrap()));
    });
}

criterion_group!(benches, bench_generation, bench_csv, bench_mdf4);
criterion_main!(benches);
