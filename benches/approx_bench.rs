/// Benchmark suite for exact vs approximate execution
use approx_query_engine::engine::{ApproxQueryEngine, QueryOptions};
use approx_query_engine::query::classify;
use approx_query_engine::storage::{MemoryStorage, Record, RecordStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const RECORDS: i64 = 500_000;

fn engine() -> ApproxQueryEngine<MemoryStorage> {
    let mut rng = StdRng::seed_from_u64(42);
    let records = (0..RECORDS)
        .map(|i| {
            Record::new(
                i,
                rng.gen_range(10.0..1000.0),
                rng.gen_range(0..5),
                rng.gen_range(1..=100),
                i,
            )
        })
        .collect();
    let storage = MemoryStorage::with_store("sales.db", RecordStore::from_records("sales", records));
    ApproxQueryEngine::with_default_config(storage)
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_embedded", |b| {
        let sql = "SELECT APPROX(SUM(amount)) FROM sales GROUP BY region";
        b.iter(|| {
            let _ = classify(black_box(sql), &Default::default());
        });
    });
}

fn bench_scalar_paths(c: &mut Criterion) {
    let engine = engine();
    let sql = "SELECT SUM(amount) FROM sales";
    let mut group = c.benchmark_group("sum_amount");

    let cases = [
        ("exact", QueryOptions::default()),
        (
            "random_10pct",
            QueryOptions {
                sample_percent: Some(10.0),
                ..QueryOptions::default()
            },
        ),
        (
            "block_10pct",
            QueryOptions {
                sample_percent: None,
                block_size: Some(1000),
                ..QueryOptions::default()
            },
        ),
        (
            "clt_2pct_error",
            QueryOptions {
                error_threshold: Some(2.0),
                ..QueryOptions::default()
            },
        ),
    ];

    for (name, options) in cases.iter() {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let _ = engine.execute(black_box(sql), "sales.db", options);
            });
        });
    }
    group.finish();
}

fn bench_grouped(c: &mut Criterion) {
    let engine = engine();
    let sql = "SELECT AVG(amount) FROM sales GROUP BY region";
    let mut group = c.benchmark_group("avg_by_region");

    group.bench_function("exact", |b| {
        b.iter(|| {
            let _ = engine.execute(black_box(sql), "sales.db", &QueryOptions::default());
        });
    });

    let sampled = QueryOptions {
        sample_percent: Some(10.0),
        thread_count: Some(4),
        ..QueryOptions::default()
    };
    group.bench_function("random_10pct_4_threads", |b| {
        b.iter(|| {
            let _ = engine.execute(black_box(sql), "sales.db", &sampled);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_classify, bench_scalar_paths, bench_grouped);
criterion_main!(benches);
