//! Watcher capture benchmarks
//!
//! Cost of the observation path for the in-memory and flat-file sinks:
//! - Trigger evaluation only (nothing committed)
//! - Capture of several properties per committed record
//! - Flat-file row encoding

use benchlog::context::{EvaluationContext, ProblemMeta, RunId};
use benchlog::logger::{FlatFile, FlatFileOptions, Logger, Store};
use benchlog::property::{Evaluations, Position, RawY, RawYBest, TransformedY, TransformedYBest};
use benchlog::trigger::{Always, Each};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const OBSERVATIONS: u64 = 1_000;

fn attach_all<S: benchlog::logger::Sink>(watcher: &mut benchlog::logger::Watcher<S>) {
    watcher.attach(Evaluations::new()).unwrap();
    watcher.attach(RawY::new()).unwrap();
    watcher.attach(RawYBest::new()).unwrap();
    watcher.attach(TransformedY::new()).unwrap();
    watcher.attach(TransformedYBest::new()).unwrap();
    watcher.attach(Position::new()).unwrap();
}

fn points(dimension: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..OBSERVATIONS)
        .map(|_| (0..dimension).map(|_| rng.gen_range(-5.0..5.0)).collect())
        .collect()
}

fn drive(logger: &mut impl Logger, meta: &ProblemMeta, run: RunId, xs: &[Vec<f64>]) {
    logger.on_run_start(run, meta).unwrap();
    let mut best = f64::INFINITY;
    for (i, x) in xs.iter().enumerate() {
        let y: f64 = x.iter().map(|v| v * v).sum();
        best = best.min(y);
        let ctx = EvaluationContext::builder(meta, run, i as u64 + 1)
            .y(y)
            .y_best(best)
            .x(x)
            .build();
        logger.on_observation(&ctx).unwrap();
    }
    logger.on_run_end(run).unwrap();
}

/// Benchmark the in-memory store with sparse and full logging
fn bench_store_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_capture");
    let meta = ProblemMeta::new(1, "sphere", 10);
    let xs = points(10);

    for interval in [1_u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("each", interval), interval, |b, &k| {
            b.iter(|| {
                let mut store = Store::new(Each::new(k).unwrap());
                attach_all(&mut store);
                drive(&mut store, &meta, RunId(0), black_box(&xs));
                black_box(store.record_count())
            });
        });
    }

    group.finish();
}

/// Benchmark flat-file rows for growing dimensions
fn bench_flatfile_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatfile_rows");
    let dir = tempfile::tempdir().unwrap();

    for dimension in [2_usize, 20, 100].iter() {
        let xs = points(*dimension);
        let options = FlatFileOptions::builder(dir.path().join(format!("d{dimension}")))
            .store_positions(true)
            .build()
            .unwrap();
        let meta = ProblemMeta::new(1, "sphere", *dimension);
        group.bench_with_input(BenchmarkId::from_parameter(dimension), dimension, |b, _| {
            let mut logger = FlatFile::new(Always, options.clone()).unwrap();
            let mut run = 0_u64;
            b.iter(|| {
                drive(&mut logger, &meta, RunId(run), black_box(&xs));
                run += 1;
            });
            logger.close().unwrap();
        });
    }

    group.finish();
}

criterion_group!(benches, bench_store_capture, bench_flatfile_rows);
criterion_main!(benches);
