//! Random Search Example
//!
//! Benchmarks uniform random search on two registered problems and logs
//! every improvement to an analyzer folder and an in-memory store.
//!
//! Run with: cargo run --example random_search -- [output-dir]
//! Set `RUST_LOG=benchlog=debug` to follow the run lifecycle.

use std::path::PathBuf;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use benchlog::context::{ProblemMeta, RunId};
use benchlog::logger::{shared, Analyzer, AnalyzerOptions, Combine, Logger, Store};
use benchlog::problem::{FunctionRegistry, Problem};
use benchlog::property::{Evaluations, TransformedYBest};
use benchlog::trigger::OnImprovement;

const RUNS: u64 = 5;
const BUDGET: u64 = 500;

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

fn rastrigin(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    10.0 * n
        + x.iter()
            .map(|v| v * v - 10.0 * (2.0 * std::f64::consts::PI * v).cos())
            .sum::<f64>()
}

fn search(problem: &mut Problem, rng: &mut StdRng) -> anyhow::Result<()> {
    let dimension = problem.meta().dimension;
    for run in 0..RUNS {
        if run > 0 {
            problem.reset()?;
        }
        for _ in 0..BUDGET {
            let x: Vec<f64> = (0..dimension).map(|_| rng.gen_range(-5.0..5.0)).collect();
            problem.evaluate(&x)?;
        }
        println!(
            "   {} run {}: best {:.6}",
            problem.meta().name,
            problem.run(),
            problem.best()
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchlog=info")),
        )
        .with_target(false)
        .init();

    let root = std::env::args()
        .nth(1)
        .map_or_else(|| std::env::temp_dir().join("benchlog-demo"), PathBuf::from);
    println!("=== benchlog Random Search ===\n");

    let mut registry = FunctionRegistry::new();
    registry.register("sphere", sphere)?;
    registry.register("rastrigin", rastrigin)?;

    let options = AnalyzerOptions::builder(&root)
        .folder("random-search")
        .algorithm("random-search", "uniform sampling in [-5, 5]^d")
        .attribute("budget", BUDGET.to_string())
        .build()?;
    let mut analyzer = Analyzer::new(OnImprovement::new(), options)
        .context("creating analyzer folder")?;
    analyzer.attach(TransformedYBest::new())?;
    let analyzer = shared(analyzer);

    let mut store = Store::new(OnImprovement::new());
    store.attach(Evaluations::new())?;
    store.attach(TransformedYBest::new())?;
    let store = shared(store);

    let mut rng = StdRng::seed_from_u64(2024);
    let mut first_run = RunId(0);
    for (id, name) in [(1, "sphere"), (3, "rastrigin")] {
        for dimension in [2, 5] {
            let mut loggers = Combine::new();
            loggers.attach(analyzer.clone());
            loggers.attach(store.clone());

            let meta = ProblemMeta::new(id, name, dimension).suite("demo");
            // Both loggers outlive the problem: run ids must not repeat.
            let mut problem = registry.create(name, meta)?.with_first_run(first_run);
            problem.attach_logger(loggers)?;
            search(&mut problem, &mut rng)?;
            problem.detach_logger()?;
            first_run = problem.run().next();
        }
    }

    let store = store.lock();
    println!(
        "\nStore: {} runs, {} records ({} observations seen)",
        store.run_count(),
        store.record_count(),
        store.stats().observations
    );
    println!(
        "Analyzer output: {}",
        analyzer.lock().sink().output_directory().display()
    );
    Ok(())
}
