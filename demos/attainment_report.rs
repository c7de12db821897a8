//! Attainment Report Example
//!
//! Compares two step-size schedules of a (1+1) evolution strategy with
//! empirical attainment histograms, reading the step size through a watched
//! reference, and prints the resulting grids.
//!
//! Run with: cargo run --example attainment_report

use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use benchlog::context::ProblemMeta;
use benchlog::logger::eah::{Eah, EahConfig};
use benchlog::logger::{shared, Combine, Logger, Store};
use benchlog::problem::Problem;
use benchlog::property::{self, TransformedYBest};
use benchlog::trigger::{Any, Each, OnImprovement};

const CONFIG: &str = r#"{
    "evaluations": {"kind": "log10", "min": 1, "max": 10000, "size": 16},
    "values": {"kind": "log10", "min": 1e-8, "max": 100, "size": 20},
    "policy": "clamp"
}"#;

const RUNS: u64 = 10;
const BUDGET: u64 = 10_000;

fn ellipsoid(x: &[f64]) -> f64 {
    x.iter()
        .enumerate()
        .map(|(i, v)| 10f64.powi(i32::try_from(i).unwrap_or(0)) * v * v)
        .sum()
}

/// (1+1)-ES; `adapt` turns the 1/5th success rule on.
fn one_plus_one(
    problem: &mut Problem,
    sigma: &Arc<RwLock<f64>>,
    adapt: bool,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    let dimension = problem.meta().dimension;
    for run in 0..RUNS {
        if run > 0 {
            problem.reset()?;
        }
        *sigma.write() = 1.0;
        let mut parent: Vec<f64> = (0..dimension).map(|_| rng.gen_range(-3.0..3.0)).collect();
        let mut parent_y = problem.evaluate(&parent)?;
        while problem.evaluations() < BUDGET {
            let step = *sigma.read();
            let child: Vec<f64> = parent
                .iter()
                .map(|v| v + step * rng.gen_range(-1.0..1.0))
                .collect();
            let child_y = problem.evaluate(&child)?;
            let success = child_y <= parent_y;
            if success {
                parent = child;
                parent_y = child_y;
            }
            if adapt {
                *sigma.write() *= if success { 1.5 } else { 1.5_f64.powf(-0.25) };
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("benchlog=warn")),
        )
        .init();

    let config: EahConfig = serde_json::from_str(CONFIG)?;
    let meta = ProblemMeta::new(2, "ellipsoid", 5).optimum(0.0);
    let mut rng = StdRng::seed_from_u64(7);

    for (label, adapt) in [("fixed step", false), ("1/5th rule", true)] {
        let sigma = Arc::new(RwLock::new(1.0_f64));
        let eah = shared(config.build()?);

        let mut trace = Store::new(Any::new(vec![
            Box::new(Each::new(1_000)?),
            Box::new(OnImprovement::new()),
        ]));
        trace.attach(TransformedYBest::new())?;
        trace.attach(property::reference("sigma", &sigma))?;
        let trace = shared(trace);

        let mut loggers = Combine::new();
        loggers.attach(eah.clone());
        loggers.attach(trace.clone());

        let mut problem = Problem::new(meta.clone(), Arc::new(ellipsoid));
        problem.attach_logger(loggers)?;
        one_plus_one(&mut problem, &sigma, adapt, &mut rng)?;
        problem.detach_logger()?;

        let eah = eah.lock();
        println!("=== {label} ===");
        println!("{}", eah.render());
        println!(
            "volume {:.4}  weighted {:.4}  logged {}",
            eah.volume(),
            eah.weighted_volume(),
            eah.stats().committed
        );

        let trace = trace.lock();
        if let Some(last) = trace.runs().last().and_then(|run| trace.records(*run)?.last()) {
            println!(
                "last record: evals {}  sigma {}\n",
                last.evaluations(),
                last.get("sigma").map_or_else(|| "None".to_string(), ToString::to_string)
            );
        }
    }
    Ok(())
}
