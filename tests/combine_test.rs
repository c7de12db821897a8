//! Fan-out through Combine: delivery order, isolation and read-back

use std::sync::Arc;

use parking_lot::Mutex;

use benchlog::context::{EvaluationContext, ProblemMeta, RunId};
use benchlog::logger::eah::{Eah, Scale};
use benchlog::logger::{shared, Combine, Logger, Store};
use benchlog::problem::FunctionRegistry;
use benchlog::property::{Evaluations, RawY, TransformedYBest};
use benchlog::trigger::{Always, Each, OnImprovement};
use benchlog::Error;

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

#[test]
fn test_problem_drives_store_and_eah_across_runs() {
    let mut registry = FunctionRegistry::new();
    registry.register("sphere", sphere).unwrap();

    let mut every = Store::new(Always);
    every.attach(Evaluations::new()).unwrap();
    every.attach(RawY::new()).unwrap();
    let every = shared(every);

    let mut sparse = Store::new(Each::new(10).unwrap());
    sparse.attach(TransformedYBest::new()).unwrap();
    let sparse = shared(sparse);

    let eah = shared(Eah::new(
        Scale::linear(0.0, 40.0, 8).unwrap(),
        Scale::log10(1e-6, 1e2, 8).unwrap(),
    ));

    let mut loggers = Combine::new();
    loggers.attach(every.clone());
    loggers.attach(sparse.clone());
    loggers.attach(eah.clone());

    let mut problem = registry
        .create("sphere", ProblemMeta::new(1, "sphere", 2))
        .unwrap();
    problem.attach_logger(loggers).unwrap();
    for run in 0..3 {
        if run > 0 {
            problem.reset().unwrap();
        }
        for i in 1..=30 {
            let step = 2.0 / f64::from(i);
            problem.evaluate(&[step, step]).unwrap();
        }
    }
    problem.detach_logger().unwrap();
    assert_eq!(problem.logger_errors(), 0);

    let every = every.lock();
    assert_eq!(every.runs(), vec![RunId(0), RunId(1), RunId(2)]);
    assert_eq!(every.record_count(), 90);
    let mut cursor = every.cursor(RunId(2)).unwrap();
    assert_eq!(cursor.len(), 30);
    let first = cursor.next().unwrap();
    assert_eq!(first.evaluations(), 1);
    assert_eq!(first.get("raw_y").and_then(|v| v.as_f64()), Some(8.0));

    let sparse = sparse.lock();
    assert_eq!(sparse.record_count(), 9);
    let logged: Vec<u64> = sparse
        .cursor(RunId(1))
        .unwrap()
        .map(|r| r.evaluations())
        .collect();
    assert_eq!(logged, vec![10, 20, 30]);

    let eah = eah.lock();
    assert_eq!(eah.grid().runs(), 3);
    assert!(eah.volume() > 0.0);
}

#[test]
fn test_closed_run_logger_does_not_block_siblings() {
    let meta = ProblemMeta::new(1, "sphere", 2);

    // This store has already finished run 0.
    let mut stale = Store::new(Always);
    stale.on_run_start(RunId(0), &meta).unwrap();
    stale.on_run_end(RunId(0)).unwrap();
    let stale = shared(stale);

    let fresh = shared(Store::new(Always));
    let mut loggers = Combine::new();
    loggers.attach(stale.clone());
    loggers.attach(fresh.clone());

    match loggers.on_run_start(RunId(0), &meta) {
        Err(Error::Aggregate(errors)) => {
            assert_eq!(errors.len(), 1);
            assert!(matches!(errors[0], Error::ClosedRun(RunId(0))));
        }
        other => panic!("expected aggregate error, got {other:?}"),
    }

    for evals in 1..=3 {
        let ctx = EvaluationContext::builder(&meta, RunId(0), evals).y(1.0).build();
        let result = loggers.on_observation(&ctx);
        assert!(result.as_ref().is_err_and(Error::is_recoverable));
    }

    assert_eq!(fresh.lock().record_count(), 3);
    assert_eq!(stale.lock().record_count(), 0);
    assert_eq!(loggers.stats().committed, 3);
}

#[test]
fn test_detached_logger_stops_receiving() {
    let meta = ProblemMeta::new(1, "sphere", 1);
    let first = shared(Store::new(OnImprovement::new()));
    let second = shared(Store::new(OnImprovement::new()));

    let mut loggers = Combine::new();
    let first_id = loggers.attach(first.clone());
    loggers.attach(second.clone());
    assert_eq!(loggers.len(), 2);

    loggers.on_run_start(RunId(0), &meta).unwrap();
    let ctx = EvaluationContext::builder(&meta, RunId(0), 1).y(5.0).build();
    loggers.on_observation(&ctx).unwrap();

    assert!(loggers.detach(first_id).is_some());
    assert!(loggers.detach(first_id).is_none());
    let ctx = EvaluationContext::builder(&meta, RunId(0), 2).y(1.0).build();
    loggers.on_observation(&ctx).unwrap();
    loggers.on_run_end(RunId(0)).unwrap();

    assert_eq!(first.lock().record_count(), 1);
    assert_eq!(second.lock().record_count(), 2);
}

type SharedStore = Arc<Mutex<Store>>;

/// A store that already finished `closed`, next to an unused one.
fn stale_and_fresh(meta: &ProblemMeta, closed: RunId) -> (Combine, SharedStore, SharedStore) {
    let mut stale = Store::new(Always);
    stale.on_run_start(closed, meta).unwrap();
    stale.on_run_end(closed).unwrap();
    let stale = shared(stale);
    let fresh = shared(Store::new(Always));

    let mut loggers = Combine::new();
    loggers.attach(stale.clone());
    loggers.attach(fresh.clone());
    (loggers, stale, fresh)
}

#[test]
fn test_reset_advances_run_when_one_logger_fails() {
    let mut registry = FunctionRegistry::new();
    registry.register("sphere", sphere).unwrap();
    let meta = ProblemMeta::new(1, "sphere", 2);
    let (loggers, stale, fresh) = stale_and_fresh(&meta, RunId(1));

    let mut problem = registry.create("sphere", meta).unwrap();
    problem.attach_logger(loggers).unwrap();
    problem.evaluate(&[1.0, 1.0]).unwrap();
    problem.reset().unwrap();
    assert_eq!(problem.run(), RunId(1));
    assert_eq!(problem.logger_errors(), 1);

    for i in 1..=5 {
        problem.evaluate(&[f64::from(i), 0.0]).unwrap();
    }
    assert_eq!(problem.evaluations(), 5);
    problem.detach_logger().unwrap();
    assert_eq!(problem.logger_errors(), 7);

    let fresh = fresh.lock();
    assert_eq!(fresh.runs(), vec![RunId(0), RunId(1)]);
    assert_eq!(fresh.records(RunId(1)).map(<[_]>::len), Some(5));
    assert_eq!(stale.lock().records(RunId(0)).map(<[_]>::len), Some(1));
}

#[test]
fn test_attach_keeps_logger_when_one_child_is_closed() {
    let mut registry = FunctionRegistry::new();
    registry.register("sphere", sphere).unwrap();
    let meta = ProblemMeta::new(1, "sphere", 2);
    let (loggers, stale, fresh) = stale_and_fresh(&meta, RunId(0));

    let mut problem = registry.create("sphere", meta).unwrap();
    problem.attach_logger(loggers).unwrap();
    assert_eq!(problem.logger_errors(), 1);
    for i in 1..=3 {
        problem.evaluate(&[f64::from(i), 1.0]).unwrap();
    }

    assert_eq!(fresh.lock().current_run(), Some(RunId(0)));
    assert_eq!(fresh.lock().record_count(), 3);
    assert!(problem.detach_logger().unwrap().is_some());
    assert_eq!(problem.logger_errors(), 5);
    assert_eq!(fresh.lock().current_run(), None);
    assert_eq!(stale.lock().record_count(), 0);
}
