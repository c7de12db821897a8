//! Trigger scenarios through a full logger pipeline

use benchlog::context::{Direction, EvaluationContext, ProblemMeta, RunId};
use benchlog::logger::{Logger, Store};
use benchlog::property::{Evaluations, TransformedYBest};
use benchlog::trigger::{All, Always, Any, At, During, Each, OnDeltaImprovement, OnImprovement, OnViolation, Trigger};

// =============================================================================
// Helpers
// =============================================================================

/// Replay `(evaluations, y)` pairs as one run, best-so-far computed here.
fn replay(trigger: impl Trigger + 'static, meta: &ProblemMeta, run: RunId, points: &[(u64, f64)]) -> Store {
    let mut store = Store::new(trigger);
    store.attach(Evaluations::new()).unwrap();
    store.attach(TransformedYBest::new()).unwrap();
    store.on_run_start(run, meta).unwrap();
    let mut best = meta.direction.worst();
    for &(evals, y) in points {
        if meta.direction.improves(y, best) {
            best = y;
        }
        let ctx = EvaluationContext::builder(meta, run, evals).y(y).y_best(best).build();
        store.on_observation(&ctx).unwrap();
    }
    store.on_run_end(run).unwrap();
    store
}

fn logged_evaluations(store: &Store, run: RunId) -> Vec<u64> {
    store
        .cursor(run)
        .map(|cursor| cursor.map(|r| r.evaluations()).collect())
        .unwrap_or_default()
}

const DECREASING: [(u64, f64); 3] = [(1, 10.0), (5, 5.0), (10, 1.0)];

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_on_improvement_logs_every_strict_improvement() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let store = replay(OnImprovement::new(), &meta, RunId(0), &DECREASING);
    assert_eq!(store.record_count(), 3);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![1, 5, 10]);
}

#[test]
fn test_each_five_logs_multiples_only() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let store = replay(Each::new(5).unwrap(), &meta, RunId(0), &DECREASING);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![5, 10]);
}

#[test]
fn test_on_improvement_skips_plateaus_and_regressions() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let points = [(1, 3.0), (2, 3.0), (3, 4.0), (4, 2.0), (5, 2.0)];
    let store = replay(OnImprovement::new(), &meta, RunId(0), &points);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![1, 4]);
}

#[test]
fn test_on_improvement_respects_maximization() {
    let meta = ProblemMeta::new(1, "onemax", 8).direction(Direction::Maximize);
    let points = [(1, 2.0), (2, 1.0), (3, 5.0)];
    let store = replay(OnImprovement::new(), &meta, RunId(0), &points);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![1, 3]);
}

#[test]
fn test_on_delta_improvement_ignores_small_steps() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let points = [(1, 10.0), (2, 9.95), (3, 9.0), (4, 8.99)];
    let store = replay(OnDeltaImprovement::new(0.1), &meta, RunId(0), &points);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![1, 3]);
}

#[test]
fn test_at_fires_once_per_point_per_run() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let mut store = Store::new(At::new([2, 4]).unwrap());
    store.attach(Evaluations::new()).unwrap();
    for run in [RunId(0), RunId(1)] {
        store.on_run_start(run, &meta).unwrap();
        for evals in [1, 2, 2, 3, 4] {
            let ctx = EvaluationContext::builder(&meta, run, evals).y(1.0).build();
            store.on_observation(&ctx).unwrap();
        }
        store.on_run_end(run).unwrap();
    }
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![2, 4]);
    assert_eq!(logged_evaluations(&store, RunId(1)), vec![2, 4]);
}

#[test]
fn test_combinators() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let points: Vec<(u64, f64)> = (1..=20).map(|e| (e, 100.0 - e as f64)).collect();

    let all = All::new(vec![
        Box::new(OnImprovement::new()),
        Box::new(During::new([(1, 4), (18, 21)]).unwrap()),
    ]);
    let store = replay(all, &meta, RunId(0), &points);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![1, 2, 3, 18, 19, 20]);

    let any = Any::new(vec![Box::new(Each::new(10).unwrap()), Box::new(At::new([3]).unwrap())]);
    let store = replay(any, &meta, RunId(0), &points);
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![3, 10, 20]);

    let store = replay(All::default(), &meta, RunId(0), &points);
    assert_eq!(store.record_count(), 20);
    let store = replay(Any::default(), &meta, RunId(0), &points);
    assert_eq!(store.record_count(), 0);
}

#[test]
fn test_on_violation_uses_first_constraint() {
    let meta = ProblemMeta::new(1, "constrained", 1);
    let mut store = Store::new(OnViolation::new());
    store.attach(Evaluations::new()).unwrap();
    store.on_run_start(RunId(0), &meta).unwrap();
    for (evals, violation) in [(1, 0.0), (2, 0.5), (3, 0.0), (4, 2.0)] {
        let violations = [violation];
        let ctx = EvaluationContext::builder(&meta, RunId(0), evals)
            .y(1.0)
            .violations(&violations)
            .build();
        store.on_observation(&ctx).unwrap();
    }
    store.on_run_end(RunId(0)).unwrap();
    assert_eq!(logged_evaluations(&store, RunId(0)), vec![2, 4]);
}

#[test]
fn test_trigger_state_resets_between_runs() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let mut store = Store::new(OnImprovement::new());
    store.attach(Evaluations::new()).unwrap();
    for run in [RunId(0), RunId(1)] {
        store.on_run_start(run, &meta).unwrap();
        for (evals, y) in DECREASING {
            let ctx = EvaluationContext::builder(&meta, run, evals).y(y).build();
            store.on_observation(&ctx).unwrap();
        }
        store.on_run_end(run).unwrap();
    }
    assert_eq!(logged_evaluations(&store, RunId(1)), vec![1, 5, 10]);
}

#[test]
fn test_always_logs_everything() {
    let meta = ProblemMeta::new(1, "sphere", 2);
    let store = replay(Always, &meta, RunId(4), &DECREASING);
    assert_eq!(store.records(RunId(4)).map(<[_]>::len), Some(3));
}
