//! Minimal evaluation driver and function registry
//!
//! [`Problem`] stands in for the benchmark-function collaborator: it counts
//! evaluations, keeps best-so-far values, builds the
//! [`EvaluationContext`] and notifies its logger. Objective functions come
//! from an explicit, caller-owned [`FunctionRegistry`].
//!
//! ## Usage
//!
//! ```rust
//! use benchlog::context::ProblemMeta;
//! use benchlog::logger::{shared, Store};
//! use benchlog::problem::FunctionRegistry;
//! use benchlog::property::RawY;
//! use benchlog::trigger::Always;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register("sphere", |x: &[f64]| x.iter().map(|v| v * v).sum())?;
//!
//! let mut store = Store::new(Always);
//! store.attach(RawY::new())?;
//! let store = shared(store);
//!
//! let mut problem = registry.create("sphere", ProblemMeta::new(1, "sphere", 2))?;
//! problem.attach_logger(store.clone())?;
//! problem.evaluate(&[1.0, 2.0])?;
//! problem.detach_logger()?;
//!
//! assert_eq!(store.lock().record_count(), 1);
//! # Ok::<(), benchlog::Error>(())
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::logger::Logger;
use crate::{Error, Result};

/// Objective function: decision vector to raw objective value.
pub type Objective = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Transformation applied to raw values before the algorithm sees them.
pub type Transform = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Constraint: decision vector to violation (`0` when satisfied).
pub type Constraint = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Explicit name to objective mapping, populated by the caller.
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, Objective>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateName` if `name` is already registered.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> Result<()>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    /// Objective registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Objective> {
        self.functions.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Problem evaluating the function `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an unknown name.
    pub fn create(&self, name: &str, meta: ProblemMeta) -> Result<Problem> {
        let objective = self
            .get(name)
            .ok_or_else(|| Error::Configuration(format!("no function registered as {name:?}")))?;
        Ok(Problem::new(meta, objective))
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

/// Evaluation driver notifying an attached logger.
pub struct Problem {
    meta: ProblemMeta,
    objective: Objective,
    transform: Option<Transform>,
    constraints: Vec<Constraint>,
    logger: Option<Box<dyn Logger>>,
    run: RunId,
    evaluations: u64,
    raw_y_best: f64,
    transformed_y_best: f64,
    logger_errors: u64,
}

impl Problem {
    /// Create a problem; the first run is `RunId(0)`.
    #[must_use]
    pub fn new(meta: ProblemMeta, objective: Objective) -> Self {
        let worst = meta.direction.worst();
        Self {
            meta,
            objective,
            transform: None,
            constraints: Vec::new(),
            logger: None,
            run: RunId(0),
            evaluations: 0,
            raw_y_best: worst,
            transformed_y_best: worst,
            logger_errors: 0,
        }
    }

    /// Apply `transform` to raw values before reporting them.
    #[must_use]
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Number runs from `run` instead of `RunId(0)`. Loggers shared by
    /// several problems need run ids that are unique across all of them.
    #[must_use]
    pub const fn with_first_run(mut self, run: RunId) -> Self {
        self.run = run;
        self
    }

    /// Add a constraint; its violation is reported with every evaluation.
    #[must_use]
    pub fn with_constraint<F>(mut self, constraint: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        self.constraints.push(Arc::new(constraint));
        self
    }

    /// Problem metadata.
    #[must_use]
    pub const fn meta(&self) -> &ProblemMeta {
        &self.meta
    }

    /// Current run.
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    /// Evaluations performed in the current run.
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Best transformed value of the current run.
    #[must_use]
    pub const fn best(&self) -> f64 {
        self.transformed_y_best
    }

    /// Logger errors swallowed so far (each was reported via `tracing`).
    #[must_use]
    pub const fn logger_errors(&self) -> u64 {
        self.logger_errors
    }

    /// Attach `logger` and start the current run on it. A previously
    /// attached logger is detached first (its run is ended).
    ///
    /// A recoverable run-start error (for example one closed sink inside a
    /// [`Combine`](crate::logger::Combine)) keeps the logger attached and is
    /// counted in [`Problem::logger_errors`].
    ///
    /// # Errors
    ///
    /// Returns a non-recoverable run-start error; the logger is dropped.
    pub fn attach_logger(&mut self, logger: impl Logger + 'static) -> Result<()> {
        self.detach_logger()?;
        let mut logger: Box<dyn Logger> = Box::new(logger);
        let started = logger.on_run_start(self.run, &self.meta);
        self.absorb("run start", started)?;
        debug!(run = self.run.0, problem = self.meta.problem_id, "logger attached");
        self.logger = Some(logger);
        Ok(())
    }

    /// End the current run on the attached logger and detach it.
    ///
    /// # Errors
    ///
    /// Returns a non-recoverable run-end error; the logger is dropped.
    pub fn detach_logger(&mut self) -> Result<Option<Box<dyn Logger>>> {
        match self.logger.take() {
            Some(mut logger) => {
                let ended = logger.on_run_end(self.run);
                self.absorb("run end", ended)?;
                Ok(Some(logger))
            }
            None => Ok(None),
        }
    }

    fn absorb(&mut self, event: &str, result: Result<()>) -> Result<()> {
        match result {
            Err(e) if e.is_recoverable() => {
                self.logger_errors += 1;
                warn!(run = self.run.0, event, error = %e, "logger error");
                Ok(())
            }
            other => other,
        }
    }

    /// Evaluate `x` and notify the logger.
    ///
    /// Logger errors never fail the evaluation: they are reported with
    /// `tracing` and counted in [`Problem::logger_errors`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `x` does not have the problem's
    /// dimension.
    pub fn evaluate(&mut self, x: &[f64]) -> Result<f64> {
        if x.len() != self.meta.dimension {
            return Err(Error::Configuration(format!(
                "expected a {}-dimensional point, got {}",
                self.meta.dimension,
                x.len()
            )));
        }
        self.evaluations += 1;
        let raw_y = (self.objective)(x);
        let transformed_y = self.transform.as_ref().map_or(raw_y, |t| t(raw_y));
        let direction = self.meta.direction;
        if direction.improves(transformed_y, self.transformed_y_best) {
            self.transformed_y_best = transformed_y;
            self.raw_y_best = raw_y;
        }

        if let Some(logger) = self.logger.as_mut() {
            let violations: Vec<f64> = self.constraints.iter().map(|c| c(x)).collect();
            let ctx = EvaluationContext::builder(&self.meta, self.run, self.evaluations)
                .raw_y(raw_y)
                .transformed_y(transformed_y)
                .raw_y_best(self.raw_y_best)
                .transformed_y_best(self.transformed_y_best)
                .x(x)
                .violations(&violations)
                .build();
            if let Err(e) = logger.on_observation(&ctx) {
                self.logger_errors += 1;
                warn!(run = self.run.0, evaluations = self.evaluations, error = %e, "logger error");
            }
        }
        Ok(transformed_y)
    }

    /// End the current run and start the next one.
    ///
    /// The problem always moves to the next run, whatever the logger
    /// reports. Recoverable logger errors are counted in
    /// [`Problem::logger_errors`].
    ///
    /// # Errors
    ///
    /// Returns the logger's non-recoverable run-end or run-start error,
    /// after the problem entered the next run.
    pub fn reset(&mut self) -> Result<()> {
        let previous = self.run;
        self.run = previous.next();
        self.evaluations = 0;
        self.raw_y_best = self.meta.direction.worst();
        self.transformed_y_best = self.raw_y_best;
        debug!(run = self.run.0, "problem reset");

        let Some(logger) = self.logger.as_mut() else {
            return Ok(());
        };
        let ended = logger.on_run_end(previous);
        let started = logger.on_run_start(self.run, &self.meta);
        let ended = self.absorb("run end", ended);
        let started = self.absorb("run start", started);
        ended.and(started)
    }
}

impl std::fmt::Debug for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Problem")
            .field("meta", &self.meta)
            .field("run", &self.run)
            .field("evaluations", &self.evaluations)
            .field("best", &self.transformed_y_best)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Direction;
    use crate::logger::{shared, Store};
    use crate::property::{RawY, TransformedYBest, Violation};
    use crate::trigger::Always;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| v * v).sum()
    }

    #[test]
    fn test_registry_rejects_duplicates_and_unknown_names() {
        let mut registry = FunctionRegistry::new();
        registry.register("sphere", sphere).unwrap();
        assert!(matches!(registry.register("sphere", sphere), Err(Error::DuplicateName(_))));
        assert!(matches!(
            registry.create("rosenbrock", ProblemMeta::new(8, "rosenbrock", 2)),
            Err(Error::Configuration(_))
        ));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["sphere"]);
    }

    #[test]
    fn test_evaluate_tracks_best_and_notifies_logger() {
        let mut store = Store::new(Always);
        store.attach(RawY::new()).unwrap();
        store.attach(TransformedYBest::new()).unwrap();
        store.attach(Violation::new(0)).unwrap();
        let store = shared(store);

        let mut problem = Problem::new(ProblemMeta::new(1, "sphere", 1), Arc::new(sphere))
            .with_transform(|y| y + 1.0)
            .with_constraint(|x| (x[0] - 2.0).max(0.0));
        problem.attach_logger(store.clone()).unwrap();
        for x in [3.0, 1.0, 2.0] {
            problem.evaluate(&[x]).unwrap();
        }
        assert!((problem.best() - 2.0).abs() < f64::EPSILON);
        problem.reset().unwrap();
        assert_eq!(problem.evaluations(), 0);
        problem.evaluate(&[0.5]).unwrap();
        problem.detach_logger().unwrap();

        let store = store.lock();
        assert_eq!(store.runs(), vec![RunId(0), RunId(1)]);
        let first = store.records(RunId(0)).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].get("violation").and_then(|v| v.as_f64()), Some(1.0));
        assert_eq!(first[2].get("transformed_y_best").and_then(|v| v.as_f64()), Some(2.0));
        assert_eq!(first[2].get("raw_y").and_then(|v| v.as_f64()), Some(4.0));
    }

    #[test]
    fn test_shared_logger_needs_distinct_run_ids() {
        let store = shared(Store::new(Always));
        let meta = ProblemMeta::new(1, "sphere", 1);

        let mut first = Problem::new(meta.clone(), Arc::new(sphere));
        first.attach_logger(store.clone()).unwrap();
        first.evaluate(&[1.0]).unwrap();
        first.detach_logger().unwrap();

        let mut reused = Problem::new(meta.clone(), Arc::new(sphere));
        reused.attach_logger(store.clone()).unwrap();
        reused.evaluate(&[3.0]).unwrap();
        reused.detach_logger().unwrap();
        assert_eq!(reused.logger_errors(), 3);
        assert_eq!(store.lock().record_count(), 1);

        let mut second = Problem::new(meta, Arc::new(sphere)).with_first_run(RunId(1));
        second.attach_logger(store.clone()).unwrap();
        second.evaluate(&[2.0]).unwrap();
        second.detach_logger().unwrap();
        assert_eq!(store.lock().runs(), vec![RunId(0), RunId(1)]);
    }

    /// Fails with an IO error when any run after the first starts.
    struct FailsLater;

    impl Logger for FailsLater {
        fn on_run_start(&mut self, run: RunId, _meta: &ProblemMeta) -> Result<()> {
            if run > RunId(0) {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }

        fn on_observation(&mut self, _ctx: &EvaluationContext<'_>) -> Result<()> {
            Ok(())
        }

        fn on_run_end(&mut self, _run: RunId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_reset_surfaces_hard_errors_after_advancing() {
        let mut problem = Problem::new(ProblemMeta::new(1, "sphere", 1), Arc::new(sphere));
        problem.attach_logger(FailsLater).unwrap();
        problem.evaluate(&[2.0]).unwrap();

        assert!(matches!(problem.reset(), Err(Error::Io(_))));
        assert_eq!(problem.run(), RunId(1));
        assert_eq!(problem.evaluations(), 0);
        assert_eq!(problem.logger_errors(), 0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut problem = Problem::new(
            ProblemMeta::new(1, "sphere", 3).direction(Direction::Minimize),
            Arc::new(sphere),
        );
        assert!(matches!(problem.evaluate(&[1.0]), Err(Error::Configuration(_))));
        assert_eq!(problem.evaluations(), 0);
    }
}
