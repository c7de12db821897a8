//! Evaluation context - what a logger sees of one objective evaluation
//!
//! The context is owned by the caller (usually [`crate::problem::Problem`])
//! and lent read-only to every attached logger for the duration of a single
//! call. Loggers must not keep it past that call.
//!
//! ## Usage
//!
//! ```rust
//! use benchlog::context::{Direction, EvaluationContext, ProblemMeta, RunId};
//!
//! let meta = ProblemMeta::new(1, "sphere", 5).direction(Direction::Minimize);
//! let x = [0.1, 0.2, 0.3, 0.4, 0.5];
//! let ctx = EvaluationContext::builder(&meta, RunId(0), 1)
//!     .raw_y(0.55)
//!     .transformed_y(0.55)
//!     .x(&x)
//!     .build();
//!
//! assert_eq!(ctx.evaluations(), 1);
//! assert!((ctx.transformed_y_best() - 0.55).abs() < f64::EPSILON);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one independent run of an algorithm on a problem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl RunId {
    /// The run following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimization direction of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Smaller objective values are better.
    #[default]
    Minimize,
    /// Larger objective values are better.
    Maximize,
}

impl Direction {
    /// Whether `candidate` is strictly better than `incumbent`.
    ///
    /// NaN is never an improvement.
    #[must_use]
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Minimize => candidate < incumbent,
            Self::Maximize => candidate > incumbent,
        }
    }

    /// The worst possible value, used as the initial best-so-far.
    #[must_use]
    pub const fn worst(self) -> f64 {
        match self {
            Self::Minimize => f64::INFINITY,
            Self::Maximize => f64::NEG_INFINITY,
        }
    }

    /// Short label used in flat files ("min"/"max").
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Minimize => "min",
            Self::Maximize => "max",
        }
    }
}

/// Static description of the problem instance being evaluated.
///
/// Produced by the external problem collaborator; the logging layer only
/// reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemMeta {
    /// Suite the problem belongs to ("None" when used standalone).
    pub suite: String,
    /// Numeric problem identifier.
    pub problem_id: u32,
    /// Human readable function name.
    pub name: String,
    /// Instance identifier.
    pub instance: u32,
    /// Number of decision variables.
    pub dimension: usize,
    /// Optimization direction.
    pub direction: Direction,
    /// Known optimal objective value, if any.
    pub optimum: Option<f64>,
}

impl ProblemMeta {
    /// Suite name used when a problem is not part of a suite.
    pub const NO_SUITE: &'static str = "None";

    /// Create metadata for instance 1 of a minimization problem.
    #[must_use]
    pub fn new(problem_id: u32, name: impl Into<String>, dimension: usize) -> Self {
        Self {
            suite: Self::NO_SUITE.to_string(),
            problem_id,
            name: name.into(),
            instance: 1,
            dimension,
            direction: Direction::Minimize,
            optimum: None,
        }
    }

    /// Set the suite name.
    #[must_use]
    pub fn suite(mut self, suite: impl Into<String>) -> Self {
        self.suite = suite.into();
        self
    }

    /// Set the instance identifier.
    #[must_use]
    pub const fn instance(mut self, instance: u32) -> Self {
        self.instance = instance;
        self
    }

    /// Set the optimization direction.
    #[must_use]
    pub const fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the known optimum.
    #[must_use]
    pub const fn optimum(mut self, optimum: f64) -> Self {
        self.optimum = Some(optimum);
        self
    }
}

/// Read-only snapshot of one evaluation.
///
/// Borrowed from the caller: decision vector and constraint values are
/// slices into caller-owned storage.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    meta: &'a ProblemMeta,
    run: RunId,
    evaluations: u64,
    raw_y: f64,
    transformed_y: f64,
    raw_y_best: f64,
    transformed_y_best: f64,
    x: &'a [f64],
    violations: &'a [f64],
    penalties: &'a [f64],
}

impl<'a> EvaluationContext<'a> {
    /// Start building a context for evaluation number `evaluations` of `run`.
    #[must_use]
    pub fn builder(
        meta: &'a ProblemMeta,
        run: RunId,
        evaluations: u64,
    ) -> EvaluationContextBuilder<'a> {
        EvaluationContextBuilder::new(meta, run, evaluations)
    }

    /// Problem metadata.
    #[must_use]
    pub const fn meta(&self) -> &'a ProblemMeta {
        self.meta
    }

    /// Run this evaluation belongs to.
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    /// Number of evaluations performed so far in this run (this one included).
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Untransformed objective value of this evaluation.
    #[must_use]
    pub const fn raw_y(&self) -> f64 {
        self.raw_y
    }

    /// Objective value as seen by the algorithm.
    #[must_use]
    pub const fn transformed_y(&self) -> f64 {
        self.transformed_y
    }

    /// Untransformed value of the best solution so far.
    #[must_use]
    pub const fn raw_y_best(&self) -> f64 {
        self.raw_y_best
    }

    /// Best transformed value so far.
    #[must_use]
    pub const fn transformed_y_best(&self) -> f64 {
        self.transformed_y_best
    }

    /// Optimization direction of the problem.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.meta.direction
    }

    /// Evaluated decision vector.
    #[must_use]
    pub const fn x(&self) -> &'a [f64] {
        self.x
    }

    /// Constraint violations, one per constraint.
    #[must_use]
    pub const fn violations(&self) -> &'a [f64] {
        self.violations
    }

    /// Constraint penalties, one per constraint.
    #[must_use]
    pub const fn penalties(&self) -> &'a [f64] {
        self.penalties
    }
}

/// Builder for [`EvaluationContext`].
///
/// Best-so-far values default to the current values, which is correct for
/// the first evaluation of a run.
#[derive(Debug)]
pub struct EvaluationContextBuilder<'a> {
    meta: &'a ProblemMeta,
    run: RunId,
    evaluations: u64,
    raw_y: f64,
    transformed_y: f64,
    raw_y_best: Option<f64>,
    transformed_y_best: Option<f64>,
    x: &'a [f64],
    violations: &'a [f64],
    penalties: &'a [f64],
}

impl<'a> EvaluationContextBuilder<'a> {
    /// Create a new builder with required fields.
    #[must_use]
    pub const fn new(meta: &'a ProblemMeta, run: RunId, evaluations: u64) -> Self {
        Self {
            meta,
            run,
            evaluations,
            raw_y: f64::NAN,
            transformed_y: f64::NAN,
            raw_y_best: None,
            transformed_y_best: None,
            x: &[],
            violations: &[],
            penalties: &[],
        }
    }

    /// Set the raw objective value.
    #[must_use]
    pub const fn raw_y(mut self, y: f64) -> Self {
        self.raw_y = y;
        self
    }

    /// Set the transformed objective value.
    #[must_use]
    pub const fn transformed_y(mut self, y: f64) -> Self {
        self.transformed_y = y;
        self
    }

    /// Set both raw and transformed value (identity transformation).
    #[must_use]
    pub const fn y(self, y: f64) -> Self {
        self.raw_y(y).transformed_y(y)
    }

    /// Set the raw best-so-far value.
    #[must_use]
    pub const fn raw_y_best(mut self, y: f64) -> Self {
        self.raw_y_best = Some(y);
        self
    }

    /// Set the transformed best-so-far value.
    #[must_use]
    pub const fn transformed_y_best(mut self, y: f64) -> Self {
        self.transformed_y_best = Some(y);
        self
    }

    /// Set both best-so-far values (identity transformation).
    #[must_use]
    pub const fn y_best(self, y: f64) -> Self {
        self.raw_y_best(y).transformed_y_best(y)
    }

    /// Set the evaluated decision vector.
    #[must_use]
    pub const fn x(mut self, x: &'a [f64]) -> Self {
        self.x = x;
        self
    }

    /// Set constraint violations.
    #[must_use]
    pub const fn violations(mut self, violations: &'a [f64]) -> Self {
        self.violations = violations;
        self
    }

    /// Set constraint penalties.
    #[must_use]
    pub const fn penalties(mut self, penalties: &'a [f64]) -> Self {
        self.penalties = penalties;
        self
    }

    /// Build the context.
    #[must_use]
    pub fn build(self) -> EvaluationContext<'a> {
        EvaluationContext {
            meta: self.meta,
            run: self.run,
            evaluations: self.evaluations,
            raw_y: self.raw_y,
            transformed_y: self.transformed_y,
            raw_y_best: self.raw_y_best.unwrap_or(self.raw_y),
            transformed_y_best: self.transformed_y_best.unwrap_or(self.transformed_y),
            x: self.x,
            violations: self.violations,
            penalties: self.penalties,
        }
    }
}
