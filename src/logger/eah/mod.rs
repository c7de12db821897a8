//! Empirical Attainment Histogram
//!
//! The (evaluations, target) plane is discretized by two [`Scale`]s. Cell
//! `(e, v)` is attained by a run once the run has reached a target at least
//! as good as value bucket `v` within evaluation bucket `e` or earlier. The
//! grid counts, per cell, how many distinct runs attained it.
//!
//! ## Target
//!
//! With a known optimum the target is the error `|optimum - y_best|`
//! (always minimized); otherwise it is `y_best` itself, compared in the
//! problem's direction.
//!
//! ## Update
//!
//! Each run keeps a frontier `first[v]`: the earliest evaluation bucket at
//! which value bucket `v` was attained. Reaching `(e, v)` attains every
//! worse value bucket too, so the update walks from `v` toward the worse
//! end and stops at the first bucket already attained no later than `e`.
//! Every cell is incremented at most once per run.
//!
//! ## Usage
//!
//! ```rust
//! use benchlog::context::{EvaluationContext, ProblemMeta, RunId};
//! use benchlog::logger::eah::{stat, Eah, Scale};
//! use benchlog::logger::Logger;
//!
//! let mut eah = Eah::new(Scale::linear(0.0, 10.0, 10)?, Scale::log10(1e-2, 1e2, 4)?);
//!
//! let meta = ProblemMeta::new(1, "sphere", 2);
//! eah.on_run_start(RunId(0), &meta)?;
//! let ctx = EvaluationContext::builder(&meta, RunId(0), 10).y(1.0).build();
//! eah.on_observation(&ctx)?;
//! eah.on_run_end(RunId(0))?;
//!
//! assert!(stat::surface(eah.grid())[9] > 0.0);
//! # Ok::<(), benchlog::Error>(())
//! ```

mod scale;
pub mod stat;

pub use scale::{Scale, ScaleConfig, ScaleKind};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::{CaptureStats, Logger, RunTracker};
use crate::context::{Direction, EvaluationContext, ProblemMeta, RunId};
use crate::trigger::{OnImprovement, Trigger};
use crate::Result;

/// What to do with observations outside a scale's domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainPolicy {
    /// Discard the observation, count it as degraded, report `Error::Domain`.
    #[default]
    Reject,
    /// Map the observation to the nearest edge bucket.
    Clamp,
}

/// Serializable EAH configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EahConfig {
    /// Evaluation-count axis.
    pub evaluations: ScaleConfig,
    /// Target-value axis.
    pub values: ScaleConfig,
    /// Out-of-domain policy, shared by both axes.
    #[serde(default)]
    pub policy: DomainPolicy,
}

impl EahConfig {
    /// Validate both axes and build the engine.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for invalid scale parameters.
    pub fn build(&self) -> Result<Eah> {
        Ok(Eah::new(self.evaluations.build()?, self.values.build()?).with_policy(self.policy))
    }
}

/// Attained-run counts per (evaluation bucket, value bucket).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttainmentGrid {
    evaluation_buckets: usize,
    value_buckets: usize,
    runs: u64,
    cells: Vec<u64>,
}

impl AttainmentGrid {
    /// Empty grid.
    #[must_use]
    pub fn new(evaluation_buckets: usize, value_buckets: usize) -> Self {
        Self {
            evaluation_buckets,
            value_buckets,
            runs: 0,
            cells: vec![0; evaluation_buckets * value_buckets],
        }
    }

    /// Number of evaluation buckets.
    #[must_use]
    pub const fn evaluation_buckets(&self) -> usize {
        self.evaluation_buckets
    }

    /// Number of value buckets.
    #[must_use]
    pub const fn value_buckets(&self) -> usize {
        self.value_buckets
    }

    /// Number of runs started on this grid.
    #[must_use]
    pub const fn runs(&self) -> u64 {
        self.runs
    }

    /// Attained-run count of cell `(e, v)`.
    #[must_use]
    pub fn get(&self, e: usize, v: usize) -> u64 {
        self.cells[e * self.value_buckets + v]
    }

    /// Dense counts, row-major by evaluation bucket.
    #[must_use]
    pub fn cells(&self) -> &[u64] {
        &self.cells
    }

    /// Non-zero cells as `((e, v), count)`.
    pub fn attained(&self) -> impl Iterator<Item = ((usize, usize), u64)> + '_ {
        let width = self.value_buckets;
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(move |(i, &count)| ((i / width, i % width), count))
    }

    fn bump(&mut self, e: usize, v: usize) {
        self.cells[e * self.value_buckets + v] += 1;
    }
}

/// Logger aggregating observations into an [`AttainmentGrid`].
pub struct Eah {
    evaluations: Scale,
    values: Scale,
    policy: DomainPolicy,
    trigger: Box<dyn Trigger>,
    grid: AttainmentGrid,
    tracker: RunTracker,
    stats: CaptureStats,
    first: Vec<Option<usize>>,
    target: Target,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Error(f64),
    Value(Direction),
}

impl Eah {
    /// Create an engine logging improvements only, rejecting
    /// out-of-domain observations.
    #[must_use]
    pub fn new(evaluations: Scale, values: Scale) -> Self {
        Self {
            grid: AttainmentGrid::new(evaluations.size(), values.size()),
            first: vec![None; values.size()],
            evaluations,
            values,
            policy: DomainPolicy::Reject,
            trigger: Box::new(OnImprovement::new()),
            tracker: RunTracker::new(),
            stats: CaptureStats::default(),
            target: Target::Value(Direction::Minimize),
        }
    }

    /// Create an engine from a deserialized configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for invalid scale parameters.
    pub fn from_config(config: &EahConfig) -> Result<Self> {
        config.build()
    }

    /// Set the out-of-domain policy.
    #[must_use]
    pub const fn with_policy(mut self, policy: DomainPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the trigger (default: improvements only).
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.trigger = Box::new(trigger);
        self
    }

    /// Current grid.
    #[must_use]
    pub const fn grid(&self) -> &AttainmentGrid {
        &self.grid
    }

    /// Evaluation-count axis.
    #[must_use]
    pub const fn evaluation_scale(&self) -> &Scale {
        &self.evaluations
    }

    /// Target-value axis.
    #[must_use]
    pub const fn value_scale(&self) -> &Scale {
        &self.values
    }

    /// Out-of-domain policy.
    #[must_use]
    pub const fn policy(&self) -> DomainPolicy {
        self.policy
    }

    /// Fraction of (run, cell) pairs attained. See [`stat::volume`].
    #[must_use]
    pub fn volume(&self) -> f64 {
        stat::volume(&self.grid)
    }

    /// Attainment per evaluation bucket. See [`stat::surface`].
    #[must_use]
    pub fn surface(&self) -> Vec<f64> {
        stat::surface(&self.grid)
    }

    /// Volume weighted by raw bucket widths. See [`stat::weighted_volume`].
    #[must_use]
    pub fn weighted_volume(&self) -> f64 {
        stat::weighted_volume(&self.grid, &self.evaluations, &self.values)
    }

    /// Plain-text grid picture. See [`stat::render`].
    #[must_use]
    pub fn render(&self) -> String {
        stat::render(&self.grid, &self.evaluations, &self.values)
    }

    /// Close per-run bookkeeping of `run`; no further increments are
    /// possible for it. Same as [`Logger::on_run_end`].
    ///
    /// # Errors
    ///
    /// Returns `Error::ClosedRun` if `run` was already finalized and
    /// `Error::RunState` if it is not the open run.
    pub fn finalize_run(&mut self, run: RunId) -> Result<()> {
        self.tracker.end(run)?;
        self.first.fill(None);
        debug!(run = run.0, runs = self.grid.runs, "eah run finalized");
        Ok(())
    }

    fn bucket(&self, scale: &Scale, x: f64) -> Result<usize> {
        match (scale.index(x), self.policy) {
            (Ok(i), _) => Ok(i),
            (Err(_), DomainPolicy::Clamp) => Ok(scale.clamped_index(x)),
            (Err(e), DomainPolicy::Reject) => Err(e),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn cell(&self, ctx: &EvaluationContext<'_>) -> Result<(usize, usize, bool)> {
        let (target, minimize) = match self.target {
            Target::Error(optimum) => ((optimum - ctx.transformed_y_best()).abs(), true),
            Target::Value(direction) => (
                ctx.transformed_y_best(),
                direction == Direction::Minimize,
            ),
        };
        let e = self.bucket(&self.evaluations, ctx.evaluations() as f64)?;
        let v = self.bucket(&self.values, target)?;
        Ok((e, v, minimize))
    }

    /// Mark `(e, v)` and everything it dominates as attained for this run.
    fn fill(&mut self, e: usize, v: usize, minimize: bool) {
        if minimize {
            for i in v..self.values.size() {
                if !self.attain(e, i) {
                    break;
                }
            }
        } else {
            for i in (0..=v).rev() {
                if !self.attain(e, i) {
                    break;
                }
            }
        }
    }

    /// Attain value bucket `i` from evaluation bucket `e` on. Returns false
    /// when it was already attained no later than `e`, in which case every
    /// worse bucket was too.
    fn attain(&mut self, e: usize, i: usize) -> bool {
        let end = match self.first[i] {
            Some(f) if f <= e => return false,
            Some(f) => f,
            None => self.grid.evaluation_buckets,
        };
        for j in e..end {
            self.grid.bump(j, i);
        }
        self.first[i] = Some(e);
        true
    }
}

impl Logger for Eah {
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()> {
        self.tracker.begin(run)?;
        self.trigger.reset(run);
        self.first.fill(None);
        self.grid.runs += 1;
        self.target = meta
            .optimum
            .map_or(Target::Value(meta.direction), Target::Error);
        debug!(run = run.0, target = ?self.target, "eah run start");
        Ok(())
    }

    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        self.tracker.check(ctx.run())?;
        self.stats.observations += 1;
        if !self.trigger.should_log(ctx) {
            return Ok(());
        }
        match self.cell(ctx) {
            Ok((e, v, minimize)) => {
                trace!(e, v, "eah fill");
                self.fill(e, v, minimize);
                self.stats.committed += 1;
                Ok(())
            }
            Err(error) => {
                self.stats.degraded += 1;
                warn!(
                    run = ctx.run().0,
                    evaluations = ctx.evaluations(),
                    error = %error,
                    "eah observation rejected"
                );
                Err(error)
            }
        }
    }

    fn on_run_end(&mut self, run: RunId) -> Result<()> {
        self.finalize_run(run)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(run) = self.tracker.current() {
            self.finalize_run(run)?;
        }
        Ok(())
    }

    fn stats(&self) -> CaptureStats {
        self.stats
    }
}

impl std::fmt::Debug for Eah {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eah")
            .field("evaluations", &self.evaluations)
            .field("values", &self.values)
            .field("policy", &self.policy)
            .field("runs", &self.grid.runs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::Always;
    use crate::Error;

    fn engine(policy: DomainPolicy) -> Eah {
        Eah::new(
            Scale::linear(0.0, 10.0, 10).unwrap(),
            Scale::linear(0.0, 10.0, 10).unwrap(),
        )
        .with_policy(policy)
        .with_trigger(Always)
    }

    fn observe(eah: &mut Eah, meta: &ProblemMeta, run: RunId, evals: u64, best: f64) -> Result<()> {
        let ctx = EvaluationContext::builder(meta, run, evals).y(best).build();
        eah.on_observation(&ctx)
    }

    #[test]
    fn test_fill_dominated_quadrant_once() {
        let mut eah = engine(DomainPolicy::Reject);
        let meta = ProblemMeta::new(1, "f", 1);
        eah.on_run_start(RunId(0), &meta).unwrap();
        observe(&mut eah, &meta, RunId(0), 2, 5.5).unwrap();
        observe(&mut eah, &meta, RunId(0), 4, 5.5).unwrap();
        observe(&mut eah, &meta, RunId(0), 6, 2.5).unwrap();
        eah.finalize_run(RunId(0)).unwrap();

        let grid = eah.grid();
        // value bucket 5 attained from eval bucket 2 onward, bucket 2 from 6.
        assert_eq!(grid.get(1, 5), 0);
        assert_eq!(grid.get(2, 5), 1);
        assert_eq!(grid.get(9, 9), 1);
        assert_eq!(grid.get(5, 2), 0);
        assert_eq!(grid.get(6, 2), 1);
        assert_eq!(grid.get(9, 1), 0);
        assert!(grid.cells().iter().all(|&c| c <= 1));
        // 8 eval buckets x buckets 5..10 plus 4 eval buckets x buckets 2..5
        assert_eq!(stat::sum(grid), 8 * 5 + 4 * 3);
    }

    #[test]
    fn test_maximization_fills_downward() {
        let mut eah = engine(DomainPolicy::Reject);
        let meta = ProblemMeta::new(1, "f", 1).direction(Direction::Maximize);
        eah.on_run_start(RunId(0), &meta).unwrap();
        observe(&mut eah, &meta, RunId(0), 9, 3.5).unwrap();
        eah.finalize_run(RunId(0)).unwrap();
        assert_eq!(eah.grid().get(9, 0), 1);
        assert_eq!(eah.grid().get(9, 3), 1);
        assert_eq!(eah.grid().get(9, 4), 0);
    }

    #[test]
    fn test_known_optimum_uses_error() {
        let mut eah = engine(DomainPolicy::Reject);
        let meta = ProblemMeta::new(1, "f", 1).optimum(-3.0);
        eah.on_run_start(RunId(0), &meta).unwrap();
        // error |-3 - (-1)| = 2
        observe(&mut eah, &meta, RunId(0), 0, -1.0).unwrap();
        assert_eq!(eah.grid().get(0, 2), 1);
        assert_eq!(eah.grid().get(0, 1), 0);
    }

    #[test]
    fn test_reject_policy_counts_degraded() {
        let mut eah = engine(DomainPolicy::Reject);
        let meta = ProblemMeta::new(1, "f", 1);
        eah.on_run_start(RunId(0), &meta).unwrap();
        let err = observe(&mut eah, &meta, RunId(0), 3, 50.0).unwrap_err();
        assert!(matches!(err, Error::Domain { .. }));
        assert_eq!(eah.stats().degraded, 1);
        assert_eq!(stat::sum(eah.grid()), 0);
    }

    #[test]
    fn test_clamp_policy_uses_edge_bucket() {
        let mut eah = engine(DomainPolicy::Clamp);
        let meta = ProblemMeta::new(1, "f", 1);
        eah.on_run_start(RunId(0), &meta).unwrap();
        observe(&mut eah, &meta, RunId(0), 30, -4.0).unwrap();
        assert_eq!(eah.grid().get(9, 0), 1);
        assert_eq!(stat::sum(eah.grid()), 10);
    }

    #[test]
    fn test_closed_run_rejects_writes() {
        let mut eah = engine(DomainPolicy::Reject);
        let meta = ProblemMeta::new(1, "f", 1);
        eah.on_run_start(RunId(0), &meta).unwrap();
        eah.finalize_run(RunId(0)).unwrap();
        assert!(matches!(eah.finalize_run(RunId(0)), Err(Error::ClosedRun(_))));
        assert!(matches!(
            observe(&mut eah, &meta, RunId(0), 1, 1.0),
            Err(Error::ClosedRun(_))
        ));
        assert!(matches!(eah.on_run_start(RunId(0), &meta), Err(Error::ClosedRun(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config: EahConfig = serde_json::from_str(
            r#"{"evaluations": {"min": 0, "max": 100, "size": 10},
                "values": {"kind": "log2", "min": 0, "max": 1, "size": 4}}"#,
        )
        .unwrap();
        assert!(matches!(Eah::from_config(&config), Err(Error::Configuration(_))));
    }
}
