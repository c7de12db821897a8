//! Value-driven triggers

use tracing::trace;

use super::Trigger;
use crate::context::{EvaluationContext, RunId};

/// Fires when the best-so-far transformed value strictly improves.
///
/// The trigger remembers the best value it has seen in the current run; the
/// first observation of a run always fires (anything beats the unbounded
/// worst). NaN values never fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnImprovement {
    best: Option<f64>,
}

impl OnImprovement {
    /// Create a trigger with an empty "best seen" state.
    #[must_use]
    pub const fn new() -> Self {
        Self { best: None }
    }

    /// Best value seen in the current run.
    #[must_use]
    pub const fn best(&self) -> Option<f64> {
        self.best
    }
}

impl Trigger for OnImprovement {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let y = ctx.transformed_y_best();
        let improved = match self.best {
            None => !y.is_nan(),
            Some(best) => ctx.direction().improves(y, best),
        };
        if improved {
            self.best = Some(y);
        }
        trace!(evaluations = ctx.evaluations(), improved, "on_improvement");
        improved
    }

    fn reset(&mut self, _run: RunId) {
        self.best = None;
    }
}

/// Fires when the current transformed value beats the trigger's own best
/// by strictly more than `delta`.
///
/// The first observation of a run always fires.
#[derive(Debug, Clone, Copy)]
pub struct OnDeltaImprovement {
    delta: f64,
    best: Option<f64>,
}

impl OnDeltaImprovement {
    /// Default minimal improvement.
    pub const DEFAULT_DELTA: f64 = 1e-10;

    /// Create a trigger requiring improvements larger than `delta`.
    #[must_use]
    pub const fn new(delta: f64) -> Self {
        Self { delta, best: None }
    }

    /// Required improvement.
    #[must_use]
    pub const fn delta(&self) -> f64 {
        self.delta
    }
}

impl Default for OnDeltaImprovement {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELTA)
    }
}

impl Trigger for OnDeltaImprovement {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let y = ctx.transformed_y();
        let improved = match self.best {
            None => !y.is_nan(),
            Some(best) => ctx.direction().improves(y, best) && (best - y).abs() > self.delta,
        };
        if improved {
            self.best = Some(y);
        }
        improved
    }

    fn reset(&mut self, _run: RunId) {
        self.best = None;
    }
}

/// Fires when the first constraint of the context is violated.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnViolation {
    violations: usize,
}

impl OnViolation {
    /// Create a trigger with a zeroed violation counter.
    #[must_use]
    pub const fn new() -> Self {
        Self { violations: 0 }
    }

    /// Number of violating observations seen in the current run.
    #[must_use]
    pub const fn violations(&self) -> usize {
        self.violations
    }
}

impl Trigger for OnViolation {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let violated = ctx.violations().first().is_some_and(|v| *v != 0.0);
        if violated {
            self.violations += 1;
        }
        violated
    }

    fn reset(&mut self, _run: RunId) {
        self.violations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Direction, ProblemMeta};

    fn fire(trigger: &mut impl Trigger, meta: &ProblemMeta, evals: u64, y: f64, best: f64) -> bool {
        let ctx = EvaluationContext::builder(meta, RunId(0), evals)
            .y(y)
            .y_best(best)
            .build();
        trigger.should_log(&ctx)
    }

    #[test]
    fn test_on_improvement_minimize() {
        let meta = ProblemMeta::new(1, "f", 2);
        let mut t = OnImprovement::new();
        assert!(fire(&mut t, &meta, 1, 10.0, 10.0)); // Better than infinity.
        assert!(!fire(&mut t, &meta, 2, 12.0, 10.0)); // Strict inequality.
        assert!(fire(&mut t, &meta, 3, 5.0, 5.0));
        assert_eq!(t.best(), Some(5.0));
    }

    #[test]
    fn test_on_improvement_maximize_and_reset() {
        let meta = ProblemMeta::new(1, "f", 2).direction(Direction::Maximize);
        let mut t = OnImprovement::new();
        assert!(fire(&mut t, &meta, 1, 1.0, 1.0));
        assert!(fire(&mut t, &meta, 2, 2.0, 2.0));
        assert!(!fire(&mut t, &meta, 3, 0.5, 2.0));
        t.reset(RunId(1));
        assert!(fire(&mut t, &meta, 1, 0.5, 0.5));
    }

    #[test]
    fn test_on_delta_improvement() {
        let meta = ProblemMeta::new(1, "f", 2);
        let mut t = OnDeltaImprovement::new(0.5);
        assert!(fire(&mut t, &meta, 1, 10.0, 10.0));
        assert!(!fire(&mut t, &meta, 2, 9.8, 9.8));
        assert!(fire(&mut t, &meta, 3, 9.0, 9.0));
    }

    #[test]
    fn test_on_violation_counts() {
        let meta = ProblemMeta::new(1, "f", 2);
        let mut t = OnViolation::new();
        let violated = [0.3];
        let ok = [0.0];
        let ctx = EvaluationContext::builder(&meta, RunId(0), 1)
            .y(1.0)
            .violations(&violated)
            .build();
        assert!(t.should_log(&ctx));
        let ctx = EvaluationContext::builder(&meta, RunId(0), 2)
            .y(1.0)
            .violations(&ok)
            .build();
        assert!(!t.should_log(&ctx));
        assert_eq!(t.violations(), 1);
        t.reset(RunId(1));
        assert_eq!(t.violations(), 0);
    }
}
