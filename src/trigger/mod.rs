//! Triggers - decide *when* an observation is committed
//!
//! A trigger is a stateful predicate evaluated once per candidate
//! observation. Its decision depends only on the current context and on its
//! own prior-call state, never on other triggers.
//!
//! ## Usage
//!
//! ```rust
//! use benchlog::trigger::{All, Any, During, Each, OnImprovement, Trigger};
//!
//! # fn main() -> benchlog::Result<()> {
//! // Log every 10 evaluations, or whenever the best value improves.
//! let regularly = Any::new(vec![Box::new(Each::new(10)?), Box::new(OnImprovement::new())]);
//!
//! // Log improvements, but only at the beginning or the end of a 100-evaluation run.
//! let edges = All::new(vec![
//!     Box::new(OnImprovement::new()),
//!     Box::new(During::new([(0, 10), (90, 100)])?),
//! ]);
//! # let _ = (regularly, edges);
//! # Ok(())
//! # }
//! ```

mod improvement;
mod schedule;

pub use improvement::{OnDeltaImprovement, OnImprovement, OnViolation};
pub use schedule::{At, During, Each};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::{EvaluationContext, RunId};

/// Predicate deciding whether an observation is committed to a sink.
pub trait Trigger: Send {
    /// Decide whether the observation described by `ctx` should be logged.
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool;

    /// Clear per-run state. Called once at each run start.
    fn reset(&mut self, _run: RunId) {}
}

impl<T: Trigger + ?Sized> Trigger for Box<T> {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        (**self).should_log(ctx)
    }

    fn reset(&mut self, run: RunId) {
        (**self).reset(run);
    }
}

/// A trigger shared between several loggers.
///
/// Whoever assembles the pipeline keeps the other handles alive; each
/// logger resets and queries the same underlying state.
impl<T: Trigger> Trigger for Arc<Mutex<T>> {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        self.lock().should_log(ctx)
    }

    fn reset(&mut self, run: RunId) {
        self.lock().reset(run);
    }
}

/// Fires on every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Always;

impl Trigger for Always {
    fn should_log(&mut self, _ctx: &EvaluationContext<'_>) -> bool {
        true
    }
}

/// Logical AND over child triggers.
///
/// Short-circuits on the first child returning `false`; children after it
/// are not queried for that observation. An empty set always fires.
#[derive(Default)]
pub struct All {
    children: Vec<Box<dyn Trigger>>,
}

impl All {
    /// Combine the given triggers.
    #[must_use]
    pub fn new(children: Vec<Box<dyn Trigger>>) -> Self {
        Self { children }
    }

    /// Add a child trigger.
    pub fn push(&mut self, child: impl Trigger + 'static) {
        self.children.push(Box::new(child));
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Trigger for All {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        self.children.iter_mut().all(|child| child.should_log(ctx))
    }

    fn reset(&mut self, run: RunId) {
        for child in &mut self.children {
            child.reset(run);
        }
    }
}

/// Logical OR over child triggers.
///
/// Short-circuits on the first child returning `true`. An empty set never
/// fires.
#[derive(Default)]
pub struct Any {
    children: Vec<Box<dyn Trigger>>,
}

impl Any {
    /// Combine the given triggers.
    #[must_use]
    pub fn new(children: Vec<Box<dyn Trigger>>) -> Self {
        Self { children }
    }

    /// Add a child trigger.
    pub fn push(&mut self, child: impl Trigger + 'static) {
        self.children.push(Box::new(child));
    }

    /// Number of children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether there are no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Trigger for Any {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        self.children.iter_mut().any(|child| child.should_log(ctx))
    }

    fn reset(&mut self, run: RunId) {
        for child in &mut self.children {
            child.reset(run);
        }
    }
}
