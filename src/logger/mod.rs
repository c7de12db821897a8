//! Loggers - sinks notified of run lifecycle and observations
//!
//! ## Lifecycle
//!
//! ```text
//! on_run_start(run, meta) ──> on_observation(ctx)* ──> on_run_end(run)
//!        ^                                                  │
//!        └──────────────────────────────────────────────────┘
//! ```
//!
//! A logger is always either *between runs* or *inside exactly one run*.
//! Observations outside a run, nested run starts and mismatched run ends are
//! rejected with `Error::RunState`; re-using a finished run id is rejected
//! with `Error::ClosedRun`.
//!
//! ## Sinks
//!
//! All flat sinks share one capture engine, [`Watcher`], and differ only in
//! their [`Sink`] strategy:
//!
//! - [`Store`]: in-memory, cursor-navigable
//! - [`FlatFile`]: one delimited row per committed observation
//! - [`Analyzer`]: flat rows plus per-problem JSON summaries
//!
//! [`Eah`] aggregates observations into an attainment grid, and [`Combine`]
//! fans each notification out to several loggers.

pub mod analyzer;
pub mod combine;
pub mod eah;
pub mod flatfile;
pub mod store;
pub mod watcher;

pub use analyzer::{Analyzer, AnalyzerOptions, AnalyzerSink};
pub use combine::{Combine, LoggerId};
pub use eah::Eah;
pub use flatfile::{FlatFile, FlatFileOptions, FlatFileSink};
pub use store::{Cursor, MemorySink, Store};
pub use watcher::{Record, Sink, Watcher};

use std::ops::AddAssign;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::{Error, Result};

/// Sink contract: lifecycle notifications plus observations.
pub trait Logger: Send {
    /// A new run starts on the given problem.
    ///
    /// # Errors
    ///
    /// Returns `Error::RunState` if a run is already open and
    /// `Error::ClosedRun` if `run` was already finished.
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()>;

    /// One evaluation was performed.
    ///
    /// # Errors
    ///
    /// Sink specific; per-observation errors leave the logger usable.
    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()>;

    /// The run ends; pending output is flushed.
    ///
    /// # Errors
    ///
    /// Returns `Error::RunState` if `run` is not the open run.
    fn on_run_end(&mut self, run: RunId) -> Result<()>;

    /// Release resources (files). Called once when the experiment is over.
    ///
    /// # Errors
    ///
    /// Returns an IO error if final output cannot be written.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Counters describing what was captured so far.
    fn stats(&self) -> CaptureStats {
        CaptureStats::default()
    }
}

impl<L: Logger + ?Sized> Logger for Box<L> {
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()> {
        (**self).on_run_start(run, meta)
    }

    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        (**self).on_observation(ctx)
    }

    fn on_run_end(&mut self, run: RunId) -> Result<()> {
        (**self).on_run_end(run)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn stats(&self) -> CaptureStats {
        (**self).stats()
    }
}

/// A logger shared with other owners, e.g. attached to a [`Combine`] while
/// the caller keeps a handle to read results back.
///
/// The lock serializes access when several worker threads report
/// evaluations: grid and run bookkeeping are not reentrant.
impl<L: Logger> Logger for Arc<Mutex<L>> {
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()> {
        self.lock().on_run_start(run, meta)
    }

    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        self.lock().on_observation(ctx)
    }

    fn on_run_end(&mut self, run: RunId) -> Result<()> {
        self.lock().on_run_end(run)
    }

    fn close(&mut self) -> Result<()> {
        self.lock().close()
    }

    fn stats(&self) -> CaptureStats {
        self.lock().stats()
    }
}

/// Wrap a logger so it can be attached somewhere and read back later.
#[must_use]
pub fn shared<L: Logger>(logger: L) -> Arc<Mutex<L>> {
    Arc::new(Mutex::new(logger))
}

/// What a logger did with the observations it received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Observations received.
    pub observations: u64,
    /// Observations committed (trigger fired and capture happened).
    pub committed: u64,
    /// Committed observations with at least one missing field, or
    /// observations rejected by a scale.
    pub degraded: u64,
}

impl AddAssign for CaptureStats {
    fn add_assign(&mut self, rhs: Self) {
        self.observations += rhs.observations;
        self.committed += rhs.committed;
        self.degraded += rhs.degraded;
    }
}

/// Between-runs / inside-one-run state machine shared by all loggers.
#[derive(Debug, Default)]
pub struct RunTracker {
    current: Option<RunId>,
    closed: FxHashSet<RunId>,
}

impl RunTracker {
    /// Create a tracker in the between-runs state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open run, if any.
    #[must_use]
    pub const fn current(&self) -> Option<RunId> {
        self.current
    }

    /// Whether `run` was already finished.
    #[must_use]
    pub fn is_closed(&self, run: RunId) -> bool {
        self.closed.contains(&run)
    }

    /// Enter `run`.
    ///
    /// # Errors
    ///
    /// `Error::ClosedRun` if `run` already finished, `Error::RunState` if
    /// another run is open.
    pub fn begin(&mut self, run: RunId) -> Result<()> {
        if self.is_closed(run) {
            return Err(Error::ClosedRun(run));
        }
        if let Some(open) = self.current {
            return Err(Error::RunState(format!(
                "cannot start run {run} while run {open} is open"
            )));
        }
        self.current = Some(run);
        Ok(())
    }

    /// Check that an observation for `run` may be recorded.
    ///
    /// # Errors
    ///
    /// `Error::ClosedRun` for finished runs, `Error::RunState` when `run` is
    /// not the open run.
    pub fn check(&self, run: RunId) -> Result<()> {
        if self.is_closed(run) {
            return Err(Error::ClosedRun(run));
        }
        match self.current {
            Some(open) if open == run => Ok(()),
            Some(open) => Err(Error::RunState(format!(
                "observation for run {run} while run {open} is open"
            ))),
            None => Err(Error::RunState(format!(
                "observation for run {run} outside of any run"
            ))),
        }
    }

    /// Leave `run`; it can never be reopened.
    ///
    /// # Errors
    ///
    /// `Error::ClosedRun` if `run` already finished, `Error::RunState` when
    /// `run` is not the open run.
    pub fn end(&mut self, run: RunId) -> Result<()> {
        match self.current {
            Some(open) if open == run => {
                self.current = None;
                self.closed.insert(run);
                Ok(())
            }
            _ if self.is_closed(run) => Err(Error::ClosedRun(run)),
            _ => Err(Error::RunState(format!("run {run} is not open"))),
        }
    }

    /// Leave `run` without finishing it, after its start failed. The run
    /// may be started again.
    pub fn abandon(&mut self, run: RunId) {
        if self.current == Some(run) {
            self.current = None;
        }
    }
}
