//! Watcher - trigger + ordered properties + capture strategy
//!
//! A [`Watcher`] owns one trigger and an ordered list of properties. On every
//! observation it asks the trigger, and when the trigger fires it evaluates
//! the properties in attachment order into a [`Record`] and hands it to its
//! [`Sink`]. Unavailable properties become missing fields; the record is
//! still committed and counted as degraded.
//!
//! ## Usage
//!
//! ```rust
//! use benchlog::context::{EvaluationContext, ProblemMeta, RunId};
//! use benchlog::logger::{Logger, Store};
//! use benchlog::property::TransformedYBest;
//! use benchlog::trigger::OnImprovement;
//!
//! let mut store = Store::new(OnImprovement::new());
//! store.attach(TransformedYBest::new())?;
//!
//! let meta = ProblemMeta::new(1, "sphere", 2);
//! store.on_run_start(RunId(0), &meta)?;
//! for (evals, y) in [(1, 10.0), (2, 12.0), (3, 5.0)] {
//!     let ctx = EvaluationContext::builder(&meta, RunId(0), evals).y(y).build();
//!     store.on_observation(&ctx)?;
//! }
//! store.on_run_end(RunId(0))?;
//!
//! assert_eq!(store.records(RunId(0)).map(<[_]>::len), Some(2));
//! # Ok::<(), benchlog::Error>(())
//! ```

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::{CaptureStats, Logger, RunTracker};
use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::property::{Property, Value};
use crate::trigger::Trigger;
use crate::{Error, Result};

/// One committed observation: property values in attachment order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    run: RunId,
    evaluations: u64,
    names: Arc<[String]>,
    values: Vec<Option<Value>>,
}

impl Record {
    /// Run the observation belongs to.
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    /// Evaluation count of the observation (also its timestamp).
    #[must_use]
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }

    /// Property names, in attachment order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Captured values; `None` marks a property that was unavailable.
    #[must_use]
    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    /// Value captured for the property `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values[i].as_ref())
    }

    /// Number of fields that could not be captured.
    #[must_use]
    pub fn missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Whether at least one field is missing.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.values.iter().any(Option::is_none)
    }
}

/// Capture strategy of a [`Watcher`]: where committed records go.
pub trait Sink: Send {
    /// A run starts; `properties` is the watcher's current property list.
    ///
    /// # Errors
    ///
    /// Sink specific (e.g. an output file cannot be opened).
    fn begin_run(
        &mut self,
        run: RunId,
        meta: &ProblemMeta,
        properties: &[Arc<dyn Property>],
    ) -> Result<()>;

    /// Called for every observation, whether or not the trigger fires.
    ///
    /// # Errors
    ///
    /// Sink specific.
    fn observe(&mut self, _ctx: &EvaluationContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Store one committed record.
    ///
    /// # Errors
    ///
    /// Sink specific (e.g. write failure).
    fn commit(
        &mut self,
        ctx: &EvaluationContext<'_>,
        properties: &[Arc<dyn Property>],
        record: Record,
    ) -> Result<()>;

    /// The open run ends.
    ///
    /// # Errors
    ///
    /// Sink specific (e.g. flush failure).
    fn end_run(&mut self, run: RunId) -> Result<()>;

    /// Release resources.
    ///
    /// # Errors
    ///
    /// Sink specific.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A logger capturing properties into a [`Sink`] whenever its trigger fires.
pub struct Watcher<S> {
    trigger: Box<dyn Trigger>,
    properties: Vec<Arc<dyn Property>>,
    names: Arc<[String]>,
    sink: S,
    tracker: RunTracker,
    stats: CaptureStats,
}

impl<S: Sink> Watcher<S> {
    /// Create a watcher with no properties.
    #[must_use]
    pub fn with_sink(trigger: impl Trigger + 'static, sink: S) -> Self {
        Self {
            trigger: Box::new(trigger),
            properties: Vec::new(),
            names: Arc::from(Vec::new()),
            sink,
            tracker: RunTracker::new(),
            stats: CaptureStats::default(),
        }
    }

    /// Watch one more property.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateName` if a property with the same name is
    /// already attached, `Error::RunState` while a run is open.
    pub fn attach(&mut self, property: impl Property + 'static) -> Result<&mut Self> {
        self.attach_shared(Arc::new(property))
    }

    /// Watch a property shared with other watchers.
    ///
    /// # Errors
    ///
    /// See [`Watcher::attach`].
    pub fn attach_shared(&mut self, property: Arc<dyn Property>) -> Result<&mut Self> {
        if let Some(run) = self.tracker.current() {
            return Err(Error::RunState(format!(
                "cannot attach {:?} while run {run} is open",
                property.name()
            )));
        }
        if self.names.iter().any(|n| n == property.name()) {
            return Err(Error::DuplicateName(property.name().to_string()));
        }
        debug!(property = property.name(), "attach");
        self.properties.push(property);
        self.refresh_names();
        Ok(self)
    }

    /// Stop watching the property `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RunState` while a run is open.
    pub fn detach(&mut self, name: &str) -> Result<Option<Arc<dyn Property>>> {
        if let Some(run) = self.tracker.current() {
            return Err(Error::RunState(format!(
                "cannot detach {name:?} while run {run} is open"
            )));
        }
        let removed = self
            .properties
            .iter()
            .position(|p| p.name() == name)
            .map(|i| self.properties.remove(i));
        self.refresh_names();
        Ok(removed)
    }

    /// Replace the trigger. The new trigger is reset at the next run start.
    pub fn set_trigger(&mut self, trigger: impl Trigger + 'static) {
        self.trigger = Box::new(trigger);
    }

    /// Watched properties, in attachment order.
    #[must_use]
    pub fn properties(&self) -> &[Arc<dyn Property>] {
        &self.properties
    }

    /// Watched property names, in attachment order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The capture strategy.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The capture strategy, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Open run, if any.
    #[must_use]
    pub const fn current_run(&self) -> Option<RunId> {
        self.tracker.current()
    }

    fn refresh_names(&mut self) {
        self.names = self
            .properties
            .iter()
            .map(|p| p.name().to_string())
            .collect();
    }

    fn capture(&self, ctx: &EvaluationContext<'_>) -> Record {
        let values = self
            .properties
            .iter()
            .map(|property| match property.value(ctx) {
                Ok(value) => Some(value),
                Err(Error::Unavailable(name)) => {
                    trace!(property = %name, "unavailable");
                    None
                }
                Err(e) => {
                    warn!(property = property.name(), error = %e, "property capture failed");
                    None
                }
            })
            .collect();
        Record {
            run: ctx.run(),
            evaluations: ctx.evaluations(),
            names: Arc::clone(&self.names),
            values,
        }
    }
}

impl<S: Sink> Logger for Watcher<S> {
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()> {
        self.tracker.begin(run)?;
        if let Err(e) = self.sink.begin_run(run, meta, &self.properties) {
            self.tracker.abandon(run);
            return Err(e);
        }
        self.trigger.reset(run);
        debug!(run = run.0, problem = meta.problem_id, instance = meta.instance, "run start");
        Ok(())
    }

    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        self.tracker.check(ctx.run())?;
        self.stats.observations += 1;
        self.sink.observe(ctx)?;
        if !self.trigger.should_log(ctx) {
            return Ok(());
        }

        let record = self.capture(ctx);
        self.stats.committed += 1;
        if record.is_degraded() {
            self.stats.degraded += 1;
            warn!(
                run = ctx.run().0,
                evaluations = ctx.evaluations(),
                missing = record.missing(),
                "degraded capture"
            );
        }
        trace!(evaluations = ctx.evaluations(), "commit");
        self.sink.commit(ctx, &self.properties, record)
    }

    fn on_run_end(&mut self, run: RunId) -> Result<()> {
        self.tracker.end(run)?;
        debug!(run = run.0, committed = self.stats.committed, "run end");
        self.sink.end_run(run)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(run) = self.tracker.current() {
            self.on_run_end(run)?;
        }
        self.sink.close()
    }

    fn stats(&self) -> CaptureStats {
        self.stats
    }
}

impl<S> std::fmt::Debug for Watcher<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("properties", &self.names)
            .field("current_run", &self.tracker.current())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
