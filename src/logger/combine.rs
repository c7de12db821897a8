//! Combine - fan one notification stream out to several loggers
//!
//! Delivery follows attachment order. A failing logger never stops the
//! fan-out: every error of one call is collected and returned together as
//! `Error::Aggregate` once all loggers were notified.

use tracing::{debug, warn};

use super::{CaptureStats, Logger};
use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::{Error, Result};

/// Handle of an attached logger, used to detach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoggerId(u64);

/// Logger delivering every notification to all attached loggers.
#[derive(Default)]
pub struct Combine {
    loggers: Vec<(LoggerId, Box<dyn Logger>)>,
    next_id: u64,
}

impl Combine {
    /// Create an empty fan-out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a logger after the ones already attached.
    pub fn attach(&mut self, logger: impl Logger + 'static) -> LoggerId {
        self.attach_boxed(Box::new(logger))
    }

    /// Attach an already boxed logger.
    pub fn attach_boxed(&mut self, logger: Box<dyn Logger>) -> LoggerId {
        let id = LoggerId(self.next_id);
        self.next_id += 1;
        self.loggers.push((id, logger));
        debug!(logger = id.0, attached = self.loggers.len(), "combine attach");
        id
    }

    /// Detach and return a logger. A logger detached inside a run keeps
    /// that run open.
    pub fn detach(&mut self, id: LoggerId) -> Option<Box<dyn Logger>> {
        let position = self.loggers.iter().position(|(i, _)| *i == id)?;
        Some(self.loggers.remove(position).1)
    }

    /// Number of attached loggers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    /// Whether no logger is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    /// Attached logger ids, in delivery order.
    #[must_use]
    pub fn ids(&self) -> Vec<LoggerId> {
        self.loggers.iter().map(|(id, _)| *id).collect()
    }

    fn fan_out<F>(&mut self, event: &str, mut deliver: F) -> Result<()>
    where
        F: FnMut(&mut dyn Logger) -> Result<()>,
    {
        let mut errors = Vec::new();
        for (id, logger) in &mut self.loggers {
            if let Err(e) = deliver(logger.as_mut()) {
                warn!(logger = id.0, event, error = %e, "logger failed");
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }
}

impl Logger for Combine {
    fn on_run_start(&mut self, run: RunId, meta: &ProblemMeta) -> Result<()> {
        self.fan_out("run start", |logger| logger.on_run_start(run, meta))
    }

    fn on_observation(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        self.fan_out("observation", |logger| logger.on_observation(ctx))
    }

    fn on_run_end(&mut self, run: RunId) -> Result<()> {
        self.fan_out("run end", |logger| logger.on_run_end(run))
    }

    fn close(&mut self) -> Result<()> {
        self.fan_out("close", |logger| logger.close())
    }

    fn stats(&self) -> CaptureStats {
        let mut total = CaptureStats::default();
        for (_, logger) in &self.loggers {
            total += logger.stats();
        }
        total
    }
}

impl std::fmt::Debug for Combine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Combine")
            .field("loggers", &self.ids())
            .finish()
    }
}
