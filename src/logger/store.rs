//! Store - in-memory sink with cursor read-back
//!
//! Records are kept by value, append-only, indexed by (run id, insertion
//! order). A [`Cursor`] borrows the store, so the run set cannot change
//! while a cursor is alive.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::watcher::{Record, Sink, Watcher};
use crate::context::{EvaluationContext, ProblemMeta, RunId};
use crate::property::Property;
use crate::trigger::Trigger;
use crate::{Error, Result};

/// Records of one run.
#[derive(Debug, Clone)]
struct RunLog {
    run: RunId,
    meta: ProblemMeta,
    records: Vec<Record>,
}

/// In-memory capture strategy.
#[derive(Debug, Default)]
pub struct MemorySink {
    runs: Vec<RunLog>,
    index: FxHashMap<RunId, usize>,
    current: Option<usize>,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sink for MemorySink {
    fn begin_run(
        &mut self,
        run: RunId,
        meta: &ProblemMeta,
        _properties: &[Arc<dyn Property>],
    ) -> Result<()> {
        if self.index.contains_key(&run) {
            return Err(Error::ClosedRun(run));
        }
        self.index.insert(run, self.runs.len());
        self.current = Some(self.runs.len());
        self.runs.push(RunLog {
            run,
            meta: meta.clone(),
            records: Vec::new(),
        });
        Ok(())
    }

    fn commit(
        &mut self,
        _ctx: &EvaluationContext<'_>,
        _properties: &[Arc<dyn Property>],
        record: Record,
    ) -> Result<()> {
        let slot = self
            .current
            .ok_or_else(|| Error::RunState("commit outside of any run".to_string()))?;
        self.runs[slot].records.push(record);
        Ok(())
    }

    fn end_run(&mut self, _run: RunId) -> Result<()> {
        self.current = None;
        Ok(())
    }
}

/// Logger keeping every committed record in memory.
pub type Store = Watcher<MemorySink>;

impl Watcher<MemorySink> {
    /// Create an in-memory store.
    #[must_use]
    pub fn new(trigger: impl Trigger + 'static) -> Self {
        Self::with_sink(trigger, MemorySink::new())
    }

    /// Run ids, in start order.
    #[must_use]
    pub fn runs(&self) -> Vec<RunId> {
        self.sink().runs.iter().map(|log| log.run).collect()
    }

    /// Number of runs started so far.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.sink().runs.len()
    }

    /// Total number of records over all runs.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.sink().runs.iter().map(|log| log.records.len()).sum()
    }

    /// Problem the run was performed on.
    #[must_use]
    pub fn run_meta(&self, run: RunId) -> Option<&ProblemMeta> {
        self.log(run).map(|log| &log.meta)
    }

    /// Records of `run`, in insertion order.
    #[must_use]
    pub fn records(&self, run: RunId) -> Option<&[Record]> {
        self.log(run).map(|log| log.records.as_slice())
    }

    /// Cursor positioned before the first record of `run`.
    #[must_use]
    pub fn cursor(&self, run: RunId) -> Option<Cursor<'_>> {
        self.records(run).map(|records| Cursor {
            run,
            records,
            position: 0,
        })
    }

    fn log(&self, run: RunId) -> Option<&RunLog> {
        let sink = self.sink();
        sink.index.get(&run).map(|&i| &sink.runs[i])
    }
}

/// Sequential read-only view of one run.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    run: RunId,
    records: &'a [Record],
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Run being read.
    #[must_use]
    pub const fn run(&self) -> RunId {
        self.run
    }

    /// Number of records already returned.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Next record without advancing.
    #[must_use]
    pub fn peek(&self) -> Option<&'a Record> {
        self.records.get(self.position)
    }

    /// Whether the end of the run was reached.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.position >= self.records.len()
    }

    /// Move back before the first record.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl<'a> Iterator for Cursor<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.get(self.position)?;
        self.position += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.records.len().saturating_sub(self.position);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Cursor<'_> {}
