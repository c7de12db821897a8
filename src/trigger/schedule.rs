//! Evaluation-count driven triggers
//!
//! Inputs are normalized (sorted, deduplicated, merged) at construction so
//! that every query is a binary search.

use tracing::trace;

use super::Trigger;
use crate::context::{EvaluationContext, RunId};
use crate::{Error, Result};

/// Fires every `interval` evaluations, starting at `starting_at`.
///
/// Fires iff `count >= starting_at` and `(count - starting_at) % interval == 0`.
/// With the default `starting_at = 0`, evaluation count 0 fires.
#[derive(Debug, Clone, Copy)]
pub struct Each {
    interval: u64,
    starting_at: u64,
}

impl Each {
    /// Fire at every multiple of `interval`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `interval` is zero.
    pub fn new(interval: u64) -> Result<Self> {
        Self::starting_at(interval, 0)
    }

    /// Fire at `starting_at`, `starting_at + interval`, ...
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `interval` is zero.
    pub fn starting_at(interval: u64, starting_at: u64) -> Result<Self> {
        if interval == 0 {
            return Err(Error::Configuration(
                "Each trigger interval must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            interval,
            starting_at,
        })
    }

    /// Interval between two firings.
    #[must_use]
    pub const fn interval(&self) -> u64 {
        self.interval
    }

    /// First evaluation count that fires.
    #[must_use]
    pub const fn first(&self) -> u64 {
        self.starting_at
    }
}

impl Trigger for Each {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let count = ctx.evaluations();
        let fired = count >= self.starting_at && (count - self.starting_at) % self.interval == 0;
        trace!(evaluations = count, fired, "each");
        fired
    }
}

/// Fires at a fixed set of evaluation counts, each at most once per run.
#[derive(Debug, Clone)]
pub struct At {
    points: Vec<u64>,
    consumed: Vec<bool>,
}

impl At {
    /// Fire at the given evaluation counts (any order, duplicates ignored).
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if no point is given.
    pub fn new(points: impl IntoIterator<Item = u64>) -> Result<Self> {
        let mut points: Vec<u64> = points.into_iter().collect();
        if points.is_empty() {
            return Err(Error::Configuration(
                "At trigger needs at least one evaluation count".to_string(),
            ));
        }
        points.sort_unstable();
        points.dedup();
        let consumed = vec![false; points.len()];
        Ok(Self { points, consumed })
    }

    /// Normalized (sorted, unique) evaluation counts.
    #[must_use]
    pub fn points(&self) -> &[u64] {
        &self.points
    }
}

impl Trigger for At {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let count = ctx.evaluations();
        match self.points.binary_search(&count) {
            Ok(i) if !self.consumed[i] => {
                self.consumed[i] = true;
                trace!(evaluations = count, "at fired");
                true
            }
            _ => false,
        }
    }

    fn reset(&mut self, _run: RunId) {
        self.consumed.fill(false);
    }
}

/// Fires while the evaluation count lies in any of a set of half-open
/// intervals `[start, end)`.
#[derive(Debug, Clone)]
pub struct During {
    ranges: Vec<(u64, u64)>,
}

impl During {
    /// Fire within the given intervals (any order; overlapping or adjacent
    /// intervals are merged).
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the set is empty or an interval has
    /// `start >= end`.
    pub fn new(ranges: impl IntoIterator<Item = (u64, u64)>) -> Result<Self> {
        let mut ranges: Vec<(u64, u64)> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Err(Error::Configuration(
                "During trigger needs at least one interval".to_string(),
            ));
        }
        if let Some((start, end)) = ranges.iter().find(|(start, end)| start >= end) {
            return Err(Error::Configuration(format!(
                "During interval [{start}, {end}) is empty"
            )));
        }
        ranges.sort_unstable();

        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(ranges.len());
        for (start, end) in ranges {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Ok(Self { ranges: merged })
    }

    /// Normalized (sorted, disjoint) intervals.
    #[must_use]
    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }
}

impl Trigger for During {
    fn should_log(&mut self, ctx: &EvaluationContext<'_>) -> bool {
        let count = ctx.evaluations();
        let idx = self.ranges.partition_point(|&(start, _)| start <= count);
        idx > 0 && count < self.ranges[idx - 1].1
    }
}
