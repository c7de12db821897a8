//! Properties reading locations owned by the algorithm under test
//!
//! None of these copy the watched value: they hold a weak handle or an
//! accessor and read through it on every capture. A location that is gone
//! or not yet bound yields `Error::Unavailable`, which the watcher records
//! as a missing field.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{Property, Value};
use crate::context::EvaluationContext;
use crate::{Error, Result};

/// A location that the algorithm may bind and unbind during a run.
pub type Slot<T> = Arc<RwLock<Option<T>>>;

/// Watches a value owned by the algorithm.
///
/// Holds a weak handle: the property never keeps the algorithm's state
/// alive, and reports `Unavailable` once it has been dropped.
pub struct Reference<T> {
    name: String,
    target: Weak<RwLock<T>>,
}

/// Watch `target` under `name`.
#[must_use]
pub fn reference<T>(name: impl Into<String>, target: &Arc<RwLock<T>>) -> Reference<T> {
    Reference {
        name: name.into(),
        target: Arc::downgrade(target),
    }
}

impl<T> Property for Reference<T>
where
    T: Copy + Into<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, _ctx: &EvaluationContext<'_>) -> Result<Value> {
        self.target
            .upgrade()
            .map(|target| {
                let value = *target.read();
                Value::Real(value.into())
            })
            .ok_or_else(|| Error::Unavailable(self.name.clone()))
    }
}

/// Watches a slot that may be unbound (`None`) at capture time.
pub struct Pointer<T> {
    name: String,
    slot: Weak<RwLock<Option<T>>>,
}

/// Watch the slot under `name`.
#[must_use]
pub fn pointer<T>(name: impl Into<String>, slot: &Slot<T>) -> Pointer<T> {
    Pointer {
        name: name.into(),
        slot: Arc::downgrade(slot),
    }
}

impl<T> Property for Pointer<T>
where
    T: Copy + Into<f64> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, _ctx: &EvaluationContext<'_>) -> Result<Value> {
        self.slot
            .upgrade()
            .and_then(|slot| {
                let bound = *slot.read();
                bound
            })
            .map(|v| Value::Real(v.into()))
            .ok_or_else(|| Error::Unavailable(self.name.clone()))
    }
}

type Getter = dyn Fn(&EvaluationContext<'_>) -> Option<Value> + Send + Sync;

/// Watches whatever a caller-supplied closure returns.
pub struct Accessor {
    name: String,
    get: Box<Getter>,
}

/// Watch the result of `get` under `name`; `None` means unavailable.
#[must_use]
pub fn accessor<F>(name: impl Into<String>, get: F) -> Accessor
where
    F: Fn(&EvaluationContext<'_>) -> Option<Value> + Send + Sync + 'static,
{
    Accessor {
        name: name.into(),
        get: Box::new(get),
    }
}

impl Property for Accessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        (self.get)(ctx).ok_or_else(|| Error::Unavailable(self.name.clone()))
    }
}
