//! Properties - decide *what* is captured from an observation
//!
//! A property is a named, stateless extractor reading one value from the
//! evaluation context, or from a location owned by the algorithm under
//! test. Properties are shared between loggers behind an `Arc`.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use benchlog::property::{self, Property, TransformedYBest, Value};
//! use benchlog::context::{EvaluationContext, ProblemMeta, RunId};
//!
//! let step_size = Arc::new(RwLock::new(0.5_f64));
//! let watched: Vec<Arc<dyn Property>> = vec![
//!     Arc::new(TransformedYBest::new()),
//!     Arc::new(property::reference("step_size", &step_size)),
//! ];
//!
//! let meta = ProblemMeta::new(1, "sphere", 2);
//! let ctx = EvaluationContext::builder(&meta, RunId(0), 1).y(4.0).build();
//! *step_size.write() = 0.25;
//! assert_eq!(watched[1].value(&ctx).unwrap(), Value::Real(0.25));
//! ```

mod external;
mod watch;

pub use external::{accessor, pointer, reference, Accessor, Pointer, Reference, Slot};
pub use watch::{
    Evaluations, Penalty, Position, RawY, RawYBest, TransformedY, TransformedYBest, Violation,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::{Error, Result};

/// A captured property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer scalar (evaluation counters, ids).
    Integer(i64),
    /// Real scalar.
    Real(f64),
    /// Small fixed-shape vector (decision vectors, multi-objective values).
    Vector(Vec<f64>),
}

impl Value {
    /// Scalar view of the value (`None` for vectors).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            Self::Vector(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            // Debug formatting is the shortest representation that parses
            // back to the same bits, and always marks reals as reals.
            Self::Real(r) => write!(f, "{r:?}"),
            Self::Vector(v) => {
                let parts: Vec<String> = v.iter().map(|x| format!("{x:?}")).collect();
                write!(f, "[{}]", parts.join(","))
            }
        }
    }
}

impl FromStr for Value {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            if inner.trim().is_empty() {
                return Ok(Self::Vector(Vec::new()));
            }
            return inner
                .split(',')
                .map(|part| parse_real(part.trim()))
                .collect::<Result<Vec<f64>>>()
                .map(Self::Vector);
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Self::Integer(i));
        }
        parse_real(s).map(Self::Real)
    }
}

fn parse_real(s: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|e| Error::Other(format!("cannot parse {s:?} as a number: {e}")))
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::Vector(v)
    }
}

/// Named extractor of one value from an observation.
pub trait Property: Send + Sync {
    /// Unique name of the property within a watcher (column name in files).
    fn name(&self) -> &str;

    /// Read the value for the current observation.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unavailable` when the backing value is not currently
    /// bound.
    fn value(&self, ctx: &EvaluationContext<'_>) -> Result<Value>;

    /// Render a captured value for flat-file output.
    fn format(&self, value: &Value) -> String {
        value.to_string()
    }
}

impl fmt::Debug for dyn Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property").field("name", &self.name()).finish()
    }
}
