//! Error types for benchlog
//!
//! Construction-time errors (`Configuration`, `DuplicateName`) abort setup.
//! Per-observation errors are isolated to the sink or property that raised
//! them and never block sibling sinks.

use thiserror::Error;

use crate::context::RunId;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// benchlog error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid trigger, scale or sink parameters
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two watched properties share a name
    #[error("Duplicate property name: {0:?} is already watched")]
    DuplicateName(String),

    /// A property's backing value is not currently bound
    #[error("Property {0:?} is unavailable in this context")]
    Unavailable(String),

    /// A scale was given a raw value outside its domain
    #[error("Value {value} is outside the domain of the {scale} scale")]
    Domain {
        /// Offending raw value
        value: f64,
        /// Scale description (kind and bounds)
        scale: String,
    },

    /// Write attempted after the run was finalized
    #[error("Run {0} is closed, no further observations are accepted")]
    ClosedRun(RunId),

    /// Lifecycle misuse (observation outside a run, nested run start, ...)
    #[error("Run lifecycle error: {0}")]
    RunState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Flat-file encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding error (analyzer summaries, configuration)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Several loggers of a fan-out failed during the same call
    #[error("{} logger(s) failed: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<Error>),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether capture may continue after this error (per-observation failures).
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Domain { .. } | Self::ClosedRun(_) => true,
            Self::Aggregate(errors) => errors.iter().all(Self::is_recoverable),
            _ => false,
        }
    }
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
