//! # benchlog: Instrumentation for Iterative Optimizers
//!
//! **Version**: 0.1.0
//!
//! benchlog sits between an optimization algorithm under test and the
//! objective function it evaluates. After every evaluation it decides
//! *whether* to record an observation ([`trigger`]), *what* to capture
//! ([`property`]), and *where* it goes ([`logger`]): in-memory stores,
//! delimited flat files, analyzer folders, or an empirical attainment
//! histogram summarizing many independent runs.
//!
//! ## Design Principles
//!
//! - **Push-based**: all work runs inline, on the evaluating thread
//! - **Composition**: one [`logger::Logger`] trait; sinks differ only in
//!   capture strategy
//! - **Isolation**: a failing property or sink never blocks its siblings
//!
//! ## Example Usage
//!
//! ```rust
//! use benchlog::context::ProblemMeta;
//! use benchlog::logger::eah::{Eah, Scale};
//! use benchlog::logger::{shared, Combine, Store};
//! use benchlog::problem::FunctionRegistry;
//! use benchlog::property::TransformedYBest;
//! use benchlog::trigger::OnImprovement;
//!
//! let mut registry = FunctionRegistry::new();
//! registry.register("sphere", |x: &[f64]| x.iter().map(|v| v * v).sum())?;
//!
//! let mut store = Store::new(OnImprovement::new());
//! store.attach(TransformedYBest::new())?;
//! let store = shared(store);
//! let eah = shared(Eah::new(Scale::linear(0.0, 100.0, 10)?, Scale::log10(1e-4, 1e2, 12)?));
//!
//! let mut loggers = Combine::new();
//! loggers.attach(store.clone());
//! loggers.attach(eah.clone());
//!
//! let mut problem = registry.create("sphere", ProblemMeta::new(1, "sphere", 2))?;
//! problem.attach_logger(loggers)?;
//! for i in 1..=50 {
//!     let step = 1.0 / f64::from(i);
//!     problem.evaluate(&[step, -step])?;
//! }
//! problem.detach_logger()?;
//!
//! assert_eq!(store.lock().record_count(), 50);
//! assert!(eah.lock().volume() > 0.0);
//! # Ok::<(), benchlog::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod context;
pub mod error;
pub mod logger;
pub mod problem;
pub mod property;
pub mod trigger;

pub use error::{Error, Result};
