//! Built-in properties reading the evaluation context

use super::{Property, Value};
use crate::context::EvaluationContext;
use crate::{Error, Result};

macro_rules! context_property {
    ($(#[$doc:meta])* $ty:ident, $default:literal, |$ctx:ident| $body:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $ty {
            name: String,
        }

        impl $ty {
            /// Create the property with its default column name.
            #[must_use]
            pub fn new() -> Self {
                Self::named($default)
            }

            /// Create the property under a custom column name.
            #[must_use]
            pub fn named(name: impl Into<String>) -> Self {
                Self { name: name.into() }
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Property for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn value(&self, $ctx: &EvaluationContext<'_>) -> Result<Value> {
                Ok($body)
            }
        }
    };
}

context_property!(
    /// Number of evaluations performed so far in the run.
    Evaluations,
    "evaluations",
    |ctx| Value::Integer(i64::try_from(ctx.evaluations()).unwrap_or(i64::MAX))
);

context_property!(
    /// Untransformed objective value of the current evaluation.
    RawY,
    "raw_y",
    |ctx| Value::Real(ctx.raw_y())
);

context_property!(
    /// Untransformed value of the best solution so far.
    RawYBest,
    "raw_y_best",
    |ctx| Value::Real(ctx.raw_y_best())
);

context_property!(
    /// Objective value of the current evaluation, as seen by the algorithm.
    TransformedY,
    "transformed_y",
    |ctx| Value::Real(ctx.transformed_y())
);

context_property!(
    /// Best transformed value so far.
    TransformedYBest,
    "transformed_y_best",
    |ctx| Value::Real(ctx.transformed_y_best())
);

context_property!(
    /// Evaluated decision vector.
    Position,
    "x",
    |ctx| Value::Vector(ctx.x().to_vec())
);

/// Violation of one constraint of the current evaluation.
#[derive(Debug, Clone)]
pub struct Violation {
    name: String,
    index: usize,
}

impl Violation {
    /// Watch the violation of constraint `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        let name = if index == 0 {
            "violation".to_string()
        } else {
            format!("violation_{index}")
        };
        Self { name, index }
    }

    /// Watch constraint `index` under a custom name.
    #[must_use]
    pub fn named(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl Property for Violation {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        ctx.violations()
            .get(self.index)
            .map(|v| Value::Real(*v))
            .ok_or_else(|| Error::Unavailable(self.name.clone()))
    }
}

/// Penalty applied for one constraint of the current evaluation.
#[derive(Debug, Clone)]
pub struct Penalty {
    name: String,
    index: usize,
}

impl Penalty {
    /// Watch the penalty of constraint `index`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        let name = if index == 0 {
            "penalty".to_string()
        } else {
            format!("penalty_{index}")
        };
        Self { name, index }
    }
}

impl Property for Penalty {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self, ctx: &EvaluationContext<'_>) -> Result<Value> {
        ctx.penalties()
            .get(self.index)
            .map(|v| Value::Real(*v))
            .ok_or_else(|| Error::Unavailable(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ProblemMeta, RunId};

    #[test]
    fn test_context_properties() {
        let meta = ProblemMeta::new(1, "sphere", 2);
        let x = [1.0, 2.0];
        let ctx = EvaluationContext::builder(&meta, RunId(0), 12)
            .raw_y(5.0)
            .transformed_y(6.0)
            .raw_y_best(1.0)
            .transformed_y_best(2.0)
            .x(&x)
            .build();

        assert_eq!(Evaluations::new().value(&ctx).unwrap(), Value::Integer(12));
        assert_eq!(RawY::new().value(&ctx).unwrap(), Value::Real(5.0));
        assert_eq!(TransformedY::new().value(&ctx).unwrap(), Value::Real(6.0));
        assert_eq!(RawYBest::new().value(&ctx).unwrap(), Value::Real(1.0));
        assert_eq!(TransformedYBest::new().value(&ctx).unwrap(), Value::Real(2.0));
        assert_eq!(Position::new().value(&ctx).unwrap(), Value::Vector(vec![1.0, 2.0]));
        assert_eq!(RawY::named("current f(x)").name(), "current f(x)");
    }

    #[test]
    fn test_constraint_properties_missing_constraint() {
        let meta = ProblemMeta::new(1, "sphere", 2);
        let violations = [0.0, 2.5];
        let ctx = EvaluationContext::builder(&meta, RunId(0), 1)
            .y(1.0)
            .violations(&violations)
            .build();

        assert_eq!(Violation::new(1).value(&ctx).unwrap(), Value::Real(2.5));
        assert_eq!(Violation::new(1).name(), "violation_1");
        assert!(matches!(
            Penalty::new(0).value(&ctx),
            Err(Error::Unavailable(name)) if name == "penalty"
        ));
    }
}
