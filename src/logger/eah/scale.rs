//! Axis scales: raw value to bucket index
//!
//! A scale partitions `[min, max]` into `size` buckets, uniformly in the
//! raw domain (linear) or in the logarithmic domain (log2, log10). Both
//! logarithmic partitions are the same set of buckets; the base only
//! changes how bounds are reported. Values equal to `max` land in the last
//! bucket.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Bucket spacing of a scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    /// Uniform bucket width.
    #[default]
    Linear,
    /// Uniform width in log2 space.
    Log2,
    /// Uniform width in log10 space.
    Log10,
}

impl ScaleKind {
    fn forward(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Log2 => x.log2(),
            Self::Log10 => x.log10(),
        }
    }

    fn inverse(self, t: f64) -> f64 {
        match self {
            Self::Linear => t,
            Self::Log2 => t.exp2(),
            Self::Log10 => 10_f64.powf(t),
        }
    }

    const fn is_log(self) -> bool {
        !matches!(self, Self::Linear)
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linear => "linear",
            Self::Log2 => "log2",
            Self::Log10 => "log10",
        })
    }
}

/// Serializable description of a scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    /// Bucket spacing.
    #[serde(default)]
    pub kind: ScaleKind,
    /// Lower bound of the domain.
    pub min: f64,
    /// Upper bound of the domain.
    pub max: f64,
    /// Number of buckets.
    pub size: usize,
}

impl ScaleConfig {
    /// Validate and build the scale.
    ///
    /// # Errors
    ///
    /// See [`Scale::new`].
    pub fn build(&self) -> Result<Scale> {
        Scale::new(self.kind, self.min, self.max, self.size)
    }
}

/// Validated monotone mapping from raw values to bucket indices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    kind: ScaleKind,
    min: f64,
    max: f64,
    size: usize,
    low: f64,
    high: f64,
}

impl Scale {
    /// Create a scale of `size` buckets over `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if `size` is zero, a bound is not
    /// finite, `min >= max`, or `min <= 0` for a logarithmic scale.
    pub fn new(kind: ScaleKind, min: f64, max: f64, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Configuration(format!("{kind} scale needs at least one bucket")));
        }
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(Error::Configuration(format!(
                "{kind} scale bounds [{min}, {max}] are not an increasing finite range"
            )));
        }
        if kind.is_log() && min <= 0.0 {
            return Err(Error::Configuration(format!(
                "{kind} scale needs a positive lower bound, got {min}"
            )));
        }
        Ok(Self {
            kind,
            min,
            max,
            size,
            low: kind.forward(min),
            high: kind.forward(max),
        })
    }

    /// Linear scale.
    ///
    /// # Errors
    ///
    /// See [`Scale::new`].
    pub fn linear(min: f64, max: f64, size: usize) -> Result<Self> {
        Self::new(ScaleKind::Linear, min, max, size)
    }

    /// Log2 scale.
    ///
    /// # Errors
    ///
    /// See [`Scale::new`].
    pub fn log2(min: f64, max: f64, size: usize) -> Result<Self> {
        Self::new(ScaleKind::Log2, min, max, size)
    }

    /// Log10 scale.
    ///
    /// # Errors
    ///
    /// See [`Scale::new`].
    pub fn log10(min: f64, max: f64, size: usize) -> Result<Self> {
        Self::new(ScaleKind::Log10, min, max, size)
    }

    /// Bucket spacing.
    #[must_use]
    pub const fn kind(&self) -> ScaleKind {
        self.kind
    }

    /// Lower bound of the domain.
    #[must_use]
    pub const fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound of the domain.
    #[must_use]
    pub const fn max(&self) -> f64 {
        self.max
    }

    /// Number of buckets.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Width of the domain.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.max - self.min
    }

    /// Serializable form.
    #[must_use]
    pub const fn config(&self) -> ScaleConfig {
        ScaleConfig {
            kind: self.kind,
            min: self.min,
            max: self.max,
            size: self.size,
        }
    }

    /// Bucket of `x`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Domain` for NaN, for `x <= 0` on a logarithmic
    /// scale, and for values outside `[min, max]`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn index(&self, x: f64) -> Result<usize> {
        if x.is_nan() || (self.kind.is_log() && x <= 0.0) || x < self.min || x > self.max {
            return Err(self.domain_error(x));
        }
        if x >= self.max {
            return Ok(self.size - 1);
        }
        let t = (self.kind.forward(x) - self.low) / (self.high - self.low);
        let i = (t * self.size as f64).floor() as usize;
        Ok(i.min(self.size - 1))
    }

    /// Bucket of `x`, mapping out-of-domain values to the nearest edge.
    ///
    /// NaN maps to the last bucket (the worst target for minimization).
    #[must_use]
    pub fn clamped_index(&self, x: f64) -> usize {
        if x.is_nan() || x >= self.max {
            self.size - 1
        } else if x <= self.min {
            0
        } else {
            self.index(x).unwrap_or(self.size - 1)
        }
    }

    /// Half-open bounds `[low, high)` of bucket `i`, in the raw domain.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self, i: usize) -> (f64, f64) {
        let edge = |k: usize| {
            if k == 0 {
                self.min
            } else if k >= self.size {
                self.max
            } else {
                let t = self.low + (self.high - self.low) * k as f64 / self.size as f64;
                self.kind.inverse(t)
            }
        };
        (edge(i), edge(i + 1))
    }

    /// Width of bucket `i` relative to the domain width.
    #[must_use]
    pub fn relative_width(&self, i: usize) -> f64 {
        let (low, high) = self.bounds(i);
        (high - low) / self.length()
    }

    fn domain_error(&self, value: f64) -> Error {
        Error::Domain {
            value,
            scale: self.to_string(),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}, {}]/{}", self.kind, self.min, self.max, self.size)
    }
}
