//! Hyperparameter declarations and values

use crate::error::{GreenGuardError, Result};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a tunable hyperparameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HyperparameterKind {
    Categorical,
    Integer,
    Real,
    Boolean,
}

/// Valid values of a hyperparameter. Ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// Finite set of choices
    Choices(Vec<String>),
    /// Integer range
    IntRange { low: i64, high: i64, log_scale: bool },
    /// Continuous range
    RealRange { low: f64, high: f64, log_scale: bool },
    /// `true` or `false`
    Boolean,
}

impl Domain {
    /// Kind of values this domain holds
    pub fn kind(&self) -> HyperparameterKind {
        match self {
            Domain::Choices(_) => HyperparameterKind::Categorical,
            Domain::IntRange { .. } => HyperparameterKind::Integer,
            Domain::RealRange { .. } => HyperparameterKind::Real,
            Domain::Boolean => HyperparameterKind::Boolean,
        }
    }
}

/// Concrete hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HyperparameterValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Categorical(String),
}

impl HyperparameterValue {
    /// Get as float (integers are widened)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            HyperparameterValue::Real(v) => Some(*v),
            HyperparameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as int
    pub fn as_int(&self) -> Option<i64> {
        match self {
            HyperparameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HyperparameterValue::Categorical(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HyperparameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for HyperparameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperparameterValue::Bool(v) => write!(f, "{}", v),
            HyperparameterValue::Int(v) => write!(f, "{}", v),
            HyperparameterValue::Real(v) => write!(f, "{}", v),
            HyperparameterValue::Categorical(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<bool> for HyperparameterValue {
    fn from(v: bool) -> Self {
        HyperparameterValue::Bool(v)
    }
}

impl From<i64> for HyperparameterValue {
    fn from(v: i64) -> Self {
        HyperparameterValue::Int(v)
    }
}

impl From<f64> for HyperparameterValue {
    fn from(v: f64) -> Self {
        HyperparameterValue::Real(v)
    }
}

impl From<&str> for HyperparameterValue {
    fn from(v: &str) -> Self {
        HyperparameterValue::Categorical(v.to_string())
    }
}

/// A tunable hyperparameter of one pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpec {
    pub name: String,
    pub domain: Domain,
    pub default: HyperparameterValue,
}

impl HyperparameterSpec {
    /// Continuous hyperparameter in `[low, high]`
    pub fn real(name: impl Into<String>, low: f64, high: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            domain: Domain::RealRange { low, high, log_scale: false },
            default: HyperparameterValue::Real(default),
        }
    }

    /// Continuous hyperparameter searched on a log scale
    pub fn log_real(name: impl Into<String>, low: f64, high: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            domain: Domain::RealRange { low, high, log_scale: true },
            default: HyperparameterValue::Real(default),
        }
    }

    /// Integer hyperparameter in `[low, high]`
    pub fn integer(name: impl Into<String>, low: i64, high: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            domain: Domain::IntRange { low, high, log_scale: false },
            default: HyperparameterValue::Int(default),
        }
    }

    /// Integer hyperparameter searched on a log scale
    pub fn log_integer(name: impl Into<String>, low: i64, high: i64, default: i64) -> Self {
        Self {
            name: name.into(),
            domain: Domain::IntRange { low, high, log_scale: true },
            default: HyperparameterValue::Int(default),
        }
    }

    /// Categorical hyperparameter
    pub fn categorical(name: impl Into<String>, choices: &[&str], default: &str) -> Self {
        Self {
            name: name.into(),
            domain: Domain::Choices(choices.iter().map(|c| c.to_string()).collect()),
            default: HyperparameterValue::Categorical(default.to_string()),
        }
    }

    /// Boolean hyperparameter
    pub fn boolean(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            domain: Domain::Boolean,
            default: HyperparameterValue::Bool(default),
        }
    }

    /// Kind of this hyperparameter
    pub fn kind(&self) -> HyperparameterKind {
        self.domain.kind()
    }

    /// Check that the declaration itself is well formed
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GreenGuardError::TemplateError(
                "hyperparameter name must not be empty".to_string(),
            ));
        }
        match &self.domain {
            Domain::Choices(choices) => {
                if choices.is_empty() {
                    return Err(GreenGuardError::TemplateError(format!(
                        "hyperparameter '{}' has no choices",
                        self.name
                    )));
                }
            }
            Domain::IntRange { low, high, log_scale } => {
                if low > high {
                    return Err(GreenGuardError::TemplateError(format!(
                        "hyperparameter '{}' has empty range [{}, {}]",
                        self.name, low, high
                    )));
                }
                if *log_scale && *low <= 0 {
                    return Err(GreenGuardError::TemplateError(format!(
                        "log-scaled hyperparameter '{}' needs a positive lower bound",
                        self.name
                    )));
                }
            }
            Domain::RealRange { low, high, log_scale } => {
                if !low.is_finite() || !high.is_finite() || low > high {
                    return Err(GreenGuardError::TemplateError(format!(
                        "hyperparameter '{}' has invalid range [{}, {}]",
                        self.name, low, high
                    )));
                }
                if *log_scale && *low <= 0.0 {
                    return Err(GreenGuardError::TemplateError(format!(
                        "log-scaled hyperparameter '{}' needs a positive lower bound",
                        self.name
                    )));
                }
            }
            Domain::Boolean => {}
        }
        if !self.contains(&self.default) {
            return Err(GreenGuardError::TemplateError(format!(
                "default {} of hyperparameter '{}' is outside its domain",
                self.default, self.name
            )));
        }
        Ok(())
    }

    /// Whether `value` lies within the domain
    pub fn contains(&self, value: &HyperparameterValue) -> bool {
        match (&self.domain, value) {
            (Domain::Choices(choices), HyperparameterValue::Categorical(v)) => choices.contains(v),
            (Domain::IntRange { low, high, .. }, HyperparameterValue::Int(v)) => low <= v && v <= high,
            (Domain::RealRange { low, high, .. }, HyperparameterValue::Real(v)) => {
                v.is_finite() && *low <= *v && *v <= *high
            }
            (Domain::RealRange { low, high, .. }, HyperparameterValue::Int(v)) => {
                let v = *v as f64;
                *low <= v && v <= *high
            }
            (Domain::Boolean, HyperparameterValue::Bool(_)) => true,
            _ => false,
        }
    }

    /// Validate `value` and return it in canonical form
    ///
    /// Integers given for a real domain are widened to reals.
    pub fn check(&self, qualified_name: &str, value: &HyperparameterValue) -> Result<HyperparameterValue> {
        if !self.contains(value) {
            return Err(GreenGuardError::InvalidAssignment(format!(
                "value {} for '{}' is outside domain {:?}",
                value, qualified_name, self.domain
            )));
        }
        Ok(match (&self.domain, value) {
            (Domain::RealRange { .. }, HyperparameterValue::Int(v)) => HyperparameterValue::Real(*v as f64),
            _ => value.clone(),
        })
    }

    /// Sample a value uniformly from the domain
    pub fn sample(&self, rng: &mut impl Rng) -> HyperparameterValue {
        match &self.domain {
            Domain::Choices(choices) => {
                let idx = rng.gen_range(0..choices.len());
                HyperparameterValue::Categorical(choices[idx].clone())
            }
            Domain::IntRange { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = (*low as f64).ln();
                    let log_high = (*high as f64 + 1.0).ln();
                    let v = (rng.gen::<f64>() * (log_high - log_low) + log_low).exp().floor() as i64;
                    v.clamp(*low, *high)
                } else {
                    rng.gen_range(*low..=*high)
                };
                HyperparameterValue::Int(val)
            }
            Domain::RealRange { low, high, log_scale } => {
                let val = if *log_scale {
                    let log_low = low.ln();
                    let log_high = high.ln();
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                HyperparameterValue::Real(val.clamp(*low, *high))
            }
            Domain::Boolean => HyperparameterValue::Bool(rng.gen()),
        }
    }
}
