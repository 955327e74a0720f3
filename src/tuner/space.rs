//! Encoding of a template's hyperparameters into the unit hypercube

use crate::error::{GreenGuardError, Result};
use crate::template::{Domain, HyperparameterAssignment, HyperparameterSpec, HyperparameterValue, PipelineTemplate};
use ndarray::{Array1, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// One hyperparameter and the columns it occupies in the encoded vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Dimension {
    name: String,
    spec: HyperparameterSpec,
    offset: usize,
    width: usize,
}

/// Search space over the tunable hyperparameters of a template
///
/// Numeric values are scaled to `[0, 1]` (on a log scale when declared),
/// booleans map to `0`/`1` and categoricals are one-hot encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    dimensions: Vec<Dimension>,
    n_dims: usize,
}

impl SearchSpace {
    /// Search space of every tunable hyperparameter in `template`
    pub fn from_template(template: &PipelineTemplate) -> Self {
        Self::from_specs(
            template
                .hyperparameters()
                .into_iter()
                .map(|(name, spec)| (name, spec.clone())),
        )
    }

    /// Search space from `(qualified name, spec)` pairs
    pub fn from_specs(specs: impl IntoIterator<Item = (String, HyperparameterSpec)>) -> Self {
        let mut offset = 0;
        let dimensions = specs
            .into_iter()
            .map(|(name, spec)| {
                let width = match &spec.domain {
                    Domain::Choices(choices) => choices.len(),
                    _ => 1,
                };
                let dim = Dimension { name, spec, offset, width };
                offset += width;
                dim
            })
            .collect();

        Self { dimensions, n_dims: offset }
    }

    /// Width of the encoded vector
    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    /// Number of hyperparameters
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Whether the space has no hyperparameters
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Fully-qualified hyperparameter names in encoding order
    pub fn names(&self) -> Vec<String> {
        self.dimensions.iter().map(|d| d.name.clone()).collect()
    }

    /// Sample an assignment uniformly from every domain
    pub fn sample(&self, rng: &mut impl Rng) -> HyperparameterAssignment {
        self.dimensions
            .iter()
            .map(|d| (d.name.clone(), d.spec.sample(rng)))
            .collect()
    }

    /// Whether every value of `assignment` is within its domain
    pub fn contains(&self, assignment: &HyperparameterAssignment) -> bool {
        assignment.len() == self.dimensions.len()
            && self.dimensions.iter().all(|d| {
                assignment
                    .get(&d.name)
                    .map(|v| d.spec.contains(v))
                    .unwrap_or(false)
            })
    }

    /// Encode an assignment into the unit hypercube
    pub fn encode(&self, assignment: &HyperparameterAssignment) -> Result<Array1<f64>> {
        let mut x = Array1::zeros(self.n_dims);

        for d in &self.dimensions {
            let value = assignment.get(&d.name).ok_or_else(|| {
                GreenGuardError::InvalidAssignment(format!("missing hyperparameter '{}'", d.name))
            })?;
            let value = d.spec.check(&d.name, value)?;

            match (&d.spec.domain, &value) {
                (Domain::Choices(choices), HyperparameterValue::Categorical(v)) => {
                    if let Some(pos) = choices.iter().position(|c| c == v) {
                        x[d.offset + pos] = 1.0;
                    }
                }
                (Domain::IntRange { low, high, log_scale }, HyperparameterValue::Int(v)) => {
                    x[d.offset] = unit(*v as f64, *low as f64, *high as f64, *log_scale);
                }
                (Domain::RealRange { low, high, log_scale }, HyperparameterValue::Real(v)) => {
                    x[d.offset] = unit(*v, *low, *high, *log_scale);
                }
                (Domain::Boolean, HyperparameterValue::Bool(v)) => {
                    x[d.offset] = if *v { 1.0 } else { 0.0 };
                }
                _ => {
                    return Err(GreenGuardError::InvalidAssignment(format!(
                        "value {} does not match the kind of '{}'",
                        value, d.name
                    )))
                }
            }
        }

        Ok(x)
    }

    /// Decode a point of the unit hypercube into the nearest valid assignment
    pub fn decode(&self, x: ArrayView1<'_, f64>) -> Result<HyperparameterAssignment> {
        if x.len() != self.n_dims {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} encoded dimensions", self.n_dims),
                actual: format!("{} encoded dimensions", x.len()),
            });
        }

        let assignment = self
            .dimensions
            .iter()
            .map(|d| {
                let u = x[d.offset];
                let value = match &d.spec.domain {
                    Domain::Choices(choices) => {
                        let block = x.slice(ndarray::s![d.offset..d.offset + d.width]);
                        let mut best = 0;
                        for (i, v) in block.iter().enumerate() {
                            if *v > block[best] {
                                best = i;
                            }
                        }
                        HyperparameterValue::Categorical(choices[best].clone())
                    }
                    Domain::IntRange { low, high, log_scale } => {
                        let v = from_unit(u, *low as f64, *high as f64, *log_scale).round() as i64;
                        HyperparameterValue::Int(v.clamp(*low, *high))
                    }
                    Domain::RealRange { low, high, log_scale } => {
                        HyperparameterValue::Real(from_unit(u, *low, *high, *log_scale).clamp(*low, *high))
                    }
                    Domain::Boolean => HyperparameterValue::Bool(u >= 0.5),
                };
                (d.name.clone(), value)
            })
            .collect();

        Ok(assignment)
    }
}

fn unit(v: f64, low: f64, high: f64, log_scale: bool) -> f64 {
    let (v, low, high) = if log_scale { (v.ln(), low.ln(), high.ln()) } else { (v, low, high) };
    if high > low {
        ((v - low) / (high - low)).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn from_unit(u: f64, low: f64, high: f64, log_scale: bool) -> f64 {
    let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.0 };
    if log_scale {
        (low.ln() + u * (high.ln() - low.ln())).exp()
    } else {
        low + u * (high - low)
    }
}
