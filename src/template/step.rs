//! Step declarations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::hyperparameter::{HyperparameterSpec, HyperparameterValue};

/// One step of a pipeline template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Step name, unique within the template
    pub name: String,
    /// Name of the registered primitive implementing the step
    pub primitive: String,
    /// Non-tunable settings
    pub fixed: BTreeMap<String, HyperparameterValue>,
    /// Tunable hyperparameters, in declaration order
    pub hyperparameters: Vec<HyperparameterSpec>,
    #[serde(default)]
    position: usize,
}

impl StepSpec {
    /// Create a step running `primitive`
    pub fn new(name: impl Into<String>, primitive: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primitive: primitive.into(),
            fixed: BTreeMap::new(),
            hyperparameters: Vec::new(),
            position: 0,
        }
    }

    /// Add a fixed setting
    pub fn with_fixed(mut self, name: impl Into<String>, value: impl Into<HyperparameterValue>) -> Self {
        self.fixed.insert(name.into(), value.into());
        self
    }

    /// Add a tunable hyperparameter
    pub fn with_hyperparameter(mut self, spec: HyperparameterSpec) -> Self {
        self.hyperparameters.push(spec);
        self
    }

    /// Position of the step in its template
    pub fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    /// Fully-qualified name of one of this step's hyperparameters
    pub fn qualified_name(&self, hyperparameter: &str) -> String {
        format!("{}.{}", self.name, hyperparameter)
    }
}
