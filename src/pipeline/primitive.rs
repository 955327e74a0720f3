//! Pipeline step implementations and their registry

use crate::error::{GreenGuardError, Result};
use crate::template::HyperparameterValue;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::primitives;

/// Kind of data flowing between two steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    /// Feature table, one row per sample
    Table,
    /// One label (or score) per sample
    Labels,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Table => write!(f, "table"),
            DataKind::Labels => write!(f, "labels"),
        }
    }
}

/// Data passed into or out of a step
#[derive(Debug, Clone)]
pub enum StepData {
    Table(Array2<f64>),
    Labels(Array1<f64>),
}

impl StepData {
    /// Kind of this data
    pub fn kind(&self) -> DataKind {
        match self {
            StepData::Table(_) => DataKind::Table,
            StepData::Labels(_) => DataKind::Labels,
        }
    }

    /// Number of samples
    pub fn n_samples(&self) -> usize {
        match self {
            StepData::Table(x) => x.nrows(),
            StepData::Labels(y) => y.len(),
        }
    }

    /// Borrow as a feature table
    pub fn as_table(&self) -> Result<&Array2<f64>> {
        match self {
            StepData::Table(x) => Ok(x),
            StepData::Labels(_) => Err(GreenGuardError::InvalidInput(
                "expected a feature table, got labels".to_string(),
            )),
        }
    }

    /// Borrow as labels
    pub fn as_labels(&self) -> Result<&Array1<f64>> {
        match self {
            StepData::Labels(y) => Ok(y),
            StepData::Table(_) => Err(GreenGuardError::InvalidInput(
                "expected labels, got a feature table".to_string(),
            )),
        }
    }

    /// Take ownership of the labels
    pub fn into_labels(self) -> Result<Array1<f64>> {
        match self {
            StepData::Labels(y) => Ok(y),
            StepData::Table(_) => Err(GreenGuardError::InvalidInput(
                "expected labels, got a feature table".to_string(),
            )),
        }
    }
}

/// A single executable pipeline step
///
/// `fit` learns state from training data; `produce` applies it. A primitive
/// is always fitted before it produces.
pub trait Primitive: Send {
    /// Learn step state from the step input and the training labels
    fn fit(&mut self, input: &StepData, y: &Array1<f64>) -> Result<()>;

    /// Transform the step input (or predict, for the final step)
    fn produce(&self, input: &StepData) -> Result<StepData>;
}

/// Resolved settings of one step: fixed settings merged with hyperparameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepParams {
    values: BTreeMap<String, HyperparameterValue>,
}

impl StepParams {
    /// Create from a map of values
    pub fn new(values: BTreeMap<String, HyperparameterValue>) -> Self {
        Self { values }
    }

    /// Set a value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HyperparameterValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Raw value
    pub fn get(&self, name: &str) -> Option<&HyperparameterValue> {
        self.values.get(name)
    }

    /// All values
    pub fn values(&self) -> &BTreeMap<String, HyperparameterValue> {
        &self.values
    }

    /// Float value or default
    pub fn real_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_float().ok_or_else(|| Self::wrong_type(name, "real", v)),
        }
    }

    /// Integer value or default
    pub fn int_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_int().ok_or_else(|| Self::wrong_type(name, "integer", v)),
        }
    }

    /// Boolean value or default
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_bool().ok_or_else(|| Self::wrong_type(name, "boolean", v)),
        }
    }

    /// String value or default
    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        match self.values.get(name) {
            None => Ok(default),
            Some(v) => v.as_str().ok_or_else(|| Self::wrong_type(name, "categorical", v)),
        }
    }

    fn wrong_type(name: &str, expected: &str, got: &HyperparameterValue) -> GreenGuardError {
        GreenGuardError::InvalidInput(format!("setting '{}' must be {}, got {}", name, expected, got))
    }
}

/// Builds a fresh primitive from its resolved settings
pub type PrimitiveConstructor = Arc<dyn Fn(&StepParams) -> Result<Box<dyn Primitive>> + Send + Sync>;

/// Registered primitive: name, typed interface and constructor
#[derive(Clone)]
pub struct PrimitiveDescriptor {
    pub name: String,
    pub input: DataKind,
    pub output: DataKind,
    constructor: PrimitiveConstructor,
}

impl PrimitiveDescriptor {
    /// Constructor shared by every instance of this primitive
    pub fn constructor(&self) -> PrimitiveConstructor {
        Arc::clone(&self.constructor)
    }

    /// Construct a fresh, unfitted primitive
    pub fn construct(&self, params: &StepParams) -> Result<Box<dyn Primitive>> {
        (self.constructor)(params)
    }
}

impl fmt::Debug for PrimitiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveDescriptor")
            .field("name", &self.name)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

/// Registry of named primitives
#[derive(Debug, Clone, Default)]
pub struct PrimitiveRegistry {
    primitives: HashMap<String, PrimitiveDescriptor>,
}

impl PrimitiveRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in primitives
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        primitives::register_builtins(&mut registry);
        registry
    }

    /// Register a primitive, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, input: DataKind, output: DataKind, constructor: F) -> &mut Self
    where
        F: Fn(&StepParams) -> Result<Box<dyn Primitive>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.primitives.insert(
            name.clone(),
            PrimitiveDescriptor {
                name,
                input,
                output,
                constructor: Arc::new(constructor),
            },
        );
        self
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_primitive<F>(mut self, name: impl Into<String>, input: DataKind, output: DataKind, constructor: F) -> Self
    where
        F: Fn(&StepParams) -> Result<Box<dyn Primitive>> + Send + Sync + 'static,
    {
        self.register(name, input, output, constructor);
        self
    }

    /// Look up a primitive
    pub fn get(&self, name: &str) -> Result<&PrimitiveDescriptor> {
        self.primitives
            .get(name)
            .ok_or_else(|| GreenGuardError::PrimitiveNotFound(name.to_string()))
    }

    /// Whether a primitive is registered
    pub fn contains(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.primitives.keys().cloned().collect();
        names.sort();
        names
    }
}
