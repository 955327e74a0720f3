//! Pipeline execution
//!
//! Provides the step abstraction and the executable pipeline:
//! - [`Primitive`] - a single fit/produce step
//! - [`PrimitiveRegistry`] - named primitives with typed inputs and outputs
//! - [`PipelineInstance`] - a template bound to one hyperparameter assignment
//! - Built-in primitives (imputer, scalers, logistic regression)

mod instance;
mod primitive;
pub mod primitives;

pub use instance::{BoundStep, PipelineInstance};
pub use primitive::{
    DataKind, Primitive, PrimitiveConstructor, PrimitiveDescriptor, PrimitiveRegistry, StepData, StepParams,
};
pub use primitives::{ImputeStrategy, LogisticRegression, MinMaxScaler, SimpleImputer, StandardScaler};
