//! Error types for the GreenGuard search engine

use thiserror::Error;

/// Result type alias for GreenGuard operations
pub type Result<T> = std::result::Result<T, GreenGuardError>;

/// Main error type for the GreenGuard engine
#[derive(Error, Debug)]
pub enum GreenGuardError {
    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    #[error("Step '{step}' failed to fit: {source}")]
    StepFit {
        step: String,
        #[source]
        source: Box<GreenGuardError>,
    },

    #[error("Pipeline not fitted")]
    NotFitted,

    #[error("Evaluation timed out after {elapsed_secs:.3}s (limit {limit_secs:.3}s)")]
    EvaluationTimeout { elapsed_secs: f64, limit_secs: f64 },

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Primitive not found: {0}")]
    PrimitiveNotFound(String),

    #[error("No viable pipeline found after {trials} trials")]
    NoViablePipeline { trials: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl GreenGuardError {
    /// Wrap an error raised by a pipeline step
    pub fn step_fit(step: impl Into<String>, source: GreenGuardError) -> Self {
        GreenGuardError::StepFit {
            step: step.into(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for GreenGuardError {
    fn from(err: serde_json::Error) -> Self {
        GreenGuardError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for GreenGuardError {
    fn from(err: ndarray::ShapeError) -> Self {
        GreenGuardError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
