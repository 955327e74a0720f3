//! GreenGuard - pipeline search and tuning engine
//!
//! Given a pipeline template (an ordered chain of steps with tunable
//! hyperparameters), a labeled dataset and a trial budget, this crate
//! searches the template's hyperparameter space with a Gaussian-process
//! tuner, scores every proposal by K-fold cross-validation and returns the
//! best pipeline found.
//!
//! # Modules
//!
//! - [`template`] - Pipeline templates, step and hyperparameter declarations
//! - [`pipeline`] - Primitives and executable pipeline instances
//! - [`evaluation`] - Fold splitting, scorers and cross-validated fitness
//! - [`tuner`] - Search-space encoding, GP and uniform tuners
//! - [`ledger`] - Trial records, the trial ledger and its stores
//! - [`search`] - The search loop
//! - [`data`] - Dataset access

// Core error handling
pub mod error;

pub mod data;
pub mod evaluation;
pub mod ledger;
pub mod pipeline;
pub mod search;
pub mod template;
pub mod tuner;

pub use error::{GreenGuardError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{GreenGuardError, Result};

    // Data
    pub use crate::data::{Dataset, DatasetAccessor};

    // Templates
    pub use crate::template::{
        HyperparameterAssignment, HyperparameterSpec, HyperparameterValue, InMemoryTemplateRegistry,
        PipelineTemplate, StepSpec, TemplateRegistry,
    };

    // Pipelines
    pub use crate::pipeline::{DataKind, PipelineInstance, Primitive, PrimitiveRegistry, StepData, StepParams};

    // Evaluation
    pub use crate::evaluation::{CrossValidationEvaluator, EvaluatorConfig, FoldFailurePolicy, Metric, Scorer};

    // Tuning
    pub use crate::tuner::{create_tuner, GpTuner, GpTunerConfig, SearchSpace, Tuner, TunerKind, UniformTuner};

    // Ledger
    pub use crate::ledger::{LocalStore, MemoryStore, Trial, TrialLedger, TrialStatus, TrialStore};

    // Search
    pub use crate::search::{run_search, SearchConfig, Searcher};
}
