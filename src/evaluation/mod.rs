//! Cross-validated evaluation of pipeline assignments
//!
//! Provides:
//! - Stratified and plain K-Fold splitting
//! - Classification scorers
//! - [`CrossValidationEvaluator`], which turns an assignment into a fitness

mod cross_validation;
mod evaluator;
mod scoring;

pub use cross_validation::{CrossValidator, CvSplit, CvStrategy};
pub use evaluator::{CrossValidationEvaluator, Evaluation, EvaluatorConfig, FoldFailure, FoldFailurePolicy};
pub use scoring::{Metric, Scorer};
