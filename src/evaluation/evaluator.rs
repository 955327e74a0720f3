//! Cross-validated fitness of one hyperparameter assignment

use crate::data::DatasetAccessor;
use crate::error::{GreenGuardError, Result};
use crate::template::{HyperparameterAssignment, PipelineTemplate};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cross_validation::{CrossValidator, CvSplit, CvStrategy};
use super::scoring::Scorer;

/// How failed folds enter the mean fitness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldFailurePolicy {
    /// Average over the successful folds only; `-inf` when none succeeded
    Exclude,
    /// Any failed fold makes the mean `-inf`
    NegativeInfinity,
}

impl Default for FoldFailurePolicy {
    fn default() -> Self {
        FoldFailurePolicy::Exclude
    }
}

/// Configuration for cross-validated evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Number of folds
    pub n_folds: usize,
    /// Keep class proportions in every fold
    pub stratified: bool,
    /// Shuffle samples before dealing them to folds
    pub shuffle: bool,
    /// Seed for fold shuffling
    pub random_state: Option<u64>,
    /// Treatment of failed folds
    pub failure_policy: FoldFailurePolicy,
    /// Per-trial time limit in seconds, checked between folds
    pub timeout_secs: Option<f64>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            stratified: true,
            shuffle: true,
            random_state: Some(0),
            failure_policy: FoldFailurePolicy::Exclude,
            timeout_secs: None,
        }
    }
}

impl EvaluatorConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the number of folds
    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.n_folds = n;
        self
    }

    /// Builder method to set the failed-fold policy
    pub fn with_failure_policy(mut self, policy: FoldFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Builder method to set the per-trial timeout
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Builder method to set the fold seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Builder method to toggle stratification
    pub fn with_stratified(mut self, stratified: bool) -> Self {
        self.stratified = stratified;
        self
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64)
    }
}

/// A fold whose fit or score failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldFailure {
    pub fold: usize,
    pub error: String,
}

/// Result of cross-validating one assignment
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Aggregate score, higher is better
    pub fitness: f64,
    /// Score of every fold, `-inf` for failed folds
    pub fold_scores: Vec<f64>,
    /// Standard deviation of the successful fold scores
    pub std_score: f64,
    /// Folds that failed
    pub failures: Vec<FoldFailure>,
}

impl Evaluation {
    fn aggregate(fold_scores: Vec<f64>, failures: Vec<FoldFailure>, policy: FoldFailurePolicy) -> Self {
        let succeeded: Vec<f64> = fold_scores.iter().copied().filter(|s| s.is_finite()).collect();

        let (mean, std_score) = if succeeded.is_empty() {
            (f64::NEG_INFINITY, 0.0)
        } else {
            let n = succeeded.len() as f64;
            let mean = succeeded.iter().sum::<f64>() / n;
            let variance = succeeded.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            (mean, variance.sqrt())
        };

        let fitness = match policy {
            FoldFailurePolicy::Exclude => mean,
            FoldFailurePolicy::NegativeInfinity if !failures.is_empty() => f64::NEG_INFINITY,
            FoldFailurePolicy::NegativeInfinity => mean,
        };

        Self {
            fitness,
            fold_scores,
            std_score,
            failures,
        }
    }

    /// Whether at least one fold produced a usable score
    pub fn is_viable(&self) -> bool {
        self.fitness.is_finite()
    }
}

/// Scores assignments of a template by K-fold cross-validation
#[derive(Debug, Clone, Default)]
pub struct CrossValidationEvaluator {
    config: EvaluatorConfig,
}

impl CrossValidationEvaluator {
    /// Create an evaluator
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// Evaluator configuration
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Fold splits used for `dataset`
    pub fn splits(&self, dataset: &dyn DatasetAccessor) -> Result<Vec<CvSplit>> {
        let strategy = if self.config.stratified {
            CvStrategy::StratifiedKFold { n_splits: self.config.n_folds, shuffle: self.config.shuffle }
        } else {
            CvStrategy::KFold { n_splits: self.config.n_folds, shuffle: self.config.shuffle }
        };
        let mut cv = CrossValidator::new(strategy);
        if let Some(seed) = self.config.random_state {
            cv = cv.with_random_state(seed);
        }
        cv.split(&dataset.labels())
    }

    /// Cross-validate one assignment
    ///
    /// Fold failures are recorded as `-inf` scores and reported as warnings.
    /// Invalid assignments, bad fold configuration and timeouts are errors.
    pub fn evaluate(
        &self,
        template: &PipelineTemplate,
        assignment: &HyperparameterAssignment,
        dataset: &dyn DatasetAccessor,
        scorer: &dyn Scorer,
    ) -> Result<Evaluation> {
        let assignment = template.validate_assignment(assignment)?;
        let splits = self.splits(dataset)?;
        let timeout = self.config.timeout();
        let start = Instant::now();

        let mut fold_scores = Vec::with_capacity(splits.len());
        let mut failures = Vec::new();

        for split in &splits {
            match Self::evaluate_fold(template, &assignment, dataset, scorer, split) {
                Ok(score) => {
                    debug!(fold = split.fold_idx, score, scorer = scorer.name(), "Fold scored");
                    fold_scores.push(score);
                }
                Err(e) => {
                    warn!(
                        template = template.name(),
                        fold = split.fold_idx,
                        error = %e,
                        "Cross-validation fold failed"
                    );
                    fold_scores.push(f64::NEG_INFINITY);
                    failures.push(FoldFailure {
                        fold: split.fold_idx,
                        error: e.to_string(),
                    });
                }
            }

            if let Some(limit) = timeout {
                let elapsed = start.elapsed();
                if elapsed > limit {
                    return Err(GreenGuardError::EvaluationTimeout {
                        elapsed_secs: elapsed.as_secs_f64(),
                        limit_secs: limit.as_secs_f64(),
                    });
                }
            }
        }

        Ok(Evaluation::aggregate(fold_scores, failures, self.config.failure_policy))
    }

    fn evaluate_fold(
        template: &PipelineTemplate,
        assignment: &HyperparameterAssignment,
        dataset: &dyn DatasetAccessor,
        scorer: &dyn Scorer,
        split: &CvSplit,
    ) -> Result<f64> {
        // Fresh instance per fold so nothing learned leaks between folds
        let mut instance = template.build(assignment)?;

        let (x_train, y_train) = dataset.select(&split.train_indices);
        instance.fit(&x_train, &y_train)?;

        let (x_test, y_test) = dataset.select(&split.test_indices);
        let score = instance.score(&x_test, &y_test, scorer)?;
        if !score.is_finite() {
            return Err(GreenGuardError::ComputationError(format!(
                "scorer '{}' returned non-finite score {}",
                scorer.name(),
                score
            )));
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_exclude() {
        let failures = vec![FoldFailure { fold: 1, error: "boom".into() }];
        let eval = Evaluation::aggregate(
            vec![0.8, f64::NEG_INFINITY, 0.6],
            failures,
            FoldFailurePolicy::Exclude,
        );
        assert!((eval.fitness - 0.7).abs() < 1e-12);
        assert!((eval.std_score - 0.1).abs() < 1e-12);
        assert_eq!(eval.fold_scores.len(), 3);
    }

    #[test]
    fn test_aggregate_negative_infinity() {
        let failures = vec![FoldFailure { fold: 1, error: "boom".into() }];
        let eval = Evaluation::aggregate(
            vec![0.8, f64::NEG_INFINITY, 0.6],
            failures,
            FoldFailurePolicy::NegativeInfinity,
        );
        assert_eq!(eval.fitness, f64::NEG_INFINITY);
        assert!(!eval.is_viable());
    }

    #[test]
    fn test_aggregate_all_failed() {
        let failures = (0..2).map(|fold| FoldFailure { fold, error: "boom".into() }).collect();
        let eval = Evaluation::aggregate(
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY],
            failures,
            FoldFailurePolicy::Exclude,
        );
        assert_eq!(eval.fitness, f64::NEG_INFINITY);
    }

    #[test]
    fn test_config_builder() {
        let config = EvaluatorConfig::new()
            .with_n_folds(3)
            .with_failure_policy(FoldFailurePolicy::NegativeInfinity)
            .with_timeout(2.5);

        assert_eq!(config.n_folds, 3);
        assert_eq!(config.failure_policy, FoldFailurePolicy::NegativeInfinity);
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
    }
}
