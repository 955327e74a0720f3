//! Search configuration

use crate::error::{GreenGuardError, Result};
use crate::evaluation::EvaluatorConfig;
use crate::tuner::{GpTunerConfig, TunerKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a search run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Trials granted per call to `run`
    pub budget: usize,

    /// Proposals evaluated in parallel; 1 is plain sequential search
    pub batch_size: usize,

    /// Tuner strategy
    pub tuner: TunerKind,

    /// Settings for GP tuners; the seed is also used by the uniform tuner
    pub tuner_config: GpTunerConfig,

    /// Cross-validation settings
    pub evaluator: EvaluatorConfig,

    /// Score the template defaults as the first trial of a new run
    pub evaluate_defaults_first: bool,

    /// Seed for the tuner when `tuner_config.random_state` is unset
    pub random_state: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            budget: 20,
            batch_size: 1,
            tuner: TunerKind::GpEi,
            tuner_config: GpTunerConfig::default(),
            evaluator: EvaluatorConfig::default(),
            evaluate_defaults_first: true,
            random_state: Some(42),
        }
    }
}

impl SearchConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the budget
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    /// Builder method to set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builder method to set the tuner strategy
    pub fn with_tuner(mut self, tuner: TunerKind) -> Self {
        self.tuner = tuner;
        self
    }

    /// Builder method to set the tuner settings
    pub fn with_tuner_config(mut self, tuner_config: GpTunerConfig) -> Self {
        self.tuner_config = tuner_config;
        self
    }

    /// Builder method to set the evaluator settings
    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Builder method to toggle scoring the defaults first
    pub fn with_defaults_first(mut self, enabled: bool) -> Self {
        self.evaluate_defaults_first = enabled;
        self
    }

    /// Builder method to set the seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Parse a JSON configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check settings that cannot be corrected at run time
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(GreenGuardError::ConfigError("batch_size must be at least 1".to_string()));
        }
        if self.evaluator.n_folds < 2 {
            return Err(GreenGuardError::ConfigError(format!(
                "n_folds must be at least 2, got {}",
                self.evaluator.n_folds
            )));
        }
        Ok(())
    }

    /// Tuner settings with the search seed filled in
    pub(crate) fn effective_tuner_config(&self) -> GpTunerConfig {
        let mut config = self.tuner_config.clone();
        if config.random_state.is_none() {
            config.random_state = self.random_state;
        }
        config
    }
}
