//! Search loop: propose, evaluate, record, observe

use crate::data::DatasetAccessor;
use crate::error::{GreenGuardError, Result};
use crate::evaluation::{CrossValidationEvaluator, Scorer};
use crate::ledger::{Trial, TrialLedger, TrialStatus, TrialStore};
use crate::pipeline::PipelineInstance;
use crate::template::{HyperparameterAssignment, PipelineTemplate};
use crate::tuner::{create_tuner, SearchSpace, Tuner};
use chrono::Utc;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::config::SearchConfig;

/// A proposal, or the reason the tuner could not make one
type Proposal = std::result::Result<HyperparameterAssignment, String>;

/// Drives the search over one template
///
/// The searcher is the only writer of its ledger. Every per-trial error is
/// recorded as a failed trial and the search continues.
pub struct Searcher {
    template: Arc<PipelineTemplate>,
    config: SearchConfig,
    evaluator: CrossValidationEvaluator,
    tuner: Box<dyn Tuner>,
    ledger: TrialLedger,
    store: Option<Arc<dyn TrialStore>>,
}

impl Searcher {
    /// Start a new search run with a fresh ledger
    pub fn new(template: impl Into<Arc<PipelineTemplate>>, config: SearchConfig) -> Result<Self> {
        let template = template.into();
        let ledger = TrialLedger::new(template.name());
        Self::resume(template, config, ledger)
    }

    /// Continue the run recorded in `ledger`
    ///
    /// The tuner is rebuilt by replaying every trial in index order.
    pub fn resume(template: impl Into<Arc<PipelineTemplate>>, config: SearchConfig, ledger: TrialLedger) -> Result<Self> {
        let template = template.into();
        config.validate()?;

        if ledger.template() != template.name() {
            return Err(GreenGuardError::ConfigError(format!(
                "ledger belongs to template '{}', not '{}'",
                ledger.template(),
                template.name()
            )));
        }

        let tuner = create_tuner(
            config.tuner,
            SearchSpace::from_template(&template),
            config.effective_tuner_config(),
        )?;
        let evaluator = CrossValidationEvaluator::new(config.evaluator.clone());

        let mut searcher = Self {
            template,
            config,
            evaluator,
            tuner,
            ledger,
            store: None,
        };
        searcher.replay();
        Ok(searcher)
    }

    /// Continue the run stored under `run_id`; later snapshots go to the same store
    pub fn resume_from_store(
        template: impl Into<Arc<PipelineTemplate>>,
        config: SearchConfig,
        store: Arc<dyn TrialStore>,
        run_id: &str,
    ) -> Result<Self> {
        let ledger = TrialLedger::load(store.as_ref(), run_id)?;
        Ok(Self::resume(template, config, ledger)?.with_store(store))
    }

    /// Replace the tuner; the ledger is replayed into it
    pub fn with_tuner(mut self, tuner: Box<dyn Tuner>) -> Self {
        self.tuner = tuner;
        self.replay();
        self
    }

    /// Write a ledger snapshot to `store` after every trial or batch
    pub fn with_store(mut self, store: Arc<dyn TrialStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn template(&self) -> &PipelineTemplate {
        &self.template
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn ledger(&self) -> &TrialLedger {
        &self.ledger
    }

    pub fn tuner(&self) -> &dyn Tuner {
        self.tuner.as_ref()
    }

    /// Give up the searcher and keep its ledger
    pub fn into_ledger(self) -> TrialLedger {
        self.ledger
    }

    /// Best trial so far
    pub fn best(&self) -> Option<&Trial> {
        self.ledger.best()
    }

    fn replay(&mut self) {
        for trial in self.ledger.trials() {
            if let Err(e) = self.tuner.observe(&trial.assignment, trial.fitness) {
                warn!(trial = trial.index, error = %e, "Tuner rejected replayed trial");
            }
        }
        if !self.ledger.is_empty() {
            info!(
                run_id = %self.ledger.run_id(),
                trials = self.ledger.len(),
                "Tuner rehydrated from ledger"
            );
        }
    }

    /// Run `config.budget` more trials and return the best trial of the run
    pub fn run(&mut self, dataset: &dyn DatasetAccessor, scorer: &dyn Scorer) -> Result<Trial> {
        let n_folds = self.config.evaluator.n_folds;
        if dataset.n_samples() < n_folds {
            return Err(GreenGuardError::ConfigError(format!(
                "{} samples cannot be split into {} folds",
                dataset.n_samples(),
                n_folds
            )));
        }

        self.ledger.grant_budget(self.config.budget);
        let batch_size = self.config.batch_size.max(1);

        info!(
            run_id = %self.ledger.run_id(),
            template = self.template.name(),
            tuner = self.config.tuner.name(),
            budget = self.ledger.remaining_budget(),
            batch_size,
            scorer = scorer.name(),
            "Starting search"
        );

        let pool = if batch_size > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(batch_size)
                    .build()
                    .map_err(|e| GreenGuardError::ComputationError(format!("Thread pool error: {}", e)))?,
            )
        } else {
            None
        };

        while self.ledger.remaining_budget() > 0 {
            let n = batch_size.min(self.ledger.remaining_budget());
            let proposals = self.propose(n);

            let template = self.template.as_ref();
            let evaluator = &self.evaluator;
            let evaluate = |proposal: Proposal| evaluate_trial(template, evaluator, proposal, dataset, scorer);

            let trials: Vec<Trial> = match &pool {
                Some(pool) => pool.install(|| proposals.into_par_iter().map(evaluate).collect()),
                None => proposals.into_iter().map(evaluate).collect(),
            };

            self.record(trials)?;
        }

        let best = match self.ledger.best() {
            Some(best) => best.clone(),
            None => {
                warn!(trials = self.ledger.len(), "No viable pipeline found");
                return Err(GreenGuardError::NoViablePipeline { trials: self.ledger.len() });
            }
        };

        info!(
            run_id = %self.ledger.run_id(),
            trials = self.ledger.len(),
            best_trial = best.index,
            best_fitness = best.fitness,
            "Search finished"
        );
        Ok(best)
    }

    fn propose(&mut self, n: usize) -> Vec<Proposal> {
        let mut proposals = Vec::with_capacity(n);
        if self.config.evaluate_defaults_first && self.ledger.is_empty() {
            proposals.push(Ok(self.template.default_assignment()));
        }

        let remaining = n - proposals.len();
        if remaining == 1 {
            proposals.push(self.tuner.propose().map_err(|e| e.to_string()));
        } else if remaining > 1 {
            match self.tuner.propose_batch(remaining) {
                Ok(batch) => proposals.extend(batch.into_iter().map(Ok)),
                Err(e) => proposals.extend((0..remaining).map(|_| Err(e.to_string()))),
            }
        }
        proposals
    }

    /// Append trials in proposal order, feed them to the tuner and checkpoint
    fn record(&mut self, trials: Vec<Trial>) -> Result<()> {
        let previous_best = self.ledger.best().map(|t| t.fitness);
        let mut observations = Vec::with_capacity(trials.len());

        for trial in trials {
            observations.push((trial.assignment.clone(), trial.fitness));
            let fitness = trial.fitness;
            let duration_secs = trial.duration_secs;
            let failure = match &trial.status {
                TrialStatus::Failed { reason } => Some(reason.clone()),
                TrialStatus::Completed if !fitness.is_finite() => Some("every fold failed".to_string()),
                TrialStatus::Completed => None,
            };

            let index = self.ledger.append(trial);
            match failure {
                Some(reason) => warn!(trial = index, reason = %reason, "Trial failed"),
                None => info!(trial = index, fitness, duration_secs, "Trial completed"),
            }
        }

        let observed = if observations.len() == 1 {
            let (assignment, fitness) = &observations[0];
            self.tuner.observe(assignment, *fitness)
        } else {
            self.tuner.observe_batch(&observations)
        };
        if let Err(e) = observed {
            warn!(error = %e, "Tuner could not use observation");
        }

        if let Some(best) = self.ledger.best() {
            if previous_best.map_or(true, |p| best.fitness > p) {
                info!(trial = best.index, fitness = best.fitness, assignment = ?best.assignment, "New best trial");
            }
        }

        if let Some(store) = &self.store {
            self.ledger.save(store.as_ref())?;
        }
        Ok(())
    }

    /// Build the best assignment and fit it on the whole dataset
    pub fn fit_best(&self, dataset: &dyn DatasetAccessor) -> Result<PipelineInstance> {
        let best = self
            .ledger
            .best()
            .ok_or(GreenGuardError::NoViablePipeline { trials: self.ledger.len() })?;

        let mut instance = self.template.build(&best.assignment)?;
        let indices: Vec<usize> = (0..dataset.n_samples()).collect();
        let (x, y) = dataset.select(&indices);
        instance.fit(&x, &y)?;

        info!(trial = best.index, n_samples = x.nrows(), "Fitted best pipeline");
        Ok(instance)
    }
}

/// Evaluate one proposal into an unindexed trial
fn evaluate_trial(
    template: &PipelineTemplate,
    evaluator: &CrossValidationEvaluator,
    proposal: Proposal,
    dataset: &dyn DatasetAccessor,
    scorer: &dyn Scorer,
) -> Trial {
    let started_at = Utc::now();
    let start = Instant::now();

    match proposal {
        Ok(assignment) => match evaluator.evaluate(template, &assignment, dataset, scorer) {
            Ok(evaluation) => Trial::completed(assignment, evaluation, started_at, start.elapsed()),
            Err(e) => Trial::failed(assignment, e.to_string(), started_at, start.elapsed()),
        },
        Err(reason) => Trial::failed(
            HyperparameterAssignment::new(),
            format!("tuner failed to propose: {}", reason),
            started_at,
            start.elapsed(),
        ),
    }
}
