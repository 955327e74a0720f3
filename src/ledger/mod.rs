//! Trial ledger
//!
//! Append-only record of every trial of one search run. The ledger is the
//! only state needed to resume a search: replaying its trials into a fresh
//! tuner rebuilds the surrogate model.

mod storage;
mod trial;

pub use storage::{LocalStore, MemoryStore, TrialStore};
pub use trial::{Trial, TrialStatus};

use crate::error::{GreenGuardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ordered trials of one search run plus its budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialLedger {
    run_id: Uuid,
    template: String,
    created_at: DateTime<Utc>,
    budget: usize,
    trials: Vec<Trial>,
}

impl TrialLedger {
    /// Empty ledger with a fresh run id and no budget
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            template: template.into(),
            created_at: Utc::now(),
            budget: 0,
            trials: Vec::new(),
        }
    }

    /// Search-run identifier, also the storage key
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Name of the searched template
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Creation time of the run
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a trial, assigning it the next index
    pub fn append(&mut self, mut trial: Trial) -> usize {
        let index = self.trials.len();
        trial.index = index;
        self.trials.push(trial);
        index
    }

    /// Trial with the highest finite fitness; ties go to the earliest trial
    pub fn best(&self) -> Option<&Trial> {
        let mut best: Option<&Trial> = None;
        for trial in self.trials.iter().filter(|t| t.is_viable()) {
            if best.map_or(true, |b| trial.fitness > b.fitness) {
                best = Some(trial);
            }
        }
        best
    }

    /// All trials in index order
    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    /// Number of recorded trials
    pub fn len(&self) -> usize {
        self.trials.len()
    }

    /// Whether no trial has been recorded yet
    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Total number of trials granted to this run
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Trials that may still be appended within the budget
    pub fn remaining_budget(&self) -> usize {
        self.budget.saturating_sub(self.trials.len())
    }

    /// Allow exactly `n` more trials from the current length
    ///
    /// Any budget left unused by an interrupted run is dropped.
    pub fn grant_budget(&mut self, n: usize) {
        self.budget = self.trials.len() + n;
    }

    /// Pretty JSON snapshot
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Restore a snapshot written by [`TrialLedger::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let ledger: Self = serde_json::from_slice(bytes)?;
        for (i, trial) in ledger.trials.iter().enumerate() {
            if trial.index != i {
                return Err(GreenGuardError::SerializationError(format!(
                    "trial at position {} has index {}",
                    i, trial.index
                )));
            }
        }
        Ok(ledger)
    }

    /// Write the snapshot under the run id
    pub fn save(&self, store: &dyn TrialStore) -> Result<()> {
        store.put(&self.run_id.to_string(), &self.to_bytes()?)
    }

    /// Load the snapshot of `run_id`
    pub fn load(store: &dyn TrialStore, run_id: &str) -> Result<Self> {
        let bytes = store
            .get(run_id)?
            .ok_or_else(|| GreenGuardError::StorageError(format!("no ledger stored for run '{}'", run_id)))?;
        Self::from_bytes(&bytes)
    }
}
