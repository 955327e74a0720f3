//! Search orchestration

mod config;
mod orchestrator;

pub use config::SearchConfig;
pub use orchestrator::Searcher;

use crate::data::DatasetAccessor;
use crate::error::Result;
use crate::evaluation::Scorer;
use crate::ledger::Trial;
use crate::template::PipelineTemplate;
use std::sync::Arc;

/// Search `template` for `budget` trials of `n_folds`-fold cross-validation
/// with default settings otherwise, returning the best trial
pub fn run_search(
    template: impl Into<Arc<PipelineTemplate>>,
    dataset: &dyn DatasetAccessor,
    budget: usize,
    n_folds: usize,
    scorer: &dyn Scorer,
) -> Result<Trial> {
    let mut config = SearchConfig::new().with_budget(budget);
    config.evaluator.n_folds = n_folds;
    Searcher::new(template, config)?.run(dataset, scorer)
}
