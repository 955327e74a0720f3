//! Integration test: search loop, ledger persistence and resumption

use greenguard::prelude::*;
use greenguard::tuner::SearchSpace as Space;
use ndarray::Array1;
use std::sync::Arc;

/// Predicts 1 when the first feature reaches the threshold
struct Threshold {
    threshold: f64,
}

impl Primitive for Threshold {
    fn fit(&mut self, _input: &StepData, _y: &Array1<f64>) -> Result<()> {
        Ok(())
    }

    fn produce(&self, input: &StepData) -> Result<StepData> {
        let x = input.as_table()?;
        Ok(StepData::Labels(x.column(0).mapv(|v| if v >= self.threshold { 1.0 } else { 0.0 })))
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry() -> Arc<PrimitiveRegistry> {
    Arc::new(
        PrimitiveRegistry::with_builtins().with_primitive("threshold", DataKind::Table, DataKind::Labels, |params| {
            Ok(Box::new(Threshold { threshold: params.real_or("threshold", 0.5)? }) as Box<dyn Primitive>)
        }),
    )
}

fn threshold_template() -> PipelineTemplate {
    PipelineTemplate::new(
        "threshold",
        vec![StepSpec::new("detector", "threshold")
            .with_hyperparameter(HyperparameterSpec::real("threshold", 0.0, 1.0, 0.5))],
        registry(),
    )
    .unwrap()
}

/// 50 samples with x0 = i / 50 and label = x0 >= 0.7
fn create_dataset() -> Dataset {
    let n = 50;
    let rows = (0..n).map(|i| vec![i as f64 / n as f64]).collect();
    let labels = (0..n)
        .map(|i| if i as f64 / n as f64 >= 0.7 { 1.0 } else { 0.0 })
        .collect();
    Dataset::from_rows(rows, labels).unwrap()
}

fn threshold_of(trial: &Trial) -> f64 {
    trial.assignment["detector.threshold"].as_float().unwrap()
}

fn config(budget: usize) -> SearchConfig {
    SearchConfig::new().with_budget(budget).with_random_state(7)
}

#[test]
fn test_search_converges_to_known_optimum() {
    init_tracing();
    let dataset = create_dataset();
    let mut searcher = Searcher::new(threshold_template(), config(20)).unwrap();

    let best = searcher.run(&dataset, &Metric::Accuracy).unwrap();
    let ledger = searcher.ledger();
    assert_eq!(ledger.len(), 20);

    // The first trial scores the defaults
    assert_eq!(threshold_of(&ledger.trials()[0]), 0.5);

    let seed_trials = &ledger.trials()[..5];
    let seed_mean = seed_trials.iter().map(|t| t.fitness).sum::<f64>() / seed_trials.len() as f64;

    assert!((threshold_of(&best) - 0.7).abs() <= 0.1, "best threshold {}", threshold_of(&best));
    assert!(best.fitness > seed_mean, "best {} vs seed mean {}", best.fitness, seed_mean);
    assert_eq!(searcher.best().unwrap().index, best.index);
}

#[test]
fn test_scorer_raising_everywhere_reports_no_viable_pipeline() {
    init_tracing();
    let dataset = create_dataset();
    let scorer = |_: &Array1<f64>, _: &Array1<f64>| -> Result<f64> {
        Err(GreenGuardError::ComputationError("scorer exploded".to_string()))
    };

    let mut searcher = Searcher::new(threshold_template(), config(4)).unwrap();
    let result = searcher.run(&dataset, &scorer);

    assert!(matches!(result, Err(GreenGuardError::NoViablePipeline { trials: 4 })));
    assert_eq!(searcher.ledger().len(), 4);
    assert!(searcher.ledger().trials().iter().all(|t| t.fitness == f64::NEG_INFINITY));
    assert!(searcher.fit_best(&dataset).is_err());
}

/// Proposes an out-of-domain value first, then valid values
struct Misbehaving {
    space: Space,
    proposals: usize,
    observations: usize,
}

impl Tuner for Misbehaving {
    fn propose(&mut self) -> Result<HyperparameterAssignment> {
        self.proposals += 1;
        let value = if self.proposals == 1 { 11.0 } else { 0.7 };
        let mut assignment = HyperparameterAssignment::new();
        assignment.insert("detector.threshold".to_string(), HyperparameterValue::Real(value));
        Ok(assignment)
    }

    fn observe(&mut self, _assignment: &HyperparameterAssignment, _fitness: f64) -> Result<()> {
        self.observations += 1;
        Ok(())
    }

    fn n_observations(&self) -> usize {
        self.observations
    }

    fn search_space(&self) -> &Space {
        &self.space
    }
}

#[test]
fn test_invalid_proposal_recorded_as_failed_trial() {
    init_tracing();
    let template = threshold_template();
    let tuner = Misbehaving {
        space: Space::from_template(&template),
        proposals: 0,
        observations: 0,
    };

    let mut searcher = Searcher::new(template, config(3).with_defaults_first(false))
        .unwrap()
        .with_tuner(Box::new(tuner));
    let best = searcher.run(&create_dataset(), &Metric::Accuracy).unwrap();

    let first = &searcher.ledger().trials()[0];
    assert_eq!(first.fitness, f64::NEG_INFINITY);
    assert!(matches!(first.status, TrialStatus::Failed { .. }));
    assert_eq!(searcher.ledger().len(), 3);
    assert_eq!(searcher.tuner().n_observations(), 3);
    assert_eq!(best.index, 1);
    assert!((best.fitness - 1.0).abs() < 1e-12);
}

#[test]
fn test_best_trial_has_highest_fitness() {
    let mut ledger = TrialLedger::new("threshold");
    let template = threshold_template();
    let mut a1 = template.default_assignment();
    a1.insert("detector.threshold".to_string(), HyperparameterValue::Real(0.1));
    let a2 = template.default_assignment();

    let mut tuner = create_tuner(TunerKind::GpEi, Space::from_template(&template), GpTunerConfig::default()).unwrap();
    for (assignment, fitness) in [(a1.clone(), 10.0), (a2, 1.0)] {
        tuner.observe(&assignment, fitness).unwrap();
        let mut trial = Trial::failed(assignment, "unused", chrono::Utc::now(), std::time::Duration::ZERO);
        trial.fitness = fitness;
        trial.status = TrialStatus::Completed;
        ledger.append(trial);
    }

    assert_eq!(ledger.best().unwrap().assignment, a1);
    assert_eq!(tuner.n_observations(), 2);
}

#[test]
fn test_resume_keeps_prior_trials_byte_identical() {
    init_tracing();
    let dataset = create_dataset();
    let store: Arc<dyn TrialStore> = Arc::new(MemoryStore::new());

    let mut first = Searcher::new(threshold_template(), config(4)).unwrap().with_store(store.clone());
    first.run(&dataset, &Metric::Accuracy).unwrap();
    let run_id = first.ledger().run_id().to_string();
    let before: Vec<String> = first
        .ledger()
        .trials()
        .iter()
        .map(|t| serde_json::to_string(t).unwrap())
        .collect();

    let mut resumed = Searcher::resume_from_store(threshold_template(), config(3), store.clone(), &run_id).unwrap();
    assert_eq!(resumed.tuner().n_observations(), 4);
    resumed.run(&dataset, &Metric::Accuracy).unwrap();

    let ledger = TrialLedger::load(store.as_ref(), &run_id).unwrap();
    assert_eq!(ledger.len(), 7);
    assert_eq!(ledger.budget(), 7);
    for (i, expected) in before.iter().enumerate() {
        assert_eq!(&serde_json::to_string(&ledger.trials()[i]).unwrap(), expected);
    }
    let indices: Vec<usize> = ledger.trials().iter().map(|t| t.index).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
}

#[test]
fn test_resumed_search_matches_uninterrupted_search() {
    let dataset = create_dataset();
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn TrialStore> = Arc::new(LocalStore::new(dir.path()).unwrap());

    let mut uninterrupted = Searcher::new(threshold_template(), config(8)).unwrap();
    uninterrupted.run(&dataset, &Metric::Accuracy).unwrap();

    let mut first = Searcher::new(threshold_template(), config(6)).unwrap().with_store(store.clone());
    first.run(&dataset, &Metric::Accuracy).unwrap();
    let run_id = first.ledger().run_id().to_string();
    drop(first);

    let mut resumed = Searcher::resume_from_store(threshold_template(), config(2), store, &run_id).unwrap();
    resumed.run(&dataset, &Metric::Accuracy).unwrap();

    let expected: Vec<&HyperparameterAssignment> =
        uninterrupted.ledger().trials().iter().map(|t| &t.assignment).collect();
    let actual: Vec<&HyperparameterAssignment> = resumed.ledger().trials().iter().map(|t| &t.assignment).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_batched_search_uses_exact_budget() {
    init_tracing();
    let dataset = create_dataset();
    let mut searcher = Searcher::new(threshold_template(), config(7).with_batch_size(3)).unwrap();

    let best = searcher.run(&dataset, &Metric::Accuracy).unwrap();
    let ledger = searcher.ledger();

    assert_eq!(ledger.len(), 7);
    assert_eq!(ledger.remaining_budget(), 0);
    let indices: Vec<usize> = ledger.trials().iter().map(|t| t.index).collect();
    assert_eq!(indices, (0..7).collect::<Vec<_>>());
    assert_eq!(searcher.tuner().n_observations(), 7);
    assert!(best.is_viable());
}

#[test]
fn test_uniform_tuner_and_fit_best() {
    let dataset = create_dataset();
    let mut searcher = Searcher::new(threshold_template(), config(6).with_tuner(TunerKind::Uniform)).unwrap();
    let best = searcher.run(&dataset, &Metric::F1).unwrap();

    let instance = searcher.fit_best(&dataset).unwrap();
    assert!(instance.is_fitted());
    assert_eq!(instance.assignment(), &best.assignment);

    let accuracy = instance.score(dataset.features(), dataset.targets(), &Metric::F1).unwrap();
    assert!(accuracy >= 0.0);
}

#[test]
fn test_run_search_with_builtin_pipeline() {
    let template = PipelineTemplate::new(
        "scale_logit",
        vec![
            StepSpec::new("scale", "standard_scaler"),
            StepSpec::new("clf", "logistic_regression")
                .with_hyperparameter(HyperparameterSpec::log_real("alpha", 1e-4, 1.0, 1e-2)),
        ],
        registry(),
    )
    .unwrap();

    let best = run_search(template, &create_dataset(), 5, 3, &Metric::BalancedAccuracy).unwrap();
    assert!(best.fitness > 0.5);
    assert_eq!(best.fold_scores.len(), 3);
}

#[test]
fn test_resume_rejects_other_template() {
    let ledger = TrialLedger::new("something_else");
    let result = Searcher::resume(threshold_template(), config(1), ledger);
    assert!(matches!(result, Err(GreenGuardError::ConfigError(_))));
}

/// Keeps every snapshot written to it
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    snapshots: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl TrialStore for RecordingStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.snapshots.lock().push(bytes.to_vec());
        self.inner.put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys()
    }
}

#[test]
fn test_resume_from_mid_run_snapshot_adds_exactly_m_trials() {
    init_tracing();
    let dataset = create_dataset();
    let store = Arc::new(RecordingStore::default());

    let mut first = Searcher::new(threshold_template(), config(6))
        .unwrap()
        .with_store(store.clone() as Arc<dyn TrialStore>);
    first.run(&dataset, &Metric::Accuracy).unwrap();

    let snapshot = store.snapshots.lock()[2].clone();
    let ledger = TrialLedger::from_bytes(&snapshot).unwrap();
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.remaining_budget(), 3);
    let before: Vec<String> = ledger
        .trials()
        .iter()
        .map(|t| serde_json::to_string(t).unwrap())
        .collect();

    let mut resumed = Searcher::resume(threshold_template(), config(2), ledger).unwrap();
    resumed.run(&dataset, &Metric::Accuracy).unwrap();

    let ledger = resumed.ledger();
    assert_eq!(ledger.len(), 5);
    assert_eq!(ledger.budget(), 5);
    for (i, expected) in before.iter().enumerate() {
        assert_eq!(&serde_json::to_string(&ledger.trials()[i]).unwrap(), expected);
    }
}

#[test]
fn test_too_few_samples_for_folds_spends_no_budget() {
    let dataset = Dataset::from_rows(vec![vec![0.1], vec![0.5], vec![0.9]], vec![0.0, 0.0, 1.0]).unwrap();
    let mut searcher = Searcher::new(threshold_template(), config(4)).unwrap();

    let result = searcher.run(&dataset, &Metric::Accuracy);
    assert!(matches!(result, Err(GreenGuardError::ConfigError(_))));
    assert!(searcher.ledger().is_empty());
    assert_eq!(searcher.ledger().budget(), 0);
}
