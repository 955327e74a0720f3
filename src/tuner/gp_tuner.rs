//! Bayesian optimization with a Gaussian-process surrogate

use crate::error::{GreenGuardError, Result};
use crate::template::HyperparameterAssignment;
use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::gaussian_process::{AcquisitionFunction, GaussianProcess, KernelType};
use super::{proposal_rng, SearchSpace, Tuner};

/// Configuration for [`GpTuner`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpTunerConfig {
    /// Surrogate kernel over the unit hypercube
    pub kernel: KernelType,
    /// Acquisition function maximized over candidates
    pub acquisition: AcquisitionFunction,
    /// Observations required before the surrogate is used
    pub n_startup_trials: usize,
    /// Candidates scored per proposal
    pub n_candidates: usize,
    /// Observation noise added to the kernel diagonal
    pub noise: f64,
    /// Standard deviation of the perturbations around the best point
    pub local_scale: f64,
    /// Seed for proposals
    pub random_state: Option<u64>,
}

impl Default for GpTunerConfig {
    fn default() -> Self {
        Self {
            kernel: KernelType::default(),
            acquisition: AcquisitionFunction::ExpectedImprovement,
            n_startup_trials: 5,
            n_candidates: 500,
            noise: 1e-4,
            local_scale: 0.1,
            random_state: None,
        }
    }
}

impl GpTunerConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the kernel
    pub fn with_kernel(mut self, kernel: KernelType) -> Self {
        self.kernel = kernel;
        self
    }

    /// Builder method to set the acquisition function
    pub fn with_acquisition(mut self, acquisition: AcquisitionFunction) -> Self {
        self.acquisition = acquisition;
        self
    }

    /// Builder method to set the number of startup trials
    pub fn with_n_startup(mut self, n: usize) -> Self {
        self.n_startup_trials = n;
        self
    }

    /// Builder method to set the number of candidates
    pub fn with_n_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n;
        self
    }

    /// Builder method to set the observation noise
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Builder method to set the seed
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.n_candidates == 0 {
            return Err(GreenGuardError::ConfigError("n_candidates must be at least 1".to_string()));
        }
        if !(self.noise.is_finite() && self.noise > 0.0) {
            return Err(GreenGuardError::ConfigError(format!("noise must be positive, got {}", self.noise)));
        }
        if !(self.local_scale.is_finite() && self.local_scale >= 0.0) {
            return Err(GreenGuardError::ConfigError(format!(
                "local_scale must be non-negative, got {}",
                self.local_scale
            )));
        }
        if let AcquisitionFunction::UpperConfidenceBound { kappa } = self.acquisition {
            if !kappa.is_finite() {
                return Err(GreenGuardError::ConfigError("kappa must be finite".to_string()));
            }
        }
        self.kernel.validate()
    }
}

/// GP-based tuner
///
/// Proposals are uniform until `n_startup_trials` observations exist. After
/// that, half of the candidates are uniform samples and half are Gaussian
/// perturbations of the best observed point; the candidate with the highest
/// acquisition value is proposed.
#[derive(Debug, Clone)]
pub struct GpTuner {
    config: GpTunerConfig,
    space: SearchSpace,
    seed: u64,
    x_observed: Vec<Array1<f64>>,
    y_observed: Vec<f64>,
    gp: Option<GaussianProcess>,
    pending: u64,
}

impl GpTuner {
    /// Create a tuner over `space`
    pub fn new(space: SearchSpace, config: GpTunerConfig) -> Result<Self> {
        config.validate()?;
        let seed = config.random_state.unwrap_or_else(rand::random);
        Ok(Self {
            config,
            space,
            seed,
            x_observed: Vec::new(),
            y_observed: Vec::new(),
            gp: None,
            pending: 0,
        })
    }

    /// Tuner configuration
    pub fn config(&self) -> &GpTunerConfig {
        &self.config
    }

    /// Fitted surrogate, if any
    pub fn surrogate(&self) -> Option<&GaussianProcess> {
        self.gp.as_ref()
    }

    /// Index and fitness of the best finite observation; ties keep the earliest
    fn best_observed(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &y) in self.y_observed.iter().enumerate() {
            if y.is_finite() && best.map_or(true, |(_, b)| y > b) {
                best = Some((i, y));
            }
        }
        best
    }

    fn record(&mut self, assignment: &HyperparameterAssignment, fitness: f64) -> Result<()> {
        let x = self.space.encode(assignment)?;
        self.x_observed.push(x);
        self.y_observed.push(fitness);
        Ok(())
    }

    /// Refit the surrogate on every observation, with non-finite fitness
    /// replaced by the worst finite fitness seen
    fn refit(&mut self) -> Result<()> {
        let worst = self
            .y_observed
            .iter()
            .copied()
            .filter(|y| y.is_finite())
            .fold(None, |acc: Option<f64>, y| Some(acc.map_or(y, |a| a.min(y))));

        let worst = match worst {
            Some(w) => w,
            None => {
                self.gp = None;
                return Ok(());
            }
        };

        let n_dims = self.space.n_dims();
        let mut x = Array2::zeros((self.x_observed.len(), n_dims));
        for (i, row) in self.x_observed.iter().enumerate() {
            x.row_mut(i).assign(row);
        }
        let y: Array1<f64> = self
            .y_observed
            .iter()
            .map(|&y| if y.is_finite() { y } else { worst })
            .collect();

        let mut gp = GaussianProcess::new(self.config.kernel).with_noise(self.config.noise);
        gp.fit(x, &y)?;
        self.gp = Some(gp);
        Ok(())
    }

    fn candidates(&self, rng: &mut impl Rng) -> Result<Vec<HyperparameterAssignment>> {
        let n = self.config.n_candidates;
        let mut candidates = Vec::with_capacity(n);

        let n_local = match self.best_observed() {
            Some((best, _)) => {
                let n_local = n / 2;
                let center = &self.x_observed[best];
                for _ in 0..n_local {
                    let x = center.mapv(|c| c + self.config.local_scale * standard_normal(rng));
                    candidates.push(self.space.decode(x.view())?);
                }
                n_local
            }
            None => 0,
        };

        for _ in n_local..n {
            candidates.push(self.space.sample(rng));
        }
        Ok(candidates)
    }
}

impl Tuner for GpTuner {
    fn propose(&mut self) -> Result<HyperparameterAssignment> {
        let mut rng = proposal_rng(self.seed, self.y_observed.len(), self.pending);
        self.pending += 1;

        if self.space.is_empty() {
            return Ok(HyperparameterAssignment::new());
        }

        let gp = match &self.gp {
            Some(gp) if self.y_observed.len() >= self.config.n_startup_trials => gp,
            _ => return Ok(self.space.sample(&mut rng)),
        };
        let best_y = self.best_observed().map_or(0.0, |(_, y)| y);

        let mut candidates = self.candidates(&mut rng)?;
        let mut x = Array2::zeros((candidates.len(), self.space.n_dims()));
        for (i, candidate) in candidates.iter().enumerate() {
            x.row_mut(i).assign(&self.space.encode(candidate)?);
        }

        let (mean, var) = gp.predict(&x)?;

        let mut best_idx = 0;
        let mut best_acq = f64::NEG_INFINITY;
        for i in 0..candidates.len() {
            let acq = self.config.acquisition.value(mean[i], var[i], best_y);
            if acq > best_acq {
                best_acq = acq;
                best_idx = i;
            }
        }

        debug!(
            n_candidates = candidates.len(),
            acquisition = best_acq,
            predicted = mean[best_idx],
            best_observed = best_y,
            "GP proposal"
        );
        Ok(candidates.swap_remove(best_idx))
    }

    fn observe(&mut self, assignment: &HyperparameterAssignment, fitness: f64) -> Result<()> {
        self.pending = 0;
        self.record(assignment, fitness)?;
        if !fitness.is_finite() {
            debug!(fitness, "Non-finite fitness observed");
        }
        self.refit()
    }

    fn observe_batch(&mut self, results: &[(HyperparameterAssignment, f64)]) -> Result<()> {
        self.pending = 0;
        let mut first_error = None;
        for (assignment, fitness) in results {
            if let Err(e) = self.record(assignment, *fitness) {
                warn!(error = %e, "Skipping observation outside the search space");
                first_error.get_or_insert(e);
            }
        }
        self.refit()?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn n_observations(&self) -> usize {
        self.y_observed.len()
    }

    fn search_space(&self) -> &SearchSpace {
        &self.space
    }
}

/// Box-Muller standard normal sample
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
