//! Hyperparameter tuners
//!
//! A tuner proposes assignments for a template's search space and learns
//! from the fitness observed for each of them. Tuners are driven by a single
//! orchestrator and are not shared between threads.

mod gaussian_process;
mod gp_tuner;
mod space;
mod uniform;

pub use gaussian_process::{AcquisitionFunction, GaussianProcess, KernelType};
pub use gp_tuner::{GpTuner, GpTunerConfig};
pub use space::SearchSpace;
pub use uniform::UniformTuner;

use crate::error::{GreenGuardError, Result};
use crate::template::HyperparameterAssignment;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Proposes hyperparameter assignments and learns from their fitness
pub trait Tuner: Send {
    /// Propose the next assignment to evaluate
    fn propose(&mut self) -> Result<HyperparameterAssignment>;

    /// Record the fitness of an evaluated assignment
    ///
    /// Non-finite fitness marks a failed trial and must be accepted.
    fn observe(&mut self, assignment: &HyperparameterAssignment, fitness: f64) -> Result<()>;

    /// Propose `n` assignments to evaluate together
    fn propose_batch(&mut self, n: usize) -> Result<Vec<HyperparameterAssignment>> {
        (0..n).map(|_| self.propose()).collect()
    }

    /// Record a batch of results in order
    fn observe_batch(&mut self, results: &[(HyperparameterAssignment, f64)]) -> Result<()> {
        for (assignment, fitness) in results {
            self.observe(assignment, *fitness)?;
        }
        Ok(())
    }

    /// Number of observations recorded so far
    fn n_observations(&self) -> usize;

    /// Space proposals are drawn from
    fn search_space(&self) -> &SearchSpace;
}

/// Built-in tuner strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunerKind {
    /// Uniform random search
    Uniform,
    /// GP surrogate with the configured acquisition function
    Gp,
    /// GP surrogate with expected improvement
    GpEi,
}

impl Default for TunerKind {
    fn default() -> Self {
        TunerKind::GpEi
    }
}

impl TunerKind {
    /// Resolve a tuner by name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "uniform" => Ok(TunerKind::Uniform),
            "gp" => Ok(TunerKind::Gp),
            "gpei" | "gp_ei" => Ok(TunerKind::GpEi),
            other => Err(GreenGuardError::ConfigError(format!("unknown tuner '{}'", other))),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &'static str {
        match self {
            TunerKind::Uniform => "uniform",
            TunerKind::Gp => "gp",
            TunerKind::GpEi => "gpei",
        }
    }
}

/// Create a tuner of the given kind over `space`
pub fn create_tuner(kind: TunerKind, space: SearchSpace, config: GpTunerConfig) -> Result<Box<dyn Tuner>> {
    let tuner: Box<dyn Tuner> = match kind {
        TunerKind::Uniform => Box::new(UniformTuner::new(space, config.random_state)),
        TunerKind::Gp => Box::new(GpTuner::new(space, config)?),
        TunerKind::GpEi => Box::new(GpTuner::new(
            space,
            config.with_acquisition(AcquisitionFunction::ExpectedImprovement),
        )?),
    };
    Ok(tuner)
}

/// Random stream for one proposal
///
/// Depends only on the seed, the number of observations and the number of
/// proposals made since the last observation, so a tuner rebuilt by
/// replaying its observations continues with the same proposals.
pub(crate) fn proposal_rng(seed: u64, n_observations: usize, pending: u64) -> Xoshiro256PlusPlus {
    let stream = seed
        ^ (n_observations as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ pending.wrapping_add(1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    Xoshiro256PlusPlus::seed_from_u64(stream)
}
