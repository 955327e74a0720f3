use crate::error::Result;
use crate::template::HyperparameterAssignment;

use super::{proposal_rng, SearchSpace, Tuner};

/// Uniform random search
#[derive(Debug, Clone)]
pub struct UniformTuner {
    space: SearchSpace,
    seed: u64,
    n_observations: usize,
    pending: u64,
}

impl UniformTuner {
    /// Create a uniform tuner; without a seed one is drawn from entropy
    pub fn new(space: SearchSpace, random_state: Option<u64>) -> Self {
        Self {
            space,
            seed: random_state.unwrap_or_else(rand::random),
            n_observations: 0,
            pending: 0,
        }
    }
}

impl Tuner for UniformTuner {
    fn propose(&mut self) -> Result<HyperparameterAssignment> {
        let mut rng = proposal_rng(self.seed, self.n_observations, self.pending);
        self.pending += 1;
        Ok(self.space.sample(&mut rng))
    }

    fn observe(&mut self, _assignment: &HyperparameterAssignment, _fitness: f64) -> Result<()> {
        self.n_observations += 1;
        self.pending = 0;
        Ok(())
    }

    fn n_observations(&self) -> usize {
        self.n_observations
    }

    fn search_space(&self) -> &SearchSpace {
        &self.space
    }
}
