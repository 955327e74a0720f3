//! Fold splitting

use crate::error::{GreenGuardError, Result};
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Cross-validation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CvStrategy {
    /// Plain K-Fold over sample indices
    KFold { n_splits: usize, shuffle: bool },
    /// K-Fold that keeps class proportions in every fold
    StratifiedKFold { n_splits: usize, shuffle: bool },
}

impl Default for CvStrategy {
    fn default() -> Self {
        CvStrategy::StratifiedKFold { n_splits: 5, shuffle: true }
    }
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq)]
pub struct CvSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Cross-validation splitter
#[derive(Debug, Clone)]
pub struct CrossValidator {
    strategy: CvStrategy,
    random_state: Option<u64>,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CvStrategy) -> Self {
        Self {
            strategy,
            random_state: None,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Generate train/test splits; the test folds partition `0..n_samples`
    pub fn split(&self, y: &Array1<f64>) -> Result<Vec<CvSplit>> {
        match &self.strategy {
            CvStrategy::KFold { n_splits, shuffle } => self.k_fold_split(y.len(), *n_splits, *shuffle),
            CvStrategy::StratifiedKFold { n_splits, shuffle } => {
                self.stratified_k_fold_split(y, *n_splits, *shuffle)
            }
        }
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.random_state {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }

    fn check_sizes(n_samples: usize, n_splits: usize) -> Result<()> {
        if n_splits < 2 {
            return Err(GreenGuardError::ConfigError(
                "n_splits must be at least 2".to_string(),
            ));
        }
        if n_samples < n_splits {
            return Err(GreenGuardError::InvalidInput(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }
        Ok(())
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CvSplit>> {
        Self::check_sizes(n_samples, n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut self.rng());
        }

        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut current = 0;
        for (fold_idx, fold) in folds.iter_mut().enumerate() {
            let size = if fold_idx < remainder { base + 1 } else { base };
            fold.extend_from_slice(&indices[current..current + size]);
            current += size;
        }

        Ok(Self::folds_to_splits(folds))
    }

    fn stratified_k_fold_split(&self, y: &Array1<f64>, n_splits: usize, shuffle: bool) -> Result<Vec<CvSplit>> {
        Self::check_sizes(y.len(), n_splits)?;

        // Classes in sorted label order so the split depends only on the data
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &val) in y.iter().enumerate() {
            class_indices.entry(val.round() as i64).or_default().push(idx);
        }

        for (class, indices) in &class_indices {
            if indices.len() < n_splits {
                warn!(
                    class = *class,
                    members = indices.len(),
                    n_splits,
                    "Least populated class has fewer members than folds"
                );
            }
        }

        if shuffle {
            let mut rng = self.rng();
            for indices in class_indices.values_mut() {
                indices.shuffle(&mut rng);
            }
        }

        // Deal round-robin, continuing where the previous class stopped,
        // so fold sizes never differ by more than one
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
        let mut next_fold = 0;
        for indices in class_indices.values() {
            for &idx in indices {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % n_splits;
            }
        }

        Ok(Self::folds_to_splits(folds))
    }

    fn folds_to_splits(folds: Vec<Vec<usize>>) -> Vec<CvSplit> {
        (0..folds.len())
            .map(|fold_idx| {
                let mut test_indices = folds[fold_idx].clone();
                test_indices.sort_unstable();
                let mut train_indices: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != fold_idx)
                    .flat_map(|(_, f)| f.iter().copied())
                    .collect();
                train_indices.sort_unstable();

                CvSplit {
                    train_indices,
                    test_indices,
                    fold_idx,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_labels(n: usize) -> Array1<f64> {
        (0..n).map(|i| (i % 2) as f64).collect()
    }

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CvStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(&balanced_labels(100)).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }
    }

    #[test]
    fn test_stratified_partition() {
        let cv = CrossValidator::new(CvStrategy::StratifiedKFold { n_splits: 5, shuffle: true })
            .with_random_state(7);
        let splits = cv.split(&balanced_labels(100)).unwrap();

        assert_eq!(splits.len(), 5);

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());

        for split in &splits {
            for idx in &split.test_indices {
                assert!(!split.train_indices.contains(idx));
            }
            assert_eq!(split.test_indices.len() + split.train_indices.len(), 100);
        }
    }

    #[test]
    fn test_stratified_preserves_proportions() {
        // 90 negatives, 10 rare positives
        let y: Array1<f64> = (0..100).map(|i| if i % 10 == 0 { 1.0 } else { 0.0 }).collect();
        let cv = CrossValidator::new(CvStrategy::StratifiedKFold { n_splits: 5, shuffle: true })
            .with_random_state(42);
        let splits = cv.split(&y).unwrap();

        for split in &splits {
            let positives = split.test_indices.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 2);
            assert_eq!(split.test_indices.len(), 20);
        }
    }

    #[test]
    fn test_fold_sizes_near_equal() {
        let y: Array1<f64> = (0..23).map(|i| if i < 7 { 1.0 } else { 0.0 }).collect();
        let cv = CrossValidator::new(CvStrategy::StratifiedKFold { n_splits: 4, shuffle: false });
        let splits = cv.split(&y).unwrap();

        let sizes: Vec<usize> = splits.iter().map(|s| s.test_indices.len()).collect();
        let min = *sizes.iter().min().unwrap();
        let max = *sizes.iter().max().unwrap();
        assert!(max - min <= 1, "sizes {:?}", sizes);
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let y = balanced_labels(50);
        let cv = CrossValidator::new(CvStrategy::default()).with_random_state(3);
        assert_eq!(cv.split(&y).unwrap(), cv.split(&y).unwrap());
    }

    #[test]
    fn test_invalid_sizes() {
        let cv = CrossValidator::new(CvStrategy::StratifiedKFold { n_splits: 1, shuffle: false });
        assert!(cv.split(&balanced_labels(10)).is_err());

        let cv = CrossValidator::new(CvStrategy::StratifiedKFold { n_splits: 5, shuffle: false });
        assert!(cv.split(&balanced_labels(3)).is_err());
    }
}
