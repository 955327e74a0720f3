//! Labeled dataset access
//!
//! The search engine never loads data itself. It consumes anything that
//! implements [`DatasetAccessor`]: a set of `(features, label)` samples
//! addressable by a stable index.

use crate::error::{GreenGuardError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Indexed access to a labeled dataset
///
/// Indices must be stable across calls so that fold partitioning is
/// reproducible.
pub trait DatasetAccessor: Send + Sync {
    /// Number of samples
    fn n_samples(&self) -> usize;

    /// Number of features per sample
    fn n_features(&self) -> usize;

    /// Feature row of one sample
    fn row(&self, index: usize) -> ArrayView1<'_, f64>;

    /// Label of one sample
    fn label(&self, index: usize) -> f64;

    /// Gather the given samples into a feature table and label vector
    fn select(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((indices.len(), self.n_features()));
        for (i, &idx) in indices.iter().enumerate() {
            x.row_mut(i).assign(&self.row(idx));
        }
        let y = indices.iter().map(|&idx| self.label(idx)).collect();
        (x, y)
    }

    /// All labels in index order
    fn labels(&self) -> Array1<f64> {
        (0..self.n_samples()).map(|i| self.label(i)).collect()
    }
}

/// In-memory dataset backed by ndarray
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Array1<f64>,
}

impl Dataset {
    /// Create a dataset, checking that every row has a label
    pub fn new(features: Array2<f64>, labels: Array1<f64>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        if features.nrows() == 0 {
            return Err(GreenGuardError::InvalidInput("dataset is empty".to_string()));
        }
        Ok(Self { features, labels })
    }

    /// Create a dataset from row vectors
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<f64>) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(bad) = rows.iter().find(|r| r.len() != n_cols) {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} features per row", n_cols),
                actual: format!("{} features", bad.len()),
            });
        }
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let features = Array2::from_shape_vec((n_rows, n_cols), flat)?;
        Self::new(features, Array1::from_vec(labels))
    }

    /// Feature table
    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Label vector
    pub fn targets(&self) -> &Array1<f64> {
        &self.labels
    }
}

impl DatasetAccessor for Dataset {
    fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    fn n_features(&self) -> usize {
        self.features.ncols()
    }

    fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.features.row(index)
    }

    fn label(&self, index: usize) -> f64 {
        self.labels[index]
    }

    fn select(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        (
            self.features.select(Axis(0), indices),
            self.labels.select(Axis(0), indices),
        )
    }

    fn labels(&self) -> Array1<f64> {
        self.labels.clone()
    }
}
