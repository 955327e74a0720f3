//! Built-in primitives
//!
//! A small set of steps that makes templates runnable without any external
//! component: NaN imputation, two scalers and a logistic-regression
//! classifier as the final estimator.

use crate::error::{GreenGuardError, Result};
use ndarray::{Array1, Array2, Axis};

use super::primitive::{DataKind, Primitive, PrimitiveRegistry, StepData, StepParams};

pub(crate) fn register_builtins(registry: &mut PrimitiveRegistry) {
    registry
        .register("simple_imputer", DataKind::Table, DataKind::Table, |params| {
            Ok(Box::new(SimpleImputer::from_params(params)?) as Box<dyn Primitive>)
        })
        .register("standard_scaler", DataKind::Table, DataKind::Table, |params| {
            Ok(Box::new(StandardScaler::from_params(params)?) as Box<dyn Primitive>)
        })
        .register("min_max_scaler", DataKind::Table, DataKind::Table, |_| {
            Ok(Box::new(MinMaxScaler::default()) as Box<dyn Primitive>)
        })
        .register("logistic_regression", DataKind::Table, DataKind::Labels, |params| {
            Ok(Box::new(LogisticRegression::from_params(params)?) as Box<dyn Primitive>)
        });
}

fn check_rows(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(GreenGuardError::ShapeError {
            expected: format!("{} labels", x.nrows()),
            actual: format!("{} labels", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(GreenGuardError::InvalidInput("no training samples".to_string()));
    }
    Ok(())
}

fn check_columns(x: &Array2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(GreenGuardError::ShapeError {
            expected: format!("{} columns", expected),
            actual: format!("{} columns", x.ncols()),
        });
    }
    Ok(())
}

/// Imputation strategy for missing (NaN) values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImputeStrategy {
    Mean,
    Median,
    Constant(f64),
}

/// Fills NaN cells with a per-column statistic
#[derive(Debug, Clone)]
pub struct SimpleImputer {
    strategy: ImputeStrategy,
    fill_values: Option<Vec<f64>>,
}

impl SimpleImputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self { strategy, fill_values: None }
    }

    fn from_params(params: &StepParams) -> Result<Self> {
        let strategy = match params.str_or("strategy", "mean")? {
            "mean" => ImputeStrategy::Mean,
            "median" => ImputeStrategy::Median,
            "constant" => ImputeStrategy::Constant(params.real_or("fill_value", 0.0)?),
            other => {
                return Err(GreenGuardError::InvalidInput(format!(
                    "unknown imputation strategy '{}'",
                    other
                )))
            }
        };
        Ok(Self::new(strategy))
    }
}

impl Primitive for SimpleImputer {
    fn fit(&mut self, input: &StepData, y: &Array1<f64>) -> Result<()> {
        let x = input.as_table()?;
        check_rows(x, y)?;

        let fill_values: Vec<f64> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let mut valid: Vec<f64> = col.iter().filter(|v| !v.is_nan()).copied().collect();
                match self.strategy {
                    ImputeStrategy::Constant(value) => value,
                    _ if valid.is_empty() => 0.0,
                    ImputeStrategy::Mean => valid.iter().sum::<f64>() / valid.len() as f64,
                    ImputeStrategy::Median => {
                        valid.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                        valid[valid.len() / 2]
                    }
                }
            })
            .collect();

        self.fill_values = Some(fill_values);
        Ok(())
    }

    fn produce(&self, input: &StepData) -> Result<StepData> {
        let fill_values = self.fill_values.as_ref().ok_or(GreenGuardError::NotFitted)?;
        let x = input.as_table()?;
        check_columns(x, fill_values.len())?;

        let mut out = x.clone();
        for (mut col, &fill) in out.axis_iter_mut(Axis(1)).zip(fill_values.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(StepData::Table(out))
    }
}

/// Centers columns and scales them to unit variance
#[derive(Debug, Clone)]
pub struct StandardScaler {
    with_mean: bool,
    params: Option<Vec<(f64, f64)>>,
}

impl StandardScaler {
    pub fn new(with_mean: bool) -> Self {
        Self { with_mean, params: None }
    }

    fn from_params(params: &StepParams) -> Result<Self> {
        Ok(Self::new(params.bool_or("with_mean", true)?))
    }
}

impl Primitive for StandardScaler {
    fn fit(&mut self, input: &StepData, y: &Array1<f64>) -> Result<()> {
        let x = input.as_table()?;
        check_rows(x, y)?;

        let params: Vec<(f64, f64)> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let n = col.len() as f64;
                let mean = col.sum() / n;
                let std = (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
                let center = if self.with_mean { mean } else { 0.0 };
                (center, if std > 0.0 { std } else { 1.0 })
            })
            .collect();

        self.params = Some(params);
        Ok(())
    }

    fn produce(&self, input: &StepData) -> Result<StepData> {
        let params = self.params.as_ref().ok_or(GreenGuardError::NotFitted)?;
        let x = input.as_table()?;
        check_columns(x, params.len())?;

        let mut out = x.clone();
        for (mut col, &(center, scale)) in out.axis_iter_mut(Axis(1)).zip(params.iter()) {
            col.mapv_inplace(|v| (v - center) / scale);
        }
        Ok(StepData::Table(out))
    }
}

/// Rescales columns to `[0, 1]` using the training range
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    params: Option<Vec<(f64, f64)>>,
}

impl Primitive for MinMaxScaler {
    fn fit(&mut self, input: &StepData, y: &Array1<f64>) -> Result<()> {
        let x = input.as_table()?;
        check_rows(x, y)?;

        let params: Vec<(f64, f64)> = x
            .axis_iter(Axis(1))
            .map(|col| {
                let min = col.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = col.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                (min, if range > 0.0 { range } else { 1.0 })
            })
            .collect();

        self.params = Some(params);
        Ok(())
    }

    fn produce(&self, input: &StepData) -> Result<StepData> {
        let params = self.params.as_ref().ok_or(GreenGuardError::NotFitted)?;
        let x = input.as_table()?;
        check_columns(x, params.len())?;

        let mut out = x.clone();
        for (mut col, &(min, range)) in out.axis_iter_mut(Axis(1)).zip(params.iter()) {
            col.mapv_inplace(|v| (v - min) / range);
        }
        Ok(StepData::Table(out))
    }
}

/// Binary logistic regression trained by gradient descent with L2 penalty
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    alpha: f64,
    max_iter: usize,
    tol: f64,
    threshold: f64,
    fit_intercept: bool,
    weights: Option<(Array1<f64>, f64)>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            alpha: 0.01,
            max_iter: 1000,
            tol: 1e-6,
            threshold: 0.5,
            fit_intercept: true,
            weights: None,
        }
    }
}

impl LogisticRegression {
    fn from_params(params: &StepParams) -> Result<Self> {
        let defaults = Self::default();
        let max_iter = params.int_or("max_iter", defaults.max_iter as i64)?;
        if max_iter < 1 {
            return Err(GreenGuardError::InvalidInput("max_iter must be positive".to_string()));
        }
        Ok(Self {
            learning_rate: params.real_or("learning_rate", defaults.learning_rate)?,
            alpha: params.real_or("alpha", defaults.alpha)?,
            max_iter: max_iter as usize,
            tol: params.real_or("tol", defaults.tol)?,
            threshold: params.real_or("threshold", defaults.threshold)?,
            fit_intercept: params.bool_or("fit_intercept", defaults.fit_intercept)?,
            weights: None,
        })
    }

    fn sigmoid(z: &Array1<f64>) -> Array1<f64> {
        z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
    }

    /// Probability of the positive class
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (weights, bias) = self.weights.as_ref().ok_or(GreenGuardError::NotFitted)?;
        check_columns(x, weights.len())?;
        Ok(Self::sigmoid(&(x.dot(weights) + *bias)))
    }
}

impl Primitive for LogisticRegression {
    fn fit(&mut self, input: &StepData, y: &Array1<f64>) -> Result<()> {
        let x = input.as_table()?;
        check_rows(x, y)?;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(GreenGuardError::InvalidInput(
                "features contain NaN or infinite values".to_string(),
            ));
        }
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(GreenGuardError::InvalidInput(
                "logistic regression expects 0/1 labels".to_string(),
            ));
        }

        let n_samples = x.nrows() as f64;
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let predictions = Self::sigmoid(&(x.dot(&weights) + bias));
            let errors = &predictions - y;
            let dw = (x.t().dot(&errors) / n_samples) + (self.alpha * &weights);
            let db = if self.fit_intercept { errors.mean().unwrap_or(0.0) } else { 0.0 };

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if !grad_norm.is_finite() {
                return Err(GreenGuardError::ComputationError(
                    "gradient diverged".to_string(),
                ));
            }
            if grad_norm < self.tol {
                break;
            }

            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }

        self.weights = Some((weights, bias));
        Ok(())
    }

    fn produce(&self, input: &StepData) -> Result<StepData> {
        let proba = self.predict_proba(input.as_table()?)?;
        let threshold = self.threshold;
        Ok(StepData::Labels(proba.mapv(|p| if p >= threshold { 1.0 } else { 0.0 })))
    }
}
