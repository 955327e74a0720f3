//! Gaussian process regression over the encoded search space
//!
//! Fits a zero-mean GP to normalized fitness values with a Cholesky solve of
//! `K + noise * I`. Inputs are expected in the unit hypercube, so length
//! scales are relative to the full range of every hyperparameter.

use crate::error::{GreenGuardError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Covariance function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Squared exponential
    Rbf { length_scale: f64 },
    /// Matérn kernel, closed forms for nu in {0.5, 1.5, 2.5}
    Matern { nu: f64, length_scale: f64 },
    /// Rational quadratic
    RationalQuadratic { length_scale: f64, alpha: f64 },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::Matern { nu: 2.5, length_scale: 0.25 }
    }
}

impl KernelType {
    /// Covariance between two points
    pub fn value(&self, x1: ArrayView1<'_, f64>, x2: ArrayView1<'_, f64>) -> f64 {
        let dist_sq: f64 = x1.iter().zip(x2.iter()).map(|(a, b)| (a - b) * (a - b)).sum();

        match *self {
            KernelType::Rbf { length_scale } => (-0.5 * dist_sq / (length_scale * length_scale)).exp(),
            KernelType::Matern { nu, length_scale } => {
                let r = dist_sq.sqrt() / length_scale;
                if r < 1e-10 {
                    return 1.0;
                }

                if (nu - 0.5).abs() < 1e-6 {
                    (-r).exp()
                } else if (nu - 1.5).abs() < 1e-6 {
                    let sqrt3 = 3.0_f64.sqrt();
                    (1.0 + sqrt3 * r) * (-sqrt3 * r).exp()
                } else if (nu - 2.5).abs() < 1e-6 {
                    let sqrt5 = 5.0_f64.sqrt();
                    (1.0 + sqrt5 * r + 5.0 / 3.0 * r * r) * (-sqrt5 * r).exp()
                } else {
                    // Other nu values fall back to the smooth limit
                    (-0.5 * r * r).exp()
                }
            }
            KernelType::RationalQuadratic { length_scale, alpha } => {
                (1.0 + dist_sq / (2.0 * alpha * length_scale * length_scale)).powf(-alpha)
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let (length_scale, extra) = match *self {
            KernelType::Rbf { length_scale } => (length_scale, 1.0),
            KernelType::Matern { nu, length_scale } => (length_scale, nu),
            KernelType::RationalQuadratic { length_scale, alpha } => (length_scale, alpha),
        };
        if !(length_scale.is_finite() && length_scale > 0.0 && extra.is_finite() && extra > 0.0) {
            return Err(GreenGuardError::ConfigError(format!(
                "kernel parameters must be finite and positive: {:?}",
                self
            )));
        }
        Ok(())
    }

    fn matrix(&self, x1: &Array2<f64>, x2: &Array2<f64>) -> Array2<f64> {
        let mut k = Array2::zeros((x1.nrows(), x2.nrows()));
        for (i, a) in x1.rows().into_iter().enumerate() {
            for (j, b) in x2.rows().into_iter().enumerate() {
                k[[i, j]] = self.value(a, b);
            }
        }
        k
    }
}

/// Acquisition function, maximized over candidates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AcquisitionFunction {
    /// Expected improvement over the best observed fitness
    ExpectedImprovement,
    /// Mean plus `kappa` standard deviations
    UpperConfidenceBound { kappa: f64 },
    /// Predicted mean only
    Mean,
}

impl Default for AcquisitionFunction {
    fn default() -> Self {
        AcquisitionFunction::ExpectedImprovement
    }
}

impl AcquisitionFunction {
    /// Acquisition value of a candidate with posterior `mean` and `variance`
    pub fn value(&self, mean: f64, variance: f64, best: f64) -> f64 {
        let std = variance.max(0.0).sqrt().max(1e-10);

        match *self {
            AcquisitionFunction::ExpectedImprovement => {
                let improvement = mean - best;
                let z = improvement / std;
                improvement * normal_cdf(z) + std * normal_pdf(z)
            }
            AcquisitionFunction::UpperConfidenceBound { kappa } => mean + kappa * std,
            AcquisitionFunction::Mean => mean,
        }
    }
}

/// Gaussian process regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianProcess {
    kernel: KernelType,
    noise: f64,
    x_train: Option<Array2<f64>>,
    l_chol: Option<Array2<f64>>,
    alpha: Option<Array1<f64>>,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Create an unfitted GP with the given kernel
    pub fn new(kernel: KernelType) -> Self {
        Self {
            kernel,
            noise: 1e-6,
            x_train: None,
            l_chol: None,
            alpha: None,
            y_mean: 0.0,
            y_std: 1.0,
        }
    }

    /// Set the observation noise added to the kernel diagonal
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(1e-10);
        self
    }

    /// Kernel of this GP
    pub fn kernel(&self) -> &KernelType {
        &self.kernel
    }

    /// Whether `fit` has succeeded
    pub fn is_fitted(&self) -> bool {
        self.alpha.is_some()
    }

    /// Fit the GP to `y = f(x)`
    pub fn fit(&mut self, x: Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.kernel.validate()?;

        let n = y.len();
        if n == 0 {
            return Err(GreenGuardError::InvalidInput("cannot fit a GP without observations".to_string()));
        }
        if x.nrows() != n {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} rows", n),
                actual: format!("{} rows", x.nrows()),
            });
        }
        if y.iter().chain(x.iter()).any(|v| !v.is_finite()) {
            return Err(GreenGuardError::InvalidInput("GP training data must be finite".to_string()));
        }

        self.y_mean = y.mean().unwrap_or(0.0);
        self.y_std = y.std(0.0);
        if self.y_std < 1e-10 {
            self.y_std = 1.0;
        }
        let y_normalized = y.mapv(|yi| (yi - self.y_mean) / self.y_std);

        let mut k = self.kernel.matrix(&x, &x);
        for i in 0..n {
            k[[i, i]] += self.noise;
        }

        let l = cholesky(&k);
        let alpha = solve_cholesky(&l, &y_normalized);

        self.x_train = Some(x);
        self.l_chol = Some(l);
        self.alpha = Some(alpha);
        Ok(())
    }

    /// Posterior mean and variance at every row of `x_test`
    pub fn predict(&self, x_test: &Array2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let (x_train, l, alpha) = match (&self.x_train, &self.l_chol, &self.alpha) {
            (Some(x), Some(l), Some(a)) => (x, l, a),
            _ => return Err(GreenGuardError::NotFitted),
        };
        if x_test.ncols() != x_train.ncols() {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} columns", x_train.ncols()),
                actual: format!("{} columns", x_test.ncols()),
            });
        }

        let k_star = self.kernel.matrix(x_test, x_train);
        let mean = k_star.dot(alpha).mapv(|m| m * self.y_std + self.y_mean);

        let mut var = Array1::zeros(x_test.nrows());
        for (i, row) in x_test.rows().into_iter().enumerate() {
            let k_self = self.kernel.value(row, row);
            let v = solve_lower_triangular(l, &k_star.row(i).to_owned());
            var[i] = (k_self - v.dot(&v)).max(1e-10) * self.y_std * self.y_std;
        }

        Ok((mean, var))
    }
}

/// Cholesky factor of a symmetric matrix, with the diagonal clamped
/// away from zero for nearly singular inputs
fn cholesky(a: &Array2<f64>) -> Array2<f64> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            if i == j {
                for k in 0..j {
                    sum += l[[j, k]] * l[[j, k]];
                }
                l[[j, j]] = (a[[j, j]] - sum).max(1e-10).sqrt();
            } else {
                for k in 0..j {
                    sum += l[[i, k]] * l[[j, k]];
                }
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    l
}

/// Solve `L x = b` for lower triangular `L`
fn solve_lower_triangular(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let mut x = Array1::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[[i, j]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve `L L^T x = b`
fn solve_cholesky(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = b.len();
    let y = solve_lower_triangular(l, b);

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for j in (i + 1)..n {
            sum -= l[[j, i]] * x[j];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Standard normal CDF
pub(crate) fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF
pub(crate) fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz and Stegun 7.1.26
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kernels_at_zero_distance() {
        let x = array![0.3, 0.7];
        for kernel in [
            KernelType::Rbf { length_scale: 0.5 },
            KernelType::Matern { nu: 2.5, length_scale: 0.5 },
            KernelType::Matern { nu: 1.5, length_scale: 0.5 },
            KernelType::RationalQuadratic { length_scale: 0.5, alpha: 1.0 },
        ] {
            assert!((kernel.value(x.view(), x.view()) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_kernel_decays_with_distance() {
        let kernel = KernelType::default();
        let a = array![0.0];
        let near = kernel.value(a.view(), array![0.1].view());
        let far = kernel.value(a.view(), array![0.9].view());
        assert!(near > far);
        assert!(far > 0.0);
    }

    #[test]
    fn test_fit_predict_interpolates() {
        let mut gp = GaussianProcess::new(KernelType::Rbf { length_scale: 0.3 });
        let x = Array2::from_shape_vec((5, 1), vec![0.0, 0.25, 0.5, 0.75, 1.0]).unwrap();
        let y = array![0.0, 0.5, 1.0, 0.5, 0.0];
        gp.fit(x.clone(), &y).unwrap();

        let (mean, var) = gp.predict(&x).unwrap();
        for i in 0..5 {
            assert!((mean[i] - y[i]).abs() < 1e-2, "mean {} vs {}", mean[i], y[i]);
            assert!(var[i] < 1e-2);
        }

        let (_, far_var) = gp.predict(&array![[3.0]]).unwrap();
        assert!(far_var[0] > var[0]);
    }

    #[test]
    fn test_predict_before_fit() {
        let gp = GaussianProcess::new(KernelType::default());
        assert!(matches!(gp.predict(&array![[0.5]]), Err(GreenGuardError::NotFitted)));
    }

    #[test]
    fn test_fit_rejects_non_finite() {
        let mut gp = GaussianProcess::new(KernelType::default());
        let x = array![[0.0], [1.0]];
        assert!(gp.fit(x, &array![1.0, f64::NEG_INFINITY]).is_err());
        assert!(!gp.is_fitted());
    }

    #[test]
    fn test_constant_targets() {
        let mut gp = GaussianProcess::new(KernelType::default()).with_noise(1e-4);
        gp.fit(array![[0.2], [0.2], [0.8]], &array![0.5, 0.5, 0.5]).unwrap();
        let (mean, _) = gp.predict(&array![[0.5]]).unwrap();
        assert!((mean[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_acquisition() {
        let ei = AcquisitionFunction::ExpectedImprovement;
        assert!(ei.value(0.5, 0.01, 0.6) > 0.0);
        assert!(ei.value(0.7, 0.01, 0.6) > ei.value(0.5, 0.01, 0.6));

        let ucb = AcquisitionFunction::UpperConfidenceBound { kappa: 2.0 };
        assert!((ucb.value(1.0, 0.25, 0.0) - 2.0).abs() < 1e-12);
        assert_eq!(AcquisitionFunction::Mean.value(0.3, 1.0, 0.9), 0.3);
    }

    #[test]
    fn test_normal_cdf() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!(normal_cdf(-3.0) < 0.01);
        assert!(normal_cdf(3.0) > 0.99);
    }
}
