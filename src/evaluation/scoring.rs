//! Scoring functions
//!
//! Scores are higher-is-better. Labels are binary, with values above 0.5
//! counted as the positive (failure) class.

use crate::error::{GreenGuardError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Pure function of true and predicted labels; higher is better
pub trait Scorer: Send + Sync {
    /// Score predictions against the true labels
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64>;

    /// Name used in logs
    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> Scorer for F
where
    F: Fn(&Array1<f64>, &Array1<f64>) -> Result<f64> + Send + Sync,
{
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        self(y_true, y_pred)
    }
}

/// Built-in classification metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Accuracy,
    F1,
    Precision,
    Recall,
    BalancedAccuracy,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::F1
    }
}

impl Metric {
    /// Resolve a metric by name
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Metric::Accuracy),
            "f1" | "f1_score" => Ok(Metric::F1),
            "precision" => Ok(Metric::Precision),
            "recall" => Ok(Metric::Recall),
            "balanced_accuracy" => Ok(Metric::BalancedAccuracy),
            other => Err(GreenGuardError::ConfigError(format!("unknown metric '{}'", other))),
        }
    }

    fn confusion_counts(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> (usize, usize, usize, usize) {
        let mut tp = 0;
        let mut fp = 0;
        let mut tn = 0;
        let mut fn_ = 0;

        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            match (*t > 0.5, *p > 0.5) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        (tp, fp, tn, fn_)
    }

    fn ratio(num: usize, den: usize) -> f64 {
        if den > 0 {
            num as f64 / den as f64
        } else {
            0.0
        }
    }
}

impl Scorer for Metric {
    fn score(&self, y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
        if y_true.len() != y_pred.len() {
            return Err(GreenGuardError::InvalidInput(format!(
                "{} true labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        if y_true.is_empty() {
            return Err(GreenGuardError::InvalidInput("no labels to score".to_string()));
        }

        let (tp, fp, tn, fn_) = Self::confusion_counts(y_true, y_pred);
        let score = match self {
            Metric::Accuracy => {
                let correct = y_true
                    .iter()
                    .zip(y_pred.iter())
                    .filter(|(t, p)| (*t - *p).abs() < 0.5)
                    .count();
                Self::ratio(correct, y_true.len())
            }
            Metric::Precision => Self::ratio(tp, tp + fp),
            Metric::Recall => Self::ratio(tp, tp + fn_),
            Metric::F1 => {
                let precision = Self::ratio(tp, tp + fp);
                let recall = Self::ratio(tp, tp + fn_);
                if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                }
            }
            Metric::BalancedAccuracy => {
                let tpr = Self::ratio(tp, tp + fn_);
                let tnr = Self::ratio(tn, tn + fp);
                (tpr + tnr) / 2.0
            }
        };
        Ok(score)
    }

    fn name(&self) -> &str {
        match self {
            Metric::Accuracy => "accuracy",
            Metric::F1 => "f1",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::BalancedAccuracy => "balanced_accuracy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_metrics() {
        let y_true = array![1.0, 1.0, 0.0, 0.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0];

        assert_eq!(Metric::Accuracy.score(&y_true, &y_pred).unwrap(), 0.5);
        assert_eq!(Metric::Precision.score(&y_true, &y_pred).unwrap(), 0.5);
        assert_eq!(Metric::Recall.score(&y_true, &y_pred).unwrap(), 0.5);
        assert_eq!(Metric::F1.score(&y_true, &y_pred).unwrap(), 0.5);
        assert_eq!(Metric::BalancedAccuracy.score(&y_true, &y_pred).unwrap(), 0.5);
    }

    #[test]
    fn test_f1_without_positives() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 0.0];
        assert_eq!(Metric::F1.score(&y_true, &y_pred).unwrap(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let result = Metric::Accuracy.score(&array![1.0], &array![1.0, 0.0]);
        assert!(matches!(result, Err(GreenGuardError::InvalidInput(_))));
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Metric::from_name("F1").unwrap(), Metric::F1);
        assert_eq!(Metric::from_name("accuracy").unwrap().name(), "accuracy");
        assert!(Metric::from_name("auc").is_err());
    }

    #[test]
    fn test_closure_scorer() {
        let scorer = |y_true: &Array1<f64>, _y_pred: &Array1<f64>| -> Result<f64> { Ok(y_true.len() as f64) };
        assert_eq!(scorer.score(&array![0.0, 1.0], &array![0.0, 1.0]).unwrap(), 2.0);
        assert_eq!(Scorer::name(&scorer), "custom");
    }
}
