//! Trial records

use crate::evaluation::Evaluation;
use crate::template::HyperparameterAssignment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    /// Cross-validation ran; fitness may still be `-inf` when every fold failed
    Completed,
    /// The trial could not be evaluated
    Failed { reason: String },
}

/// One evaluation of one hyperparameter assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Position in the ledger, assigned on append
    pub index: usize,
    pub assignment: HyperparameterAssignment,
    /// Aggregate cross-validated score, `-inf` for failed trials
    #[serde(with = "score")]
    pub fitness: f64,
    #[serde(with = "scores")]
    pub fold_scores: Vec<f64>,
    #[serde(with = "score")]
    pub std_score: f64,
    pub duration_secs: f64,
    pub started_at: DateTime<Utc>,
    pub status: TrialStatus,
    /// Fold failures and other non-fatal problems
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Trial {
    /// Trial from a finished evaluation
    pub fn completed(
        assignment: HyperparameterAssignment,
        evaluation: Evaluation,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let warnings = evaluation
            .failures
            .iter()
            .map(|f| format!("fold {} failed: {}", f.fold, f.error))
            .collect();

        Self {
            index: 0,
            assignment,
            fitness: evaluation.fitness,
            fold_scores: evaluation.fold_scores,
            std_score: evaluation.std_score,
            duration_secs: duration.as_secs_f64(),
            started_at,
            status: TrialStatus::Completed,
            warnings,
        }
    }

    /// Trial that could not be evaluated, scored `-inf`
    pub fn failed(
        assignment: HyperparameterAssignment,
        reason: impl Into<String>,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let reason = reason.into();
        Self {
            index: 0,
            assignment,
            fitness: f64::NEG_INFINITY,
            fold_scores: Vec::new(),
            std_score: 0.0,
            duration_secs: duration.as_secs_f64(),
            started_at,
            status: TrialStatus::Failed { reason: reason.clone() },
            warnings: vec![reason],
        }
    }

    /// Whether the trial produced a usable fitness
    pub fn is_viable(&self) -> bool {
        self.fitness.is_finite()
    }
}

/// Float that keeps non-finite values as `"inf"`, `"-inf"` or `"NaN"`
struct Score(f64);

impl Serialize for Score {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ScoreVisitor;

        impl<'de> serde::de::Visitor<'de> for ScoreVisitor {
            type Value = Score;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a number or one of \"inf\", \"-inf\", \"NaN\"")
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<Score, E> {
                Ok(Score(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<Score, E> {
                Ok(Score(v as f64))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<Score, E> {
                Ok(Score(v as f64))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<Score, E> {
                match v {
                    "inf" => Ok(Score(f64::INFINITY)),
                    "-inf" => Ok(Score(f64::NEG_INFINITY)),
                    "NaN" => Ok(Score(f64::NAN)),
                    other => Err(E::invalid_value(serde::de::Unexpected::Str(other), &self)),
                }
            }
        }

        deserializer.deserialize_any(ScoreVisitor)
    }
}

mod score {
    use super::Score;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Score(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Score::deserialize(deserializer).map(|s| s.0)
    }
}

mod scores {
    use super::Score;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(v.iter().map(|x| Score(*x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        Vec::<Score>::deserialize(deserializer).map(|v| v.into_iter().map(|s| s.0).collect())
    }
}
