//! Executable pipeline bound to one hyperparameter assignment

use crate::error::{GreenGuardError, Result};
use crate::evaluation::Scorer;
use crate::template::HyperparameterAssignment;
use ndarray::{Array1, Array2};
use std::fmt;
use tracing::debug;

use super::primitive::{Primitive, PrimitiveConstructor, StepData, StepParams};

/// A template step resolved against its primitive and settings
#[derive(Clone)]
pub struct BoundStep {
    name: String,
    constructor: PrimitiveConstructor,
    params: StepParams,
}

impl BoundStep {
    pub(crate) fn new(name: String, constructor: PrimitiveConstructor, params: StepParams) -> Self {
        Self { name, constructor, params }
    }

    /// Step name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolved step settings
    pub fn params(&self) -> &StepParams {
        &self.params
    }
}

/// Template + assignment + fitted state
///
/// Fitting rebuilds every step from its constructor, so refitting discards
/// whatever was learned before.
pub struct PipelineInstance {
    template: String,
    assignment: HyperparameterAssignment,
    steps: Vec<BoundStep>,
    fitted: Option<Vec<Box<dyn Primitive>>>,
}

impl PipelineInstance {
    pub(crate) fn new(template: String, assignment: HyperparameterAssignment, steps: Vec<BoundStep>) -> Self {
        Self {
            template,
            assignment,
            steps,
            fitted: None,
        }
    }

    /// Name of the template this instance was built from
    pub fn template_name(&self) -> &str {
        &self.template
    }

    /// Hyperparameter assignment of this instance
    pub fn assignment(&self) -> &HyperparameterAssignment {
        &self.assignment
    }

    /// Bound steps in execution order
    pub fn steps(&self) -> &[BoundStep] {
        &self.steps
    }

    /// Whether `fit` has completed successfully
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fit every step in order, feeding each step's output to the next
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fitted = None;

        if x.nrows() != y.len() {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let n_steps = self.steps.len();
        let mut fitted = Vec::with_capacity(n_steps);
        let mut data = StepData::Table(x.clone());

        for (position, step) in self.steps.iter().enumerate() {
            let mut primitive = (step.constructor)(&step.params)
                .map_err(|e| GreenGuardError::step_fit(&step.name, e))?;
            primitive
                .fit(&data, y)
                .map_err(|e| GreenGuardError::step_fit(&step.name, e))?;

            if position + 1 < n_steps {
                data = primitive
                    .produce(&data)
                    .map_err(|e| GreenGuardError::step_fit(&step.name, e))?;
            }
            fitted.push(primitive);
        }

        debug!(template = %self.template, n_samples = x.nrows(), "Pipeline fitted");
        self.fitted = Some(fitted);
        Ok(())
    }

    /// Predict labels for `x`
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fitted = self.fitted.as_ref().ok_or(GreenGuardError::NotFitted)?;

        let mut data = StepData::Table(x.clone());
        for primitive in fitted {
            data = primitive.produce(&data)?;
        }

        let predictions = data.into_labels()?;
        if predictions.len() != x.nrows() {
            return Err(GreenGuardError::ShapeError {
                expected: format!("{} predictions", x.nrows()),
                actual: format!("{} predictions", predictions.len()),
            });
        }
        Ok(predictions)
    }

    /// Predict `x` and score the predictions against `y`
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>, scorer: &dyn Scorer) -> Result<f64> {
        let predictions = self.predict(x)?;
        scorer.score(y, &predictions)
    }
}

impl fmt::Debug for PipelineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineInstance")
            .field("template", &self.template)
            .field("assignment", &self.assignment)
            .field("steps", &self.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>())
            .field("fitted", &self.is_fitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::Metric;
    use crate::pipeline::{DataKind, PrimitiveRegistry};
    use crate::template::{HyperparameterSpec, PipelineTemplate, StepSpec};
    use ndarray::array;
    use std::sync::Arc;

    struct FailingFit;

    impl Primitive for FailingFit {
        fn fit(&mut self, _input: &StepData, _y: &Array1<f64>) -> Result<()> {
            Err(GreenGuardError::ComputationError("boom".to_string()))
        }

        fn produce(&self, input: &StepData) -> Result<StepData> {
            Ok(input.clone())
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        (
            array![[-2.0, 1.0], [-1.0, 0.5], [-1.5, 0.0], [1.0, 0.2], [2.0, 0.9], [1.5, 0.4]],
            array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
    }

    fn registry() -> Arc<PrimitiveRegistry> {
        let mut registry = PrimitiveRegistry::with_builtins();
        registry.register("failing", DataKind::Table, DataKind::Table, |_| {
            Ok(Box::new(FailingFit) as Box<dyn Primitive>)
        });
        Arc::new(registry)
    }

    fn template(first: &str) -> PipelineTemplate {
        PipelineTemplate::new(
            "test",
            vec![
                StepSpec::new("prep", first),
                StepSpec::new("clf", "logistic_regression")
                    .with_hyperparameter(HyperparameterSpec::real("alpha", 0.0, 1.0, 0.01)),
            ],
            registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_predict_before_fit() {
        let t = template("standard_scaler");
        let instance = t.build(&t.default_assignment()).unwrap();
        let (x, _) = data();
        assert!(matches!(instance.predict(&x), Err(GreenGuardError::NotFitted)));
    }

    #[test]
    fn test_fit_predict_score() {
        let t = template("standard_scaler");
        let mut instance = t.build(&t.default_assignment()).unwrap();
        let (x, y) = data();

        instance.fit(&x, &y).unwrap();
        let predictions = instance.predict(&x).unwrap();
        assert_eq!(predictions.len(), 6);

        let score = instance.score(&x, &y, &Metric::Accuracy).unwrap();
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_failure_names_step_and_clears_state() {
        let good = template("standard_scaler");
        let bad = template("failing");
        let (x, y) = data();

        let mut instance = bad.build(&bad.default_assignment()).unwrap();
        match instance.fit(&x, &y) {
            Err(GreenGuardError::StepFit { step, .. }) => assert_eq!(step, "prep"),
            other => panic!("expected StepFit, got {:?}", other),
        }
        assert!(!instance.is_fitted());

        let mut instance = good.build(&good.default_assignment()).unwrap();
        instance.fit(&x, &y).unwrap();
        assert!(instance.is_fitted());
    }

    #[test]
    fn test_refit_replaces_state() {
        let t = template("min_max_scaler");
        let mut instance = t.build(&t.default_assignment()).unwrap();
        let (x, y) = data();

        instance.fit(&x, &y).unwrap();
        let shifted = x.mapv(|v| v + 100.0);
        instance.fit(&shifted, &y).unwrap();

        let predictions = instance.predict(&shifted).unwrap();
        assert_eq!(predictions.len(), 6);
    }
}
