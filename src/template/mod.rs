//! Pipeline templates
//!
//! A [`PipelineTemplate`] is an immutable, validated sequence of steps. Each
//! step names a registered primitive, carries fixed settings and declares the
//! hyperparameters left open for tuning. All structural checks happen once in
//! [`PipelineTemplate::new`]; per-trial work only checks assignments.

mod hyperparameter;
mod registry;
mod step;

pub use hyperparameter::{Domain, HyperparameterKind, HyperparameterSpec, HyperparameterValue};
pub use registry::{InMemoryTemplateRegistry, TemplateRegistry};
pub use step::StepSpec;

use crate::error::{GreenGuardError, Result};
use crate::pipeline::{BoundStep, DataKind, PipelineInstance, PrimitiveRegistry, StepParams};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Concrete values for every tunable hyperparameter, keyed by
/// fully-qualified name (`"<step>.<hyperparameter>"`)
pub type HyperparameterAssignment = BTreeMap<String, HyperparameterValue>;

/// Validated, immutable sequence of pipeline steps
#[derive(Clone)]
pub struct PipelineTemplate {
    name: String,
    steps: Vec<StepSpec>,
    primitives: Arc<PrimitiveRegistry>,
}

impl PipelineTemplate {
    /// Create a template, validating its structure
    pub fn new(name: impl Into<String>, steps: Vec<StepSpec>, primitives: Arc<PrimitiveRegistry>) -> Result<Self> {
        let mut steps = steps;
        for (position, step) in steps.iter_mut().enumerate() {
            step.set_position(position);
        }

        let template = Self {
            name: name.into(),
            steps,
            primitives,
        };
        template.validate()?;
        Ok(template)
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(GreenGuardError::TemplateError(format!(
                "template '{}' has no steps",
                self.name
            )));
        }

        let mut step_names = HashSet::new();
        let mut hp_names = HashSet::new();
        let mut expected_input = DataKind::Table;

        for step in &self.steps {
            if step.name.is_empty() || step.name.contains('.') {
                return Err(GreenGuardError::TemplateError(format!(
                    "invalid step name '{}'",
                    step.name
                )));
            }
            if !step_names.insert(step.name.as_str()) {
                return Err(GreenGuardError::TemplateError(format!(
                    "duplicate step name '{}'",
                    step.name
                )));
            }

            for hp in &step.hyperparameters {
                hp.validate()?;
                if !hp_names.insert(hp.name.as_str()) {
                    return Err(GreenGuardError::TemplateError(format!(
                        "hyperparameter name '{}' is declared more than once",
                        hp.name
                    )));
                }
                if step.fixed.contains_key(&hp.name) {
                    return Err(GreenGuardError::TemplateError(format!(
                        "'{}' is both fixed and tunable in step '{}'",
                        hp.name, step.name
                    )));
                }
            }

            let descriptor = self.primitives.get(&step.primitive).map_err(|_| {
                GreenGuardError::TemplateError(format!(
                    "step '{}' uses unregistered primitive '{}'",
                    step.name, step.primitive
                ))
            })?;
            if descriptor.input != expected_input {
                return Err(GreenGuardError::TemplateError(format!(
                    "step '{}' expects {} input but receives {}",
                    step.name, descriptor.input, expected_input
                )));
            }
            expected_input = descriptor.output;
        }

        if expected_input != DataKind::Labels {
            return Err(GreenGuardError::TemplateError(format!(
                "last step of template '{}' must produce labels",
                self.name
            )));
        }
        Ok(())
    }

    /// Template name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Primitive registry the template resolves against
    pub fn primitives(&self) -> &Arc<PrimitiveRegistry> {
        &self.primitives
    }

    /// Tunable hyperparameters with their fully-qualified names, in template order
    pub fn hyperparameters(&self) -> Vec<(String, &HyperparameterSpec)> {
        self.steps
            .iter()
            .flat_map(|step| {
                step.hyperparameters
                    .iter()
                    .map(move |hp| (step.qualified_name(&hp.name), hp))
            })
            .collect()
    }

    /// Look up a hyperparameter by fully-qualified name
    pub fn hyperparameter(&self, qualified_name: &str) -> Option<&HyperparameterSpec> {
        let (step_name, hp_name) = qualified_name.split_once('.')?;
        self.steps
            .iter()
            .find(|s| s.name == step_name)?
            .hyperparameters
            .iter()
            .find(|hp| hp.name == hp_name)
    }

    /// Assignment made of every hyperparameter's default
    pub fn default_assignment(&self) -> HyperparameterAssignment {
        self.hyperparameters()
            .into_iter()
            .map(|(name, hp)| (name, hp.default.clone()))
            .collect()
    }

    /// Check an assignment and return it in canonical form
    pub fn validate_assignment(&self, assignment: &HyperparameterAssignment) -> Result<HyperparameterAssignment> {
        if let Some(unknown) = assignment.keys().find(|name| self.hyperparameter(name).is_none()) {
            return Err(GreenGuardError::InvalidAssignment(format!(
                "unknown hyperparameter '{}'",
                unknown
            )));
        }

        let mut canonical = HyperparameterAssignment::new();
        for (name, hp) in self.hyperparameters() {
            let value = assignment.get(&name).ok_or_else(|| {
                GreenGuardError::InvalidAssignment(format!("missing hyperparameter '{}'", name))
            })?;
            let value = hp.check(&name, value)?;
            canonical.insert(name, value);
        }
        Ok(canonical)
    }

    /// Bind the template to an assignment
    ///
    /// Construction is cheap: nothing is fitted until
    /// [`PipelineInstance::fit`] is called.
    pub fn build(&self, assignment: &HyperparameterAssignment) -> Result<PipelineInstance> {
        let assignment = self.validate_assignment(assignment)?;

        let mut bound = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let mut values = step.fixed.clone();
            for hp in &step.hyperparameters {
                if let Some(value) = assignment.get(&step.qualified_name(&hp.name)) {
                    values.insert(hp.name.clone(), value.clone());
                }
            }
            let descriptor = self.primitives.get(&step.primitive)?;
            bound.push(BoundStep::new(
                step.name.clone(),
                descriptor.constructor(),
                StepParams::new(values),
            ));
        }

        Ok(PipelineInstance::new(self.name.clone(), assignment, bound))
    }
}

impl fmt::Debug for PipelineTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTemplate")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<PrimitiveRegistry> {
        Arc::new(PrimitiveRegistry::with_builtins())
    }

    fn template() -> PipelineTemplate {
        PipelineTemplate::new(
            "scaled_logit",
            vec![
                StepSpec::new("scaler", "standard_scaler")
                    .with_hyperparameter(HyperparameterSpec::boolean("with_mean", true)),
                StepSpec::new("clf", "logistic_regression")
                    .with_fixed("max_iter", 200i64)
                    .with_hyperparameter(HyperparameterSpec::log_real("alpha", 1e-4, 1.0, 0.01))
                    .with_hyperparameter(HyperparameterSpec::integer("depth", 1, 10, 3)),
            ],
            registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_positions_assigned() {
        let t = template();
        assert_eq!(t.steps()[0].position(), 0);
        assert_eq!(t.steps()[1].position(), 1);
    }

    #[test]
    fn test_empty_template_rejected() {
        let result = PipelineTemplate::new("empty", vec![], registry());
        assert!(matches!(result, Err(GreenGuardError::TemplateError(_))));
    }

    #[test]
    fn test_duplicate_hyperparameter_rejected() {
        let result = PipelineTemplate::new(
            "dup",
            vec![
                StepSpec::new("a", "standard_scaler")
                    .with_hyperparameter(HyperparameterSpec::real("alpha", 0.0, 1.0, 0.5)),
                StepSpec::new("b", "logistic_regression")
                    .with_hyperparameter(HyperparameterSpec::real("alpha", 0.0, 1.0, 0.5)),
            ],
            registry(),
        );
        assert!(matches!(result, Err(GreenGuardError::TemplateError(_))));
    }

    #[test]
    fn test_incompatible_chaining_rejected() {
        let result = PipelineTemplate::new(
            "bad_chain",
            vec![
                StepSpec::new("clf", "logistic_regression"),
                StepSpec::new("scaler", "standard_scaler"),
            ],
            registry(),
        );
        assert!(matches!(result, Err(GreenGuardError::TemplateError(_))));
    }

    #[test]
    fn test_missing_estimator_rejected() {
        let result = PipelineTemplate::new(
            "no_estimator",
            vec![StepSpec::new("scaler", "standard_scaler")],
            registry(),
        );
        assert!(matches!(result, Err(GreenGuardError::TemplateError(_))));
    }

    #[test]
    fn test_unregistered_primitive_rejected() {
        let result = PipelineTemplate::new(
            "unknown",
            vec![StepSpec::new("clf", "random_forest")],
            registry(),
        );
        assert!(matches!(result, Err(GreenGuardError::TemplateError(_))));
    }

    #[test]
    fn test_default_assignment_builds() {
        let t = template();
        let defaults = t.default_assignment();
        assert_eq!(defaults.len(), 3);
        assert!(defaults.contains_key("clf.alpha"));
        assert!(t.build(&defaults).is_ok());
    }

    #[test]
    fn test_build_rejects_out_of_domain() {
        let t = template();
        let mut assignment = t.default_assignment();
        assignment.insert("clf.depth".to_string(), HyperparameterValue::Int(11));
        assert!(matches!(
            t.build(&assignment),
            Err(GreenGuardError::InvalidAssignment(_))
        ));
    }

    #[test]
    fn test_build_rejects_missing_and_unknown() {
        let t = template();

        let mut missing = t.default_assignment();
        missing.remove("scaler.with_mean");
        assert!(matches!(t.build(&missing), Err(GreenGuardError::InvalidAssignment(_))));

        let mut unknown = t.default_assignment();
        unknown.insert("clf.gamma".to_string(), HyperparameterValue::Real(0.1));
        assert!(matches!(t.build(&unknown), Err(GreenGuardError::InvalidAssignment(_))));
    }

    #[test]
    fn test_build_rejects_wrong_kind() {
        let t = template();
        let mut assignment = t.default_assignment();
        assignment.insert("scaler.with_mean".to_string(), HyperparameterValue::Int(1));
        assert!(t.build(&assignment).is_err());
    }
}
