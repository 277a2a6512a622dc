//! Shape validation run over a workflow definition before any step executes.
//!
//! The pass is pure: it returns every violation it finds instead of stopping at the
//! first, so authors see all problems in one go.

use std::{collections::HashSet, fmt};

use super::WorkflowDefinition;

/// A single shape problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationViolation {
    /// Offending step, when the violation is step-scoped.
    pub step_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ValidationViolation {
    fn workflow(message: impl Into<String>) -> Self {
        Self {
            step_id: None,
            message: message.into(),
        }
    }

    fn step(step_id: &str, message: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step_id) => write!(f, "step '{}': {}", step_id, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Validate step shapes and identifiers.
///
/// Checks:
/// - the workflow has a non-blank `name`
/// - every step has a non-blank `id`, and ids are unique
/// - every step declares exactly one of `command` and `prompt`
/// - `system` only appears alongside `prompt`
pub fn validate_workflow_definition(definition: &WorkflowDefinition) -> Vec<ValidationViolation> {
    let mut violations = Vec::new();

    if definition.name.trim().is_empty() {
        violations.push(ValidationViolation::workflow("workflow is missing the required 'name'"));
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for (index, step) in definition.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            violations.push(ValidationViolation::workflow(format!("step #{} is missing the required 'id'", index + 1)));
        } else if !seen_ids.insert(step.id.as_str()) {
            violations.push(ValidationViolation::step(&step.id, "duplicate step id"));
        }

        let label = if step.id.trim().is_empty() {
            format!("#{}", index + 1)
        } else {
            step.id.clone()
        };
        match (&step.command, &step.prompt) {
            (Some(_), Some(_)) => violations.push(ValidationViolation::step(
                &label,
                "declares both 'command' and 'prompt'; a step must have exactly one",
            )),
            (None, None) => violations.push(ValidationViolation::step(
                &label,
                "declares neither 'command' nor 'prompt'; a step must have exactly one",
            )),
            _ => {}
        }

        if step.system.is_some() && step.prompt.is_none() {
            violations.push(ValidationViolation::step(&label, "'system' is only allowed on prompt steps"));
        }
    }

    violations
}
