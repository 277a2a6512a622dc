//! Load-time checks over a parsed workflow definition.
//!
//! [`ensure_valid`] is the gate every entry point passes before the first step runs.
//! Structural violations are fatal and reported together. References to steps that
//! have not run yet are legal (they render empty) but almost always a mistake, so
//! they are surfaced as warnings only.

use std::collections::HashMap;

use stepwise_types::{WorkflowDefinition, WorkflowStepDefinition, validate_workflow_definition};
use tracing::warn;

use crate::{
    error::WorkflowError,
    resolve::{extract_references, path_segments},
};

/// Fails with every structural violation, and logs suspicious step references.
pub fn ensure_valid(definition: &WorkflowDefinition) -> Result<(), WorkflowError> {
    let violations = validate_workflow_definition(definition);
    if !violations.is_empty() {
        return Err(WorkflowError::Validation { violations });
    }

    for finding in forward_references(definition) {
        warn!(workflow = %definition.name, step_id = %finding.step_id, reference = %finding.reference, "{}", finding.message());
    }
    Ok(())
}

/// A template reference to a step that has not completed when the referencing step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReference {
    /// Step whose template contains the reference.
    pub step_id: String,
    /// Referenced step id.
    pub target: String,
    /// Reference expression as written.
    pub reference: String,
}

impl ForwardReference {
    pub fn message(&self) -> String {
        if self.step_id == self.target {
            format!("step '{}' references its own output via '{}'", self.step_id, self.reference)
        } else {
            format!(
                "step '{}' references later step '{}' via '{}'; it will render empty",
                self.step_id, self.target, self.reference
            )
        }
    }
}

/// Lists references to the referencing step itself or to any later step.
pub fn forward_references(definition: &WorkflowDefinition) -> Vec<ForwardReference> {
    let positions: HashMap<&str, usize> = definition
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| (step.id.as_str(), index))
        .collect();

    let mut findings = Vec::new();
    for (index, step) in definition.steps.iter().enumerate() {
        for reference in step_templates(step).flat_map(extract_references) {
            let Some(target) = referenced_step(&reference, &positions) else {
                continue;
            };
            if positions.get(target.as_str()).is_some_and(|&position| position >= index) {
                findings.push(ForwardReference {
                    step_id: step.id.clone(),
                    target,
                    reference,
                });
            }
        }
    }
    findings
}

fn step_templates(step: &WorkflowStepDefinition) -> impl Iterator<Item = &str> {
    [&step.command, &step.prompt, &step.system, &step.stdin, &step.cwd]
        .into_iter()
        .filter_map(|template| template.as_deref())
        .chain(step.env.values().map(String::as_str))
}

fn referenced_step(reference: &str, positions: &HashMap<&str, usize>) -> Option<String> {
    let segments = path_segments(reference);
    let root = segments.first()?;
    if positions.contains_key(root.as_str()) {
        return Some(root.clone());
    }
    if root == "steps" {
        return segments.get(1).filter(|id| positions.contains_key(id.as_str())).cloned();
    }
    None
}
