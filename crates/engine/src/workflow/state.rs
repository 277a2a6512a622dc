//! Run state for a single invocation.
//!
//! A run is described entirely by `(definition, position, accumulated results)` plus the
//! arg overrides it was started with. [`WorkflowRunState`] holds that triple while an
//! invocation is in flight and converts to and from the [`ResumePayload`] that travels
//! inside a resume token. Nothing here outlives the call that created it.

use serde_json::{Map as JsonMap, Value};
use stepwise_types::{
    RESUME_PROTOCOL_VERSION, ResumeKind, ResumePayload, StepKind, StepResult, WorkflowDefinition, WorkflowSource,
    WorkflowStepDefinition,
};

use crate::error::WorkflowError;

/// Position and accumulated results of an in-flight run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRunState {
    /// Index of the next step to execute.
    position: usize,
    /// Caller-supplied arg overrides, before defaults are applied.
    args: JsonMap<String, Value>,
    /// Results of every step before `position`, in order.
    results: Vec<StepResult>,
}

impl WorkflowRunState {
    /// State for a run starting at the first step.
    pub fn fresh(args: JsonMap<String, Value>) -> Self {
        Self {
            position: 0,
            args,
            results: Vec::new(),
        }
    }

    /// Rebuilds state from a decoded payload, rejecting payloads that do not fit `definition`.
    ///
    /// The payload must name the same workflow, point at a prompt step, and carry one
    /// result per earlier step with matching ids in declaration order.
    pub fn from_payload(definition: &WorkflowDefinition, payload: ResumePayload) -> Result<Self, WorkflowError> {
        if payload.workflow.name != definition.name {
            return Err(WorkflowError::InvalidResume(format!(
                "token belongs to workflow '{}' but the definition is '{}'",
                payload.workflow.name, definition.name
            )));
        }

        let index = payload.next_step_index;
        let step = definition.steps.get(index).ok_or_else(|| {
            WorkflowError::InvalidResume(format!(
                "next step index {index} is out of range for {} step(s)",
                definition.steps.len()
            ))
        })?;
        if step.kind() != Some(StepKind::Prompt) {
            return Err(WorkflowError::InvalidResume(format!(
                "step '{}' at index {index} is not a prompt step",
                step.id
            )));
        }

        if payload.results.len() != index {
            return Err(WorkflowError::InvalidResume(format!(
                "expected {index} accumulated result(s) but the token carries {}",
                payload.results.len()
            )));
        }
        for (result, expected) in payload.results.iter().zip(&definition.steps) {
            if result.id != expected.id {
                return Err(WorkflowError::InvalidResume(format!(
                    "accumulated result '{}' does not match step '{}'",
                    result.id, expected.id
                )));
            }
        }

        Ok(Self {
            position: index,
            args: payload.args,
            results: payload.results,
        })
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn args(&self) -> &JsonMap<String, Value> {
        &self.args
    }

    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// The step at the current position, or `None` once every step has completed.
    pub fn next_step<'a>(&self, definition: &'a WorkflowDefinition) -> Option<&'a WorkflowStepDefinition> {
        definition.steps.get(self.position)
    }

    /// Records a completed step and advances the position.
    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
        self.position += 1;
    }

    /// Completes the halted prompt step at the current position with the host's text.
    ///
    /// The completion is stored verbatim; it is never treated as a template.
    pub fn complete_prompt(&mut self, definition: &WorkflowDefinition, completion: &str) -> Result<(), WorkflowError> {
        let step = self.next_step(definition).ok_or_else(|| {
            WorkflowError::InvalidResume(format!("no step at index {} to receive the completion", self.position))
        })?;
        let result = StepResult::from_completion(step.id.clone(), completion);
        self.record(result);
        Ok(())
    }

    /// Continuation payload for a halt at the current position.
    pub fn to_payload(&self, definition: &WorkflowDefinition) -> ResumePayload {
        ResumePayload {
            protocol_version: RESUME_PROTOCOL_VERSION,
            kind: ResumeKind::WorkflowFile,
            workflow: WorkflowSource::of(definition),
            args: self.args.clone(),
            next_step_index: self.position,
            results: self.results.clone(),
        }
    }

    /// Step outputs keyed by id, as exposed to templates.
    pub fn scope_entries(&self) -> impl Iterator<Item = (String, Value)> + '_ {
        self.results.iter().map(|result| (result.id.clone(), result.scope_value()))
    }

    pub fn into_results(self) -> Vec<StepResult> {
        self.results
    }
}
