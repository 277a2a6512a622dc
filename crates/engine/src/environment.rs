//! Environment composition for workflow steps.
//!
//! Layers, lowest to highest precedence:
//!
//! 1. the caller-supplied parent environment (an immutable snapshot, never read from
//!    the process here)
//! 2. the workflow `env` map, each value resolved against `{parent env, args}` with args
//!    outranking same-named parent variables
//! 3. the step `env` map, resolved against layer 2's scope plus completed step outputs
//!    and the step's own earlier peers

use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value};
use stepwise_types::{WorkflowDefinition, WorkflowStepDefinition};

use crate::resolve::{RunContext, interpolate};

/// Resolves the workflow-level env map.
///
/// Values may reference args and parent variables but not each other.
pub fn resolve_workflow_environment(
    definition: &WorkflowDefinition,
    parent_environment: &HashMap<String, String>,
    args: &JsonMap<String, Value>,
) -> IndexMap<String, String> {
    let scope = RunContext {
        parent_environment: parent_environment.clone(),
        args: args.clone(),
        ..Default::default()
    };

    definition
        .env
        .iter()
        .map(|(name, template)| (name.clone(), interpolate(template, &scope)))
        .collect()
}

/// Resolves a step-level env map against the run scope.
///
/// Entries are resolved in declaration order and each resolved value is visible to
/// later peers, shadowing any workflow-level value of the same name.
pub fn resolve_step_environment(step: &WorkflowStepDefinition, context: &RunContext) -> IndexMap<String, String> {
    let mut scope = context.clone();
    let mut resolved = IndexMap::with_capacity(step.env.len());

    for (name, template) in &step.env {
        let value = interpolate(template, &scope);
        scope.environment_variables.insert(name.clone(), value.clone());
        resolved.insert(name.clone(), value);
    }

    resolved
}

/// Returns a copy of `context` with the step's resolved env layered on top.
pub fn step_scope(step: &WorkflowStepDefinition, context: &RunContext) -> RunContext {
    let step_environment = resolve_step_environment(step, context);
    let mut scope = context.clone();
    scope.environment_variables.extend(step_environment);
    scope
}
