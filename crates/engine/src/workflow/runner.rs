//! Sequential workflow runner with suspend/resume at prompt steps.
//!
//! Every entry point builds a fresh scope from the caller's options and the replayed
//! results, executes steps in declaration order from the current position, and stops at
//! the first prompt step that has no completion. The halt carries a resume token that
//! encodes the position and accumulated results; handing it back together with the
//! host's completion continues the run from exactly that point.

use std::collections::HashMap;

use serde_json::{Map as JsonMap, Value};
use stepwise_types::{HostRequestType, LlmRequest, OutputPolicy, ResumePayload, RunOutcome, WorkflowDefinition};
use tracing::{debug, info};

use crate::{
    environment::resolve_workflow_environment,
    error::WorkflowError,
    executor::{ProcessRunner, StepOutcome, execute_step, prepare_step},
    load_workflow_file,
    resolve::RunContext,
    resume::encode_resume_token,
    workflow::{document::ensure_valid, state::WorkflowRunState},
};

/// Caller-controlled inputs of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Snapshot of the environment spawned processes inherit.
    pub parent_env: HashMap<String, String>,
    /// Arg overrides layered over declared defaults. Undeclared names are accepted.
    pub args: JsonMap<String, Value>,
    /// Which step results populate the output of a completed run.
    pub output: OutputPolicy,
}

impl RunOptions {
    /// Options whose parent environment is a snapshot of the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process_environment() -> Self {
        let parent_env = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();
        Self {
            parent_env,
            ..Default::default()
        }
    }

    pub fn with_args(mut self, args: JsonMap<String, Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_output(mut self, output: OutputPolicy) -> Self {
        self.output = output;
        self
    }
}

/// Runs `definition` from its first step.
pub fn run_workflow(
    definition: &WorkflowDefinition,
    options: &RunOptions,
    runner: &dyn ProcessRunner,
) -> Result<RunOutcome, WorkflowError> {
    ensure_valid(definition)?;
    info!(workflow = %definition.name, steps = definition.steps.len(), "starting workflow");
    let state = WorkflowRunState::fresh(options.args.clone());
    drive(definition, state, options, runner)
}

/// Continues a halted run, reloading the definition from the workflow file named in the payload.
///
/// Args are taken from the payload; `options.args` is ignored so a continuation cannot
/// diverge from the values the earlier steps saw.
pub fn resume_workflow(
    payload: ResumePayload,
    llm_response: &str,
    options: &RunOptions,
    runner: &dyn ProcessRunner,
) -> Result<RunOutcome, WorkflowError> {
    let path = payload.workflow.file.clone().ok_or_else(|| {
        WorkflowError::InvalidResume(format!(
            "token for workflow '{}' does not reference a workflow file",
            payload.workflow.name
        ))
    })?;
    let definition = load_workflow_file(&path)?;
    resume_workflow_with_definition(&definition, payload, llm_response, options, runner)
}

/// Continues a halted run against a caller-supplied definition.
pub fn resume_workflow_with_definition(
    definition: &WorkflowDefinition,
    payload: ResumePayload,
    llm_response: &str,
    options: &RunOptions,
    runner: &dyn ProcessRunner,
) -> Result<RunOutcome, WorkflowError> {
    ensure_valid(definition)?;
    let mut state = WorkflowRunState::from_payload(definition, payload)?;
    info!(workflow = %definition.name, position = state.position(), "resuming workflow");
    state.complete_prompt(definition, llm_response)?;
    drive(definition, state, options, runner)
}

fn drive(
    definition: &WorkflowDefinition,
    mut state: WorkflowRunState,
    options: &RunOptions,
    runner: &dyn ProcessRunner,
) -> Result<RunOutcome, WorkflowError> {
    let mut context = initial_context(definition, &state, options);

    while let Some(step) = state.next_step(definition) {
        debug!(step_id = %step.id, kind = ?step.kind(), index = state.position(), "starting step");
        let prepared = prepare_step(definition, step, &context)?;

        match execute_step(&prepared, runner)? {
            StepOutcome::Completed(result) => {
                context.steps.insert(result.id.clone(), result.scope_value());
                state.record(result);
            }
            StepOutcome::Halted {
                step_id,
                prompt,
                system,
                context: prompt_context,
            } => {
                let resume_token = encode_resume_token(&state.to_payload(definition))?;
                info!(workflow = %definition.name, step_id = %step_id, "workflow needs an llm completion");
                return Ok(RunOutcome::NeedsLlm {
                    request: LlmRequest {
                        request_type: HostRequestType::LlmRequest,
                        step_id,
                        prompt,
                        system,
                        context: prompt_context,
                        resume_token,
                    },
                });
            }
        }
    }

    info!(workflow = %definition.name, output = %options.output, "workflow completed");
    Ok(RunOutcome::Ok {
        output: options.output.select(definition, state.into_results()),
    })
}

fn initial_context(definition: &WorkflowDefinition, state: &WorkflowRunState, options: &RunOptions) -> RunContext {
    let args = definition.effective_args(state.args());
    let environment_variables = resolve_workflow_environment(definition, &options.parent_env, &args);
    RunContext {
        parent_environment: options.parent_env.clone(),
        args,
        environment_variables,
        steps: state.scope_entries().collect(),
    }
}
