//! Step execution: renders a step against the run scope, then either spawns it or
//! halts for a host completion.
//!
//! - [`prepare_step`] interpolates command, stdin, working directory, prompt and env
//! - [`execute_step`] drives a prepared step through `pending → running → {completed | halted | failed}`
//! - `runner::ProcessRunner` abstracts how a command line is executed

use std::{
    fmt,
    path::{Path, PathBuf},
};

use stepwise_types::{StepResult, WorkflowDefinition, WorkflowStepDefinition};
use tracing::{debug, info};

use crate::{
    environment::step_scope,
    error::WorkflowError,
    resolve::{RunContext, interpolate},
};

pub mod runner;
pub use runner::{ProcessInvocation, ProcessOutput, ProcessRunner, ShellProcessRunner};

/// Maximum number of stderr characters quoted in an execution error.
const STDERR_TAIL_CHARS: usize = 2000;

/// Step with every template rendered against the scope it runs in.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStep {
    /// Identifier of the step this was prepared from.
    pub id: String,
    /// What the step does once it runs.
    pub action: PreparedAction,
}

/// Rendered work for one step.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedAction {
    /// Spawn a process through the platform shell.
    Process(ProcessInvocation),
    /// Halt and ask the host for a completion.
    Prompt {
        prompt: String,
        system: Option<String>,
        context: Option<String>,
    },
}

/// Lifecycle of a single step within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    /// Output is merged into the scope.
    Completed,
    /// Prompt step waiting on the host.
    Halted,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Halted => "halted",
            StepStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Non-fatal result of executing a prepared step. Failures surface as [`WorkflowError`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(StepResult),
    Halted {
        step_id: String,
        prompt: String,
        system: Option<String>,
        context: Option<String>,
    },
}

impl StepOutcome {
    pub fn status(&self) -> StepStatus {
        match self {
            StepOutcome::Completed(_) => StepStatus::Completed,
            StepOutcome::Halted { .. } => StepStatus::Halted,
        }
    }
}

/// Renders `step` against `context`.
///
/// The step's own env is composed on top of the context first, so its command,
/// stdin and prompt templates can reference the step-level values.
pub fn prepare_step(
    definition: &WorkflowDefinition,
    step: &WorkflowStepDefinition,
    context: &RunContext,
) -> Result<PreparedStep, WorkflowError> {
    let scope = step_scope(step, context);
    let render = |template: &Option<String>| template.as_deref().map(|text| interpolate(text, &scope));

    let action = match (&step.command, &step.prompt) {
        (Some(command), None) => {
            let working_directory = step
                .cwd
                .as_deref()
                .or(definition.cwd.as_deref())
                .map(|template| interpolate(template, &scope));
            PreparedAction::Process(ProcessInvocation {
                command: interpolate(command, &scope),
                working_directory: resolve_working_directory(definition.base_dir(), working_directory.as_deref()),
                environment: scope.effective_environment(),
                stdin: render(&step.stdin),
            })
        }
        (None, Some(prompt)) => PreparedAction::Prompt {
            prompt: interpolate(prompt, &scope),
            system: render(&step.system),
            context: render(&step.stdin),
        },
        _ => {
            return Err(WorkflowError::Execution {
                step_id: step.id.clone(),
                message: "step must declare exactly one of 'command' or 'prompt'".into(),
            });
        }
    };

    Ok(PreparedStep {
        id: step.id.clone(),
        action,
    })
}

/// Working directory for a process step.
///
/// Absolute values are used as-is; relative values are joined onto `base_dir` when
/// the workflow came from a file. Without a rendered value the workflow file's own
/// directory is used, and `None` means the caller's directory is inherited.
pub fn resolve_working_directory(base_dir: Option<&Path>, rendered: Option<&str>) -> Option<PathBuf> {
    match rendered.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => {
            let path = PathBuf::from(value);
            match base_dir {
                Some(base) if path.is_relative() => Some(base.join(path)),
                _ => Some(path),
            }
        }
        None => base_dir.map(Path::to_path_buf),
    }
}

/// Runs a prepared step to a terminal state.
///
/// Process steps spawn through `runner` and complete on exit status zero. Prompt
/// steps halt immediately without touching the runner.
pub fn execute_step(step: &PreparedStep, runner: &dyn ProcessRunner) -> Result<StepOutcome, WorkflowError> {
    match &step.action {
        PreparedAction::Process(invocation) => {
            debug!(step_id = %step.id, status = %StepStatus::Running, "running process step");
            let output = runner.run(invocation).map_err(|error| WorkflowError::Execution {
                step_id: step.id.clone(),
                message: format!("failed to run command: {error}"),
            })?;

            if !output.success() {
                debug!(step_id = %step.id, status = %StepStatus::Failed, exit_code = output.exit_code, "process step failed");
                return Err(WorkflowError::Execution {
                    step_id: step.id.clone(),
                    message: exit_failure_message(&output),
                });
            }

            debug!(step_id = %step.id, status = %StepStatus::Completed, "process step completed");
            Ok(StepOutcome::Completed(StepResult::from_process(
                step.id.clone(),
                output.stdout,
                output.stderr,
                output.exit_code,
            )))
        }
        PreparedAction::Prompt { prompt, system, context } => {
            info!(step_id = %step.id, status = %StepStatus::Halted, "halting for llm completion");
            Ok(StepOutcome::Halted {
                step_id: step.id.clone(),
                prompt: prompt.clone(),
                system: system.clone(),
                context: context.clone(),
            })
        }
    }
}

fn exit_failure_message(output: &ProcessOutput) -> String {
    let mut message = format!("command exited with status {}", output.exit_code);
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        let skip = stderr.chars().count().saturating_sub(STDERR_TAIL_CHARS);
        let tail: String = stderr.chars().skip(skip).collect();
        message.push_str(": ");
        message.push_str(&tail);
    }
    message
}
