//! Strongly typed workflow schema definitions shared across the engine and CLI.
//!
//! Workflow files are authored as YAML (JSON documents parse too, being a YAML subset).
//! Args and env maps preserve authoring order (via `IndexMap`) because env entries may
//! reference earlier peers during composition.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod run;
pub mod validation;

/// Describes a fully authored workflow: metadata, declared args, env, and sequential steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    /// Workflow name used in resume payloads and diagnostics.
    #[serde(default)]
    pub name: String,
    /// Optional descriptive copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments keyed by name, preserving author order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, WorkflowArgDefinition>,
    /// Workflow-level environment templates, layered over the parent environment.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// Working directory template; relative values resolve against the workflow file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Ordered list of workflow steps executed sequentially.
    #[serde(default)]
    pub steps: Vec<WorkflowStepDefinition>,
    /// Absolute path of the file this definition was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl WorkflowDefinition {
    /// Directory that relative working directories resolve against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.source_path.as_deref().and_then(Path::parent)
    }

    /// Looks up a step by identifier.
    pub fn step(&self, id: &str) -> Option<&WorkflowStepDefinition> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Declared arg defaults overlaid with caller-supplied overrides.
    ///
    /// Args without a default and without an override are absent from the result,
    /// so templates referencing them render empty.
    pub fn effective_args(&self, overrides: &serde_json::Map<String, JsonValue>) -> serde_json::Map<String, JsonValue> {
        let mut values = serde_json::Map::new();
        for (name, definition) in &self.args {
            if let Some(default) = &definition.default {
                values.insert(name.clone(), default.clone());
            }
        }
        for (name, value) in overrides {
            values.insert(name.clone(), value.clone());
        }
        values
    }
}

/// Metadata for a single declared workflow argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowArgDefinition {
    /// Value used when the caller does not supply one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Descriptive text explaining the purpose of the arg.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Describes a single step within a workflow.
///
/// Exactly one of `command` and `prompt` must be present; the loader enforces this
/// through [`validation::validate_workflow_definition`] before any step runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowStepDefinition {
    /// Unique step identifier referenced by later templates.
    pub id: String,
    /// Optional descriptive copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Command line template executed through the platform shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Prompt template handed to the host LLM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// System text template; only valid alongside `prompt`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Stdin template for process steps, or context for prompt steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Step-level environment templates, layered over the workflow env.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    /// Step-level working directory template overriding the workflow `cwd`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Marks the step's result for inclusion under the `marked` output policy.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub output: bool,
}

impl WorkflowStepDefinition {
    /// Classifies the step, or `None` when the shape is invalid.
    pub fn kind(&self) -> Option<StepKind> {
        match (&self.command, &self.prompt) {
            (Some(_), None) => Some(StepKind::Process),
            (None, Some(_)) => Some(StepKind::Prompt),
            _ => None,
        }
    }
}

/// Lists the two kinds of step a workflow can contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Spawns an external process.
    Process,
    /// Halts the run and asks the host for an LLM completion.
    Prompt,
}
