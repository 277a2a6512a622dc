//! Run-time records exchanged with callers: step results, host requests, outcomes,
//! and the resume payload carried inside a resume token.

use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{StepKind, WorkflowDefinition};

/// Current resume payload layout. Tokens carrying any other version are rejected.
pub const RESUME_PROTOCOL_VERSION: u32 = 1;

/// Recorded outcome of a completed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Step identifier.
    pub id: String,
    /// Whether the step spawned a process or was answered by the host.
    pub kind: StepKind,
    /// Captured process stdout, or the completion text of a resumed prompt step.
    pub stdout: String,
    /// Captured process stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// Process exit code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// `stdout` parsed as JSON, when it is valid JSON other than `null`.
    ///
    /// A present `"json": null` deserializes to `Some(Value::Null)` rather than `None`.
    #[serde(default, with = "present_json", skip_serializing_if = "Option::is_none")]
    pub json: Option<JsonValue>,
}

impl StepResult {
    /// Builds the result of a process step that exited successfully.
    pub fn from_process(id: impl Into<String>, stdout: String, stderr: String, exit_code: i32) -> Self {
        let json = parse_json_output(&stdout);
        Self {
            id: id.into(),
            kind: StepKind::Process,
            stdout,
            stderr: Some(stderr),
            exit_code: Some(exit_code),
            json,
        }
    }

    /// Builds the result of a prompt step from the host-supplied completion, kept verbatim.
    pub fn from_completion(id: impl Into<String>, completion: impl Into<String>) -> Self {
        let stdout = completion.into();
        let json = parse_json_output(&stdout);
        Self {
            id: id.into(),
            kind: StepKind::Prompt,
            stdout,
            stderr: None,
            exit_code: None,
            json,
        }
    }

    /// Value exposed to later steps under this step's id.
    pub fn scope_value(&self) -> JsonValue {
        let mut fields = serde_json::Map::new();
        fields.insert("stdout".into(), JsonValue::String(self.stdout.clone()));
        if let Some(stderr) = &self.stderr {
            fields.insert("stderr".into(), JsonValue::String(stderr.clone()));
        }
        if let Some(exit_code) = self.exit_code {
            fields.insert("exitCode".into(), JsonValue::from(exit_code));
        }
        if let Some(json) = &self.json {
            fields.insert("json".into(), json.clone());
        }
        JsonValue::Object(fields)
    }
}

/// Keeps a present `null` distinct from an absent field.
mod present_json {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value as JsonValue;

    pub fn serialize<S: Serializer>(value: &Option<JsonValue>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(json) => json.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<JsonValue>, D::Error> {
        JsonValue::deserialize(deserializer).map(Some)
    }
}

fn parse_json_output(text: &str) -> Option<JsonValue> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<JsonValue>(trimmed) {
        Ok(JsonValue::Null) | Err(_) => None,
        Ok(value) => Some(value),
    }
}

/// Discriminant of requests handed to the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostRequestType {
    #[default]
    LlmRequest,
}

/// Halt descriptor returned when a prompt step needs a host completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequest {
    #[serde(rename = "type", default)]
    pub request_type: HostRequestType,
    /// Identifier of the halted prompt step.
    pub step_id: String,
    /// Rendered prompt text.
    pub prompt: String,
    /// Rendered system text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Rendered stdin template of the prompt step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Opaque continuation to hand back on resume.
    pub resume_token: String,
}

/// Terminal state of one runner invocation. Fatal failures surface as errors instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step completed.
    Ok { output: Vec<StepResult> },
    /// A prompt step was reached without a completion.
    NeedsLlm { request: LlmRequest },
}

/// Kind discriminant of a resume payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResumeKind {
    /// Continuation of a workflow loaded from a workflow definition.
    WorkflowFile,
}

/// Reference to the workflow a payload belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowSource {
    /// Workflow name at the time of the halt.
    pub name: String,
    /// Absolute path of the workflow file, absent for in-memory definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl WorkflowSource {
    pub fn of(definition: &WorkflowDefinition) -> Self {
        Self {
            name: definition.name.clone(),
            file: definition.source_path.clone(),
        }
    }
}

/// Minimal continuation state serialized into a resume token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResumePayload {
    pub protocol_version: u32,
    pub kind: ResumeKind,
    pub workflow: WorkflowSource,
    /// Arg overrides the run was started with.
    #[serde(default)]
    pub args: serde_json::Map<String, JsonValue>,
    /// Index of the halted prompt step.
    pub next_step_index: usize,
    /// Results of every step before `next_step_index`, in order.
    #[serde(default)]
    pub results: Vec<StepResult>,
}

/// Selects which step results populate the output of a completed run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    /// Every step, in declaration order.
    #[default]
    All,
    /// Only the final step.
    Last,
    /// Only steps declared with `output: true`.
    Marked,
}

impl OutputPolicy {
    pub fn select(self, definition: &WorkflowDefinition, results: Vec<StepResult>) -> Vec<StepResult> {
        match self {
            OutputPolicy::All => results,
            OutputPolicy::Last => results.into_iter().last().into_iter().collect(),
            OutputPolicy::Marked => results
                .into_iter()
                .filter(|result| definition.step(&result.id).map(|step| step.output).unwrap_or(false))
                .collect(),
        }
    }
}

impl FromStr for OutputPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(OutputPolicy::All),
            "last" => Ok(OutputPolicy::Last),
            "marked" => Ok(OutputPolicy::Marked),
            other => Err(format!("unknown output policy '{other}' (expected all, last, or marked)")),
        }
    }
}

impl fmt::Display for OutputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OutputPolicy::All => "all",
            OutputPolicy::Last => "last",
            OutputPolicy::Marked => "marked",
        };
        f.write_str(label)
    }
}
