//! Error taxonomy surfaced by the engine.
//!
//! Hosts distinguish a bad continuation ([`WorkflowError::Decode`],
//! [`WorkflowError::InvalidResume`]) from a failed workflow
//! ([`WorkflowError::Validation`], [`WorkflowError::Execution`]) through
//! [`WorkflowError::kind`]. Nothing in the engine retries.

use std::path::PathBuf;

use stepwise_types::ValidationViolation;
use thiserror::Error;

/// Fatal failure of a workflow invocation. No partial output accompanies it.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("failed to read workflow file {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid workflow: {}", format_violations(.violations))]
    Validation { violations: Vec<ValidationViolation> },

    #[error("step '{step_id}' failed: {message}")]
    Execution { step_id: String, message: String },

    #[error("invalid resume token: {0}")]
    Decode(#[from] DecodeError),

    #[error("resume token does not match the workflow: {0}")]
    InvalidResume(String),

    #[error("failed to encode resume token: {0}")]
    Encode(#[from] serde_json::Error),
}

impl WorkflowError {
    /// Stable category label used in host-facing error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Load { .. } | WorkflowError::Parse { .. } => "load",
            WorkflowError::Validation { .. } => "validation",
            WorkflowError::Execution { .. } => "execution",
            WorkflowError::Decode(_) => "decode",
            WorkflowError::InvalidResume(_) => "resume",
            WorkflowError::Encode(_) => "encode",
        }
    }

    /// Step the failure is attributed to, when there is one.
    pub fn step_id(&self) -> Option<&str> {
        match self {
            WorkflowError::Execution { step_id, .. } => Some(step_id),
            WorkflowError::Validation { violations } => violations.iter().find_map(|violation| violation.step_id.as_deref()),
            _ => None,
        }
    }
}

/// Malformed or tampered resume token.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,

    #[error("token is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is malformed: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("unsupported resume protocol version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

fn format_violations(violations: &[ValidationViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}
