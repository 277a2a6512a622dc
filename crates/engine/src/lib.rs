//! # Stepwise Engine
//!
//! The Stepwise Engine loads, validates, and executes sequential workflows whose steps
//! either spawn a shell process or halt to ask the host for an LLM completion.
//!
//! ## Key Features
//!
//! - **Workflow Loading**: Parses YAML (or JSON) workflow files and validates them before any step runs
//! - **Template Interpolation**: `${name.path}` and bare `$step.path` substitution across layered scopes
//! - **Environment Composition**: Parent snapshot, workflow env, and step env layered per step
//! - **Suspend/Resume**: Prompt steps halt with a self-contained resume token
//!
//! ## Usage
//!
//! ```rust
//! use stepwise_engine::{RunOptions, ShellProcessRunner, load_workflow_file, run_workflow};
//! use stepwise_types::RunOutcome;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let workflow_path = temp_dir.path().join("workflow.yaml");
//! std::fs::write(&workflow_path, r#"
//! name: ask
//! steps:
//!   - id: question
//!     prompt: What is the capital of France?
//! "#)?;
//!
//! let definition = load_workflow_file(&workflow_path)?;
//! let outcome = run_workflow(&definition, &RunOptions::default(), &ShellProcessRunner)?;
//! assert!(matches!(outcome, RunOutcome::NeedsLlm { .. }));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`resolve`**: Template interpolation against a layered [`RunContext`]
//! - **`environment`**: Workflow and step env composition
//! - **`executor`**: Step preparation, execution, and the [`ProcessRunner`] seam
//! - **`resume`**: Resume token codec
//! - **`workflow`**: Validation gate, run state, and the sequential runner

use std::{fs, path::Path};

use stepwise_types::WorkflowDefinition;
use tracing::debug;

pub mod environment;
pub mod error;
pub mod executor;
pub mod resolve;
pub mod resume;
pub mod workflow;

pub use error::{DecodeError, WorkflowError};
pub use executor::{PreparedStep, ProcessInvocation, ProcessOutput, ProcessRunner, ShellProcessRunner, StepOutcome, StepStatus};
pub use resolve::RunContext;
pub use resume::{decode_resume_token, encode_resume_token};
pub use workflow::document::ensure_valid;
pub use workflow::runner::{RunOptions, resume_workflow, resume_workflow_with_definition, run_workflow};
pub use workflow::state::WorkflowRunState;

/// Loads and validates a workflow file.
///
/// The path is canonicalized and recorded on the definition so relative working
/// directories resolve against the file's directory and resume tokens can point back
/// at the file.
///
/// # Errors
///
/// - [`WorkflowError::Load`] when the file cannot be read
/// - [`WorkflowError::Parse`] when the content is not a workflow document
/// - [`WorkflowError::Validation`] when the definition violates a structural rule
///
/// # Examples
///
/// ```rust
/// use stepwise_engine::load_workflow_file;
///
/// let temp_dir = tempfile::tempdir()?;
/// let workflow_path = temp_dir.path().join("build.yaml");
/// std::fs::write(&workflow_path, "name: build\nsteps:\n  - id: compile\n    command: make\n")?;
///
/// let definition = load_workflow_file(&workflow_path)?;
/// assert_eq!(definition.steps[0].id, "compile");
/// assert!(definition.source_path.is_some());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn load_workflow_file(file_path: impl AsRef<Path>) -> Result<WorkflowDefinition, WorkflowError> {
    let file_path = file_path.as_ref();
    let load_error = |source| WorkflowError::Load {
        path: file_path.to_path_buf(),
        source,
    };

    let canonical_path = fs::canonicalize(file_path).map_err(load_error)?;
    let content = fs::read_to_string(&canonical_path).map_err(load_error)?;
    debug!(path = %canonical_path.display(), "loaded workflow file");

    let mut definition = parse_definition(&content, &canonical_path.display().to_string())?;
    definition.source_path = Some(canonical_path);
    ensure_valid(&definition)?;
    Ok(definition)
}

/// Parses and validates an in-memory workflow document.
///
/// The result has no source path: relative working directories are used as-is and
/// resume tokens must be continued with [`resume_workflow_with_definition`].
pub fn parse_workflow_str(content: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let definition = parse_definition(content, "<inline>")?;
    ensure_valid(&definition)?;
    Ok(definition)
}

fn parse_definition(content: &str, origin: &str) -> Result<WorkflowDefinition, WorkflowError> {
    serde_yaml::from_str(content).map_err(|source| WorkflowError::Parse {
        origin: origin.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_records_the_canonical_source_path() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let workflow_path = temp_dir.path().join("workflow.yaml");
        fs::write(
            &workflow_path,
            r#"
name: "test-workflow"
args:
  app_name:
    description: "Application name"
steps:
  - id: "deploy"
    command: "./deploy.sh ${app_name}"
"#,
        )
        .expect("write workflow");

        let definition = load_workflow_file(&workflow_path).expect("load");
        assert_eq!(definition.name, "test-workflow");
        assert_eq!(
            definition.source_path,
            Some(fs::canonicalize(&workflow_path).expect("canonical"))
        );
        assert_eq!(
            definition.base_dir(),
            Some(fs::canonicalize(temp_dir.path()).expect("canonical").as_path())
        );
    }

    #[test]
    fn json_documents_load_too() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let workflow_path = temp_dir.path().join("workflow.json");
        fs::write(
            &workflow_path,
            r#"{"name": "json", "steps": [{"id": "a", "prompt": "hi"}]}"#,
        )
        .expect("write workflow");

        let definition = load_workflow_file(&workflow_path).expect("load");
        assert_eq!(definition.steps.len(), 1);
    }

    #[test]
    fn missing_files_are_load_errors() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let error = load_workflow_file(temp_dir.path().join("absent.yaml")).expect_err("missing");
        assert!(matches!(error, WorkflowError::Load { .. }));
        assert_eq!(error.kind(), "load");
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        let error = parse_workflow_str("name: [unclosed").expect_err("malformed");
        assert!(matches!(error, WorkflowError::Parse { ref origin, .. } if origin == "<inline>"));
        assert_eq!(error.kind(), "load");
    }

    #[test]
    fn invalid_documents_fail_validation() {
        let error = parse_workflow_str(
            r#"
name: shapes
steps:
  - id: nothing
"#,
        )
        .expect_err("invalid");
        assert_eq!(error.kind(), "validation");
        assert!(error.to_string().contains("declares neither 'command' nor 'prompt'"));
    }
}
