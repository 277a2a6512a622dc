//! Shared type definitions for Stepwise workflows: the authored schema, shape
//! validation, and the run records exchanged with hosts.

pub mod workflow;

pub use workflow::{
    StepKind, WorkflowArgDefinition, WorkflowDefinition, WorkflowStepDefinition,
    run::{
        HostRequestType, LlmRequest, OutputPolicy, RESUME_PROTOCOL_VERSION, ResumeKind, ResumePayload, RunOutcome, StepResult,
        WorkflowSource,
    },
    validation::{ValidationViolation, validate_workflow_definition},
};
