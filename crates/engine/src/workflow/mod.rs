//! Workflow-level orchestration on top of the step executor.
//!
//! - `document` gates definitions before anything runs
//! - `state` carries position and accumulated results across a halt
//! - `runner` drives steps in order and turns halts into resume tokens

pub mod document;
pub mod runner;
pub mod state;
