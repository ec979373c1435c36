//! disp-sas library - displacement workflow preparation
//!
//! Builds the epoch stack from a run configuration, resolves parameters and
//! the phase reference, and combines amplitude statistics across ministacks.

pub mod logging;
pub mod workflow;

pub use workflow::{prepare_workflow, ResolvedWorkflow, RESOLVED_WORKFLOW_NAME};
