//! State module for tracking run progress
//!
//! # Components
//!
//! - `Phase`: one sequential stage of the pipeline
//! - `RunMode`: the subsequence of phases a run executes
//! - `RunState`: the orchestrator's lifecycle state machine
//! - `OperationStatus`: status of an operation log row

mod phase;
mod run_state;

// Re-export main types
pub use phase::{Phase, RunMode};
pub use run_state::{OperationStatus, RunState};
