//! Query workflow: state, trace and the engine that drives them

pub mod engine;
pub mod state;
pub mod trace;

pub use engine::WorkflowEngine;
pub use state::{ExecutionSummary, WorkflowState};
pub use trace::{Step, StepStatus, TraceEntry};
