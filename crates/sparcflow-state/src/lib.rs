//! The workflow record threaded through every engine operation.
//!
//! [`WorkflowState`] is created once per issue by [`create_initial_state`],
//! mutated by the orchestrator and by phase nodes, and persisted after every
//! mutation through the [`document`] contract.

pub mod document;
mod input;
mod state;

pub use input::{WorkflowInput, create_initial_state};
pub use state::{
    AgentAction, AiContext, ChatMessage, DecisionRecord, ErrorRecord, Memory, Metadata,
    PerformanceMetrics, ToolCall, TransitionRecord, WorkflowState,
};
