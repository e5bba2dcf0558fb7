//! Workflow engine for sparcflow
//!
//! [`WorkflowDriver`] threads one [`WorkflowState`](sparcflow_state::WorkflowState)
//! through a bounded loop:
//!
//! ```text
//! load or create -> save -> loop {
//!     orchestrator.decide -> node.execute (with timeout) -> save
//!     is_complete ? stop : transition table -> next phase
//! }
//! ```
//!
//! The loop ends when the completion predicate holds, a node fails, the
//! table has no edge, no node is registered, or the iteration bound is hit.
//! Every outcome leaves a checkpoint on disk that a later call can resume.

mod driver;
mod persistence;
mod report;
mod timeout;
mod transition;


pub use driver::{DECISION_HISTORY_LIMIT, DriverSettings, WorkflowDriver, orchestrator_for};
pub use persistence::{FileStateStore, MemoryStateStore, PersistenceGateway};
pub use report::{
    ArtifactSummary, RunOutcome, RunPerformance, StatusKind, WorkflowMetrics, WorkflowOutput,
    WorkflowStatus,
};
pub use timeout::NodeTimeout;
pub use transition::{
    CONDITION_COMPLETE, CONDITION_NEXT, Edge, TransitionError, TransitionTable, is_complete,
};
