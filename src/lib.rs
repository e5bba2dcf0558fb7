//! sparcflow - resumable multi-phase workflows for tracked issues
//!
//! An issue moves through nine named phases grouped into three modes:
//!
//! ```text
//! design: specification → pseudocode → architecture → refinement → completion
//! build:  implementation → testing
//! debug:  analysis → fix_generation
//! ```
//!
//! Each step asks an [`Orchestrator`] to pick an agent, runs the phase's
//! [`PhaseNode`], checkpoints the [`WorkflowState`] through a
//! [`PersistenceGateway`] and follows the [`TransitionTable`]. A run stops when
//! the mode's terminal phase is reached (or progress hits 100), when a node
//! fails, or at the iteration bound; the stored record can be resumed later.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! sparcflow run PROJ-142 --mode design --title "Rate limiter" \
//!     --description "Token bucket per API key"
//! sparcflow status PROJ-142 --json
//! sparcflow reset PROJ-142
//! ```
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use sparcflow::{Mode, WorkflowDriver, WorkflowInput};
//!
//! # async fn demo(config: sparcflow::Config) -> Result<(), sparcflow::SparcflowError> {
//! let driver = WorkflowDriver::from_config(&config);
//! let input = WorkflowInput::new("PROJ-142", Mode::Design, "Rate limiter", "Token bucket");
//! let output = driver.execute_workflow(input).await?;
//! println!("{} at {}%", output.state.current_phase, output.performance.progress);
//! # Ok(())
//! # }
//! ```
//!
//! # JSON Contracts
//!
//! `status --json` and `run --json` print JCS (RFC 8785) canonical JSON; use
//! [`emit_jcs`] for the same encoding in your own integrations.

pub mod cli;

pub use sparcflow_config::{
    CliArgs, Config, ConfigBuilder, OnPersistenceError, OrchestratorStrategy,
};
pub use sparcflow_engine::{
    DECISION_HISTORY_LIMIT, DriverSettings, FileStateStore, MemoryStateStore, NodeTimeout,
    PersistenceGateway, RunOutcome, RunPerformance, StatusKind, TransitionTable, WorkflowDriver,
    WorkflowMetrics, WorkflowOutput, WorkflowStatus, is_complete,
};
pub use sparcflow_orchestrator::{
    CapabilityOrchestrator, Decision, DecisionMetrics, Orchestrator, OrchestratorMetrics,
    PassthroughOrchestrator, RuleBasedOrchestrator,
};
pub use sparcflow_phase_api::{CapabilityRequest, CapabilityResponse, PhaseCapability, PhaseNode};
pub use sparcflow_phases::{ArtifactNode, NodeRegistry, TemplateCapability};
pub use sparcflow_state::{WorkflowInput, WorkflowState, create_initial_state};
pub use sparcflow_utils::canonicalization::emit_jcs;
pub use sparcflow_utils::{
    ExitCode, Mode, NodeExecutionError, OrchestrationError, PersistenceError, PhaseId,
    SparcflowError, UserFriendlyError,
};
