//! Views handed back to callers: run output, status and driver metrics.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use sparcflow_orchestrator::OrchestratorMetrics;
use sparcflow_state::{DecisionRecord, ErrorRecord, PerformanceMetrics, WorkflowState};
use sparcflow_utils::canonicalization::short_hash;
use sparcflow_utils::error::NodeExecutionError;
use sparcflow_utils::types::{Mode, PhaseId};

use crate::transition::is_complete;

/// Why the driver loop stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The completion predicate held after a phase ran
    Completed,
    /// The iteration bound was reached first; the record can be resumed
    IterationBound { iterations: u32 },
    /// A node failed; the error is recorded in `metadata.errors`
    NodeFailed {
        #[serde(serialize_with = "display")]
        error: NodeExecutionError,
    },
    /// The transition table has no edge out of `phase`
    NoTransition { phase: PhaseId },
    /// No node is registered for `phase`
    MissingNode { phase: PhaseId },
}

impl RunOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    #[must_use]
    pub const fn node_error(&self) -> Option<&NodeExecutionError> {
        match self {
            Self::NodeFailed { error } => Some(error),
            _ => None,
        }
    }
}

fn display<S: Serializer>(error: &NodeExecutionError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// Summary numbers for one `execute_workflow` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPerformance {
    /// Wall-clock time of the call, in milliseconds
    pub execution_time_ms: u64,
    pub progress: u8,
    /// Node executions performed by this call, failed ones included
    pub node_count: u32,
    pub success_rate: f64,
}

/// Result of [`WorkflowDriver::execute_workflow`](crate::WorkflowDriver::execute_workflow).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowOutput {
    pub state: WorkflowState,
    pub artifacts: BTreeMap<String, Option<String>>,
    pub performance: RunPerformance,
    pub decisions: Vec<DecisionRecord>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Completed,
    Failed,
    InProgress,
}

impl StatusKind {
    /// Classify a stored record.
    ///
    /// `failed` requires the newest error to concern the current phase and to
    /// be no older than the record's last update, so a later successful run
    /// of that phase clears it.
    #[must_use]
    pub fn of(state: &WorkflowState) -> Self {
        if is_complete(state) {
            return Self::Completed;
        }
        match state.latest_error() {
            Some(err) if err.phase == state.current_phase && err.timestamp >= state.updated_at => {
                Self::Failed
            }
            _ => Self::InProgress,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One artifact as listed by status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    pub key: String,
    pub bytes: usize,
    /// BLAKE3 of the content, first 16 hex characters
    pub hash: String,
}

/// Snapshot of a stored record for `sparcflow status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub issue_id: String,
    pub mode: Mode,
    pub phase: PhaseId,
    pub progress: u8,
    pub status: StatusKind,
    pub artifacts: Vec<ArtifactSummary>,
    pub last_updated: DateTime<Utc>,
    pub performance: PerformanceMetrics,
    pub latest_error: Option<ErrorRecord>,
}

impl WorkflowStatus {
    #[must_use]
    pub fn from_state(state: &WorkflowState) -> Self {
        let artifacts = state
            .non_empty_artifacts()
            .map(|(key, text)| ArtifactSummary {
                key: key.to_string(),
                bytes: text.len(),
                hash: short_hash(text),
            })
            .collect();

        Self {
            issue_id: state.issue_id.clone(),
            mode: state.current_mode,
            phase: state.current_phase,
            progress: state.progress,
            status: StatusKind::of(state),
            artifacts,
            last_updated: state.updated_at,
            performance: state.metadata.performance.clone(),
            latest_error: state.latest_error().cloned(),
        }
    }
}

/// Driver-level view for `getWorkflowMetrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetrics {
    /// Number of phases in the workflow
    pub total_nodes: usize,
    /// Phases with a registered node
    pub available_nodes: Vec<PhaseId>,
    pub orchestrator: String,
    pub orchestrator_metrics: OrchestratorMetrics,
    /// Most recent decisions across every run of this driver, oldest first
    pub decision_history: Vec<DecisionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sparcflow_state::{WorkflowInput, create_initial_state};

    fn state() -> WorkflowState {
        create_initial_state(&WorkflowInput::new("t1", Mode::Debug, "X", "crash"))
    }

    fn error_at(phase: PhaseId, timestamp: DateTime<Utc>) -> ErrorRecord {
        ErrorRecord {
            phase,
            kind: "node_failed".to_string(),
            message: "boom".to_string(),
            timestamp,
        }
    }

    #[test]
    fn test_status_derivation() {
        let mut s = state();
        assert_eq!(StatusKind::of(&s), StatusKind::InProgress);

        s.metadata.errors.push(error_at(PhaseId::Analysis, s.updated_at));
        assert_eq!(StatusKind::of(&s), StatusKind::Failed);

        // A later update of the record clears the failure.
        s.updated_at += Duration::seconds(1);
        assert_eq!(StatusKind::of(&s), StatusKind::InProgress);

        s.current_phase = PhaseId::FixGeneration;
        assert_eq!(StatusKind::of(&s), StatusKind::Completed);
    }

    #[test]
    fn test_error_on_other_phase_is_not_failure() {
        let mut s = state();
        s.metadata
            .errors
            .push(error_at(PhaseId::Implementation, s.updated_at));
        assert_eq!(StatusKind::of(&s), StatusKind::InProgress);
    }

    #[test]
    fn test_status_lists_artifacts_with_hashes() {
        let mut s = state();
        s.set_artifact("analysis", "root cause");
        s.set_artifact("fixes", "");
        let status = WorkflowStatus::from_state(&s);

        assert_eq!(status.artifacts.len(), 1);
        assert_eq!(status.artifacts[0].key, "analysis");
        assert_eq!(status.artifacts[0].bytes, 10);
        assert_eq!(status.artifacts[0].hash.len(), 16);
        assert_eq!(status.artifacts[0].hash, short_hash("root cause"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = RunOutcome::NodeFailed {
            error: NodeExecutionError::Timeout {
                phase: PhaseId::Testing,
                timeout_seconds: 5,
            },
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["kind"], "node_failed");
        assert_eq!(value["error"], "Phase testing timed out after 5 seconds");

        let value = serde_json::to_value(RunOutcome::IterationBound { iterations: 10 }).unwrap();
        assert_eq!(value["kind"], "iteration_bound");
        assert_eq!(value["iterations"], 10);
        assert_eq!(serde_json::to_value(StatusKind::InProgress).unwrap(), "in_progress");
    }
}
