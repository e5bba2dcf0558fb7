use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sparcflow_utils::types::Mode;

use crate::state::{AiContext, Memory, Metadata, WorkflowState};

/// Everything needed to start (or resume) a workflow for one issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    pub issue_id: String,
    pub mode: Mode,
    pub user_input: String,
    pub issue_title: String,
    pub issue_description: String,
}

impl WorkflowInput {
    /// Input whose `user_input` defaults to the description.
    #[must_use]
    pub fn new(
        issue_id: impl Into<String>,
        mode: Mode,
        issue_title: impl Into<String>,
        issue_description: impl Into<String>,
    ) -> Self {
        let issue_description = issue_description.into();
        Self {
            issue_id: issue_id.into(),
            mode,
            user_input: issue_description.clone(),
            issue_title: issue_title.into(),
            issue_description,
        }
    }

    #[must_use]
    pub fn with_user_input(mut self, user_input: impl Into<String>) -> Self {
        self.user_input = user_input.into();
        self
    }
}

/// Fresh record at the initial phase of `input.mode` with zero progress.
#[must_use]
pub fn create_initial_state(input: &WorkflowInput) -> WorkflowState {
    let now = Utc::now();
    WorkflowState {
        issue_id: input.issue_id.clone(),
        current_mode: input.mode,
        current_phase: input.mode.initial_phase(),
        progress: 0,
        issue_title: input.issue_title.clone(),
        issue_description: input.issue_description.clone(),
        user_input: input.user_input.clone(),
        artifacts: BTreeMap::new(),
        ai_context: AiContext::default(),
        memory: Memory::default(),
        metadata: Metadata::default(),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparcflow_utils::types::PhaseId;

    #[test]
    fn test_initial_phase_for_every_mode() {
        let expected = [
            (Mode::Design, PhaseId::Specification),
            (Mode::Build, PhaseId::Implementation),
            (Mode::Debug, PhaseId::Analysis),
        ];
        for (mode, phase) in expected {
            let state = create_initial_state(&WorkflowInput::new("i", mode, "t", "d"));
            assert_eq!(state.current_phase, phase);
            assert_eq!(state.current_mode, mode);
            assert_eq!(state.progress, 0);
            assert!(state.artifacts.is_empty());
            assert!(state.metadata.transitions.is_empty());
            assert_eq!(state.created_at, state.updated_at);
        }
    }

    #[test]
    fn test_provenance_is_copied() {
        let input = WorkflowInput::new("t1", Mode::Design, "X", "build X").with_user_input("do it");
        let state = create_initial_state(&input);
        assert_eq!(state.issue_id, "t1");
        assert_eq!(state.issue_title, "X");
        assert_eq!(state.issue_description, "build X");
        assert_eq!(state.user_input, "do it");
    }

    #[test]
    fn test_user_input_defaults_to_description() {
        let input = WorkflowInput::new("t1", Mode::Build, "X", "build X");
        assert_eq!(input.user_input, "build X");
    }
}
