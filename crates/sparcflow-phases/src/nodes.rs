use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use sparcflow_phase_api::{CapabilityRequest, PhaseCapability, PhaseNode, WorkflowState};
use sparcflow_utils::types::PhaseId;

/// Static description of one phase node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    pub phase: PhaseId,
    /// Phases whose artifacts are passed to the capability when present
    pub deps: &'static [PhaseId],
    /// Progress reported once the phase has produced its artifact
    pub progress: u8,
    pub title: &'static str,
    pub instructions: &'static str,
}

pub const NODE_SPECS: [NodeSpec; 9] = [
    NodeSpec {
        phase: PhaseId::Specification,
        deps: &[],
        progress: 20,
        title: "Requirements",
        instructions: "State the problem, the users affected and testable acceptance criteria. \
                       Use WHEN/THEN phrasing for each criterion.",
    },
    NodeSpec {
        phase: PhaseId::Pseudocode,
        deps: &[PhaseId::Specification],
        progress: 40,
        title: "Pseudocode",
        instructions: "Outline the main control flow and data structures that satisfy the \
                       requirements. Keep it language-neutral.",
    },
    NodeSpec {
        phase: PhaseId::Architecture,
        deps: &[PhaseId::Specification, PhaseId::Pseudocode],
        progress: 60,
        title: "Architecture",
        instructions: "Name the components, their interfaces and how data moves between them.",
    },
    NodeSpec {
        phase: PhaseId::Refinement,
        deps: &[PhaseId::Pseudocode, PhaseId::Architecture],
        progress: 80,
        title: "Refinement",
        instructions: "Identify edge cases, failure modes and simplifications in the design.",
    },
    NodeSpec {
        phase: PhaseId::Completion,
        deps: &[
            PhaseId::Specification,
            PhaseId::Architecture,
            PhaseId::Refinement,
        ],
        progress: 100,
        title: "Completion",
        instructions: "Summarize the final design and list the implementation tasks in order.",
    },
    NodeSpec {
        phase: PhaseId::Implementation,
        deps: &[PhaseId::Architecture, PhaseId::Completion],
        progress: 50,
        title: "Implementation",
        instructions: "Describe the code changes per component, file by file.",
    },
    NodeSpec {
        phase: PhaseId::Testing,
        deps: &[PhaseId::Specification, PhaseId::Implementation],
        progress: 100,
        title: "Test Plan",
        instructions: "Map every acceptance criterion to at least one test case.",
    },
    NodeSpec {
        phase: PhaseId::Analysis,
        deps: &[PhaseId::Implementation, PhaseId::Testing],
        progress: 50,
        title: "Analysis",
        instructions: "Reproduce the defect, isolate the failing component and state the root cause.",
    },
    NodeSpec {
        phase: PhaseId::FixGeneration,
        deps: &[PhaseId::Analysis],
        progress: 100,
        title: "Fixes",
        instructions: "Propose the minimal change that removes the root cause and a regression test.",
    },
];

/// Look up the static description of `phase`.
#[must_use]
pub fn spec_for(phase: PhaseId) -> &'static NodeSpec {
    // NODE_SPECS follows the declaration order of PhaseId.
    &NODE_SPECS[phase as usize]
}

/// A phase node that asks a capability for its artifact text.
///
/// All nine phases share this implementation and differ only in their
/// [`NodeSpec`].
pub struct ArtifactNode {
    spec: &'static NodeSpec,
    capability: Arc<dyn PhaseCapability>,
}

impl ArtifactNode {
    #[must_use]
    pub fn new(phase: PhaseId, capability: Arc<dyn PhaseCapability>) -> Self {
        Self {
            spec: spec_for(phase),
            capability,
        }
    }

    #[must_use]
    pub fn spec(&self) -> &'static NodeSpec {
        self.spec
    }

    /// Build the generation request from the state's provenance and the
    /// artifacts of this phase's dependencies.
    #[must_use]
    pub fn request_for(&self, state: &WorkflowState) -> CapabilityRequest {
        let prompt = format!(
            "Produce the {} document for issue {}.\n\n{}",
            self.spec.title, state.issue_id, self.spec.instructions
        );

        let mut request = CapabilityRequest::new(self.spec.phase, prompt)
            .with_context("issue_title", state.issue_title.as_str())
            .with_context("issue_description", state.issue_description.as_str())
            .with_context("user_input", state.user_input.as_str());

        for dep in self.spec.deps {
            let key = dep.artifact_key();
            if let Some(text) = state.artifact(key)
                && !text.is_empty()
            {
                request = request.with_context(key, text);
            }
        }
        request
    }
}

#[async_trait]
impl PhaseNode for ArtifactNode {
    fn id(&self) -> PhaseId {
        self.spec.phase
    }

    fn deps(&self) -> &'static [PhaseId] {
        self.spec.deps
    }

    async fn execute(&self, mut state: WorkflowState) -> Result<WorkflowState> {
        let phase = self.spec.phase;
        let started = Instant::now();

        let response = self
            .capability
            .generate(self.request_for(&state))
            .await
            .with_context(|| {
                format!(
                    "{} failed to generate the {} artifact",
                    self.capability.name(),
                    phase
                )
            })?;

        if response.text.trim().is_empty() {
            bail!("{} returned an empty {} artifact", response.tool, phase);
        }

        tracing::debug!(
            phase = %phase,
            tool = %response.tool,
            bytes = response.text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Artifact generated"
        );

        state.record_tool_call(&response.tool, true);
        state.set_artifact(phase.artifact_key(), response.text);
        state.progress = state.progress.max(self.spec.progress);
        state.record_action(format!("generated {}", phase.artifact_key()), true);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparcflow_phase_api::CapabilityResponse;
    use sparcflow_state::{WorkflowInput, create_initial_state};
    use sparcflow_utils::types::Mode;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed text.
    struct Recording {
        reply: String,
        seen: Mutex<Vec<CapabilityRequest>>,
    }

    impl Recording {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PhaseCapability for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, request: CapabilityRequest) -> Result<CapabilityResponse> {
            self.seen.lock().unwrap().push(request);
            Ok(CapabilityResponse::new(self.reply.clone(), self.name()))
        }
    }

    struct Failing;

    #[async_trait]
    impl PhaseCapability for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _request: CapabilityRequest) -> Result<CapabilityResponse> {
            bail!("backend unavailable")
        }
    }

    fn design_state() -> WorkflowState {
        create_initial_state(&WorkflowInput::new("t1", Mode::Design, "X", "build X"))
    }

    #[test]
    fn test_specs_follow_phase_order() {
        for (spec, phase) in NODE_SPECS.iter().zip(PhaseId::ALL) {
            assert_eq!(spec.phase, phase);
            assert!(spec.progress <= 100);
            assert_eq!(spec_for(phase).phase, phase);
        }
    }

    #[test]
    fn test_terminal_phases_report_full_progress() {
        for mode in Mode::ALL {
            assert_eq!(spec_for(mode.terminal_phase()).progress, 100);
            assert!(spec_for(mode.initial_phase()).progress < 100);
        }
    }

    #[tokio::test]
    async fn test_execute_writes_artifact_and_history() {
        let capability = Recording::new("# Requirements\n- it works");
        let node = ArtifactNode::new(PhaseId::Specification, capability.clone());

        let out = node.execute(design_state()).await.unwrap();

        assert_eq!(out.artifact("requirements"), Some("# Requirements\n- it works"));
        assert_eq!(out.progress, 20);
        assert_eq!(out.current_phase, PhaseId::Specification);
        assert_eq!(out.ai_context.tool_calls.len(), 1);
        assert_eq!(out.ai_context.tool_calls[0].tool, "recording");
        assert!(out.ai_context.agent_history[0].success);

        let seen = capability.seen.lock().unwrap();
        assert_eq!(seen[0].context["issue_title"], "X");
        assert_eq!(seen[0].context["user_input"], "build X");
    }

    #[tokio::test]
    async fn test_dependency_artifacts_reach_the_capability() {
        let capability = Recording::new("pseudo");
        let node = ArtifactNode::new(PhaseId::Pseudocode, capability.clone());
        let mut state = design_state();
        state.current_phase = PhaseId::Pseudocode;
        state.set_artifact("requirements", "R1");
        state.set_artifact("architecture", "not a dep");

        node.execute(state).await.unwrap();

        let seen = capability.seen.lock().unwrap();
        assert_eq!(seen[0].context.get("requirements").map(String::as_str), Some("R1"));
        assert!(!seen[0].context.contains_key("architecture"));
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let node = ArtifactNode::new(PhaseId::Specification, Recording::new("text"));
        let mut state = design_state();
        state.progress = 70;

        let out = node.execute(state).await.unwrap();
        assert_eq!(out.progress, 70);
    }

    #[tokio::test]
    async fn test_capability_errors_propagate() {
        let node = ArtifactNode::new(PhaseId::Specification, Arc::new(Failing));
        let err = node.execute(design_state()).await.unwrap_err();
        assert!(format!("{err:#}").contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_empty_artifact_is_an_error() {
        let node = ArtifactNode::new(PhaseId::Specification, Recording::new("  \n"));
        assert!(node.execute(design_state()).await.is_err());
    }
}
