//! Contracts between the workflow driver and the units of work it runs.
//!
//! A [`PhaseNode`] consumes a [`WorkflowState`] and returns it with new
//! artifacts, agent-history entries and possibly higher progress. It never
//! changes `current_phase` or `current_mode`; advancing is the driver's job.
//!
//! Text generation inside a node goes through a [`PhaseCapability`], the seam
//! where a language model, a template engine or a test double plugs in.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use sparcflow_state::WorkflowState;
pub use sparcflow_utils::types::{Mode, PhaseId};

/// A unit of work for one phase.
#[async_trait]
pub trait PhaseNode: Send + Sync {
    /// The phase this node executes.
    fn id(&self) -> PhaseId;

    /// Phases whose artifacts this node reads when present.
    fn deps(&self) -> &'static [PhaseId];

    /// Run the phase.
    ///
    /// The returned state must keep `current_phase`, `current_mode` and every
    /// existing artifact key. Errors are recorded by the driver and end the run.
    async fn execute(&self, state: WorkflowState) -> anyhow::Result<WorkflowState>;
}

/// Request for free-text generation on behalf of a phase or orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub phase: PhaseId,
    pub prompt: String,
    /// Named inputs such as the issue title or earlier artifacts
    pub context: BTreeMap<String, String>,
}

impl CapabilityRequest {
    #[must_use]
    pub fn new(phase: PhaseId, prompt: impl Into<String>) -> Self {
        Self {
            phase,
            prompt: prompt.into(),
            context: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Generated text plus the name of the tool that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub text: String,
    pub tool: String,
    pub duration: Option<Duration>,
}

impl CapabilityResponse {
    #[must_use]
    pub fn new(text: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool: tool.into(),
            duration: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Opaque text generation backend.
#[async_trait]
pub trait PhaseCapability: Send + Sync {
    /// Short name recorded as the tool in `aiContext.toolCalls`.
    fn name(&self) -> &str;

    async fn generate(&self, request: CapabilityRequest) -> anyhow::Result<CapabilityResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparcflow_state::{WorkflowInput, create_initial_state};
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl PhaseCapability for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, request: CapabilityRequest) -> anyhow::Result<CapabilityResponse> {
            Ok(CapabilityResponse::new(request.prompt, self.name()))
        }
    }

    struct Writer {
        capability: Arc<dyn PhaseCapability>,
    }

    #[async_trait]
    impl PhaseNode for Writer {
        fn id(&self) -> PhaseId {
            PhaseId::Specification
        }

        fn deps(&self) -> &'static [PhaseId] {
            &[]
        }

        async fn execute(&self, mut state: WorkflowState) -> anyhow::Result<WorkflowState> {
            let response = self
                .capability
                .generate(CapabilityRequest::new(self.id(), "hello"))
                .await?;
            state.record_tool_call(&response.tool, true);
            state.set_artifact(self.id().artifact_key(), response.text);
            state.record_action("wrote", true);
            Ok(state)
        }
    }

    #[test]
    fn test_request_builder() {
        let req = CapabilityRequest::new(PhaseId::Testing, "p")
            .with_context("title", "X")
            .with_context("title", "Y");
        assert_eq!(req.context.len(), 1);
        assert_eq!(req.context["title"], "Y");
    }

    #[tokio::test]
    async fn test_node_through_trait_object() {
        let node: Box<dyn PhaseNode> = Box::new(Writer {
            capability: Arc::new(Echo),
        });
        let state = create_initial_state(&WorkflowInput::new("t", Mode::Design, "X", "d"));

        let out = node.execute(state).await.unwrap();
        assert_eq!(out.artifact("requirements"), Some("hello"));
        assert_eq!(out.ai_context.tool_calls[0].tool, "echo");
        assert_eq!(out.current_phase, PhaseId::Specification);
    }
}
