use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Instant;

use sparcflow_phase_api::{CapabilityRequest, PhaseCapability};
use sparcflow_state::WorkflowState;
use sparcflow_utils::error::OrchestrationError;

use crate::decision::{Decision, Orchestrator};
use crate::rules::{RuleBasedOrchestrator, apply, known_agents};

/// First `agent: <name>` line of a capability answer.
static AGENT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*agent\s*:\s*([A-Za-z0-9][A-Za-z0-9_.-]*)").expect("valid agent pattern")
});

/// Confidence assigned to an agent named by the capability.
const CAPABILITY_CONFIDENCE: f64 = 0.8;

/// Asks a [`PhaseCapability`] which agent should handle the phase.
///
/// Answers without an `agent:` line fall back to the rule table. A capability
/// error fails the decision and therefore the run.
pub struct CapabilityOrchestrator {
    capability: Arc<dyn PhaseCapability>,
}

impl CapabilityOrchestrator {
    #[must_use]
    pub fn new(capability: Arc<dyn PhaseCapability>) -> Self {
        Self { capability }
    }

    fn request_for(state: &WorkflowState, description: &str) -> CapabilityRequest {
        let prompt = format!(
            "Choose the agent for the {} phase of issue {} ({} mode). \
             Known agents: {}. Answer with a single line `agent: <name>`.",
            state.current_phase,
            state.issue_id,
            state.current_mode,
            known_agents().join(", ")
        );
        CapabilityRequest::new(state.current_phase, prompt)
            .with_context("purpose", "agent_selection")
            .with_context("issue_title", state.issue_title.as_str())
            .with_context("issue_description", description)
    }
}

/// Extract the agent name from a capability answer.
#[must_use]
pub fn parse_agent(text: &str) -> Option<&str> {
    AGENT_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[async_trait]
impl Orchestrator for CapabilityOrchestrator {
    fn name(&self) -> &str {
        "capability"
    }

    async fn decide(
        &self,
        mut state: WorkflowState,
        description: &str,
    ) -> Result<Decision, OrchestrationError> {
        let started = Instant::now();
        let phase = state.current_phase;

        let response = self
            .capability
            .generate(Self::request_for(&state, description))
            .await
            .map_err(|e| OrchestrationError::DecisionFailed {
                phase,
                reason: format!("{e:#}"),
            })?;
        state.record_tool_call(&response.tool, true);

        let mut decision = match parse_agent(&response.text) {
            Some(agent) => {
                let rationale = format!("{} selected {agent} for {phase}", response.tool);
                apply(
                    state,
                    self.name(),
                    agent,
                    rationale,
                    CAPABILITY_CONFIDENCE,
                )
            }
            None => {
                tracing::debug!(
                    phase = %phase,
                    tool = %response.tool,
                    "Capability answer named no agent, using rule table"
                );
                let (agent, rationale, confidence) =
                    RuleBasedOrchestrator::assess(&state, description);
                let mut decision = apply(state, self.name(), agent, rationale, confidence);
                decision.metrics.fallback = true;
                decision
            }
        };

        decision.metrics.used_capability = true;
        decision.metrics.duration_ms = started.elapsed().as_millis() as u64;
        Ok(decision)
    }
}
