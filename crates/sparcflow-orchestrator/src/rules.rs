use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;

use sparcflow_state::{DecisionRecord, WorkflowState};
use sparcflow_utils::error::OrchestrationError;
use sparcflow_utils::types::PhaseId;

use crate::decision::{Decision, DecisionMetrics, Orchestrator};

/// Agent responsible for each phase, in `PhaseId` declaration order.
const AGENTS: [&str; 9] = [
    "requirements-analyst",
    "algorithm-designer",
    "system-architect",
    "design-reviewer",
    "integration-planner",
    "implementation-engineer",
    "test-engineer",
    "debug-analyst",
    "fix-engineer",
];

const BASE_CONFIDENCE: f64 = 0.9;
const NO_DESCRIPTION_CONFIDENCE: f64 = 0.6;
const RETRY_CONFIDENCE: f64 = 0.5;

/// Agent the rule table assigns to `phase`.
#[must_use]
pub fn agent_for(phase: PhaseId) -> &'static str {
    AGENTS[phase as usize]
}

/// Every agent name the rule table knows.
#[must_use]
pub fn known_agents() -> &'static [&'static str] {
    &AGENTS
}

/// Leaves the state untouched and records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughOrchestrator;

#[async_trait]
impl Orchestrator for PassthroughOrchestrator {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn decide(
        &self,
        state: WorkflowState,
        _description: &str,
    ) -> Result<Decision, OrchestrationError> {
        let metrics = DecisionMetrics::new(self.name(), state.current_phase);
        Ok(Decision {
            state,
            record: None,
            metrics,
        })
    }
}

/// Assigns the agent from a fixed per-phase table.
///
/// Confidence drops when the run has no description to work from and drops
/// further when the phase already failed in this record.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedOrchestrator;

impl RuleBasedOrchestrator {
    /// Agent, rationale and confidence for the state's current phase.
    #[must_use]
    pub fn assess(state: &WorkflowState, description: &str) -> (&'static str, String, f64) {
        let phase = state.current_phase;
        let agent = agent_for(phase);

        let failed_before = state.metadata.errors.iter().any(|e| e.phase == phase);
        if failed_before {
            return (
                agent,
                format!("retrying {phase} after an earlier failure; {agent} owns this phase"),
                RETRY_CONFIDENCE,
            );
        }

        if description.trim().is_empty() {
            return (
                agent,
                format!("{phase} has no issue description to work from; defaulting to {agent}"),
                NO_DESCRIPTION_CONFIDENCE,
            );
        }

        (
            agent,
            format!("{agent} owns {phase} in {} mode", state.current_mode),
            BASE_CONFIDENCE,
        )
    }
}

#[async_trait]
impl Orchestrator for RuleBasedOrchestrator {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn decide(
        &self,
        state: WorkflowState,
        description: &str,
    ) -> Result<Decision, OrchestrationError> {
        let started = Instant::now();
        let (agent, rationale, confidence) = Self::assess(&state, description);
        let mut decision = apply(state, self.name(), agent, rationale, confidence);
        decision.metrics.duration_ms = started.elapsed().as_millis() as u64;
        Ok(decision)
    }
}

/// Set the current agent and append the decision record.
pub(crate) fn apply(
    mut state: WorkflowState,
    orchestrator: &str,
    agent: &str,
    rationale: String,
    confidence: f64,
) -> Decision {
    let record = DecisionRecord {
        phase: state.current_phase,
        mode: state.current_mode,
        agent: agent.to_string(),
        rationale,
        confidence,
        timestamp: Utc::now(),
    };

    state.ai_context.current_agent = Some(agent.to_string());
    state.ai_context.decisions.push(record.clone());

    tracing::debug!(
        issue_id = %state.issue_id,
        phase = %record.phase,
        agent = %record.agent,
        confidence = record.confidence,
        "Agent selected"
    );

    let metrics = DecisionMetrics {
        agent: Some(record.agent.clone()),
        confidence: Some(confidence),
        ..DecisionMetrics::new(orchestrator, record.phase)
    };

    Decision {
        state,
        record: Some(record),
        metrics,
    }
}
