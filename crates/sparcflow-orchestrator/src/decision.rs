use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sparcflow_state::{DecisionRecord, WorkflowState};
use sparcflow_utils::error::OrchestrationError;
use sparcflow_utils::types::PhaseId;

/// Decision policy consulted once per driver iteration, before the node for
/// `state.current_phase` runs.
///
/// A policy may set `aiContext.currentAgent` and append to
/// `aiContext.decisions`. It must not change `current_phase` or
/// `current_mode`; the driver rejects a decision that does.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    fn name(&self) -> &str;

    /// Annotate `state` for the phase about to run.
    ///
    /// `description` is the issue description the run was started with.
    async fn decide(
        &self,
        state: WorkflowState,
        description: &str,
    ) -> Result<Decision, OrchestrationError>;
}

/// Outcome of one [`Orchestrator::decide`] call.
#[derive(Debug, Clone)]
pub struct Decision {
    pub state: WorkflowState,
    /// The record appended to `aiContext.decisions`, if any
    pub record: Option<DecisionRecord>,
    pub metrics: DecisionMetrics,
}

/// Per-call measurements, aggregated by the caller into
/// [`OrchestratorMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMetrics {
    pub orchestrator: String,
    pub phase: PhaseId,
    pub agent: Option<String>,
    pub confidence: Option<f64>,
    pub duration_ms: u64,
    /// A generation capability was consulted
    pub used_capability: bool,
    /// The capability answer was unusable and the rule table decided
    pub fallback: bool,
}

impl DecisionMetrics {
    #[must_use]
    pub fn new(orchestrator: &str, phase: PhaseId) -> Self {
        Self {
            orchestrator: orchestrator.to_string(),
            phase,
            agent: None,
            confidence: None,
            duration_ms: 0,
            used_capability: false,
            fallback: false,
        }
    }
}

/// Running totals over every decision a driver has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorMetrics {
    pub total_decisions: u64,
    /// Decisions that produced a record
    pub recorded_decisions: u64,
    pub decisions_by_agent: BTreeMap<String, u64>,
    pub decisions_by_phase: BTreeMap<String, u64>,
    pub capability_calls: u64,
    pub fallbacks: u64,
    pub total_decision_time_ms: u64,
    /// Mean confidence over decisions that reported one
    pub average_confidence: f64,
}

impl OrchestratorMetrics {
    pub fn record(&mut self, metrics: &DecisionMetrics) {
        self.total_decisions += 1;
        *self
            .decisions_by_phase
            .entry(metrics.phase.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(agent) = &metrics.agent {
            *self.decisions_by_agent.entry(agent.clone()).or_insert(0) += 1;
        }
        if metrics.used_capability {
            self.capability_calls += 1;
        }
        if metrics.fallback {
            self.fallbacks += 1;
        }
        self.total_decision_time_ms += metrics.duration_ms;

        if let Some(confidence) = metrics.confidence {
            self.recorded_decisions += 1;
            let n = self.recorded_decisions as f64;
            self.average_confidence += (confidence - self.average_confidence) / n;
        }
    }
}
