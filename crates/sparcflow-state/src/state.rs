use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sparcflow_utils::types::{Mode, PhaseId};

/// One issue's workflow record.
///
/// Field names serialize in camelCase. Counter maps are `BTreeMap`s so they
/// serialize as plain JSON objects with a stable key order, and timestamps
/// serialize as RFC 3339 strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub issue_id: String,
    pub current_mode: Mode,
    /// Always a phase of `current_mode` at checkpoints.
    pub current_phase: PhaseId,
    /// 0..=100, non-decreasing within one run.
    pub progress: u8,
    pub issue_title: String,
    pub issue_description: String,
    pub user_input: String,
    /// Append-only: keys are never removed once written.
    #[serde(default)]
    pub artifacts: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub ai_context: AiContext,
    #[serde(default)]
    pub memory: Memory,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiContext {
    pub current_agent: Option<String>,
    #[serde(default)]
    pub agent_history: Vec<AgentAction>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
}

/// One entry of the agent history; `success` feeds the run's success rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub phase: PhaseId,
    pub agent: Option<String>,
    pub action: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool: String,
    pub phase: PhaseId,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// An orchestrator decision, appended before the phase it concerns runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub phase: PhaseId,
    pub mode: Mode,
    pub agent: String,
    pub rationale: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Free-form scratch space owned by orchestrators and nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub retrieved_context: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub performance: PerformanceMetrics,
}

/// A phase change. `to` is `None` for the terminal record written when the
/// completion predicate stops the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: PhaseId,
    pub to: Option<PhaseId>,
    pub condition: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub phase: PhaseId,
    /// Machine-readable tag, e.g. `node_timeout`
    pub kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Performance counters. Maps are keyed by phase name or tool name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Total node execution time across all runs, in milliseconds
    pub execution_time_ms: u64,
    /// Cumulative milliseconds per phase
    #[serde(default)]
    pub node_execution_times: BTreeMap<String, u64>,
    #[serde(default)]
    pub tool_usage_counts: BTreeMap<String, u64>,
    /// Failed executions / executions, per phase
    #[serde(default)]
    pub error_rates: BTreeMap<String, f64>,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub node_executions: BTreeMap<String, u32>,
}

impl WorkflowState {
    #[must_use]
    pub fn artifact(&self, key: &str) -> Option<&str> {
        self.artifacts.get(key).and_then(|v| v.as_deref())
    }

    /// Insert or replace an artifact. Keys are never removed.
    pub fn set_artifact(&mut self, key: impl Into<String>, content: impl Into<String>) {
        self.artifacts.insert(key.into(), Some(content.into()));
    }

    /// Append an agent history entry for the current phase.
    pub fn record_action(&mut self, action: impl Into<String>, success: bool) {
        self.ai_context.agent_history.push(AgentAction {
            phase: self.current_phase,
            agent: self.ai_context.current_agent.clone(),
            action: action.into(),
            success,
            timestamp: Utc::now(),
        });
    }

    /// Record a tool invocation made while running the current phase.
    pub fn record_tool_call(&mut self, tool: impl Into<String>, success: bool) {
        self.ai_context.tool_calls.push(ToolCall {
            tool: tool.into(),
            phase: self.current_phase,
            success,
            timestamp: Utc::now(),
        });
    }

    /// Successful agent-history entries over all entries; 0 when empty.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let history = &self.ai_context.agent_history;
        if history.is_empty() {
            return 0.0;
        }
        let ok = history.iter().filter(|a| a.success).count();
        ok as f64 / history.len() as f64
    }

    /// Rebuild `toolUsageCounts` from the tool-call log.
    pub fn refresh_tool_usage_counts(&mut self) {
        let mut counts = BTreeMap::new();
        for call in &self.ai_context.tool_calls {
            *counts.entry(call.tool.clone()).or_insert(0u64) += 1;
        }
        self.metadata.performance.tool_usage_counts = counts;
    }

    #[must_use]
    pub fn latest_error(&self) -> Option<&ErrorRecord> {
        self.metadata.errors.last()
    }

    /// Keys of artifacts that currently hold non-empty text.
    pub fn non_empty_artifacts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.artifacts.iter().filter_map(|(k, v)| match v.as_deref() {
            Some(text) if !text.is_empty() => Some((k.as_str(), text)),
            _ => None,
        })
    }
}
