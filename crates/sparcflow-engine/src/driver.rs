use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::Instrument;

use sparcflow_config::{
    Config, DEFAULT_LOCK_TTL_SECS, DEFAULT_MAX_ITERATIONS, OnPersistenceError,
    OrchestratorStrategy,
};
use sparcflow_lock::{FileLock, utils as lock_utils};
use sparcflow_orchestrator::{
    CapabilityOrchestrator, Orchestrator, OrchestratorMetrics, PassthroughOrchestrator,
    RuleBasedOrchestrator,
};
use sparcflow_phase_api::{PhaseCapability, PhaseNode};
use sparcflow_phases::{NodeRegistry, TemplateCapability};
use sparcflow_state::{
    DecisionRecord, ErrorRecord, TransitionRecord, WorkflowInput, WorkflowState,
    create_initial_state,
};
use sparcflow_utils::error::{
    NodeExecutionError, OrchestrationError, PersistenceError, SparcflowError,
};
use sparcflow_utils::issue_id::sanitize_issue_id;
use sparcflow_utils::logging;
use sparcflow_utils::types::PhaseId;

use crate::persistence::{FileStateStore, PersistenceGateway};
use crate::report::{RunOutcome, RunPerformance, WorkflowMetrics, WorkflowOutput, WorkflowStatus};
use crate::timeout::NodeTimeout;
use crate::transition::{CONDITION_COMPLETE, Edge, TransitionTable, is_complete};

/// Decisions kept for [`WorkflowDriver::get_workflow_metrics`].
pub const DECISION_HISTORY_LIMIT: usize = 100;

/// Knobs of the driver loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    /// Node executions allowed per `execute_workflow` call
    pub max_iterations: u32,
    pub node_timeout: NodeTimeout,
    /// Policy for failed state-file writes
    pub on_persistence_error: OnPersistenceError,
    pub lock_ttl_seconds: u64,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            node_timeout: NodeTimeout::default(),
            on_persistence_error: OnPersistenceError::default(),
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

impl DriverSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.max_iterations,
            node_timeout: NodeTimeout::from_config(config),
            on_persistence_error: config.on_persistence_error,
            lock_ttl_seconds: config.lock_ttl_seconds,
        }
    }
}

/// Orchestrator for `strategy`; the capability policy asks `capability`.
#[must_use]
pub fn orchestrator_for(
    strategy: OrchestratorStrategy,
    capability: Arc<dyn PhaseCapability>,
) -> Arc<dyn Orchestrator> {
    match strategy {
        OrchestratorStrategy::Passthrough => Arc::new(PassthroughOrchestrator),
        OrchestratorStrategy::RuleBased => Arc::new(RuleBasedOrchestrator),
        OrchestratorStrategy::Capability => Arc::new(CapabilityOrchestrator::new(capability)),
    }
}

#[derive(Debug, Default)]
struct Insights {
    metrics: OrchestratorMetrics,
    history: VecDeque<DecisionRecord>,
}

/// The bounded control loop: orchestrator, node, checkpoint, transition.
///
/// Runs for one issue are serialized twice over: an async mutex per issue id
/// queues calls inside this process, and a [`FileLock`] in the gateway's lock
/// directory rejects a run from another process.
pub struct WorkflowDriver {
    registry: NodeRegistry,
    orchestrator: Arc<dyn Orchestrator>,
    gateway: Arc<dyn PersistenceGateway>,
    table: TransitionTable,
    settings: DriverSettings,
    issue_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    insights: Mutex<Insights>,
}

impl WorkflowDriver {
    #[must_use]
    pub fn new(
        registry: NodeRegistry,
        orchestrator: Arc<dyn Orchestrator>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            gateway,
            table: TransitionTable::standard(),
            settings: DriverSettings::default(),
            issue_locks: Mutex::new(HashMap::new()),
            insights: Mutex::new(Insights::default()),
        }
    }

    /// Offline driver for `config`: template-rendered artifacts, the
    /// configured orchestrator strategy and a file store in `state_dir`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let capability: Arc<dyn PhaseCapability> = Arc::new(TemplateCapability);
        Self::new(
            NodeRegistry::standard(capability.clone()),
            orchestrator_for(config.strategy, capability),
            Arc::new(FileStateStore::new(config.state_dir.clone())),
        )
        .with_settings(DriverSettings::from_config(config))
    }

    #[must_use]
    pub fn with_settings(mut self, settings: DriverSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_transition_table(mut self, table: TransitionTable) -> Self {
        self.table = table;
        self
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.settings.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_node_timeout(mut self, timeout: NodeTimeout) -> Self {
        self.settings.node_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_on_persistence_error(mut self, policy: OnPersistenceError) -> Self {
        self.settings.on_persistence_error = policy;
        self
    }

    #[must_use]
    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    #[must_use]
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Run the workflow for `input.issue_id` until it completes, fails or
    /// hits the iteration bound.
    ///
    /// A stored record in the same mode that is not complete is resumed at
    /// its phase and progress. Any other stored record is re-entered at the
    /// initial phase of `input.mode` with progress 0, keeping its artifacts
    /// and history.
    ///
    /// # Errors
    ///
    /// Orchestrator failures, lock conflicts, unreadable records and (under
    /// the `raise` policy) failed state writes abort the call. Node failures
    /// do not: they end the loop and are reported in the output.
    pub async fn execute_workflow(
        &self,
        mut input: WorkflowInput,
    ) -> Result<WorkflowOutput, SparcflowError> {
        input.issue_id = sanitize_issue_id(&input.issue_id)?;

        let _queued = self.queue_for(&input.issue_id).await;

        let _file_lock = match self.gateway.lock_dir() {
            Some(dir) => Some(FileLock::acquire(
                dir,
                &input.issue_id,
                false,
                Some(self.settings.lock_ttl_seconds),
            )?),
            None => None,
        };

        let span = logging::workflow_span(&input.issue_id, input.mode.as_str());
        self.run(input).instrument(span).await
    }

    async fn run(&self, input: WorkflowInput) -> Result<WorkflowOutput, SparcflowError> {
        let started = Instant::now();
        let mut state = self.prepare(&input).await?;
        self.checkpoint(&mut state).await?;

        let max_iterations = self.settings.max_iterations;
        let mut executions = 0u32;
        let mut outcome = RunOutcome::IterationBound {
            iterations: max_iterations,
        };

        for iteration in 1..=max_iterations {
            let phase = state.current_phase;

            state = self.decide(state, &input.issue_description).await?;

            let Some(node) = self.registry.get(phase) else {
                tracing::warn!(
                    issue_id = %state.issue_id,
                    phase = %phase,
                    "No node registered for phase, stopping"
                );
                self.checkpoint(&mut state).await?;
                outcome = RunOutcome::MissingNode { phase };
                break;
            };

            logging::log_phase_start(
                &state.issue_id,
                phase.as_str(),
                state.current_mode.as_str(),
                iteration,
            );
            executions += 1;
            let node_started = Instant::now();
            let result = self.execute_node(node.as_ref(), state.clone(), iteration).await;
            let elapsed_ms = node_started.elapsed().as_millis() as u64;

            match result {
                Ok(mut next) => {
                    next.progress = next.progress.max(state.progress).min(100);
                    next.updated_at = Utc::now();
                    record_execution(&mut next, phase, elapsed_ms);
                    state = next;
                    self.checkpoint(&mut state).await?;
                    logging::log_phase_complete(
                        &state.issue_id,
                        phase.as_str(),
                        state.progress,
                        elapsed_ms,
                    );
                }
                Err(error) => {
                    logging::log_phase_error(
                        &state.issue_id,
                        phase.as_str(),
                        &error.to_string(),
                        elapsed_ms,
                    );
                    let now = Utc::now();
                    state.updated_at = now;
                    state.metadata.errors.push(ErrorRecord {
                        phase,
                        kind: error.kind().to_string(),
                        message: error.to_string(),
                        timestamp: now,
                    });
                    state.record_action(format!("{phase} failed"), false);
                    record_execution(&mut state, phase, elapsed_ms);
                    self.checkpoint(&mut state).await?;
                    outcome = RunOutcome::NodeFailed { error };
                    break;
                }
            }

            if is_complete(&state) {
                state.metadata.transitions.push(TransitionRecord {
                    from: phase,
                    to: None,
                    condition: CONDITION_COMPLETE.to_string(),
                    timestamp: Utc::now(),
                    success: true,
                });
                self.checkpoint(&mut state).await?;
                outcome = RunOutcome::Completed;
                break;
            }

            if iteration == max_iterations {
                tracing::warn!(
                    issue_id = %state.issue_id,
                    phase = %phase,
                    progress = state.progress,
                    iteration = iteration,
                    "Iteration bound reached before completion, record can be resumed"
                );
                break;
            }

            let Some(edge) = self.table.next(phase) else {
                tracing::info!(
                    issue_id = %state.issue_id,
                    phase = %phase,
                    "No transition out of phase, stopping"
                );
                outcome = RunOutcome::NoTransition { phase };
                break;
            };

            follow_edge(&mut state, edge);
        }

        let performance = RunPerformance {
            execution_time_ms: started.elapsed().as_millis() as u64,
            progress: state.progress,
            node_count: executions,
            success_rate: state.success_rate(),
        };
        tracing::info!(
            issue_id = %state.issue_id,
            phase = %state.current_phase,
            progress = state.progress,
            node_count = executions,
            duration_ms = performance.execution_time_ms,
            outcome = ?outcome,
            "Workflow run finished"
        );

        Ok(WorkflowOutput {
            artifacts: state.artifacts.clone(),
            decisions: state.ai_context.decisions.clone(),
            state,
            performance,
            outcome,
        })
    }

    /// Load or create the record this run works on.
    async fn prepare(&self, input: &WorkflowInput) -> Result<WorkflowState, PersistenceError> {
        match self.gateway.load(&input.issue_id).await? {
            None => {
                tracing::info!(issue_id = %input.issue_id, mode = %input.mode, "Starting new workflow");
                Ok(create_initial_state(input))
            }
            Some(mut state) if state.current_mode == input.mode && !is_complete(&state) => {
                // A phase that finished before the previous call stopped is not run again.
                if finished_current_phase(&state)
                    && let Some(edge) = self.table.next(state.current_phase)
                {
                    follow_edge(&mut state, edge);
                }
                tracing::info!(
                    issue_id = %state.issue_id,
                    phase = %state.current_phase,
                    progress = state.progress,
                    "Resuming workflow"
                );
                Ok(state)
            }
            Some(mut state) => {
                tracing::info!(
                    issue_id = %state.issue_id,
                    from_mode = %state.current_mode,
                    mode = %input.mode,
                    "Re-entering workflow at the initial phase"
                );
                state.current_mode = input.mode;
                state.current_phase = input.mode.initial_phase();
                state.progress = 0;
                state.updated_at = Utc::now();
                Ok(state)
            }
        }
    }

    async fn decide(
        &self,
        state: WorkflowState,
        description: &str,
    ) -> Result<WorkflowState, OrchestrationError> {
        let phase = state.current_phase;
        let mode = state.current_mode;

        let decision = self
            .orchestrator
            .decide(state, description)
            .await
            .inspect_err(|e| {
                tracing::error!(phase = %phase, error = %e, "Orchestrator failed");
            })?;

        if decision.state.current_phase != phase || decision.state.current_mode != mode {
            return Err(OrchestrationError::ContractViolation {
                reason: format!(
                    "{} moved the workflow from {mode}/{phase} to {}/{}",
                    self.orchestrator.name(),
                    decision.state.current_mode,
                    decision.state.current_phase
                ),
            });
        }

        let mut insights = self.insights.lock().unwrap_or_else(PoisonError::into_inner);
        insights.metrics.record(&decision.metrics);
        if let Some(record) = &decision.record {
            insights.history.push_back(record.clone());
            while insights.history.len() > DECISION_HISTORY_LIMIT {
                insights.history.pop_front();
            }
        }
        Ok(decision.state)
    }

    /// Run `node` under the timeout and check that it kept its contract.
    async fn execute_node(
        &self,
        node: &dyn PhaseNode,
        state: WorkflowState,
        iteration: u32,
    ) -> Result<WorkflowState, NodeExecutionError> {
        let phase = state.current_phase;
        let mode = state.current_mode;
        let issue_id = state.issue_id.clone();
        let keys: Vec<String> = state.artifacts.keys().cloned().collect();

        let span = logging::phase_span(&issue_id, phase.as_str(), iteration);
        let next = self
            .settings
            .node_timeout
            .run(phase, node.execute(state))
            .instrument(span)
            .await?;

        if next.current_phase != phase || next.current_mode != mode || next.issue_id != issue_id {
            return Err(NodeExecutionError::ContractViolation {
                phase,
                reason: format!(
                    "node moved the workflow to {}/{}",
                    next.current_mode, next.current_phase
                ),
            });
        }
        if let Some(dropped) = keys.iter().find(|k| !next.artifacts.contains_key(*k)) {
            return Err(NodeExecutionError::ContractViolation {
                phase,
                reason: format!("node dropped artifact '{dropped}'"),
            });
        }
        Ok(next)
    }

    /// Save `state`, applying the persistence policy to failures.
    async fn checkpoint(&self, state: &mut WorkflowState) -> Result<(), PersistenceError> {
        state.refresh_tool_usage_counts();
        state.metadata.performance.success_rate = state.success_rate();

        match self.gateway.save(state).await {
            Ok(()) => Ok(()),
            Err(e) if self.settings.on_persistence_error == OnPersistenceError::Log => {
                tracing::warn!(
                    issue_id = %state.issue_id,
                    phase = %state.current_phase,
                    error = %e,
                    "Failed to save workflow state, continuing"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for earlier calls on `issue_id` in this process to finish.
    async fn queue_for(&self, issue_id: &str) -> IssueSlot<'_> {
        let mutex = {
            let mut locks = self.issue_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(issue_id.to_string()).or_default().clone()
        };
        IssueSlot {
            locks: &self.issue_locks,
            issue_id: issue_id.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_issues(&self) -> usize {
        self.issue_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Status of the stored record, or `None` when the issue has none.
    pub async fn get_workflow_status(
        &self,
        issue_id: &str,
    ) -> Result<Option<WorkflowStatus>, SparcflowError> {
        let issue_id = sanitize_issue_id(issue_id)?;
        let state = self.gateway.load(&issue_id).await?;
        Ok(state.as_ref().map(WorkflowStatus::from_state))
    }

    /// Delete the record and its artifacts. Resetting an unknown issue is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Refuses while another process holds the issue lock, unless `force`.
    pub async fn reset_workflow(&self, issue_id: &str, force: bool) -> Result<(), SparcflowError> {
        let issue_id = sanitize_issue_id(issue_id)?;

        let _queued = self.queue_for(&issue_id).await;

        if let Some(dir) = self.gateway.lock_dir() {
            lock_utils::ensure_idle(dir, &issue_id, force, Some(self.settings.lock_ttl_seconds))?;
        }
        self.gateway.delete(&issue_id).await?;
        if let Some(dir) = self.gateway.lock_dir() {
            lock_utils::force_remove_lock(dir, &issue_id)?;
        }

        tracing::info!(issue_id = %issue_id, force = force, "Workflow reset");
        Ok(())
    }

    /// Node availability and the orchestrator numbers gathered by this driver.
    #[must_use]
    pub fn get_workflow_metrics(&self) -> WorkflowMetrics {
        let insights = self.insights.lock().unwrap_or_else(PoisonError::into_inner);
        WorkflowMetrics {
            total_nodes: PhaseId::ALL.len(),
            available_nodes: self.registry.phases().collect(),
            orchestrator: self.orchestrator.name().to_string(),
            orchestrator_metrics: insights.metrics.clone(),
            decision_history: insights.history.iter().cloned().collect(),
        }
    }
}

/// A held turn on the per-issue mutex. Dropping it releases the turn and
/// forgets the issue once nobody else is queued on it.
struct IssueSlot<'a> {
    locks: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    issue_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IssueSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        if locks
            .get(&self.issue_id)
            .is_some_and(|m| Arc::strong_count(m) == 1)
        {
            locks.remove(&self.issue_id);
        }
    }
}

/// Move `state` along `edge`, recording the transition.
fn follow_edge(state: &mut WorkflowState, edge: &Edge) {
    let from = state.current_phase;
    let now = Utc::now();
    state.metadata.transitions.push(TransitionRecord {
        from,
        to: Some(edge.to),
        condition: edge.condition.clone(),
        timestamp: now,
        success: true,
    });
    state.current_phase = edge.to;
    state.current_mode = edge.mode;
    state.updated_at = now;
    tracing::debug!(
        issue_id = %state.issue_id,
        from = %from,
        to = %edge.to,
        mode = %edge.mode,
        "Transitioned"
    );
}

/// Whether the stored phase already ran to success in an earlier call.
///
/// Nodes append to the agent history when they succeed and the driver
/// appends a failed entry when they do not, so the newest entry tells a
/// success checkpoint apart from a failure checkpoint. A fresh or re-entered
/// phase has no newest entry of its own.
fn finished_current_phase(state: &WorkflowState) -> bool {
    state
        .ai_context
        .agent_history
        .last()
        .is_some_and(|last| last.phase == state.current_phase && last.success)
}

/// Fold one node execution into the performance counters.
fn record_execution(state: &mut WorkflowState, phase: PhaseId, elapsed_ms: u64) {
    let key = phase.as_str().to_string();
    let failures = state
        .metadata
        .errors
        .iter()
        .filter(|e| e.phase == phase)
        .count();

    let perf = &mut state.metadata.performance;
    perf.execution_time_ms += elapsed_ms;
    *perf.node_execution_times.entry(key.clone()).or_insert(0) += elapsed_ms;
    let runs = perf.node_executions.entry(key.clone()).or_insert(0);
    *runs += 1;
    let rate = (failures as f64 / f64::from(*runs)).min(1.0);
    perf.error_rates.insert(key, rate);
}
