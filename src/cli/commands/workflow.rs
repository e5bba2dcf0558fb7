//! Run command implementation
//!
//! Handles `sparcflow run` and `sparcflow run --json`.

use anyhow::{Result, anyhow};

use super::json_emit::{RunReport, emit_run_json};

use crate::{
    Config, NodeExecutionError, RunOutcome, SparcflowError, WorkflowDriver, WorkflowInput,
    WorkflowMetrics, WorkflowOutput,
};

/// Execute the run command
pub(crate) async fn execute_run_command(
    input: WorkflowInput,
    json: bool,
    metrics: bool,
    config: &Config,
) -> Result<()> {
    let driver = WorkflowDriver::from_config(config);
    let output = driver.execute_workflow(input).await?;
    let metrics = metrics.then(|| driver.get_workflow_metrics());

    if json {
        let report = RunReport {
            output: &output,
            metrics: metrics.as_ref(),
        };
        println!("{}", emit_run_json(&report)?);
    } else {
        print_summary(&output, config);
        if let Some(metrics) = &metrics {
            print_metrics(metrics);
        }
    }

    outcome_result(&output.outcome)
}

/// Short human label for a run outcome.
pub(crate) fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::IterationBound { iterations } => {
            format!("stopped after {iterations} iterations (resumable)")
        }
        RunOutcome::NodeFailed { error } => format!("failed: {error}"),
        RunOutcome::NoTransition { phase } => format!("no transition out of {phase}"),
        RunOutcome::MissingNode { phase } => format!("no node registered for {phase}"),
    }
}

/// Turn a finished run into the command's result.
///
/// Completed and bounded runs succeed; everything else surfaces as an error
/// so the process exits non-zero.
pub(crate) fn outcome_result(outcome: &RunOutcome) -> Result<()> {
    match outcome {
        RunOutcome::Completed | RunOutcome::IterationBound { .. } => Ok(()),
        RunOutcome::NodeFailed { error } => Err(SparcflowError::Node(error.clone()).into()),
        RunOutcome::MissingNode { phase } => {
            Err(SparcflowError::Node(NodeExecutionError::MissingNode { phase: *phase }).into())
        }
        RunOutcome::NoTransition { phase } => {
            Err(anyhow!("Transition table has no edge out of phase {phase}"))
        }
    }
}

fn print_summary(output: &WorkflowOutput, config: &Config) {
    let state = &output.state;
    let perf = &output.performance;

    println!("Workflow for issue: {}", state.issue_id);
    println!("  Mode: {}", state.current_mode);
    println!("  Phase: {}", state.current_phase);
    println!("  Outcome: {}", outcome_label(&output.outcome));
    println!("  Progress: {}%", perf.progress);
    println!("  Nodes executed: {}", perf.node_count);
    println!("  Success rate: {:.0}%", perf.success_rate * 100.0);
    println!("  Duration: {}ms", perf.execution_time_ms);

    let artifacts: Vec<_> = state.non_empty_artifacts().collect();
    if artifacts.is_empty() {
        println!("  Artifacts: none");
    } else {
        println!("  Artifacts:");
        for (key, text) in artifacts {
            println!("    - {key} ({} bytes)", text.len());
        }
    }

    println!(
        "  State file: {}",
        sparcflow_utils::paths::state_file(&config.state_dir, &state.issue_id)
    );
}

fn print_metrics(metrics: &WorkflowMetrics) {
    let m = &metrics.orchestrator_metrics;
    println!();
    println!("Orchestrator: {}", metrics.orchestrator);
    println!(
        "  Nodes available: {}/{}",
        metrics.available_nodes.len(),
        metrics.total_nodes
    );
    println!("  Decisions: {} ({} recorded)", m.total_decisions, m.recorded_decisions);
    println!("  Average confidence: {:.2}", m.average_confidence);
    println!("  Capability calls: {}", m.capability_calls);
    println!("  Fallbacks: {}", m.fallbacks);
    for (agent, count) in &m.decisions_by_agent {
        println!("    - {agent}: {count}");
    }
}
