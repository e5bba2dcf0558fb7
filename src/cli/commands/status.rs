//! Status command implementation
//!
//! Handles `sparcflow status` and `sparcflow status --json`.

use anyhow::Result;

use super::json_emit::emit_status_json;

use crate::{Config, WorkflowDriver, WorkflowStatus};

/// Execute the status command
pub(crate) async fn execute_status_command(issue: &str, json: bool, config: &Config) -> Result<()> {
    let driver = WorkflowDriver::from_config(config);
    let Some(status) = driver.get_workflow_status(issue).await? else {
        if json {
            println!("{{}}");
        } else {
            println!("Status for issue: {issue}");
            println!("  Status: No workflow found");
            println!("  State directory: {}", config.state_dir);
        }
        return Ok(());
    };

    if json {
        println!("{}", emit_status_json(&status)?);
    } else {
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &WorkflowStatus) {
    println!("Status for issue: {}", status.issue_id);
    println!("  Status: {}", status.status);
    println!("  Mode: {}", status.mode);
    println!("  Phase: {}", status.phase);
    println!("  Progress: {}%", status.progress);
    println!("  Last updated: {}", status.last_updated.to_rfc3339());

    let perf = &status.performance;
    println!(
        "  Executions: {} ({}ms total, success rate {:.0}%)",
        perf.node_executions.values().sum::<u32>(),
        perf.execution_time_ms,
        perf.success_rate * 100.0
    );

    if status.artifacts.is_empty() {
        println!("  Artifacts: none");
    } else {
        println!("  Artifacts:");
        for artifact in &status.artifacts {
            println!(
                "    - {} ({} bytes, {})",
                artifact.key, artifact.bytes, artifact.hash
            );
        }
    }

    if let Some(err) = &status.latest_error {
        println!("  Latest error ({}): {}", err.phase, err.message);
    }
}
