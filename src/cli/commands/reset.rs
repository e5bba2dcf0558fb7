//! Reset command implementation
//!
//! Handles `sparcflow reset`.

use anyhow::Result;

use crate::{Config, WorkflowDriver};

/// Execute the reset command
pub(crate) async fn execute_reset_command(issue: &str, force: bool, config: &Config) -> Result<()> {
    let driver = WorkflowDriver::from_config(config);
    driver.reset_workflow(issue, force).await?;
    println!("✓ Reset workflow for issue: {issue}");
    Ok(())
}
