//! JSON emit functions for CLI output
//!
//! Output is canonical JSON (JCS, RFC 8785) so that reports are byte-stable
//! for the same record.

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{WorkflowMetrics, WorkflowOutput, WorkflowStatus, emit_jcs};

/// `run --json` payload: the run output plus, with `--metrics`, the driver
/// metrics gathered during the run.
#[derive(Debug, Serialize)]
pub(crate) struct RunReport<'a> {
    #[serde(flatten)]
    pub output: &'a WorkflowOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<&'a WorkflowMetrics>,
}

pub(crate) fn emit_run_json(report: &RunReport<'_>) -> Result<String> {
    emit_jcs(report).context("Failed to emit run JSON")
}

pub(crate) fn emit_status_json(status: &WorkflowStatus) -> Result<String> {
    emit_jcs(status).context("Failed to emit status JSON")
}
