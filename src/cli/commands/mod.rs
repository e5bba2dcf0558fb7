//! Command implementations for the sparcflow CLI
//!
//! - `workflow`: `sparcflow run`
//! - `status`: `sparcflow status`
//! - `reset`: `sparcflow reset`
//! - `json_emit`: canonical JSON output shared by the commands

mod json_emit;
mod reset;
mod status;
mod workflow;

pub(crate) use json_emit::{RunReport, emit_run_json, emit_status_json};
pub(crate) use reset::execute_reset_command;
pub(crate) use status::execute_status_command;
pub(crate) use workflow::{execute_run_command, outcome_label, outcome_result};
