//! CLI entry point and dispatch logic
//!
//! `run()` parses arguments, discovers the configuration, initializes
//! tracing, creates the tokio runtime, dispatches to a command and prints
//! every error itself.

use anyhow::Result;
use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::{Config, ExitCode, SparcflowError, WorkflowInput};

/// Main CLI execution function.
///
/// Returns `Err(ExitCode)` after printing the error report; `main` only
/// maps the code to the process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli.cli_args();

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = SparcflowError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    // A subscriber may already be installed when embedded; keep going.
    if let Err(e) = sparcflow_utils::logging::init_tracing(config.verbose) {
        if config.verbose {
            eprintln!("Tracing not initialized: {e}");
        }
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();
    let result = rt.block_on(dispatch(cli.command, &config));

    match result {
        Ok(()) => Ok(()),
        Err(error) => Err(report_error(&error, operation)),
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run {
            issue,
            mode,
            title,
            description,
            input,
            json,
            metrics,
        } => {
            let mut workflow_input = WorkflowInput::new(issue, mode, title, description);
            if let Some(text) = input {
                workflow_input = workflow_input.with_user_input(text);
            }
            commands::execute_run_command(workflow_input, json, metrics, config).await
        }
        Commands::Status { issue, json } => {
            commands::execute_status_command(&issue, json, config).await
        }
        Commands::Reset { issue, force } => {
            commands::execute_reset_command(&issue, force, config).await
        }
    }
}

/// Print `error` for a person at a terminal and pick the exit code.
pub(crate) fn report_error(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(err) = error.downcast_ref::<SparcflowError>() {
        eprintln!("✗ sparcflow {operation} failed");
        eprintln!("{}", err.display_for_user());
        return err.to_exit_code();
    }

    eprintln!("✗ Unexpected error during {operation}: {error:#}");
    eprintln!("\n  Run with --verbose for more detailed output");
    ExitCode::INTERNAL
}
