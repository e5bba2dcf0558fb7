//! Tracing setup and structured log helpers for workflow execution.
//!
//! Every driver event carries the same field names (`issue_id`, `phase`,
//! `mode`, `iteration`, `duration_ms`) so logs can be filtered per issue.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Set to `json` to emit newline-delimited JSON log records.
pub const LOG_FORMAT_ENV: &str = "SPARCFLOW_LOG_FORMAT";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` selects
/// `sparcflow=debug,info` instead of `sparcflow=info,warn`. Output goes to
/// stderr so stdout stays reserved for command results.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("sparcflow=debug,info")
            } else {
                EnvFilter::try_new("sparcflow=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one `execute_workflow` call.
#[must_use]
pub fn workflow_span(issue_id: &str, mode: &str) -> tracing::Span {
    span!(Level::INFO, "workflow", issue_id = %issue_id, mode = %mode)
}

/// Span wrapping one phase node execution.
#[must_use]
pub fn phase_span(issue_id: &str, phase: &str, iteration: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "phase_execution",
        issue_id = %issue_id,
        phase = %phase,
        iteration = iteration,
    )
}

pub fn log_phase_start(issue_id: &str, phase: &str, mode: &str, iteration: u32) {
    info!(
        issue_id = %issue_id,
        phase = %phase,
        mode = %mode,
        iteration = iteration,
        "Starting phase execution"
    );
}

pub fn log_phase_complete(issue_id: &str, phase: &str, progress: u8, duration_ms: u64) {
    info!(
        issue_id = %issue_id,
        phase = %phase,
        progress = progress,
        duration_ms = duration_ms,
        "Phase execution completed"
    );
}

pub fn log_phase_error(issue_id: &str, phase: &str, error: &str, duration_ms: u64) {
    error!(
        issue_id = %issue_id,
        phase = %phase,
        duration_ms = duration_ms,
        error = %error,
        "Phase execution failed"
    );
}
