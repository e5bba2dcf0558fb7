use std::fmt;
use thiserror::Error;

pub use sparcflow_lock::LockError;

use crate::issue_id::IssueIdError;
use crate::types::PhaseId;

/// Library-level error type with rich context and user-friendly reporting.
///
/// | Category | Variant |
/// |----------|---------|
/// | Configuration | `Config`, `IssueId` |
/// | Concurrency | `Lock` |
/// | Phase execution | `Node` |
/// | Orchestration | `Orchestration` |
/// | Persistence | `Persistence`, `Io` |
///
/// Node failures are normally recorded in the workflow record rather than
/// returned; the CLI lifts them into `Node` to pick an exit code.
/// Library code returns `SparcflowError` and never calls `std::process::exit()`.
#[derive(Error, Debug)]
pub enum SparcflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Issue ID validation error: {0}")]
    IssueId(#[from] IssueIdError),

    #[error("File lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Phase execution error: {0}")]
    Node(#[from] NodeExecutionError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while running a phase node.
///
/// These are captured into `metadata.errors` of the workflow record and end the
/// driver loop; they do not abort the `execute_workflow` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeExecutionError {
    #[error("Phase {phase} failed: {reason}")]
    Failed { phase: PhaseId, reason: String },

    #[error("Phase {phase} timed out after {timeout_seconds} seconds")]
    Timeout { phase: PhaseId, timeout_seconds: u64 },

    #[error("No node registered for phase {phase}")]
    MissingNode { phase: PhaseId },

    #[error("Phase {phase} broke its contract: {reason}")]
    ContractViolation { phase: PhaseId, reason: String },
}

impl NodeExecutionError {
    #[must_use]
    pub const fn phase(&self) -> PhaseId {
        match self {
            Self::Failed { phase, .. }
            | Self::Timeout { phase, .. }
            | Self::MissingNode { phase }
            | Self::ContractViolation { phase, .. } => *phase,
        }
    }

    /// Stable machine-readable tag stored in error records.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "node_failed",
            Self::Timeout { .. } => "node_timeout",
            Self::MissingNode { .. } => "missing_node",
            Self::ContractViolation { .. } => "contract_violation",
        }
    }
}

/// Errors raised by the decision policy. These abort the whole run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Orchestrator failed to decide for phase {phase}: {reason}")]
    DecisionFailed { phase: PhaseId, reason: String },

    #[error("Orchestrator broke its contract: {reason}")]
    ContractViolation { reason: String },
}

/// Errors raised while saving, loading or deleting a workflow record.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to serialize workflow state for issue '{issue_id}': {reason}")]
    Serialize { issue_id: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Workflow state at {path} is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Failed to delete {path}: {reason}")]
    Delete { path: String, reason: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

/// Trait for errors that can be explained to a person at a terminal.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PhaseExecution,
    Orchestration,
    Persistence,
    Concurrency,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
            Self::Orchestration => write!(f, "Orchestration"),
            Self::Persistence => write!(f, "Persistence"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("Configuration file has invalid format: {reason}"),
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with optional [defaults] and [orchestrator] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => {
                Some(format!("The '{key}' option has specific format requirements."))
            }
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "sparcflow searches for .sparcflow/config.toml starting from the current directory upward."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of your config file".to_string(),
                "Remove unknown keys; the file is parsed strictly".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "on_persistence_error" => vec!["Use 'raise' or 'log'".to_string()],
                "strategy" => {
                    vec!["Use 'passthrough', 'rule-based' or 'capability'".to_string()]
                }
                "node_timeout" => vec!["Use a whole number of seconds, at least 1".to_string()],
                _ => vec![format!("Check the documented values for '{key}'")],
            },
            Self::NotFound { path } => vec![
                format!("Create the file at {path}"),
                "Or omit --config to use discovery and defaults".to_string(),
            ],
            Self::DiscoveryFailed { .. } => {
                vec!["Pass an explicit file with --config <path>".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

impl UserFriendlyError for NodeExecutionError {
    fn user_message(&self) -> String {
        match self {
            Self::Failed { phase, reason } => format!("The {phase} phase failed: {reason}"),
            Self::Timeout {
                phase,
                timeout_seconds,
            } => format!("The {phase} phase timed out after {timeout_seconds} seconds"),
            Self::MissingNode { phase } => format!("No node is available for the {phase} phase"),
            Self::ContractViolation { phase, reason } => {
                format!("The {phase} phase returned an invalid state: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "The failure is recorded in the workflow's error log; the last checkpoint is kept on disk."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Timeout { .. } => vec![
                "Increase node_timeout in .sparcflow/config.toml or pass --node-timeout".to_string(),
                "Re-run the same command to resume from the current phase".to_string(),
            ],
            Self::MissingNode { .. } => {
                vec!["Register a node for this phase before running the workflow".to_string()]
            }
            _ => vec![
                "Inspect the error log with 'sparcflow status <issue> --json'".to_string(),
                "Re-run the same command to retry the failed phase".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::PhaseExecution
    }
}

impl UserFriendlyError for OrchestrationError {
    fn user_message(&self) -> String {
        match self {
            Self::DecisionFailed { phase, reason } => {
                format!("Could not decide how to run the {phase} phase: {reason}")
            }
            Self::ContractViolation { reason } => {
                format!("The orchestrator returned an invalid decision: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("The run was aborted; the last saved checkpoint remains valid.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec![
            "Try '--strategy rule-based' to use the built-in decision table".to_string(),
            "Re-run the command to resume from the last checkpoint".to_string(),
        ]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Orchestration
    }
}

impl UserFriendlyError for PersistenceError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Corrupted { .. } => Some(
                "The state file could not be parsed or has an unsupported schema version."
                    .to_string(),
            ),
            _ => Some("Workflow state is written atomically to the state directory.".to_string()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Corrupted { .. } => vec![
                "Run 'sparcflow reset <issue>' to discard the record and start over".to_string(),
            ],
            _ => vec![
                "Check permissions and free space of the state directory".to_string(),
                "Set on_persistence_error = \"log\" to continue despite write failures".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Persistence
    }
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        Some("Only one process may run a given issue's workflow at a time.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            LockError::ConcurrentExecution { pid, .. } => vec![
                format!("Wait for process {pid} to finish"),
                "Use --force only if you are sure that process is gone".to_string(),
            ],
            LockError::StaleLock { .. } => {
                vec!["Re-run with --force to take over the stale lock".to_string()]
            }
            _ => vec!["Remove the .lock file next to the state file and retry".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Concurrency
    }
}

impl SparcflowError {
    fn as_user_friendly(&self) -> Option<&dyn UserFriendlyError> {
        match self {
            Self::Config(e) => Some(e),
            Self::IssueId(e) => Some(e),
            Self::Lock(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Orchestration(e) => Some(e),
            Self::Persistence(e) => Some(e),
            Self::Io(_) => None,
        }
    }

    /// Error message with context and actionable suggestions for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        output
    }
}

impl UserFriendlyError for SparcflowError {
    fn user_message(&self) -> String {
        self.as_user_friendly()
            .map_or_else(|| self.to_string(), |e| e.user_message())
    }

    fn context(&self) -> Option<String> {
        self.as_user_friendly().and_then(|e| e.context())
    }

    fn suggestions(&self) -> Vec<String> {
        self.as_user_friendly()
            .map(|e| e.suggestions())
            .unwrap_or_default()
    }

    fn category(&self) -> ErrorCategory {
        self.as_user_friendly()
            .map_or(ErrorCategory::Persistence, |e| e.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_error_kind_and_phase() {
        let err = NodeExecutionError::Timeout {
            phase: PhaseId::Testing,
            timeout_seconds: 5,
        };
        assert_eq!(err.kind(), "node_timeout");
        assert_eq!(err.phase(), PhaseId::Testing);
        assert_eq!(err.to_string(), "Phase testing timed out after 5 seconds");
    }

    #[test]
    fn test_from_conversions() {
        let err: SparcflowError = OrchestrationError::ContractViolation {
            reason: "phase changed".into(),
        }
        .into();
        assert!(matches!(err, SparcflowError::Orchestration(_)));
        assert_eq!(err.category(), ErrorCategory::Orchestration);
    }

    #[test]
    fn test_display_for_user_includes_suggestions() {
        let err = SparcflowError::Config(ConfigError::InvalidValue {
            key: "on_persistence_error".into(),
            value: "panic".into(),
        });
        let message = err.display_for_user();
        assert!(message.starts_with("Error: Configuration 'on_persistence_error'"));
        assert!(message.contains("Context:"));
        assert!(message.contains("Use 'raise' or 'log'"));
    }

    #[test]
    fn test_io_error_has_no_context() {
        let err = SparcflowError::Io(std::io::Error::other("disk gone"));
        assert!(err.context().is_none());
        assert!(err.suggestions().is_empty());
        assert!(err.user_message().contains("disk gone"));
    }

    #[test]
    fn test_every_user_friendly_error_has_suggestions() {
        let errors: Vec<Box<dyn UserFriendlyError>> = vec![
            Box::new(NodeExecutionError::MissingNode {
                phase: PhaseId::Analysis,
            }),
            Box::new(OrchestrationError::DecisionFailed {
                phase: PhaseId::Analysis,
                reason: "boom".into(),
            }),
            Box::new(PersistenceError::Corrupted {
                path: "x".into(),
                reason: "y".into(),
            }),
            Box::new(LockError::StaleLock {
                issue_id: "i".into(),
                pid: 1,
                age_secs: 10,
            }),
        ];
        for err in errors {
            assert!(!err.user_message().is_empty());
            assert!(!err.suggestions().is_empty());
        }
    }
}
