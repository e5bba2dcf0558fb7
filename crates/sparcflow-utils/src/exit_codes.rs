//! Exit code constants and error mapping for the sparcflow CLI.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, issue id or configuration |
//! | 9 | `LOCK_HELD` | Another process holds the issue lock |
//! | 10 | `NODE_TIMEOUT` | A phase node exceeded its timeout |
//! | 11 | `NODE_FAILURE` | A phase node failed or broke its contract |
//! | 12 | `ORCHESTRATION_FAILURE` | The decision policy failed |
//! | 13 | `PERSISTENCE_FAILURE` | The workflow record could not be saved or loaded |

use crate::error::{NodeExecutionError, SparcflowError};

/// Type-safe process exit code. The numeric values are part of the CLI contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CLI_ARGS: ExitCode = ExitCode(2);
    pub const LOCK_HELD: ExitCode = ExitCode(9);
    pub const NODE_TIMEOUT: ExitCode = ExitCode(10);
    pub const NODE_FAILURE: ExitCode = ExitCode(11);
    pub const ORCHESTRATION_FAILURE: ExitCode = ExitCode(12);
    pub const PERSISTENCE_FAILURE: ExitCode = ExitCode(13);

    /// Numeric value for `std::process::exit()`.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl SparcflowError {
    /// Map this error to the CLI exit code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::IssueId(_) => ExitCode::CLI_ARGS,
            Self::Lock(_) => ExitCode::LOCK_HELD,
            Self::Node(NodeExecutionError::Timeout { .. }) => ExitCode::NODE_TIMEOUT,
            Self::Node(_) => ExitCode::NODE_FAILURE,
            Self::Orchestration(_) => ExitCode::ORCHESTRATION_FAILURE,
            Self::Persistence(_) => ExitCode::PERSISTENCE_FAILURE,
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, OrchestrationError, PersistenceError};
    use crate::issue_id::IssueIdError;
    use crate::types::PhaseId;
    use sparcflow_lock::LockError;

    #[test]
    fn test_exit_code_table() {
        let cases: Vec<(SparcflowError, i32)> = vec![
            (ConfigError::InvalidFile("x".into()).into(), 2),
            (IssueIdError::Empty.into(), 2),
            (
                LockError::ConcurrentExecution {
                    issue_id: "a".into(),
                    pid: 1,
                    created_ago: "1s".into(),
                }
                .into(),
                9,
            ),
            (
                NodeExecutionError::Timeout {
                    phase: PhaseId::Specification,
                    timeout_seconds: 1,
                }
                .into(),
                10,
            ),
            (
                NodeExecutionError::Failed {
                    phase: PhaseId::Specification,
                    reason: "x".into(),
                }
                .into(),
                11,
            ),
            (
                OrchestrationError::ContractViolation { reason: "x".into() }.into(),
                12,
            ),
            (
                PersistenceError::Write {
                    path: "p".into(),
                    reason: "r".into(),
                }
                .into(),
                13,
            ),
            (std::io::Error::other("x").into(), 1),
        ];

        for (err, expected) in cases {
            assert_eq!(err.to_exit_code().as_i32(), expected, "{err}");
        }
    }

    #[test]
    fn test_round_trip_numeric() {
        assert_eq!(ExitCode::from_i32(0), ExitCode::SUCCESS);
        assert_eq!(i32::from(ExitCode::PERSISTENCE_FAILURE), 13);
    }
}
