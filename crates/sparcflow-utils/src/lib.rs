pub mod atomic_write;
pub mod canonicalization;
pub mod error;
pub mod exit_codes;
pub mod issue_id;
pub mod logging;
pub mod paths;
pub mod types;

pub use error::{
    ConfigError, ErrorCategory, NodeExecutionError, OrchestrationError, PersistenceError,
    SparcflowError, UserFriendlyError,
};
pub use exit_codes::ExitCode;
pub use issue_id::{IssueIdError, sanitize_issue_id};
pub use types::{ConfigSource, Mode, PhaseId};
