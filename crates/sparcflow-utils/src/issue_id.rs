//! Issue ID sanitization.
//!
//! Issue ids become file and directory names inside the state directory
//! (`<id>-state.json`, `<id>/`, `<id>.lock`), so they are reduced to a safe
//! ASCII alphabet before any path is built from them.

use crate::error::{ErrorCategory, UserFriendlyError};
use unicode_normalization::UnicodeNormalization;

/// Error type for issue ID validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueIdError {
    #[error("Issue ID is empty after sanitization")]
    Empty,

    #[error("Issue ID contains no letters or digits")]
    OnlyInvalidCharacters,
}

impl UserFriendlyError for IssueIdError {
    fn user_message(&self) -> String {
        match self {
            Self::Empty => "The issue ID is empty".to_string(),
            Self::OnlyInvalidCharacters => {
                "The issue ID must contain at least one ASCII letter or digit".to_string()
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some("Issue IDs name files in the state directory. Only A-Z, a-z, 0-9, '.', '-' and '_' are kept; anything else becomes '_'.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        vec![
            "Use the tracker key of the issue, e.g. PROJ-142 or gh-1337".to_string(),
            "Valid characters: A-Z, a-z, 0-9, . (dot), - (dash), _ (underscore)".to_string(),
        ]
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Sanitize an issue id for filesystem use.
///
/// Applies NFKC normalization (so full-width confusables collapse to ASCII),
/// replaces every character outside `[A-Za-z0-9._-]` with `_`, and breaks up
/// `..` sequences. A warning is logged when the id changes.
///
/// # Errors
///
/// Returns [`IssueIdError::Empty`] for an empty id and
/// [`IssueIdError::OnlyInvalidCharacters`] when no letter or digit survives.
///
/// ```
/// use sparcflow_utils::issue_id::sanitize_issue_id;
///
/// assert_eq!(sanitize_issue_id("PROJ-142").unwrap(), "PROJ-142");
/// assert_eq!(sanitize_issue_id("fix login bug").unwrap(), "fix_login_bug");
/// assert_eq!(sanitize_issue_id("ＰＲＯＪ－１").unwrap(), "PROJ-1");
/// ```
pub fn sanitize_issue_id(id: &str) -> Result<String, IssueIdError> {
    let normalized: String = id.trim().nfkc().collect();

    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    if sanitized.is_empty() {
        return Err(IssueIdError::Empty);
    }

    if !sanitized.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(IssueIdError::OnlyInvalidCharacters);
    }

    if sanitized != id {
        tracing::warn!(original = %id, sanitized = %sanitized, "issue id sanitized");
    }

    Ok(sanitized)
}
