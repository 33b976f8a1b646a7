use serde::Serialize;
use thiserror::Error;

/// Canonical error tokens returned across every capability in the library.
///
/// Internal plumbing (`fs_state`, `vcs`, front-matter parsing) uses
/// `anyhow::Result` with `.with_context(...)`. Anything that escapes to an
/// operation boundary is folded into one of these variants so callers over
/// the wire always see a stable token instead of a free-text message.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate heading: {0}")]
    DuplicateHeading(String),

    #[error("anchor not found: {0}")]
    AnchorNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock timeout after {0}ms")]
    LockTimeout(u64),

    #[error("hard limit reached for {kind}")]
    HardLimitReached {
        kind: String,
        existing: Vec<crate::flags::FlagHolder>,
    },

    #[error("history entry not found: {0}")]
    HistoryEntryNotFound(String),

    #[error("restricted mode: writer operations are disabled")]
    Restricted,

    #[error("io error: {0}")]
    IOError(String),
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::IOError(format!("{err:#}"))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::IOError(err.to_string())
    }
}

/// Canonical string token for this error, sent over the wire in place of a
/// free-text message.
impl CoreError {
    pub fn token(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NotFound",
            CoreError::DuplicateHeading(_) => "DuplicateHeading",
            CoreError::AnchorNotFound(_) => "AnchorNotFound",
            CoreError::Conflict(_) => "Conflict",
            CoreError::LockTimeout(_) => "LockTimeout",
            CoreError::HardLimitReached { .. } => "HardLimitReached",
            CoreError::HistoryEntryNotFound(_) => "HistoryEntryNotFound",
            CoreError::Restricted => "Restricted",
            CoreError::IOError(_) => "IOError",
        }
    }

    /// A human-readable suggested next action.
    pub fn suggested_action(&self) -> Option<String> {
        match self {
            CoreError::Conflict(_) => Some(
                "Read the instructions file to see the conflict markers, then call \
                 resolve-conflict with a resolution strategy."
                    .to_string(),
            ),
            CoreError::HardLimitReached { existing, .. } => Some(format!(
                "The hard cap is already reached by {} fragment(s): {}. Remove one before adding another.",
                existing.len(),
                existing
                    .iter()
                    .map(|f| f.path.clone())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            CoreError::Restricted => Some(
                "Writer operations are disabled until onboarding completes. See the \
                 onboarding flow for this repository."
                    .to_string(),
            ),
            CoreError::LockTimeout(_) => Some(
                "Another writer is holding the process lock. Retry shortly.".to_string(),
            ),
            _ => None,
        }
    }
}

/// The JSON envelope every capability call returns.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_flags: Option<Vec<crate::flags::FlagHolder>>,
}

impl From<&CoreError> for ErrorEnvelope {
    fn from(err: &CoreError) -> Self {
        let existing_flags = match err {
            CoreError::HardLimitReached { existing, .. } => Some(existing.clone()),
            _ => None,
        };
        ErrorEnvelope {
            success: false,
            error: err.token().to_string(),
            suggested_action: err.suggested_action(),
            existing_flags,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
