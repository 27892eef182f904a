//! Error types for Junction operations.
//!
//! This module defines the canonical error type used throughout Junction.
//! All subsystems return `Result<T, RouterError>` for error handling.

use std::io;
use thiserror::Error;

/// Canonical error type for all Junction operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Variants map one-to-one onto the user-visible failure classes; the
/// severity band and process exit code are derived from the variant.
#[derive(Error, Debug)]
pub enum RouterError {
    /// I/O error (auto-converts from `std::io::Error`)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization error (auto-converts from `serde_json::Error`)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed argv, bad flag, missing required positional
    #[error("{0}")]
    UserInput(String),

    /// Symbolic name or shortcut phrase cannot be resolved
    #[error("{0}")]
    NotFound(String),

    /// A registry file on disk failed structural repair
    #[error("registry corruption: {0}")]
    RegistryCorruption(String),

    /// Child entry point missing, unexecutable, or failed to launch
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Child process exited nonzero
    #[error("{summary}")]
    ChildFailure { code: i32, summary: String },

    /// Child process exceeded its deadline and was killed
    #[error("timed out: {0}")]
    Timeout(String),

    /// Shortcut phrase already activated elsewhere
    #[error("duplicate shortcut: {0}")]
    DuplicatePhrase(String),

    /// Interactive session aborted by the user
    #[error("interrupted")]
    Interrupted,
}

/// Severity band for terminal rendering and the operation log.
///
/// Unknown commands and malformed input are user mistakes, not router
/// failures, and must never land in the ERROR band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Warning,
    Error,
}

impl RouterError {
    /// Process exit code for this failure, per the CLI contract:
    /// 0 success, 1 general error, 2 invalid usage, 130 interrupt.
    /// A failed child propagates its own exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RouterError::UserInput(_) => 2,
            RouterError::Interrupted => 130,
            RouterError::ChildFailure { code, .. } => *code,
            _ => 1,
        }
    }

    /// Severity band for this failure.
    pub fn band(&self) -> Band {
        match self {
            RouterError::UserInput(_)
            | RouterError::NotFound(_)
            | RouterError::DuplicatePhrase(_) => Band::Warning,
            _ => Band::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_is_transparent() {
        let err = RouterError::NotFound("unknown command: xyzzy".to_string());
        assert_eq!(format!("{}", err), "unknown command: xyzzy");
    }

    #[test]
    fn test_user_input_maps_to_usage_exit_code() {
        let err = RouterError::UserInput("missing phrase".to_string());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.band(), Band::Warning);
    }

    #[test]
    fn test_child_failure_propagates_code() {
        let err = RouterError::ChildFailure {
            code: 7,
            summary: "child exited with status 7".to_string(),
        };
        assert_eq!(err.exit_code(), 7);
        assert_eq!(err.band(), Band::Error);
    }

    #[test]
    fn test_interrupt_exit_code() {
        assert_eq!(RouterError::Interrupted.exit_code(), 130);
    }

    #[test]
    fn test_duplicate_phrase_is_warning_band() {
        let err = RouterError::DuplicatePhrase("plan create".to_string());
        assert_eq!(err.band(), Band::Warning);
        assert_eq!(err.exit_code(), 1);
    }
}
