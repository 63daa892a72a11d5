//! Error types for gitnotes.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 6=sync, ...)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Result type alias for gitnotes operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    NoteNotFound,
    AmbiguousId,

    // Validation (exit 4)
    InvalidArgument,
    InvalidNoteState,

    // Sync (exit 6)
    SyncError,
    SyncLocked,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Git (exit 10)
    GitError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::NoteNotFound => "NOTE_NOT_FOUND",
            Self::AmbiguousId => "AMBIGUOUS_ID",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidNoteState => "INVALID_NOTE_STATE",
            Self::SyncError => "SYNC_ERROR",
            Self::SyncLocked => "SYNC_LOCKED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::GitError => "GIT_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::NoteNotFound | Self::AmbiguousId => 3,
            Self::InvalidArgument | Self::InvalidNoteState => 4,
            Self::SyncError | Self::SyncLocked => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::GitError => 10,
        }
    }

    /// Whether retrying the same command may succeed.
    ///
    /// True for transient sync conditions (network, lock held) and ambiguous
    /// IDs. False for not-found, validation or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SyncError | Self::SyncLocked | Self::AmbiguousId | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in gitnotes operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `gitnotes init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Note not found: {id}")]
    NoteNotFound { id: String },

    #[error("Ambiguous note id prefix '{prefix}' matches {}", matches.join(", "))]
    AmbiguousId { prefix: String, matches: Vec<String> },

    #[error("Note {id} is {actual}, expected {expected}")]
    InvalidNoteState {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::NoteNotFound { .. } => ErrorCode::NoteNotFound,
            Self::AmbiguousId { .. } => ErrorCode::AmbiguousId,
            Self::InvalidNoteState { .. } => ErrorCode::InvalidNoteState,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Git(_) => ErrorCode::GitError,
            Self::Sync(SyncError::Locked { .. }) => ErrorCode::SyncLocked,
            Self::Sync(_) => ErrorCode::SyncError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `gitnotes init` (optionally with --remote <url>) first".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "A note store already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NoteNotFound { id } => Some(format!(
                "No note with ID '{id}'. Use `gitnotes note list --all` to see available notes."
            )),

            Self::AmbiguousId { .. } => {
                Some("Use a longer ID prefix to select a single note.".to_string())
            }

            Self::InvalidNoteState { actual, .. } if actual == "deleted" => {
                Some("Deleted notes are kept as tombstones and cannot be edited.".to_string())
            }

            Self::Sync(SyncError::Locked { path, .. }) => Some(format!(
                "Another sync is running. If it crashed, remove {}.",
                path.display()
            )),

            Self::Sync(SyncError::Pull { .. }) => Some(
                "Nothing was changed locally. Check network access and credentials, then retry."
                    .to_string(),
            ),

            Self::Sync(SyncError::NoRepository { .. }) => Some(
                "Run `gitnotes init --remote <url>` to create the notes repository."
                    .to_string(),
            ),

            Self::InvalidNoteState { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Git(_)
            | Self::Sync(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::NotInitialized.exit_code(), 2);
        assert_eq!(Error::NoteNotFound { id: "x".into() }.exit_code(), 3);
        assert_eq!(Error::InvalidArgument("bad".into()).exit_code(), 4);
        assert_eq!(
            Error::Sync(SyncError::Pull {
                message: "offline".into()
            })
            .exit_code(),
            6
        );
        assert_eq!(Error::Config("x".into()).exit_code(), 7);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::NoteNotFound { id: "abc".into() };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "NOTE_NOT_FOUND");
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].as_str().unwrap().contains("abc"));
    }

    #[test]
    fn test_pull_failure_is_retryable() {
        let err = Error::Sync(SyncError::Pull {
            message: "timeout".into(),
        });
        assert!(err.error_code().is_retryable());
        assert!(err.hint().is_some());
    }
}
