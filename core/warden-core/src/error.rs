//! Error types for warden-core operations.

use std::path::PathBuf;

/// All errors that can occur in warden-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration / State Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("State record malformed: {path}: {details}")]
    StateMalformed { path: PathBuf, details: String },

    #[error("Handoff debounce table malformed: {path}: {details}")]
    DebounceMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Collaborator Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command execution failed: {command}: {details}")]
    CommandFailed { command: String, details: String },

    #[error("Command timed out after {timeout_secs}s: {command}")]
    CommandTimedOut { command: String, timeout_secs: u64 },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Release feed error: {0}")]
    ReleaseFeed(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Oracle response malformed: {0}")]
    OracleResponseMalformed(String),
}

impl WardenError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WardenError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        WardenError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using WardenError.
pub type Result<T> = std::result::Result<T, WardenError>;

// Conversion for string error compatibility
impl From<WardenError> for String {
    fn from(err: WardenError) -> String {
        err.to_string()
    }
}
