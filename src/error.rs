//! `AgChat` Error Types
//!
//! Centralized error handling using thiserror for type-safe errors.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for `AgChat`
#[derive(Error, Debug)]
pub enum AgChatError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-layer errors
///
/// Everything except `ConcurrentSubmission` is reported to the UI as an
/// error event; none of them escape a session task.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to start CLI: {reason}")]
    LaunchFailure { reason: String },

    #[error("No response from CLI within {timeout_secs}s")]
    NoResponseTimeout { timeout_secs: u64 },

    #[error("No response from CLI")]
    NoResponse,

    #[error("CLI exited with code {code}")]
    AbnormalExit { code: i32 },

    #[error("CLI finished without a response")]
    EmptyResponse,

    #[error("A message is already in flight for project '{project_id}'")]
    ConcurrentSubmission { project_id: String },

    #[error("No session for project '{project_id}'")]
    NotFound { project_id: String },

    #[error("Session limit of {max} reached")]
    LimitReached { max: usize },

    #[error("CLI input stream is closed")]
    InputClosed,

    #[error("Session I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}

/// One-shot CLI invocation errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to run '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("CLI produced no response")]
    EmptyResponse,

    #[error("CLI exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for one-shot CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Result type alias for top-level operations
pub type AgChatResult<T> = Result<T, AgChatError>;
