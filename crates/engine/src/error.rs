//! Session-level error taxonomy
//!
//! Agent-level failures (validation, timeouts) are recovered inside the
//! coordinator and never reach this type. What does reach it is fatal to the
//! session: bad configuration, broken mechanics arithmetic, a log sink that
//! cannot be written, or a transport that never comes back.

use thiserror::Error;

use aeonisk_domain::MechanicsError;
use aeonisk_shared::ConfigError;

/// Fatal session failure.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Invalid configuration; the session never starts. Exit code 1.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The event log could not be written; session integrity is gone.
    #[error("Log write failure: {0}")]
    LogWrite(String),

    /// Mechanics arithmetic invariant failed - a program bug, not a game event.
    #[error("Mechanics assertion failure: {0}")]
    Mechanics(#[from] MechanicsError),

    /// The LLM transport failed persistently (past all retries).
    #[error("LLM transport failure: {0}")]
    Transport(String),

    /// External cancellation (kill signal) tore the session down.
    #[error("Session cancelled: {0}")]
    Cancelled(String),

    /// Shared-state integrity failure (unknown entity mid-session, etc.).
    #[error("State error: {0}")]
    State(String),
}

impl SessionError {
    /// CLI exit code: 1 for configuration errors, 2 for runtime aborts.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::Config(_) => 1,
            _ => 2,
        }
    }

    /// Taxonomy kind recorded on the final aborted `session_end` event.
    pub fn taxonomy(&self) -> &'static str {
        match self {
            SessionError::Config(_) => "config",
            SessionError::LogWrite(_) => "log_write",
            SessionError::Mechanics(_) => "mechanics_assertion",
            SessionError::Transport(_) => "transport",
            SessionError::Cancelled(_) => "cancelled",
            SessionError::State(_) => "state",
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Config(err.to_string())
    }
}
