//! Error types for Vodlink Core

use crate::types::{SessionId, SessionState};
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error types
///
/// Every variant is scoped to a single session or a single command; none of
/// them is meant to bring down the host process.
#[derive(Error, Debug)]
pub enum Error {
    // Registry errors
    #[error("No video player associated with session id {0}")]
    UnknownSession(SessionId),

    #[error("No video player associated with texture id {0}")]
    UnknownTexture(i64),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // Source errors
    #[error("Failed to prepare source: {0}")]
    Source(String),

    #[error("Invalid source configuration: {0}")]
    InvalidSource(String),

    // Engine errors
    #[error("Engine error {code}: {description}")]
    Engine { code: i32, description: String },

    // Command errors
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        state: SessionState,
        operation: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Create a source error from any displayable cause
    pub fn source_failed(msg: impl std::fmt::Display) -> Self {
        Error::Source(msg.to_string())
    }

    /// Returns true if the error only concerns one session
    pub fn is_session_scoped(&self) -> bool {
        matches!(
            self,
            Error::UnknownSession(_)
                | Error::UnknownTexture(_)
                | Error::Source(_)
                | Error::Engine { .. }
                | Error::InvalidState { .. }
        )
    }

    /// Returns the error code used in command replies
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnknownSession(_) | Error::UnknownTexture(_) => "UNKNOWN_SESSION",
            Error::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Error::Source(_) => "SOURCE_ERROR",
            Error::InvalidSource(_) => "INVALID_SOURCE",
            Error::Engine { .. } => "ENGINE_ERROR",
            Error::InvalidState { .. } => "INVALID_STATE",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
        }
    }
}
