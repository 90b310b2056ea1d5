//! Error types for the Guardian agent

use guardian_core::GateError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

/// Main error type for agent operations
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Document parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Serialization error while writing output
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Rejected by the decision engine
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AgentError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AgentError::InvalidInput(msg.into())
    }

    pub fn file_error(msg: impl Into<String>) -> Self {
        AgentError::FileError(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        AgentError::ParseError(msg.into())
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        match self {
            AgentError::InvalidInput(_) | AgentError::FileError(_) | AgentError::ParseError(_) => {
                true
            }
            AgentError::Gate(e) => !matches!(e, GateError::Internal(_)),
            _ => false,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        AgentError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(err: serde_yaml::Error) -> Self {
        AgentError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(err: toml::de::Error) -> Self {
        AgentError::ParseError(format!("TOML error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
