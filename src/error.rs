//! Application-level error types
//!
//! Command handlers speak [`MqttError`] so their status can be handed to a
//! completion callback unchanged. Everything around them (configuration,
//! the CLI, loop startup) reports an [`AgentError`].

use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::config::ConfigError),

    #[error("MQTT operation failed: {0}")]
    MqttError(#[from] MqttError),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AgentError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Process exit code reported by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::ConfigError(_) | AgentError::InvalidInput { .. } => 2,
            AgentError::MqttError(_) => 3,
            AgentError::InternalError { .. } => 1,
        }
    }
}

/// Result type for Agent operations
pub type AgentResult<T> = Result<T, AgentError>;
