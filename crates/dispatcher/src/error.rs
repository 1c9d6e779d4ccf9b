//! Dispatcher error types

use contracts::SubscriptionId;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Subtree filter cannot be applied
    #[error("invalid subtree filter: {message}")]
    InvalidFilter { message: String },

    /// Payload could not be serialized
    #[error("failed to encode notification for subscription '{id}': {source}")]
    Encode {
        id: SubscriptionId,
        #[source]
        source: serde_json::Error,
    },

    /// Registry or store error (from contract)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid filter error
    pub fn invalid_filter(message: impl Into<String>) -> Self {
        Self::InvalidFilter {
            message: message.into(),
        }
    }
}
