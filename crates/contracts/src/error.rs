//! Layered error definitions
//!
//! Categorized by source: config / subscription / store / render / sink

use thiserror::Error;

use crate::{MirrorOperation, SubscriptionId};

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Subscription Errors =====
    /// Unknown subscription id
    #[error("subscription '{id}' not found")]
    NotFound { id: SubscriptionId },

    /// Duplicate establish
    #[error("subscription '{id}' already exists")]
    AlreadyExists { id: SubscriptionId },

    /// Request parameter rejected before touching the registry
    #[error("invalid parameter '{field}': {message}")]
    InvalidParameter { field: String, message: String },

    /// Unparseable start/stop time
    #[error("malformed timestamp '{value}': {message}")]
    MalformedTimestamp { value: String, message: String },

    // ===== Store Errors =====
    /// External store write failed during establish/modify/delete
    #[error("mirror write '{operation}' for subscription '{id}' failed: {message}")]
    MirrorWriteFailed {
        id: SubscriptionId,
        operation: MirrorOperation,
        message: String,
    },

    /// External store read or listener registration failed
    #[error("data store unavailable: {message}")]
    StoreUnavailable { message: String },

    // ===== Render Errors =====
    /// Payload construction error
    #[error("render failed for subscription '{id}': {message}")]
    RenderFailed { id: SubscriptionId, message: String },

    // ===== Sink Errors =====
    /// Sink can no longer accept payloads
    #[error("sink '{sink_id}' is not writable: {message}")]
    SinkUnwritable { sink_id: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid parameter error
    pub fn invalid_parameter(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create malformed timestamp error
    pub fn malformed_timestamp(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedTimestamp {
            value: value.into(),
            message: message.into(),
        }
    }

    /// Create mirror write error
    pub fn mirror_write(
        id: SubscriptionId,
        operation: MirrorOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::MirrorWriteFailed {
            id,
            operation,
            message: message.into(),
        }
    }

    /// Create store unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create render error
    pub fn render(id: SubscriptionId, message: impl Into<String>) -> Self {
        Self::RenderFailed {
            id,
            message: message.into(),
        }
    }

    /// Create sink unwritable error
    pub fn sink_unwritable(sink_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkUnwritable {
            sink_id: sink_id.into(),
            message: message.into(),
        }
    }

    /// Whether the error leaves the local registry mutation applied
    pub fn is_mirror_failure(&self) -> bool {
        matches!(self, Self::MirrorWriteFailed { .. })
    }
}
