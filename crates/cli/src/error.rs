//! Error types for CLI operations.

use std::path::Path;

use contracts::StreamKind;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A configured sink could not be created
    #[error("Failed to attach sink '{name}' to stream {stream}: {message}")]
    SinkAttach {
        name: String,
        stream: StreamKind,
        message: String,
    },

    /// Engine run failed
    #[error("Engine execution failed: {message}")]
    Execution { message: String },
}

impl CliError {
    pub fn config_not_found(path: &Path) -> Self {
        Self::ConfigNotFound {
            path: path.display().to_string(),
        }
    }

    pub fn sink_attach(name: impl Into<String>, stream: StreamKind, message: impl Into<String>) -> Self {
        Self::SinkAttach {
            name: name.into(),
            stream,
            message: message.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}

/// Fail with `ConfigNotFound` unless `path` exists
pub fn ensure_config_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::config_not_found(path))
    }
}
