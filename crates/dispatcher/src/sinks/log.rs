//! LogSink - logs payload summaries via tracing

use bytes::Bytes;
use contracts::{ContractError, NotificationSink};
use tracing::{info, instrument};

/// Sink that logs notification summaries for debugging
///
/// Always writable.
pub struct LogSink {
    id: String,
}

impl LogSink {
    /// Create a new LogSink with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn log_summary(&self, payload: &[u8]) {
        let kind = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.as_object().and_then(|o| o.keys().next().cloned()))
            .unwrap_or_else(|| "unknown".to_string());

        info!(
            sink = %self.id,
            kind = %kind,
            bytes = payload.len(),
            "Notification received"
        );
    }
}

impl NotificationSink for LogSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_writable(&self) -> bool {
        true
    }

    #[instrument(name = "log_sink_write", skip(self, payload), fields(sink = %self.id))]
    fn write(&self, payload: Bytes) -> Result<(), ContractError> {
        self.log_summary(&payload);
        Ok(())
    }
}
