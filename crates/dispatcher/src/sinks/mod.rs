//! Sink implementations
//!
//! Contains LogSink, NetworkSink and ChannelSink, plus the factory used for
//! configured sinks.

mod channel;
mod log;
mod network;

use std::sync::Arc;

use contracts::{NotificationSink, SinkConfig, SinkType};
use tracing::instrument;

use crate::error::DispatcherError;

pub use self::channel::ChannelSink;
pub use self::log::LogSink;
pub use self::network::{NetworkSink, NetworkSinkConfig};

/// Create a sink from configuration
#[instrument(
    name = "dispatcher_create_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn create_sink(config: &SinkConfig) -> Result<Arc<dyn NotificationSink>, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(Arc::new(LogSink::new(&config.name))),
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params).await?;
            Ok(Arc::new(sink))
        }
    }
}
