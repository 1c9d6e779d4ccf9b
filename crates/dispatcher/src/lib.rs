//! # Dispatcher
//!
//! Notification rendering and per-stream fan-out.
//!
//! - Renders push-update, push-change-update and OAM envelopes
//! - Applies subtree filters
//! - One ordered listener per stream, created on first sink and removed
//!   once the last sink left
//! - Prunes sinks that stopped being writable

pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod metrics;
pub mod render;
pub mod sinks;
pub mod streams;

pub use contracts::NotificationSink;
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, SuppressReason};
pub use error::DispatcherError;
pub use listener::{ListenerAdapter, ListenerEvent};
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
pub use render::{filter_data, Notification};
pub use sinks::{create_sink, ChannelSink, LogSink, NetworkSink, NetworkSinkConfig};
pub use streams::ListenerRegistry;
