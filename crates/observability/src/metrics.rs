//! Notification engine metrics
//!
//! Thin helpers over the `metrics` facade so metric names and labels stay
//! consistent across crates. Without an installed recorder every call is a
//! no-op.

use contracts::{MirrorOperation, NotificationKind, OamStatus};
use metrics::{counter, gauge, histogram};

/// Record one notification handed to a stream's fan-out task
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_notification_sent;
///
/// record_notification_sent(NotificationKind::PushUpdate, "YANG-PUSH", payload.len());
/// ```
pub fn record_notification_sent(kind: NotificationKind, stream: &str, payload_len: usize) {
    counter!(
        "yang_push_notifications_total",
        "kind" => kind.as_str(),
        "stream" => stream.to_string()
    )
    .increment(1);

    histogram!("yang_push_payload_bytes", "kind" => kind.as_str()).record(payload_len as f64);
}

/// Record a notification that was not produced
///
/// `reason` is one of `dampened`, `unregistered`, `inactive`, `filtered`, `stale`.
pub fn record_notification_suppressed(reason: &'static str) {
    counter!("yang_push_notifications_suppressed_total", "reason" => reason).increment(1);
}

/// Record an OAM event
pub fn record_oam(status: OamStatus) {
    counter!("yang_push_oam_total", "status" => status.as_str()).increment(1);
}

/// Record a sink dropped at delivery time
pub fn record_sink_pruned(stream: &str) {
    counter!("yang_push_sinks_pruned_total", "stream" => stream.to_string()).increment(1);
}

/// Record a mirror write attempt
pub fn record_mirror_write(operation: MirrorOperation, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "yang_push_mirror_writes_total",
        "operation" => operation.as_str(),
        "status" => status
    )
    .increment(1);
}

/// Record the number of registered subscriptions
pub fn record_active_subscriptions(count: usize) {
    gauge!("yang_push_active_subscriptions").set(count as f64);
}

/// Record the number of sinks attached to a stream
pub fn record_stream_sinks(stream: &str, count: usize) {
    gauge!("yang_push_stream_sinks", "stream" => stream.to_string()).set(count as f64);
}
