//! NotificationSink trait - Transport endpoint interface
//!
//! A sink is one live connection that receives rendered payloads. The
//! fan-out task owns the calls, so implementations only need to be cheap
//! and non-blocking.

use bytes::Bytes;

use crate::ContractError;

/// Live transport endpoint
///
/// All sink implementations must implement this trait.
pub trait NotificationSink: Send + Sync {
    /// Stable identifier, unique within a stream (used for logging/metrics)
    fn id(&self) -> &str;

    /// Whether the endpoint can still accept payloads
    ///
    /// Checked right before every write; a sink reporting `false` is
    /// removed from its stream.
    fn is_writable(&self) -> bool;

    /// Push one payload to the endpoint
    ///
    /// # Errors
    /// Returns `SinkUnwritable` when the endpoint went away mid-write
    fn write(&self, payload: Bytes) -> Result<(), ContractError>;
}
