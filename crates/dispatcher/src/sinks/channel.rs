//! ChannelSink - in-process connection backed by an mpsc channel

use bytes::Bytes;
use contracts::{ContractError, NotificationSink};
use tokio::sync::mpsc;

/// Sink delivering payloads to an in-process receiver
///
/// Writable until the receiving side is dropped.
pub struct ChannelSink {
    id: String,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver its payloads arrive on
    pub fn new(id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: id.into(), tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_writable(&self) -> bool {
        !self.tx.is_closed()
    }

    fn write(&self, payload: Bytes) -> Result<(), ContractError> {
        self.tx
            .send(payload)
            .map_err(|_| ContractError::sink_unwritable(&self.id, "receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_sink_roundtrip() {
        let (sink, mut rx) = ChannelSink::new("conn-1");
        sink.write(Bytes::from_static(b"x")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"x"));
    }

    #[test]
    fn test_channel_sink_closed() {
        let (sink, rx) = ChannelSink::new("conn-1");
        drop(rx);
        assert!(!sink.is_writable());
        let err = sink.write(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, ContractError::SinkUnwritable { .. }));
    }
}
