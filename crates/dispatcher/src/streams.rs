//! ListenerRegistry - stream name to listener map
//!
//! Creates a stream's listener on first registration and tears it down once
//! its sink set became empty with no registration in flight.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use contracts::NotificationSink;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::listener::ListenerAdapter;
use crate::metrics::StreamMetricsSnapshot;

type Adapters = Mutex<HashMap<String, ListenerAdapter>>;

/// Owner of every stream's listener
pub struct ListenerRegistry {
    adapters: Arc<Adapters>,
    idle_tx: mpsc::UnboundedSender<String>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerRegistry {
    /// Create the registry and spawn its reaper task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let adapters: Arc<Adapters> = Arc::new(Mutex::new(HashMap::new()));
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        let reaper = tokio::spawn(reap_idle(Arc::downgrade(&adapters), idle_rx));

        Self {
            adapters,
            idle_tx,
            reaper: Mutex::new(Some(reaper)),
        }
    }

    /// Add `sink` to `stream`, creating the listener if needed
    pub fn register(&self, stream: &str, sink: Arc<dyn NotificationSink>) {
        let mut adapters = self.adapters.lock();
        let adapter = adapters.entry(stream.to_string()).or_insert_with(|| {
            info!(stream = %stream, "Stream listener created");
            ListenerAdapter::spawn(stream, self.idle_tx.clone())
        });
        adapter.register(sink);
    }

    /// Remove `sink_id` from `stream` (no-op for unknown streams)
    pub fn deregister(&self, stream: &str, sink_id: &str) {
        if let Some(adapter) = self.adapters.lock().get(stream) {
            adapter.deregister(sink_id);
        }
    }

    /// Queue `payload` for every sink on `stream`
    ///
    /// Returns `false` when the stream has no listener.
    pub fn deliver(&self, stream: &str, payload: Bytes) -> bool {
        match self.adapters.lock().get(stream) {
            Some(adapter) => adapter.deliver(payload),
            None => false,
        }
    }

    /// Whether `stream` currently has a listener
    pub fn has_listener(&self, stream: &str) -> bool {
        self.adapters.lock().contains_key(stream)
    }

    /// Sinks in `stream`'s set as of the last processed event
    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.adapters
            .lock()
            .get(stream)
            .map_or(0, ListenerAdapter::sink_count)
    }

    /// Metrics for every live stream, ordered by name
    pub fn metrics(&self) -> Vec<(String, StreamMetricsSnapshot)> {
        let mut all: Vec<_> = self
            .adapters
            .lock()
            .iter()
            .map(|(stream, adapter)| (stream.clone(), adapter.metrics().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Stop the reaper and every listener after draining their queues
    pub async fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }

        let adapters: Vec<ListenerAdapter> = self.adapters.lock().drain().map(|(_, a)| a).collect();
        for adapter in adapters {
            adapter.shutdown().await;
        }
        debug!("ListenerRegistry shutdown complete");
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ListenerRegistry {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.abort();
        }
    }
}

/// Remove listeners reported idle unless a registration raced in
async fn reap_idle(adapters: Weak<Adapters>, mut idle_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(stream) = idle_rx.recv().await {
        let Some(map) = adapters.upgrade() else {
            break;
        };

        let removed = {
            let mut adapters = map.lock();
            let idle = adapters
                .get(&stream)
                .is_some_and(|a| a.sink_count() == 0 && a.pending_registrations() == 0);
            if idle {
                adapters.remove(&stream)
            } else {
                None
            }
        };

        if let Some(adapter) = removed {
            info!(stream = %stream, "Stream listener removed, no subscribers left");
            adapter.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::ChannelSink;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_register_creates_listener() {
        let registry = ListenerRegistry::new();
        assert!(!registry.deliver("S", Bytes::from_static(b"X")));

        let (sink, mut rx) = ChannelSink::new("a");
        registry.register("S", Arc::new(sink));
        assert!(registry.has_listener("S"));
        assert!(registry.deliver("S", Bytes::from_static(b"X")));

        let payload = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"X")));
        assert_eq!(registry.subscriber_count("S"), 1);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_listener_reaped_after_last_deregister() {
        let registry = ListenerRegistry::new();
        let (sink, _rx) = ChannelSink::new("a");
        registry.register("S", Arc::new(sink));
        registry.deregister("S", "a");

        for _ in 0..50 {
            if !registry.has_listener("S") {
                break;
            }
            settle().await;
        }
        assert!(!registry.has_listener("S"));
        assert_eq!(registry.subscriber_count("S"), 0);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_streams_independent() {
        let registry = ListenerRegistry::new();
        let (a, mut rx_a) = ChannelSink::new("a");
        let (b, mut rx_b) = ChannelSink::new("b");
        registry.register("CONFIGURATION", Arc::new(a));
        registry.register("OPERATIONAL", Arc::new(b));

        registry.deliver("OPERATIONAL", Bytes::from_static(b"op"));
        let payload = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap();
        assert_eq!(payload, Some(Bytes::from_static(b"op")));
        assert!(rx_a.try_recv().is_err());
        assert_eq!(registry.metrics().len(), 2);

        registry.shutdown().await;
        assert!(!registry.has_listener("OPERATIONAL"));
    }
}
