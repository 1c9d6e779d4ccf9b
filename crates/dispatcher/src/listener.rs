//! ListenerAdapter - one ordered event queue per stream
//!
//! A single worker task owns the stream's sink set and processes
//! `Register`, `Deregister` and `Deliver` in arrival order, so a delivery
//! always sees the set as of the events queued before it. Different
//! streams run on independent tasks.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use contracts::NotificationSink;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::StreamMetrics;

/// Event processed by a stream's worker
pub enum ListenerEvent {
    Register(Arc<dyn NotificationSink>),
    Deregister(String),
    Deliver(Bytes),
}

/// Handle to a running stream worker
pub struct ListenerAdapter {
    /// Stream name
    stream: String,
    /// Channel to send events to worker
    tx: mpsc::UnboundedSender<ListenerEvent>,
    /// Registrations queued but not yet applied
    pending: Arc<AtomicUsize>,
    /// Shared metrics
    metrics: Arc<StreamMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl ListenerAdapter {
    /// Spawn the worker for `stream`
    ///
    /// After a deregistration leaves the set empty the worker sends the
    /// stream name on `idle_tx`.
    pub fn spawn(stream: impl Into<String>, idle_tx: mpsc::UnboundedSender<String>) -> Self {
        let stream = stream.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(StreamMetrics::new());

        let worker = StreamWorker {
            stream: stream.clone(),
            sinks: Vec::new(),
            pending: Arc::clone(&pending),
            metrics: Arc::clone(&metrics),
            idle_tx,
        };
        let worker_handle = tokio::spawn(worker.run(rx));

        Self {
            stream,
            tx,
            pending,
            metrics,
            worker_handle,
        }
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<StreamMetrics> {
        &self.metrics
    }

    /// Sinks currently in the set (as of the last processed event)
    pub fn sink_count(&self) -> usize {
        self.metrics.sink_count()
    }

    /// Registrations not yet applied by the worker
    pub fn pending_registrations(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Queue a sink registration
    pub fn register(&self, sink: Arc<dyn NotificationSink>) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.send(ListenerEvent::Register(sink)) {
            true
        } else {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            false
        }
    }

    /// Queue a sink removal
    pub fn deregister(&self, sink_id: impl Into<String>) -> bool {
        self.send(ListenerEvent::Deregister(sink_id.into()))
    }

    /// Queue a payload for every sink in the set
    pub fn deliver(&self, payload: Bytes) -> bool {
        self.send(ListenerEvent::Deliver(payload))
    }

    fn send(&self, event: ListenerEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                error!(stream = %self.stream, "Listener worker closed unexpectedly");
                false
            }
        }
    }

    /// Stop the worker after it drained the queued events
    #[instrument(name = "listener_adapter_shutdown", skip(self), fields(stream = %self.stream))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(stream = %self.stream, error = ?e, "Listener worker panicked");
        }
        debug!(stream = %self.stream, "ListenerAdapter shutdown complete");
    }
}

/// State owned by the worker task
struct StreamWorker {
    stream: String,
    sinks: Vec<Arc<dyn NotificationSink>>,
    pending: Arc<AtomicUsize>,
    metrics: Arc<StreamMetrics>,
    idle_tx: mpsc::UnboundedSender<String>,
}

impl StreamWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ListenerEvent>) {
        debug!(stream = %self.stream, "Listener worker started");

        while let Some(event) = rx.recv().await {
            match event {
                ListenerEvent::Register(sink) => self.register(sink),
                ListenerEvent::Deregister(sink_id) => self.deregister(&sink_id),
                ListenerEvent::Deliver(payload) => self.deliver(payload),
            }
            self.metrics.set_sink_count(self.sinks.len());
        }

        debug!(stream = %self.stream, sinks = self.sinks.len(), "Listener worker stopped");
    }

    fn register(&mut self, sink: Arc<dyn NotificationSink>) {
        if self.sinks.iter().any(|s| s.id() == sink.id()) {
            debug!(stream = %self.stream, sink = %sink.id(), "Sink already registered");
        } else {
            debug!(stream = %self.stream, sink = %sink.id(), "Sink registered");
            self.sinks.push(sink);
        }
        // Count after the set changed so the reaper never sees both at zero
        self.metrics.set_sink_count(self.sinks.len());
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }

    fn deregister(&mut self, sink_id: &str) {
        self.sinks.retain(|s| s.id() != sink_id);
        debug!(stream = %self.stream, sink = %sink_id, remaining = self.sinks.len(), "Sink deregistered");
        self.sync_sink_count();
    }

    fn sync_sink_count(&self) {
        self.metrics.set_sink_count(self.sinks.len());
        if self.sinks.is_empty() {
            let _ = self.idle_tx.send(self.stream.clone());
        }
    }

    fn deliver(&mut self, payload: Bytes) {
        self.metrics.inc_deliveries();
        let stream = &self.stream;
        let metrics = &self.metrics;

        self.sinks.retain(|sink| {
            if !sink.is_writable() {
                debug!(stream = %stream, sink = %sink.id(), "Sink not writable, removed");
                metrics.inc_pruned_count();
                observability::record_sink_pruned(stream);
                return false;
            }

            match sink.write(payload.clone()) {
                Ok(()) => {
                    metrics.inc_write_count();
                    true
                }
                Err(e) => {
                    warn!(stream = %stream, sink = %sink.id(), error = %e, "Write failed, sink removed");
                    metrics.inc_failure_count();
                    metrics.inc_pruned_count();
                    observability::record_sink_pruned(stream);
                    false
                }
            }
        });

        if self.metrics.sink_count() != self.sinks.len() {
            self.sync_sink_count();
        }
    }
}
