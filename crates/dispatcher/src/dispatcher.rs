//! NotificationDispatcher - render and hand off to the stream listeners
//!
//! Triggers call in with a subscription id only; the dispatcher re-reads
//! the current record, renders the payload and queues it on the stream's
//! listener. Failures while reading or rendering degrade into an OAM
//! `error` event for that subscription and never reach the trigger.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    ChangeRecord, DataBroker, NotificationKind, NotificationSink, OamStatus, Subscription,
    SubscriptionId,
};
use parking_lot::Mutex;
use registry::SubscriptionRegistry;
use tracing::{debug, error, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::StreamMetricsSnapshot;
use crate::render;
use crate::streams::ListenerRegistry;

/// Why no notification was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// `unregister_notification` was called for the id
    Unregistered,
    /// Subscription not active yet
    Inactive,
    /// Subscription no longer in the registry
    Gone,
    /// Filter removed every change
    Filtered,
    /// Nobody listens on the stream
    NoListener,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::Inactive => "inactive",
            Self::Gone => "gone",
            Self::Filtered => "filtered",
            Self::NoListener => "no_listener",
        }
    }
}

/// Result of one dispatch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Payload queued on the stream's listener
    Queued,
    /// Nothing produced
    Suppressed(SuppressReason),
    /// Rendering or reading failed; an OAM error was emitted instead
    Degraded,
}

/// Notification dispatcher
pub struct NotificationDispatcher<B: DataBroker> {
    registry: Arc<SubscriptionRegistry<B>>,
    listeners: ListenerRegistry,
    unregistered: Mutex<HashSet<SubscriptionId>>,
}

impl<B: DataBroker> NotificationDispatcher<B> {
    /// Create a dispatcher reading records from `registry`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(registry: Arc<SubscriptionRegistry<B>>) -> Self {
        Self {
            registry,
            listeners: ListenerRegistry::new(),
            unregistered: Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry<B>> {
        &self.registry
    }

    /// Attach a sink to a stream
    pub fn register_sink(&self, stream: &str, sink: Arc<dyn NotificationSink>) {
        debug!(stream = %stream, sink = %sink.id(), "Registering sink");
        self.listeners.register(stream, sink);
        observability::record_stream_sinks(stream, self.listeners.subscriber_count(stream));
    }

    /// Detach a sink from a stream
    pub fn deregister_sink(&self, stream: &str, sink_id: &str) {
        debug!(stream = %stream, sink = %sink_id, "Deregistering sink");
        self.listeners.deregister(stream, sink_id);
    }

    /// Sinks attached to `stream`
    pub fn subscriber_count(&self, stream: &str) -> usize {
        self.listeners.subscriber_count(stream)
    }

    /// Per-stream fan-out metrics
    pub fn stream_metrics(&self) -> Vec<(String, StreamMetricsSnapshot)> {
        self.listeners.metrics()
    }

    /// Emit an administrative event
    ///
    /// Not subject to dampening, period or the unregistered flag.
    #[instrument(name = "dispatcher_oam", skip(self, detail), fields(subscription_id = %id, status = %status))]
    pub async fn oam_notification(
        &self,
        id: SubscriptionId,
        status: OamStatus,
        detail: Option<String>,
    ) -> DispatchOutcome {
        let Ok(subscription) = self.registry.get(id).await else {
            return self.suppress(id, SuppressReason::Gone);
        };
        self.emit_oam(&subscription, status, detail)
    }

    /// Emit an administrative event for a record already removed from the
    /// registry
    pub fn final_oam_notification(
        &self,
        subscription: &Subscription,
        status: OamStatus,
    ) -> DispatchOutcome {
        self.emit_oam(subscription, status, None)
    }

    /// Render and deliver a snapshot of the subscribed subtree
    #[instrument(name = "dispatcher_periodic", skip(self), fields(subscription_id = %id))]
    pub async fn periodic_notification(&self, id: SubscriptionId) -> DispatchOutcome {
        let subscription = match self.deliverable(id).await {
            Ok(subscription) => subscription,
            Err(reason) => return self.suppress(id, reason),
        };

        let mut contents = Vec::with_capacity(subscription.stream.datastores().len());
        for &datastore in subscription.stream.datastores() {
            match self
                .registry
                .broker()
                .read(datastore, &subscription.path)
                .await
            {
                Ok(data) => contents.push((datastore, data)),
                Err(e) => return self.degrade(&subscription, e.into()),
            }
        }

        let rendered = render::push_update(&subscription, contents)
            .and_then(|notification| notification.to_bytes(id));
        match rendered {
            Ok(payload) => self.deliver(&subscription, NotificationKind::PushUpdate, payload),
            Err(e) => self.degrade(&subscription, e),
        }
    }

    /// Render and deliver one accepted change batch
    #[instrument(
        name = "dispatcher_on_change",
        skip(self, changes),
        fields(subscription_id = %id, changes = changes.len())
    )]
    pub async fn on_change_notification(
        &self,
        id: SubscriptionId,
        changes: &[ChangeRecord],
    ) -> DispatchOutcome {
        let subscription = match self.deliverable(id).await {
            Ok(subscription) => subscription,
            Err(reason) => return self.suppress(id, reason),
        };

        let rendered = render::push_change_update(&subscription, changes)
            .and_then(|notification| notification.map(|n| n.to_bytes(id)).transpose());
        match rendered {
            Ok(Some(payload)) => {
                self.deliver(&subscription, NotificationKind::PushChangeUpdate, payload)
            }
            Ok(None) => self.suppress(id, SuppressReason::Filtered),
            Err(e) => self.degrade(&subscription, e),
        }
    }

    /// Stop producing data notifications for `id` (idempotent)
    pub fn unregister_notification(&self, id: SubscriptionId) {
        if self.unregistered.lock().insert(id) {
            debug!(subscription_id = %id, "Notifications unregistered");
        }
    }

    pub fn is_unregistered(&self, id: SubscriptionId) -> bool {
        self.unregistered.lock().contains(&id)
    }

    /// Drop the unregistered mark of a deleted subscription
    ///
    /// Ids are never reassigned, so this only bounds the set.
    pub fn forget(&self, id: SubscriptionId) {
        self.unregistered.lock().remove(&id);
    }

    /// Stop every stream listener after draining queued events
    pub async fn shutdown(&self) {
        self.listeners.shutdown().await;
    }

    async fn deliverable(&self, id: SubscriptionId) -> Result<Subscription, SuppressReason> {
        if self.is_unregistered(id) {
            return Err(SuppressReason::Unregistered);
        }
        let subscription = self
            .registry
            .get(id)
            .await
            .map_err(|_| SuppressReason::Gone)?;
        if !subscription.is_active() {
            return Err(SuppressReason::Inactive);
        }
        Ok(subscription)
    }

    fn emit_oam(
        &self,
        subscription: &Subscription,
        status: OamStatus,
        detail: Option<String>,
    ) -> DispatchOutcome {
        observability::record_oam(status);
        match render::oam(subscription, status, detail).to_bytes(subscription.id) {
            Ok(payload) => self.deliver(subscription, NotificationKind::Oam, payload),
            Err(e) => {
                error!(subscription_id = %subscription.id, error = %e, "OAM encoding failed");
                DispatchOutcome::Degraded
            }
        }
    }

    fn deliver(
        &self,
        subscription: &Subscription,
        kind: NotificationKind,
        payload: Bytes,
    ) -> DispatchOutcome {
        let stream = subscription.stream.name();
        let len = payload.len();

        if !self.listeners.deliver(stream, payload) {
            return self.suppress(subscription.id, SuppressReason::NoListener);
        }

        observability::record_notification_sent(kind, stream, len);
        debug!(
            subscription_id = %subscription.id,
            stream = %stream,
            kind = %kind,
            bytes = len,
            "Notification queued"
        );
        DispatchOutcome::Queued
    }

    fn suppress(&self, id: SubscriptionId, reason: SuppressReason) -> DispatchOutcome {
        observability::record_notification_suppressed(reason.as_str());
        match reason {
            SuppressReason::Unregistered => {
                warn!(subscription_id = %id, "Notification suppressed, subscription unregistered")
            }
            _ => debug!(subscription_id = %id, reason = reason.as_str(), "Notification suppressed"),
        }
        DispatchOutcome::Suppressed(reason)
    }

    fn degrade(&self, subscription: &Subscription, e: DispatcherError) -> DispatchOutcome {
        error!(subscription_id = %subscription.id, error = %e, "Notification rendering failed");
        self.emit_oam(subscription, OamStatus::Error, Some(e.to_string()));
        DispatchOutcome::Degraded
    }
}
