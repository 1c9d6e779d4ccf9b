//! SubscriptionService - establish/modify/delete and sink attachment
//!
//! Owns the registry, the dispatcher and every armed trigger. Triggers are
//! cancelled and awaited before the record they were armed for changes, so
//! no output is produced with old parameters once a call returns.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    time, DataBroker, NotificationSink, StreamKind, Subscription, SubscriptionId,
    SubscriptionParams, Trigger,
};
use dispatcher::{NotificationDispatcher, StreamMetricsSnapshot};
use registry::SubscriptionRegistry;
use tracing::{info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::on_change::{self, OnChangeSettings};
use crate::periodic;
use crate::trigger::{TriggerContext, TriggerKind, TriggerSet, Window};

type Result<T> = std::result::Result<T, SchedulerError>;

/// Control surface of the push engine
pub struct SubscriptionService<B: DataBroker> {
    registry: Arc<SubscriptionRegistry<B>>,
    dispatcher: Arc<NotificationDispatcher<B>>,
    triggers: Arc<TriggerSet>,
    config: SchedulerConfig,
}

impl<B: DataBroker> SubscriptionService<B> {
    /// Create a service on top of `broker`
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(broker: Arc<B>, config: SchedulerConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(broker));
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&registry)));

        Self {
            registry,
            dispatcher,
            triggers: Arc::new(TriggerSet::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry<B>> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher<B>> {
        &self.dispatcher
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    /// Create a subscription and arm its trigger
    ///
    /// When the mirror write fails the record stays in the registry and its
    /// trigger is armed anyway; the error is still returned so the client
    /// learns the store is out of sync.
    #[instrument(
        name = "service_establish",
        skip(self, params),
        fields(stream = %params.stream.name(), path = %params.path)
    )]
    pub async fn establish(&self, params: SubscriptionParams) -> Result<SubscriptionId> {
        let id = self.registry.generate_id();
        let subscription = Subscription::from_params(id, normalized(id, params));
        validate_trigger(&subscription)?;

        let created = self.registry.create(subscription.clone()).await;
        if let Err(e) = created {
            if !e.is_mirror_failure() {
                return Err(e.into());
            }
            warn!(subscription_id = %id, "Arming subscription without a stored mirror record");
            self.arm(&subscription);
            observability::record_active_subscriptions(self.registry.len().await);
            return Err(e.into());
        }
        self.arm(&subscription);
        observability::record_active_subscriptions(self.registry.len().await);

        info!(
            subscription_id = %id,
            stream = %subscription.stream.name(),
            trigger = ?subscription.trigger,
            "Subscription established"
        );
        Ok(id)
    }

    /// Replace the parameters of `id` and re-arm its trigger
    ///
    /// A failed mirror write keeps the new parameters locally and re-arms
    /// for them before the error is returned.
    #[instrument(name = "service_modify", skip(self, params), fields(subscription_id = %id))]
    pub async fn modify(&self, id: SubscriptionId, params: SubscriptionParams) -> Result<()> {
        let subscription = Subscription::from_params(id, normalized(id, params));
        validate_trigger(&subscription)?;
        self.registry.get(id).await?;

        self.cancel_trigger(id).await;
        let updated = match self.registry.modify(subscription).await {
            Ok(updated) => updated,
            Err(e) if e.is_mirror_failure() => {
                if let Ok(kept) = self.registry.get(id).await {
                    warn!(
                        subscription_id = %id,
                        generation = kept.generation,
                        "Re-arming modified subscription without a stored mirror record"
                    );
                    self.arm(&kept);
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        self.arm(&updated);

        info!(subscription_id = %id, generation = updated.generation, "Subscription modified");
        Ok(())
    }

    /// Cancel the trigger of `id` and remove the subscription
    #[instrument(name = "service_delete", skip(self), fields(subscription_id = %id))]
    pub async fn delete(&self, id: SubscriptionId) -> Result<()> {
        self.registry.get(id).await?;

        self.cancel_trigger(id).await;
        self.dispatcher.unregister_notification(id);
        let result = self.registry.delete(id).await;
        self.dispatcher.forget(id);
        observability::record_active_subscriptions(self.registry.len().await);

        result?;
        info!(subscription_id = %id, "Subscription deleted");
        Ok(())
    }

    /// Attach a client connection to `stream`
    pub fn attach(&self, stream: StreamKind, sink: Arc<dyn NotificationSink>) {
        self.dispatcher.register_sink(stream.name(), sink);
    }

    /// Detach a client connection from `stream`
    pub fn detach(&self, stream: StreamKind, sink_id: &str) {
        self.dispatcher.deregister_sink(stream.name(), sink_id);
    }

    pub async fn get(&self, id: SubscriptionId) -> Result<Subscription> {
        Ok(self.registry.get(id).await?)
    }

    /// Every subscription ordered by id
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        self.registry.list().await
    }

    /// Kind of the trigger armed for `id`
    pub fn trigger_kind(&self, id: SubscriptionId) -> Option<TriggerKind> {
        self.triggers.kind(id)
    }

    /// Number of armed triggers
    pub fn armed_triggers(&self) -> usize {
        self.triggers.len()
    }

    /// Per-stream fan-out metrics
    pub fn stream_metrics(&self) -> Vec<(String, StreamMetricsSnapshot)> {
        self.dispatcher.stream_metrics()
    }

    /// Cancel every trigger and stop the stream listeners
    ///
    /// Subscriptions stay in the registry.
    #[instrument(name = "service_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let handles = self.triggers.drain();
        let cancelled = handles.len();
        for handle in handles {
            handle.cancel().await;
        }
        self.dispatcher.shutdown().await;
        info!(triggers = cancelled, "SubscriptionService shutdown complete");
    }

    fn arm(&self, subscription: &Subscription) {
        let ctx = TriggerContext {
            id: subscription.id,
            generation: subscription.generation,
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            triggers: Arc::clone(&self.triggers),
            config: self.config,
        };
        let window = Window::of(subscription);

        let handle = match subscription.trigger {
            Trigger::Periodic { period_ms } => {
                periodic::arm(ctx, Duration::from_millis(period_ms), window)
            }
            Trigger::OnChange {
                dampening_period_ms,
                no_synch_on_start,
            } => on_change::arm(
                ctx,
                OnChangeSettings {
                    dampening_period: Duration::from_millis(dampening_period_ms),
                    no_synch_on_start,
                },
                window,
            ),
        };

        if let Some(previous) = self.triggers.insert(handle) {
            // modify cancels first; a leftover here belongs to a racing call
            warn!(subscription_id = %subscription.id, "Replacing an armed trigger");
            tokio::spawn(previous.cancel());
        }
    }

    async fn cancel_trigger(&self, id: SubscriptionId) {
        if let Some(handle) = self.triggers.take(id) {
            handle.cancel().await;
        }
    }
}

fn validate_trigger(subscription: &Subscription) -> Result<()> {
    subscription
        .trigger
        .validate()
        .map_err(|e| SchedulerError::invalid_schedule(subscription.id, e.to_string()))
}

/// Canonicalize time constraints; malformed ones are dropped with a warning
fn normalized(id: SubscriptionId, mut params: SubscriptionParams) -> SubscriptionParams {
    for slot in [
        &mut params.subscription_start_time,
        &mut params.subscription_stop_time,
        &mut params.start_time,
        &mut params.stop_time,
    ] {
        *slot = match time::normalize(slot.as_deref()) {
            Ok(value) => value,
            Err(e) => {
                warn!(subscription_id = %id, error = %e, "Dropping malformed time constraint");
                None
            }
        };
    }
    params
}
