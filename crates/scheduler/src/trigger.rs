//! Trigger ownership and the pieces shared by both trigger kinds
//!
//! A trigger is one fire task plus an optional stop-time task. Tasks hold
//! only `(id, generation)` and re-read the registry at every fire; a
//! missing record or a different generation ends the task quietly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contracts::{time, ContractError, DataBroker, OamStatus, Subscription, SubscriptionId};
use dispatcher::NotificationDispatcher;
use parking_lot::Mutex;
use registry::SubscriptionRegistry;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;

/// Kind of an armed trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Periodic,
    OnChange,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::OnChange => "on_change",
        }
    }
}

/// Handle to a running trigger
pub struct TriggerHandle {
    id: SubscriptionId,
    generation: u64,
    kind: TriggerKind,
    fire: JoinHandle<()>,
    stop: Option<JoinHandle<()>>,
}

impl TriggerHandle {
    pub fn new(
        id: SubscriptionId,
        generation: u64,
        kind: TriggerKind,
        fire: JoinHandle<()>,
        stop: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            generation,
            kind,
            fire,
            stop,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    /// Whether a stop-time timer is armed
    pub fn has_stop_timer(&self) -> bool {
        self.stop.is_some()
    }

    /// Cancel both tasks and wait until neither can produce output
    #[instrument(name = "trigger_cancel", skip(self), fields(subscription_id = %self.id, kind = self.kind.as_str()))]
    pub async fn cancel(self) {
        if let Some(stop) = self.stop {
            stop.abort();
            join_aborted(self.id, stop).await;
        }
        self.fire.abort();
        join_aborted(self.id, self.fire).await;
        debug!(subscription_id = %self.id, "Trigger cancelled");
    }

    /// Cancel the fire task only
    ///
    /// Used from the stop task itself, which must not await its own handle.
    async fn cancel_fire(self) {
        self.fire.abort();
        join_aborted(self.id, self.fire).await;
    }
}

async fn join_aborted(id: SubscriptionId, handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        if e.is_panic() {
            error!(subscription_id = %id, error = ?e, "Trigger task panicked");
        }
    }
}

/// Every armed trigger, keyed by subscription id
#[derive(Default)]
pub struct TriggerSet {
    handles: Mutex<HashMap<SubscriptionId, TriggerHandle>>,
}

impl TriggerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle`, returning the one it replaces
    pub fn insert(&self, handle: TriggerHandle) -> Option<TriggerHandle> {
        self.handles.lock().insert(handle.id, handle)
    }

    /// Remove the trigger of `id`
    pub fn take(&self, id: SubscriptionId) -> Option<TriggerHandle> {
        self.handles.lock().remove(&id)
    }

    /// Remove the trigger of `id` only if it was armed for `generation`
    pub fn take_generation(&self, id: SubscriptionId, generation: u64) -> Option<TriggerHandle> {
        let mut handles = self.handles.lock();
        match handles.get(&id) {
            Some(handle) if handle.generation == generation => handles.remove(&id),
            _ => None,
        }
    }

    /// Remove every trigger
    pub fn drain(&self) -> Vec<TriggerHandle> {
        self.handles.lock().drain().map(|(_, handle)| handle).collect()
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.handles.lock().contains_key(&id)
    }

    /// Kind of the trigger armed for `id`
    pub fn kind(&self, id: SubscriptionId) -> Option<TriggerKind> {
        self.handles.lock().get(&id).map(TriggerHandle::kind)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }
}

/// Shared state a trigger task needs at fire time
pub struct TriggerContext<B: DataBroker> {
    pub id: SubscriptionId,
    pub generation: u64,
    pub registry: Arc<SubscriptionRegistry<B>>,
    pub dispatcher: Arc<NotificationDispatcher<B>>,
    pub triggers: Arc<TriggerSet>,
    pub config: SchedulerConfig,
}

impl<B: DataBroker> Clone for TriggerContext<B> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            generation: self.generation,
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            triggers: Arc::clone(&self.triggers),
            config: self.config,
        }
    }
}

impl<B: DataBroker> TriggerContext<B> {
    /// Current record if the trigger is not stale
    pub async fn current(&self) -> Option<Subscription> {
        self.registry.get_current(self.id, self.generation).await
    }

    /// Flip `inactive` to `active` and announce the start
    ///
    /// Returns `false` when the subscription is gone.
    pub async fn start(&self) -> bool {
        let Some(subscription) = self.current().await else {
            return false;
        };

        if !subscription.is_active() {
            self.registry
                .transition_status(
                    self.id,
                    self.generation,
                    contracts::SubscriptionStatus::Inactive,
                    contracts::SubscriptionStatus::Active,
                )
                .await;
        }

        info!(subscription_id = %self.id, stream = %subscription.stream.name(), "Subscription started");
        self.dispatcher
            .oam_notification(self.id, OamStatus::SubscriptionStarted, None)
            .await;
        true
    }

    /// Stop-time action: end the stream and delete the subscription
    ///
    /// Only the generation this trigger was armed for is deleted; a record
    /// replaced by a concurrent modify keeps running.
    #[instrument(name = "trigger_stop", skip(self), fields(subscription_id = %self.id))]
    pub async fn stop(&self) {
        let Some(handle) = self.triggers.take_generation(self.id, self.generation) else {
            debug!(subscription_id = %self.id, "Stop time reached for a replaced trigger");
            return;
        };
        handle.cancel_fire().await;

        let Some(last_seen) = self.current().await else {
            return;
        };
        let removed = match self.registry.delete_generation(self.id, self.generation).await {
            Ok(removed) => {
                info!(subscription_id = %self.id, "Stop time reached, subscription deleted");
                removed
            }
            Err(ContractError::NotFound { .. }) => {
                debug!(subscription_id = %self.id, "Stop time reached for a replaced record");
                return;
            }
            Err(e) => {
                // the local entry is removed even when the mirror rejects it
                error!(subscription_id = %self.id, error = %e, "Stop time reached, mirror delete failed");
                last_seen
            }
        };

        self.dispatcher.unregister_notification(self.id);
        self.dispatcher
            .final_oam_notification(&removed, OamStatus::NotificationComplete);
        self.dispatcher.forget(self.id);
        observability::record_active_subscriptions(self.registry.len().await);
    }
}

/// Delays derived from a subscription's time window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Time until the start time, zero when absent or past
    pub start_delay: Duration,
    /// Time until the stop time, `None` when absent or past
    pub stop_delay: Option<Duration>,
}

impl Window {
    /// Compute delays from the subscription pair, falling back to the
    /// notification-stream pair
    ///
    /// A malformed timestamp is logged and treated as absent.
    pub fn of(subscription: &Subscription) -> Self {
        let now = Utc::now();
        let start = subscription
            .subscription_start_time
            .as_deref()
            .or(subscription.start_time.as_deref());
        let stop = subscription
            .subscription_stop_time
            .as_deref()
            .or(subscription.stop_time.as_deref());

        let start_delay = parse(subscription.id, start)
            .map_or(Duration::ZERO, |instant| time::delay_until(instant, now));
        let stop_delay = parse(subscription.id, stop)
            .filter(|instant| *instant > now)
            .map(|instant| time::delay_until(instant, now));

        Self {
            start_delay,
            stop_delay,
        }
    }
}

fn parse(id: SubscriptionId, value: Option<&str>) -> Option<chrono::DateTime<Utc>> {
    let value = value?;
    match time::parse_instant(value) {
        Ok(instant) => Some(instant),
        Err(e) => {
            warn!(subscription_id = %id, error = %e, "Ignoring malformed time constraint");
            None
        }
    }
}

/// Spawn the stop-time task if the window has one
pub fn spawn_stop<B: DataBroker>(ctx: &TriggerContext<B>, window: Window) -> Option<JoinHandle<()>> {
    let delay = window.stop_delay?;
    let ctx = ctx.clone();
    debug!(subscription_id = %ctx.id, delay_ms = delay.as_millis() as u64, "Stop timer armed");
    Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        ctx.stop().await;
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{StreamKind, SubscriptionParams};

    fn subscription(start: Option<&str>, stop: Option<&str>) -> Subscription {
        let mut params = SubscriptionParams::periodic(
            StreamKind::Operational,
            "/interfaces".parse().unwrap(),
            Duration::from_secs(1),
        );
        params.subscription_start_time = start.map(str::to_string);
        params.stop_time = stop.map(str::to_string);
        Subscription::from_params(SubscriptionId::new(1), params)
    }

    #[test]
    fn test_window_without_times() {
        let window = Window::of(&subscription(None, None));
        assert_eq!(window.start_delay, Duration::ZERO);
        assert_eq!(window.stop_delay, None);
    }

    #[test]
    fn test_window_past_and_future() {
        let future = time::format_instant(Utc::now() + chrono::Duration::hours(1));
        let window = Window::of(&subscription(Some("2000-01-01T00:00:00Z"), Some(&future)));

        assert_eq!(window.start_delay, Duration::ZERO);
        let stop = window.stop_delay.unwrap();
        assert!(stop > Duration::from_secs(3500) && stop <= Duration::from_secs(3600));
    }

    #[test]
    fn test_window_past_stop_ignored() {
        let window = Window::of(&subscription(None, Some("2000-01-01T00:00:00.5Z")));
        assert_eq!(window.stop_delay, None);
    }

    #[test]
    fn test_window_malformed_is_unconstrained() {
        let window = Window::of(&subscription(Some("yesterday"), Some("tomorrow")));
        assert_eq!(window.start_delay, Duration::ZERO);
        assert_eq!(window.stop_delay, None);
    }

    #[tokio::test]
    async fn test_trigger_set_generation_guard() {
        let set = TriggerSet::new();
        let id = SubscriptionId::new(7);
        let fire = tokio::spawn(std::future::pending::<()>());
        set.insert(TriggerHandle::new(id, 2, TriggerKind::Periodic, fire, None));

        assert!(set.take_generation(id, 1).is_none());
        assert_eq!(set.kind(id), Some(TriggerKind::Periodic));

        let handle = set.take_generation(id, 2).unwrap();
        assert!(set.is_empty());
        handle.cancel().await;
    }

    #[tokio::test]
    async fn test_stop_spares_modified_record() {
        let broker = Arc::new(datastore::MemoryBroker::new());
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&broker)));
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::clone(&registry)));
        let triggers = Arc::new(TriggerSet::new());

        let sub = subscription(None, None);
        let id = sub.id;
        registry.create(sub.clone()).await.unwrap();

        // stop timer of generation 0 still armed while a modify lands
        let fire = tokio::spawn(std::future::pending::<()>());
        triggers.insert(TriggerHandle::new(id, 0, TriggerKind::Periodic, fire, None));
        registry.modify(sub).await.unwrap();

        let ctx = TriggerContext {
            id,
            generation: 0,
            registry: Arc::clone(&registry),
            dispatcher,
            triggers: Arc::clone(&triggers),
            config: SchedulerConfig::default(),
        };
        ctx.stop().await;

        assert_eq!(registry.get(id).await.unwrap().generation, 1);
        assert!(broker.mirror_record(id).is_some());
        let ops: Vec<_> = broker.mirror_log().iter().map(|e| e.operation).collect();
        assert!(!ops.contains(&contracts::MirrorOperation::Delete));
        assert!(triggers.is_empty());
    }
}
