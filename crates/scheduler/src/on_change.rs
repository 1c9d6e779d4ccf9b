//! Change-dampened trigger
//!
//! Optional sync-on-start snapshot, then after the start delay plus the
//! reply guard the trigger listens on the stream's partitions. At most one
//! notification leaves per dampening period; batches arriving inside the
//! window are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ChangeCallback, ChangeListenerRegistration, ChangeRecord, DataBroker, ModificationType,
    SubscriptionStatus,
};
use dispatcher::DispatchOutcome;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::trigger::{spawn_stop, TriggerContext, TriggerHandle, TriggerKind, Window};

/// Dampening parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnChangeSettings {
    pub dampening_period: Duration,
    pub no_synch_on_start: bool,
}

/// One change-feed callback invocation
struct FeedBatch {
    /// First batch of its registration, the listener's own snapshot read
    initial: bool,
    records: Vec<ChangeRecord>,
}

/// Closes the change-feed registrations when the trigger task ends
struct FeedGuard(Vec<Box<dyn ChangeListenerRegistration>>);

impl Drop for FeedGuard {
    fn drop(&mut self) {
        for registration in &self.0 {
            registration.close();
        }
    }
}

/// Arm an on-change trigger for `ctx`'s subscription
pub fn arm<B: DataBroker>(
    ctx: TriggerContext<B>,
    settings: OnChangeSettings,
    window: Window,
) -> TriggerHandle {
    info!(
        subscription_id = %ctx.id,
        dampening_ms = settings.dampening_period.as_millis() as u64,
        no_synch_on_start = settings.no_synch_on_start,
        start_delay_ms = window.start_delay.as_millis() as u64,
        "On-change trigger armed"
    );

    let stop = spawn_stop(&ctx, window);
    let (id, generation) = (ctx.id, ctx.generation);
    let fire = tokio::spawn(run(ctx, settings, window));

    TriggerHandle::new(id, generation, TriggerKind::OnChange, fire, stop)
}

async fn run<B: DataBroker>(ctx: TriggerContext<B>, settings: OnChangeSettings, window: Window) {
    let armed_at = Instant::now();

    if !settings.no_synch_on_start {
        sleep_until(armed_at + ctx.config.sync_on_start_delay).await;
        sync_on_start(&ctx).await;
    }

    sleep_until(armed_at + window.start_delay + ctx.config.reply_guard_delay).await;
    if !ctx.start().await {
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let Some(_guard) = listen(&ctx, tx).await else {
        return;
    };

    dampen(&ctx, settings.dampening_period, rx).await;
}

/// Push one snapshot while the subscription is still inactive
#[instrument(name = "on_change_sync_on_start", skip(ctx), fields(subscription_id = %ctx.id))]
async fn sync_on_start<B: DataBroker>(ctx: &TriggerContext<B>) {
    let activated = ctx
        .registry
        .transition_status(
            ctx.id,
            ctx.generation,
            SubscriptionStatus::Inactive,
            SubscriptionStatus::Active,
        )
        .await;
    if !activated {
        debug!(subscription_id = %ctx.id, "Already active, sync-on-start skipped");
        return;
    }

    let outcome = ctx.dispatcher.periodic_notification(ctx.id).await;
    debug!(subscription_id = %ctx.id, outcome = ?outcome, "Sync-on-start snapshot");

    ctx.registry
        .transition_status(
            ctx.id,
            ctx.generation,
            SubscriptionStatus::Active,
            SubscriptionStatus::Inactive,
        )
        .await;
}

/// Register on every partition of the subscription's stream
///
/// A registration failure is reported as an OAM error and the trigger
/// stops listening.
async fn listen<B: DataBroker>(
    ctx: &TriggerContext<B>,
    tx: mpsc::UnboundedSender<FeedBatch>,
) -> Option<FeedGuard> {
    let subscription = ctx.current().await?;
    let broker = ctx.registry.broker();
    let mut guard = FeedGuard(Vec::new());

    for &datastore in subscription.stream.datastores() {
        let seen_initial = AtomicBool::new(false);
        let tx = tx.clone();
        let callback: ChangeCallback = Arc::new(move |records: Vec<ChangeRecord>| {
            let initial = !seen_initial.swap(true, Ordering::AcqRel);
            let _ = tx.send(FeedBatch { initial, records });
        });

        match broker.register_change_listener(datastore, &subscription.path, callback) {
            Ok(registration) => guard.0.push(registration),
            Err(e) => {
                error!(
                    subscription_id = %ctx.id,
                    datastore = %datastore,
                    error = %e,
                    "Change listener registration failed"
                );
                ctx.dispatcher
                    .oam_notification(ctx.id, contracts::OamStatus::Error, Some(e.to_string()))
                    .await;
                return None;
            }
        }
    }

    debug!(
        subscription_id = %ctx.id,
        path = %subscription.path,
        partitions = guard.0.len(),
        "Listening for changes"
    );
    Some(guard)
}

async fn dampen<B: DataBroker>(
    ctx: &TriggerContext<B>,
    dampening_period: Duration,
    mut rx: mpsc::UnboundedReceiver<FeedBatch>,
) {
    let mut last_notified: Option<Instant> = None;

    while let Some(batch) = rx.recv().await {
        let now = Instant::now();
        if last_notified.is_some_and(|last| now < last + dampening_period) {
            debug!(subscription_id = %ctx.id, records = batch.records.len(), "Batch dampened");
            observability::record_notification_suppressed("dampened");
            continue;
        }

        let accepted = accepted_changes(batch);
        if accepted.is_empty() {
            continue;
        }

        if ctx.current().await.is_none() {
            debug!(subscription_id = %ctx.id, "Subscription gone, on-change trigger exits");
            return;
        }

        match ctx.dispatcher.on_change_notification(ctx.id, &accepted).await {
            DispatchOutcome::Queued => last_notified = Some(now),
            DispatchOutcome::Degraded => {
                warn!(subscription_id = %ctx.id, "Change notification degraded to OAM error")
            }
            DispatchOutcome::Suppressed(_) => {}
        }
    }
}

/// Records of `batch` that produce a notification
///
/// The registration snapshot's `Write` records are dropped, as is any
/// record without resulting data.
fn accepted_changes(batch: FeedBatch) -> Vec<ChangeRecord> {
    batch
        .records
        .into_iter()
        .filter(|record| !(batch.initial && record.modification == ModificationType::Write))
        .filter(ChangeRecord::has_data_after)
        .collect()
}
