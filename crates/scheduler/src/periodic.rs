//! Periodic trigger
//!
//! First fire after the start delay plus the reply guard, then every
//! `period`. The first fire activates the subscription and announces it.

use std::time::Duration;

use contracts::DataBroker;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::trigger::{spawn_stop, TriggerContext, TriggerHandle, TriggerKind, Window};

/// Arm a periodic trigger for `ctx`'s subscription
pub fn arm<B: DataBroker>(ctx: TriggerContext<B>, period: Duration, window: Window) -> TriggerHandle {
    let first_fire = window.start_delay + ctx.config.reply_guard_delay;
    info!(
        subscription_id = %ctx.id,
        period_ms = period.as_millis() as u64,
        first_fire_ms = first_fire.as_millis() as u64,
        "Periodic trigger armed"
    );

    let stop = spawn_stop(&ctx, window);
    let (id, generation) = (ctx.id, ctx.generation);
    let fire = tokio::spawn(run(ctx, period, first_fire));

    TriggerHandle::new(id, generation, TriggerKind::Periodic, fire, stop)
}

async fn run<B: DataBroker>(ctx: TriggerContext<B>, period: Duration, first_fire: Duration) {
    let mut ticker = interval_at(Instant::now() + first_fire, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    ticker.tick().await;
    if !ctx.start().await {
        return;
    }

    loop {
        if ctx.current().await.is_none() {
            debug!(subscription_id = %ctx.id, "Subscription gone, periodic trigger exits");
            return;
        }
        ctx.dispatcher.periodic_notification(ctx.id).await;
        ticker.tick().await;
    }
}
