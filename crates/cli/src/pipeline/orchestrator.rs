//! Engine orchestrator - wires store, sinks, subscriptions and simulation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{ServiceBlueprint, SimulationConfig};
use datastore::MemoryBroker;
use scheduler::{SchedulerConfig, SubscriptionService};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parsed and validated service configuration
    pub blueprint: ServiceBlueprint,

    /// Run time (None = until the shutdown signal)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Run the configured change simulation
    pub simulate: bool,
}

/// Main engine orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or the timeout elapses
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let broker = MemoryBroker::new();
        for entry in &blueprint.seed {
            broker.put(entry.datastore, &entry.path, entry.value.clone());
        }
        info!(entries = blueprint.seed.len(), "Data store seeded");

        let service = SubscriptionService::new(
            Arc::new(broker.clone()),
            SchedulerConfig::from(&blueprint.service),
        );

        let mut stats = PipelineStats::default();

        for sink_config in &blueprint.sinks {
            let sink = dispatcher::create_sink(sink_config).await.map_err(|e| {
                CliError::sink_attach(&sink_config.name, sink_config.stream, e.to_string())
            })?;
            service.attach(sink_config.stream, sink);
            stats.sinks_attached += 1;
        }
        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - notifications will be dropped");
        }

        for entry in &blueprint.subscriptions {
            match service.establish(entry.to_params()).await {
                Ok(id) => {
                    debug!(subscription_id = %id, stream = %entry.stream, "Configured subscription established");
                    stats.subscriptions_established += 1;
                }
                Err(e) => {
                    error!(stream = %entry.stream, path = %entry.path, error = %e, "Establish failed");
                    stats.establish_failures += 1;
                }
            }
        }

        if stats.subscriptions_established == 0 && !blueprint.subscriptions.is_empty() {
            service.shutdown().await;
            return Err(CliError::execution("no configured subscription could be established").into());
        }

        let simulation = match (&blueprint.simulation, self.config.simulate) {
            (Some(simulation), true) => Some(spawn_simulation(broker.clone(), simulation.clone())),
            _ => None,
        };

        info!(
            subscriptions = stats.subscriptions_established,
            sinks = stats.sinks_attached,
            simulation = simulation.is_some(),
            "Engine running"
        );

        let deadline = async {
            match self.config.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown => warn!("Received shutdown signal, stopping engine..."),
            _ = deadline => info!("Run time elapsed, stopping engine..."),
        }

        info!("Shutting down engine...");
        if let Some((task, ticks)) = simulation {
            task.abort();
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Simulation task panicked");
                }
            }
            stats.simulated_changes = ticks.load(Ordering::Relaxed);
        }

        stats.active_subscriptions = service.subscriptions().await.len();
        stats.streams = service.stream_metrics();
        stats.mirror_records = broker.mirror_records().len();
        service.shutdown().await;

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            "Engine shutdown complete"
        );

        Ok(stats)
    }
}

/// Rewrite the simulation leaf with a counter on every tick
///
/// The task never ends on its own; it is aborted at shutdown.
fn spawn_simulation(
    broker: MemoryBroker,
    config: SimulationConfig,
) -> (JoinHandle<()>, Arc<AtomicU64>) {
    info!(
        datastore = %config.datastore,
        path = %config.path,
        interval_ms = config.interval_ms,
        "Change simulation started"
    );

    let ticks = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&ticks);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval());
        loop {
            ticker.tick().await;
            let tick = counter.fetch_add(1, Ordering::Relaxed) + 1;
            broker.put(config.datastore, &config.path, json!(tick));
        }
    });
    (task, ticks)
}

/// Load a blueprint for `run`, applying CLI overrides
pub fn load_blueprint(path: &std::path::Path, reply_guard_ms: Option<u64>) -> Result<ServiceBlueprint> {
    crate::error::ensure_config_exists(path)?;

    let mut blueprint = config_loader::ConfigLoader::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(ms) = reply_guard_ms {
        info!(reply_guard_ms = ms, "Overriding reply guard delay from CLI");
        blueprint.service.reply_guard_delay_ms = ms;
    }
    Ok(blueprint)
}
