//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{load_blueprint, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_engine(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let blueprint = load_blueprint(&args.config, args.reply_guard_ms)?;

    info!(
        subscriptions = blueprint.subscriptions.len(),
        sinks = blueprint.sinks.len(),
        seed = blueprint.seed.len(),
        reply_guard_ms = blueprint.service.reply_guard_delay_ms,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port != 0).then_some(args.metrics_port),
        simulate: !args.no_simulation,
    });

    info!("Starting engine...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Engine execution failed")?;

    info!(
        established = stats.subscriptions_established,
        writes = stats.total_writes(),
        duration_secs = stats.duration.as_secs_f64(),
        "Engine finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::ServiceBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Service:");
    println!("  Reply guard: {} ms", blueprint.service.reply_guard_delay_ms);
    println!("  Sync-on-start delay: {} ms", blueprint.service.sync_on_start_delay_ms);

    println!("\nSubscriptions ({}):", blueprint.subscriptions.len());
    for entry in &blueprint.subscriptions {
        println!("  - {} {} {:?}", entry.stream, entry.path, entry.trigger);
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?}) on {}", sink.name, sink.sink_type, sink.stream);
        }
    }

    if let Some(ref simulation) = blueprint.simulation {
        println!("\nSimulation:");
        println!(
            "  {}:{} every {} ms",
            simulation.datastore, simulation.path, simulation.interval_ms
        );
    }

    println!();
}
