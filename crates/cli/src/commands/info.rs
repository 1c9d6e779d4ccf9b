//! `info` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{ServiceBlueprint, Trigger};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Configuration info for JSON output
#[derive(Debug, Serialize)]
struct ConfigInfo {
    version: String,
    service: ServiceInfo,
    subscription_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    subscriptions: Vec<SubscriptionInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    simulation: Option<String>,
}

#[derive(Debug, Serialize)]
struct ServiceInfo {
    reply_guard_delay_ms: u64,
    sync_on_start_delay_ms: u64,
    seed_entries: usize,
}

#[derive(Debug, Serialize)]
struct SubscriptionInfo {
    stream: String,
    path: String,
    trigger: String,
    encoding: &'static str,
    filtered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_time: Option<String>,
}

#[derive(Debug, Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    stream: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn describe_trigger(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Periodic { period_ms } => format!("periodic every {period_ms} ms"),
        Trigger::OnChange {
            dampening_period_ms,
            no_synch_on_start,
        } => {
            let sync = if *no_synch_on_start { ", no sync-on-start" } else { "" };
            format!("on-change, dampening {dampening_period_ms} ms{sync}")
        }
    }
}

fn build_config_info(blueprint: &ServiceBlueprint, args: &InfoArgs) -> ConfigInfo {
    let subscriptions = if args.subscriptions {
        blueprint
            .subscriptions
            .iter()
            .map(|s| SubscriptionInfo {
                stream: s.stream.to_string(),
                path: s.path.to_string(),
                trigger: describe_trigger(&s.trigger),
                encoding: s.encoding.identity(),
                filtered: s.filter.is_some(),
                stop_time: s.subscription_stop_time.clone().or_else(|| s.stop_time.clone()),
            })
            .collect()
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                stream: s.stream.to_string(),
                params: s.params.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        service: ServiceInfo {
            reply_guard_delay_ms: blueprint.service.reply_guard_delay_ms,
            sync_on_start_delay_ms: blueprint.service.sync_on_start_delay_ms,
            seed_entries: blueprint.seed.len(),
        },
        subscription_count: blueprint.subscriptions.len(),
        subscriptions,
        sinks,
        simulation: blueprint.simulation.as_ref().map(|s| {
            format!("{}:{} every {} ms", s.datastore, s.path, s.interval_ms)
        }),
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 yang-push Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Service");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Reply guard: {} ms", info.service.reply_guard_delay_ms);
    println!("   ├─ Sync-on-start delay: {} ms", info.service.sync_on_start_delay_ms);
    println!("   └─ Seed entries: {}", info.service.seed_entries);

    println!("\n📡 Subscriptions ({})", info.subscription_count);
    for (i, sub) in info.subscriptions.iter().enumerate() {
        let is_last = i == info.subscriptions.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!("   {} {} {}", prefix, sub.stream, sub.path);
        println!("   {}  ├─ {}", child_prefix, sub.trigger);
        println!(
            "   {}  └─ {}{}{}",
            child_prefix,
            sub.encoding,
            if sub.filtered { ", filtered" } else { "" },
            sub.stop_time
                .as_ref()
                .map(|t| format!(", stops {t}"))
                .unwrap_or_default()
        );
    }

    if !info.sinks.is_empty() {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
            println!("   {} {} ({}) on {}", prefix, sink.name, sink.sink_type, sink.stream);
        }
    }

    if let Some(ref simulation) = info.simulation {
        println!("\n🔁 Simulation");
        println!("   └─ {}", simulation);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_describe_trigger() {
        assert_eq!(
            describe_trigger(&Trigger::Periodic { period_ms: 250 }),
            "periodic every 250 ms"
        );
        assert_eq!(
            describe_trigger(&Trigger::OnChange {
                dampening_period_ms: 0,
                no_synch_on_start: true
            }),
            "on-change, dampening 0 ms, no sync-on-start"
        );
    }

    #[test]
    fn test_details_only_on_request() {
        let blueprint: ServiceBlueprint = serde_json::from_value(serde_json::json!({
            "subscriptions": [{
                "stream": "YANG-PUSH",
                "path": "/interfaces",
                "trigger": { "on_change": { "dampening_period_ms": 100 } }
            }]
        }))
        .unwrap();

        let mut args = InfoArgs {
            config: PathBuf::from("unused.toml"),
            json: true,
            subscriptions: false,
            sinks: false,
        };
        let info = build_config_info(&blueprint, &args);
        assert_eq!(info.subscription_count, 1);
        assert!(info.subscriptions.is_empty());

        args.subscriptions = true;
        let info = build_config_info(&blueprint, &args);
        assert_eq!(info.subscriptions[0].stream, "YANG-PUSH");
        assert_eq!(info.subscriptions[0].encoding, "encode-json");
    }
}
