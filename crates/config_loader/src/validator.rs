//! Configuration validation
//!
//! Rules:
//! - derive rules on the blueprint (`validator`): delay ranges, sink name
//!   length, simulation interval
//! - periodic subscriptions have a period > 0
//! - subscription start/stop times are well formed
//! - sink names are unique
//! - network sinks carry a parseable `addr`
//! - the simulation leaf is below the partition root

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{time, ContractError, ServiceBlueprint, SinkType, SubscriptionConfig};
use validator::Validate;

/// Validate a ServiceBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    validate_derived(blueprint)?;
    validate_subscriptions(blueprint)?;
    validate_sink_names(blueprint)?;
    validate_sink_params(blueprint)?;
    validate_simulation(blueprint)?;
    Ok(())
}

/// Field-level rules declared on the contract types
fn validate_derived(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    blueprint.validate().map_err(|errors| {
        let field = errors
            .errors()
            .keys()
            .next()
            .map(|key| key.to_string())
            .unwrap_or_else(|| "blueprint".to_string());
        ContractError::config_validation(field, errors.to_string())
    })
}

/// Trigger and timestamp checks per subscription
fn validate_subscriptions(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    for (idx, entry) in blueprint.subscriptions.iter().enumerate() {
        entry.trigger.validate().map_err(|e| {
            ContractError::config_validation(format!("subscriptions[{idx}].trigger"), e.to_string())
        })?;

        for (name, value) in timestamps(entry) {
            if let Some(value) = value {
                time::ensure_format(value).map_err(|e| {
                    ContractError::config_validation(
                        format!("subscriptions[{idx}].{name}"),
                        e.to_string(),
                    )
                })?;
            }
        }

        if let Some(filter) = &entry.filter {
            if !filter.is_object() {
                return Err(ContractError::config_validation(
                    format!("subscriptions[{idx}].filter"),
                    "filter must be a table of subtree nodes",
                ));
            }
        }
    }
    Ok(())
}

fn timestamps(entry: &SubscriptionConfig) -> [(&'static str, Option<&str>); 4] {
    [
        (
            "subscription_start_time",
            entry.subscription_start_time.as_deref(),
        ),
        (
            "subscription_stop_time",
            entry.subscription_stop_time.as_deref(),
        ),
        ("start_time", entry.start_time.as_deref()),
        ("stop_time", entry.stop_time.as_deref()),
    ]
}

/// Sink names are unique across streams
fn validate_sink_names(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for sink in &blueprint.sinks {
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// Type-specific sink parameters
fn validate_sink_params(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.sink_type != SinkType::Network {
            continue;
        }

        let addr = sink.params.get("addr").ok_or_else(|| {
            ContractError::config_validation(
                format!("sinks[{idx}].params.addr"),
                "network sink requires 'addr'",
            )
        })?;

        addr.parse::<SocketAddr>().map_err(|e| {
            ContractError::config_validation(
                format!("sinks[{idx}].params.addr"),
                format!("invalid socket address '{addr}': {e}"),
            )
        })?;
    }
    Ok(())
}

fn validate_simulation(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    if let Some(simulation) = &blueprint.simulation {
        if simulation.path.is_root() {
            return Err(ContractError::config_validation(
                "simulation.path",
                "simulation path must name a leaf below the root",
            ));
        }
    }
    Ok(())
}
