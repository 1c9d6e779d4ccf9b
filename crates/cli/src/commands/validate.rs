//! `validate` command implementation.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use contracts::{ServiceBlueprint, StreamKind, Trigger};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Debug, Serialize)]
struct ConfigSummary {
    version: String,
    periodic_subscriptions: usize,
    on_change_subscriptions: usize,
    sink_count: usize,
    seed_entries: usize,
    simulation: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    if !path.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", path.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(path) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            let periodic = blueprint
                .subscriptions
                .iter()
                .filter(|s| s.trigger.is_periodic())
                .count();

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    periodic_subscriptions: periodic,
                    on_change_subscriptions: blueprint.subscriptions.len() - periodic,
                    sink_count: blueprint.sinks.len(),
                    seed_entries: blueprint.seed.len(),
                    simulation: blueprint.simulation.is_some(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ServiceBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - notifications will be dropped".to_string());
    }

    let attached: HashSet<StreamKind> = blueprint.sinks.iter().map(|s| s.stream).collect();
    for entry in &blueprint.subscriptions {
        if !attached.contains(&entry.stream) {
            warnings.push(format!(
                "Subscription on {} {} has no sink attached to its stream",
                entry.stream, entry.path
            ));
        }
    }

    if let Some(ref simulation) = blueprint.simulation {
        let observed = blueprint.subscriptions.iter().any(|entry| {
            matches!(entry.trigger, Trigger::OnChange { .. })
                && entry.stream.datastores().contains(&simulation.datastore)
                && entry.path.overlaps(&simulation.path)
        });
        if !observed {
            warnings.push(format!(
                "Simulation writes {}:{} but no on-change subscription observes it",
                simulation.datastore, simulation.path
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Subscriptions: {} periodic, {} on-change",
                summary.periodic_subscriptions, summary.on_change_subscriptions
            );
            println!("  Sinks: {}", summary.sink_count);
            println!("  Seed entries: {}", summary.seed_entries);
            println!("  Simulation: {}", if summary.simulation { "on" } else { "off" });
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = config_file(
            r#"
[[subscriptions]]
stream = "CONFIGURATION"
path = "/system"
trigger = { periodic = { period_ms = 500 } }

[simulation]
datastore = "OPERATIONAL"
path = "/counters/rx"
interval_ms = 100
"#,
        );

        let result = validate_config(file.path());
        assert!(result.valid, "{:?}", result.error);

        let summary = result.summary.unwrap();
        assert_eq!(summary.periodic_subscriptions, 1);
        assert_eq!(summary.on_change_subscriptions, 0);
        assert!(summary.simulation);

        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 3);
        assert!(warnings[2].contains("no on-change subscription"));
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(Path::new("/no/such/config.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }

    #[test]
    fn test_invalid_config() {
        let file = config_file(
            r#"
[[subscriptions]]
stream = "OPERATIONAL"
path = "/system"
trigger = { periodic = { period_ms = 0 } }
"#,
        );
        let result = validate_config(file.path());
        assert!(!result.valid);
        assert!(result.error.is_some());
    }
}
