//! # Config Loader
//!
//! Reads the engine configuration (`[service]`, `[[seed]]`,
//! `[[subscriptions]]`, `[[sinks]]`, `[simulation]`) from TOML or JSON.
//!
//! Loading runs in three passes:
//! 1. parse into a `ServiceBlueprint`
//! 2. resolve subtree filters written as JSON strings
//! 3. validate, then rewrite subscription times in canonical form
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("yang-push.toml")).unwrap();
//! println!("Subscriptions: {}", blueprint.subscriptions.len());
//! ```

mod parser;
mod validator;

pub use contracts::ServiceBlueprint;
pub use parser::ConfigFormat;

use contracts::{time, ContractError, SubscriptionConfig};
use serde_json::Value;
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the blueprint at `path`, format chosen by extension
    ///
    /// # Errors
    /// IO, unknown extension, parse or validation failure.
    pub fn load_from_path(path: &Path) -> Result<ServiceBlueprint, ContractError> {
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ConfigFormat::from_extension)
            .ok_or_else(|| {
                ContractError::config_parse(format!(
                    "unsupported config file '{}': expected .toml or .json",
                    path.display()
                ))
            })?;
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load a blueprint from in-memory content
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ServiceBlueprint, ContractError> {
        let mut blueprint = parser::parse(content, format)?;
        for (idx, entry) in blueprint.subscriptions.iter_mut().enumerate() {
            resolve_filter(idx, entry)?;
        }

        validator::validate(&blueprint)?;

        for entry in &mut blueprint.subscriptions {
            canonicalize_times(entry)?;
        }
        Ok(blueprint)
    }

    /// Serialize a blueprint back to TOML
    pub fn to_toml(blueprint: &ServiceBlueprint) -> Result<String, ContractError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize a blueprint back to JSON
    pub fn to_json(blueprint: &ServiceBlueprint) -> Result<String, ContractError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

/// A filter given as a string holds serialized JSON, the form mirror
/// records persist it in
fn resolve_filter(idx: usize, entry: &mut SubscriptionConfig) -> Result<(), ContractError> {
    if let Some(Value::String(raw)) = &entry.filter {
        let parsed: Value = serde_json::from_str(raw).map_err(|e| {
            ContractError::config_validation(
                format!("subscriptions[{idx}].filter"),
                format!("filter string is not JSON: {e}"),
            )
        })?;
        entry.filter = Some(parsed);
    }
    Ok(())
}

fn canonicalize_times(entry: &mut SubscriptionConfig) -> Result<(), ContractError> {
    for slot in [
        &mut entry.subscription_start_time,
        &mut entry.subscription_stop_time,
        &mut entry.start_time,
        &mut entry.stop_time,
    ] {
        *slot = time::normalize(slot.as_deref())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL_TOML: &str = r#"
[service]
reply_guard_delay_ms = 20

[[seed]]
datastore = "OPERATIONAL"
path = "/interfaces/eth0"
value = { "oper-status" = "up" }

[[subscriptions]]
stream = "OPERATIONAL"
path = "/interfaces"
trigger = { periodic = { period_ms = 1000 } }

[[sinks]]
name = "log_sink"
sink_type = "log"
stream = "OPERATIONAL"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.service.reply_guard_delay_ms, 20);
        assert_eq!(bp.sinks[0].name, "log_sink");
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.subscriptions.len(), bp2.subscriptions.len());
        assert_eq!(bp.subscriptions[0].path, bp2.subscriptions[0].path);
        assert_eq!(bp.seed[0].value, bp2.seed[0].value);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.subscriptions[0].trigger, bp2.subscriptions[0].trigger);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MINIMAL_TOML.as_bytes()).unwrap();

        let bp = ConfigLoader::load_from_path(file.path()).unwrap();
        assert_eq!(bp.subscriptions.len(), 1);
    }

    #[test]
    fn test_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        let err = ConfigLoader::load_from_path(file.path()).unwrap_err();
        assert!(err.to_string().contains("expected .toml or .json"));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[subscriptions]]
stream = "OPERATIONAL"
path = "/interfaces"
trigger = { periodic = { period_ms = 0 } }
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("period"));
    }

    #[test]
    fn test_string_filter_and_times_resolved() {
        let content = r#"
[[subscriptions]]
stream = "YANG-PUSH"
path = "/interfaces"
trigger = { on_change = { dampening_period_ms = 100 } }
subscription_stop_time = "2030-01-01T00:00:00.5Z"
filter = '{"eth0": null}'
"#;
        let bp = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap();
        let entry = &bp.subscriptions[0];
        assert_eq!(entry.filter, Some(serde_json::json!({"eth0": null})));
        assert_eq!(
            entry.subscription_stop_time.as_deref(),
            Some("2030-01-01T00:00:00.500Z")
        );
    }

    #[test]
    fn test_bad_filter_string_rejected() {
        let content = r#"
[[subscriptions]]
stream = "YANG-PUSH"
path = "/interfaces"
trigger = { periodic = { period_ms = 100 } }
filter = "eth0"
"#;
        let err = ConfigLoader::load_from_str(content, ConfigFormat::Toml).unwrap_err();
        assert!(err.to_string().contains("subscriptions[0].filter"));
    }
}
