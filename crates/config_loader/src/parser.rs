//! Configuration parsing
//!
//! TOML is the primary format, JSON is accepted as well.

use contracts::{ContractError, ServiceBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (recommended)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<ServiceBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<ServiceBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse configuration in the given format
pub fn parse(content: &str, format: ConfigFormat) -> Result<ServiceBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{StreamKind, Trigger};

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[service]
reply_guard_delay_ms = 100

[[seed]]
datastore = "OPERATIONAL"
path = "/interfaces"
value = { eth0 = { "oper-status" = "up" } }

[[subscriptions]]
stream = "YANG-PUSH"
path = "/interfaces"
trigger = { on_change = { dampening_period_ms = 500 } }

[subscriptions.filter.eth0]

[[sinks]]
name = "log_sink"
sink_type = "log"
stream = "YANG-PUSH"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.seed.len(), 1);
        assert_eq!(bp.subscriptions.len(), 1);
        assert_eq!(bp.subscriptions[0].stream, StreamKind::YangPush);
        assert_eq!(
            bp.subscriptions[0].trigger,
            Trigger::OnChange {
                dampening_period_ms: 500,
                no_synch_on_start: false
            }
        );
        assert_eq!(
            bp.subscriptions[0].filter,
            Some(serde_json::json!({ "eth0": {} }))
        );
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "subscriptions": [{
                "stream": "OPERATIONAL",
                "path": "/interfaces",
                "trigger": { "periodic": { "period_ms": 1000 } },
                "filter": { "eth0": null }
            }],
            "sinks": [{ "name": "log", "sink_type": "log", "stream": "OPERATIONAL" }]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert_eq!(result.unwrap().service.sync_on_start_delay_ms, 50);
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_stream_rejected() {
        let content = r#"
[[subscriptions]]
stream = "NETCONF"
path = "/a"
trigger = { periodic = { period_ms = 10 } }
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
