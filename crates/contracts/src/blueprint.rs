//! ServiceBlueprint - Config Loader output
//!
//! Describes a complete deployment: scheduling constants, seed data for the
//! store, subscriptions to establish at start-up, sinks per stream and an
//! optional change generator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

use crate::{Datastore, Encoding, InstancePath, StreamKind, SubscriptionParams, Trigger};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ServiceBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    /// Scheduling constants
    #[serde(default)]
    #[validate(nested)]
    pub service: ServiceConfig,

    /// Initial store content
    #[serde(default)]
    pub seed: Vec<SeedEntry>,

    /// Subscriptions established at start-up
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,

    /// Transport endpoints per stream
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,

    /// Store mutation generator
    #[serde(default)]
    #[validate(nested)]
    pub simulation: Option<SimulationConfig>,
}

/// Scheduling constants
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Buffer between an establish reply and the first trigger fire (ms)
    #[serde(default = "default_reply_guard_delay_ms")]
    #[validate(range(max = 60_000))]
    pub reply_guard_delay_ms: u64,

    /// Delay of the on-change sync-on-start snapshot (ms)
    #[serde(default = "default_sync_on_start_delay_ms")]
    #[validate(range(max = 60_000))]
    pub sync_on_start_delay_ms: u64,
}

fn default_reply_guard_delay_ms() -> u64 {
    100
}

fn default_sync_on_start_delay_ms() -> u64 {
    50
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            reply_guard_delay_ms: default_reply_guard_delay_ms(),
            sync_on_start_delay_ms: default_sync_on_start_delay_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn reply_guard_delay(&self) -> Duration {
        Duration::from_millis(self.reply_guard_delay_ms)
    }

    pub fn sync_on_start_delay(&self) -> Duration {
        Duration::from_millis(self.sync_on_start_delay_ms)
    }
}

/// One node written into the store before subscriptions start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEntry {
    pub datastore: Datastore,
    pub path: InstancePath,
    pub value: Value,
}

/// Subscription established at start-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub stream: StreamKind,
    pub path: InstancePath,
    pub trigger: Trigger,

    #[serde(default)]
    pub subscription_start_time: Option<String>,

    #[serde(default)]
    pub subscription_stop_time: Option<String>,

    #[serde(default)]
    pub start_time: Option<String>,

    #[serde(default)]
    pub stop_time: Option<String>,

    #[serde(default)]
    pub encoding: Encoding,

    /// Subtree filter (TOML tables map to JSON objects)
    #[serde(default)]
    pub filter: Option<Value>,
}

impl SubscriptionConfig {
    /// Establish parameters for this entry
    pub fn to_params(&self) -> SubscriptionParams {
        SubscriptionParams {
            stream: self.stream,
            path: self.path.clone(),
            trigger: self.trigger,
            subscription_start_time: self.subscription_start_time.clone(),
            subscription_stop_time: self.subscription_stop_time.clone(),
            start_time: self.start_time.clone(),
            stop_time: self.stop_time.clone(),
            filter: self.filter.clone(),
            encoding: self.encoding,
        }
    }
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1, max = 128))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Stream the sink is attached to
    pub stream: StreamKind,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// Network output (UDP)
    Network,
}

/// Periodic store mutation so on-change subscriptions see traffic
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SimulationConfig {
    pub datastore: Datastore,

    /// Leaf rewritten on every tick
    pub path: InstancePath,

    #[validate(range(min = 1))]
    pub interval_ms: u64,
}

impl SimulationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_defaults() {
        let bp: ServiceBlueprint = serde_json::from_str("{}").unwrap();
        assert_eq!(bp.service.reply_guard_delay(), Duration::from_millis(100));
        assert_eq!(bp.service.sync_on_start_delay(), Duration::from_millis(50));
        assert!(bp.subscriptions.is_empty());
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_subscription_config_to_params() {
        let entry: SubscriptionConfig = serde_json::from_value(serde_json::json!({
            "stream": "OPERATIONAL",
            "path": "/interfaces",
            "trigger": { "periodic": { "period_ms": 1000 } },
            "subscription_stop_time": "2030-01-01T00:00:00Z"
        }))
        .unwrap();

        let params = entry.to_params();
        assert_eq!(params.stream, StreamKind::Operational);
        assert_eq!(params.trigger, Trigger::Periodic { period_ms: 1000 });
        assert_eq!(
            params.subscription_stop_time.as_deref(),
            Some("2030-01-01T00:00:00Z")
        );
        assert_eq!(params.encoding, Encoding::Json);
    }

    #[test]
    fn test_derive_rules() {
        let mut bp = ServiceBlueprint::default();
        bp.simulation = Some(SimulationConfig {
            datastore: Datastore::Operational,
            path: "/counters/tick".parse().unwrap(),
            interval_ms: 0,
        });
        assert!(bp.validate().is_err());

        bp.simulation = None;
        bp.sinks.push(SinkConfig {
            name: String::new(),
            sink_type: SinkType::Log,
            stream: StreamKind::YangPush,
            params: HashMap::new(),
        });
        assert!(bp.validate().is_err());
    }
}
