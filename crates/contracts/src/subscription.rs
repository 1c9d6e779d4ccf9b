//! Subscription - the unit of client intent
//!
//! Registry records, establish/modify parameters and the enums they are built from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{ContractError, InstancePath, SubscriptionId};

/// Store partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Datastore {
    Configuration,
    Operational,
}

impl Datastore {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Operational => "operational",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification stream a subscription is attached to
///
/// Selects which store partitions are watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    #[serde(rename = "YANG-PUSH")]
    YangPush,
    #[serde(rename = "CONFIGURATION")]
    Configuration,
    #[serde(rename = "OPERATIONAL")]
    Operational,
}

impl StreamKind {
    /// Wire name, also the key of the stream's sink set
    pub fn name(&self) -> &'static str {
        match self {
            Self::YangPush => "YANG-PUSH",
            Self::Configuration => "CONFIGURATION",
            Self::Operational => "OPERATIONAL",
        }
    }

    /// Partitions observed by this stream
    pub fn datastores(&self) -> &'static [Datastore] {
        match self {
            Self::YangPush => &[Datastore::Configuration, Datastore::Operational],
            Self::Configuration => &[Datastore::Configuration],
            Self::Operational => &[Datastore::Operational],
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StreamKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "YANG-PUSH" => Ok(Self::YangPush),
            "CONFIGURATION" => Ok(Self::Configuration),
            "OPERATIONAL" => Ok(Self::Operational),
            other => Err(ContractError::invalid_parameter(
                "stream",
                format!("stream '{other}' not supported"),
            )),
        }
    }
}

/// Update trigger, exactly one per subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fixed period between push updates
    Periodic { period_ms: u64 },
    /// Data-store changes, rate limited by the dampening period
    OnChange {
        dampening_period_ms: u64,
        #[serde(default)]
        no_synch_on_start: bool,
    },
}

impl Trigger {
    pub fn periodic(period: Duration) -> Self {
        Self::Periodic {
            period_ms: period.as_millis() as u64,
        }
    }

    pub fn on_change(dampening_period: Duration, no_synch_on_start: bool) -> Self {
        Self::OnChange {
            dampening_period_ms: dampening_period.as_millis() as u64,
            no_synch_on_start,
        }
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, Self::Periodic { .. })
    }

    /// Reject schedules the timers cannot run
    pub fn validate(&self) -> Result<(), ContractError> {
        match self {
            Self::Periodic { period_ms: 0 } => Err(ContractError::invalid_parameter(
                "period",
                "period must be greater than zero",
            )),
            _ => Ok(()),
        }
    }
}

/// Subscription stream status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Before the start trigger fires
    #[default]
    Inactive,
    /// Notifications may be produced
    Active,
}

/// Output format selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    #[default]
    Json,
    Xml,
}

impl Encoding {
    /// Identity persisted in the mirror record
    pub fn identity(&self) -> &'static str {
        match self {
            Self::Json => "encode-json",
            Self::Xml => "encode-xml",
        }
    }
}

/// Parameters supplied by establish/modify requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Stream to attach to
    pub stream: StreamKind,

    /// Observed subtree
    pub path: InstancePath,

    /// Update trigger
    pub trigger: Trigger,

    /// When notifications start (absent = immediately)
    #[serde(default)]
    pub subscription_start_time: Option<String>,

    /// When the subscription ends (absent = never)
    #[serde(default)]
    pub subscription_stop_time: Option<String>,

    /// Notification stream replay window start
    #[serde(default)]
    pub start_time: Option<String>,

    /// Notification stream replay window stop
    #[serde(default)]
    pub stop_time: Option<String>,

    /// Subtree filter
    #[serde(default)]
    pub filter: Option<Value>,

    /// Output format
    #[serde(default)]
    pub encoding: Encoding,
}

impl SubscriptionParams {
    /// Periodic subscription with defaults for everything optional
    pub fn periodic(stream: StreamKind, path: InstancePath, period: Duration) -> Self {
        Self::with_trigger(stream, path, Trigger::periodic(period))
    }

    /// On-change subscription with defaults for everything optional
    pub fn on_change(
        stream: StreamKind,
        path: InstancePath,
        dampening_period: Duration,
        no_synch_on_start: bool,
    ) -> Self {
        Self::with_trigger(
            stream,
            path,
            Trigger::on_change(dampening_period, no_synch_on_start),
        )
    }

    fn with_trigger(stream: StreamKind, path: InstancePath, trigger: Trigger) -> Self {
        Self {
            stream,
            path,
            trigger,
            subscription_start_time: None,
            subscription_stop_time: None,
            start_time: None,
            stop_time: None,
            filter: None,
            encoding: Encoding::default(),
        }
    }
}

/// Registry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,

    /// Bumped by every modify; timers compare it at fire time
    pub generation: u64,

    pub stream: StreamKind,
    pub path: InstancePath,
    pub trigger: Trigger,

    /// Canonical (`YYYY-MM-DDThh:mm:ss.mmmZ`) start instant
    pub subscription_start_time: Option<String>,

    /// Canonical stop instant
    pub subscription_stop_time: Option<String>,

    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub filter: Option<Value>,
    pub status: SubscriptionStatus,
    pub encoding: Encoding,
}

impl Subscription {
    /// Fresh inactive record from request parameters
    pub fn from_params(id: SubscriptionId, params: SubscriptionParams) -> Self {
        Self {
            id,
            generation: 0,
            stream: params.stream,
            path: params.path,
            trigger: params.trigger,
            subscription_start_time: params.subscription_start_time,
            subscription_stop_time: params.subscription_stop_time,
            start_time: params.start_time,
            stop_time: params.stop_time,
            filter: params.filter,
            status: SubscriptionStatus::Inactive,
            encoding: params.encoding,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_datastores() {
        assert_eq!(StreamKind::YangPush.datastores().len(), 2);
        assert_eq!(
            StreamKind::Configuration.datastores(),
            &[Datastore::Configuration]
        );
        assert_eq!(StreamKind::Operational.datastores(), &[Datastore::Operational]);
    }

    #[test]
    fn test_stream_parse() {
        assert_eq!("YANG-PUSH".parse::<StreamKind>().unwrap(), StreamKind::YangPush);
        assert!("NETCONF".parse::<StreamKind>().is_err());
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(Trigger::Periodic { period_ms: 0 }.validate().is_err());
        assert!(Trigger::periodic(Duration::from_millis(10)).validate().is_ok());
        assert!(Trigger::on_change(Duration::ZERO, false).validate().is_ok());
    }

    #[test]
    fn test_trigger_serde_shape() {
        let trigger: Trigger =
            serde_json::from_str(r#"{"on_change":{"dampening_period_ms":500}}"#).unwrap();
        assert_eq!(
            trigger,
            Trigger::OnChange {
                dampening_period_ms: 500,
                no_synch_on_start: false
            }
        );
    }

    #[test]
    fn test_from_params_starts_inactive() {
        let params = SubscriptionParams::periodic(
            StreamKind::Operational,
            "/a".parse().unwrap(),
            Duration::from_secs(1),
        );
        let sub = Subscription::from_params(SubscriptionId::new(1), params);
        assert_eq!(sub.status, SubscriptionStatus::Inactive);
        assert_eq!(sub.generation, 0);
        assert!(!sub.is_active());
    }
}
