//! DataBroker trait - external data store capabilities
//!
//! The engine only needs three things from the versioned store: a snapshot
//! read, a change feed under a path, and a durable write of its own
//! subscription records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;

use crate::{
    ChangeCallback, ChangeListenerRegistration, ContractError, Datastore, InstancePath,
    Subscription, SubscriptionId, Trigger,
};

/// Tag of a mirror write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorOperation {
    Establish,
    Modify,
    Delete,
}

impl MirrorOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Establish => "establish",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MirrorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trigger fields as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MirrorTrigger {
    Periodic {
        period: u64,
    },
    OnChange {
        dampening_period: u64,
        /// Present as an empty marker leaf when set
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        no_synch_on_start: bool,
    },
}

/// Subscription record as persisted in the external store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorRecord {
    pub subscription_id: SubscriptionId,
    pub update_trigger: MirrorTrigger,
    pub stream: String,
    pub subscription_start_time: Option<String>,
    pub subscription_stop_time: Option<String>,
    pub start_time: Option<String>,
    pub stop_time: Option<String>,
    pub encoding: String,
    /// Serialized subtree filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl MirrorRecord {
    /// Derive the persisted form from a registry record
    pub fn from_subscription(subscription: &Subscription) -> Self {
        let update_trigger = match subscription.trigger {
            Trigger::Periodic { period_ms } => MirrorTrigger::Periodic { period: period_ms },
            Trigger::OnChange {
                dampening_period_ms,
                no_synch_on_start,
            } => MirrorTrigger::OnChange {
                dampening_period: dampening_period_ms,
                no_synch_on_start,
            },
        };

        Self {
            subscription_id: subscription.id,
            update_trigger,
            stream: subscription.stream.name().to_string(),
            subscription_start_time: subscription.subscription_start_time.clone(),
            subscription_stop_time: subscription.subscription_stop_time.clone(),
            start_time: subscription.start_time.clone(),
            stop_time: subscription.stop_time.clone(),
            encoding: subscription.encoding.identity().to_string(),
            filter: subscription.filter.as_ref().map(Value::to_string),
        }
    }
}

/// External data store trait
///
/// Abstracts the versioned store for testing and future implementation
/// replacement.
pub trait DataBroker: Send + Sync + 'static {
    /// Read the current data at `path` (None when absent)
    fn read(
        &self,
        datastore: Datastore,
        path: &InstancePath,
    ) -> impl Future<Output = Result<Option<Value>, ContractError>> + Send;

    /// Durably write one subscription record
    ///
    /// `Establish` merges, `Modify` replaces, `Delete` removes the record
    /// keyed by `record.subscription_id`.
    fn commit_mirror(
        &self,
        operation: MirrorOperation,
        record: &MirrorRecord,
    ) -> impl Future<Output = Result<(), ContractError>> + Send;

    /// Subscribe to subtree changes under `path`
    ///
    /// The store delivers one initial batch with the current data as a
    /// `Write` record. It is the first callback invocation and no live change
    /// batch is delivered until it returned.
    fn register_change_listener(
        &self,
        datastore: Datastore,
        path: &InstancePath,
        callback: ChangeCallback,
    ) -> Result<Box<dyn ChangeListenerRegistration>, ContractError>;
}
