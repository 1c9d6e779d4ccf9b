//! Notification rendering
//!
//! Builds the wire envelopes and applies subtree filters. Payload bodies are
//! JSON; the subscription's encoding is carried as a tag.
//!
//! Subtree filter nodes:
//! - `null` or `{}`: selection, the whole data node is kept
//! - object with children: containment, children are filtered recursively
//! - any other value: content match, the sibling data must equal it
//!
//! Arrays in the data are filtered element by element.

use bytes::Bytes;
use contracts::{
    time, ChangeRecord, Datastore, ModificationType, OamStatus, Subscription, SubscriptionId,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::DispatcherError;

/// Wire envelope, externally tagged by notification name
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Notification {
    PushUpdate(PushUpdate),
    PushChangeUpdate(PushChangeUpdate),
    SubscriptionStarted(OamEvent),
    NotificationComplete(OamEvent),
    SubscriptionError(OamEvent),
}

/// Snapshot of the subscribed subtree
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PushUpdate {
    pub subscription_id: SubscriptionId,
    pub time_of_update: String,
    pub encoding: &'static str,
    /// Partition name to filtered contents
    pub datastore_contents: Map<String, Value>,
}

/// Changes observed under the subscribed subtree
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PushChangeUpdate {
    pub subscription_id: SubscriptionId,
    pub time_of_update: String,
    pub encoding: &'static str,
    pub datastore_changes: Vec<ChangeEdit>,
}

/// One edit inside a change update
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChangeEdit {
    pub datastore: &'static str,
    pub target: String,
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Administrative event
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OamEvent {
    pub subscription_id: SubscriptionId,
    pub event_time: String,
    pub stream: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Notification {
    /// Serialize to the bytes handed to sinks
    pub fn to_bytes(&self, id: SubscriptionId) -> Result<Bytes, DispatcherError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|source| DispatcherError::Encode { id, source })
    }
}

/// OAM envelope for `status`
pub fn oam(subscription: &Subscription, status: OamStatus, detail: Option<String>) -> Notification {
    let event = OamEvent {
        subscription_id: subscription.id,
        event_time: time::now_canonical(),
        stream: subscription.stream.name(),
        detail,
    };
    match status {
        OamStatus::SubscriptionStarted => Notification::SubscriptionStarted(event),
        OamStatus::NotificationComplete => Notification::NotificationComplete(event),
        OamStatus::Error => Notification::SubscriptionError(event),
    }
}

/// Snapshot envelope from per-partition reads
///
/// Partitions that are absent or filtered out render as `{}`.
pub fn push_update(
    subscription: &Subscription,
    contents: Vec<(Datastore, Option<Value>)>,
) -> Result<Notification, DispatcherError> {
    let mut datastore_contents = Map::new();
    for (datastore, data) in contents {
        let filtered = match data {
            Some(data) => filter_data(subscription.filter.as_ref(), &data)?,
            None => None,
        };
        datastore_contents.insert(
            datastore.as_str().to_string(),
            filtered.unwrap_or_else(|| Value::Object(Map::new())),
        );
    }

    Ok(Notification::PushUpdate(PushUpdate {
        subscription_id: subscription.id,
        time_of_update: time::now_canonical(),
        encoding: subscription.encoding.identity(),
        datastore_contents,
    }))
}

/// Change envelope from one accepted batch
///
/// Returns `None` when the filter removed every record.
pub fn push_change_update(
    subscription: &Subscription,
    changes: &[ChangeRecord],
) -> Result<Option<Notification>, DispatcherError> {
    let mut edits = Vec::with_capacity(changes.len());

    for change in changes {
        let value = match &change.data_after {
            Some(data) => match filter_data(subscription.filter.as_ref(), data)? {
                Some(filtered) => Some(filtered),
                None => continue,
            },
            None => None,
        };

        edits.push(ChangeEdit {
            datastore: change.datastore.as_str(),
            target: change.path.to_string(),
            operation: operation(change.modification),
            value,
        });
    }

    if edits.is_empty() {
        return Ok(None);
    }

    Ok(Some(Notification::PushChangeUpdate(PushChangeUpdate {
        subscription_id: subscription.id,
        time_of_update: time::now_canonical(),
        encoding: subscription.encoding.identity(),
        datastore_changes: edits,
    })))
}

fn operation(modification: ModificationType) -> &'static str {
    match modification {
        ModificationType::Write => "replace",
        ModificationType::SubtreeModified => "merge",
        ModificationType::Delete => "delete",
    }
}

/// Apply an optional subtree filter to `data`
///
/// # Errors
/// `InvalidFilter` when the filter root is not an object.
pub fn filter_data(filter: Option<&Value>, data: &Value) -> Result<Option<Value>, DispatcherError> {
    match filter {
        None => Ok(Some(data.clone())),
        Some(filter @ Value::Object(_)) => Ok(select(data, filter)),
        Some(other) => Err(DispatcherError::invalid_filter(format!(
            "filter root must be an object, got {other}"
        ))),
    }
}

fn select(data: &Value, filter: &Value) -> Option<Value> {
    let children = match filter {
        Value::Null => return Some(data.clone()),
        Value::Object(children) if children.is_empty() => return Some(data.clone()),
        Value::Object(children) => children,
        _ => return None,
    };

    match data {
        Value::Array(items) => {
            let kept: Vec<Value> = items.iter().filter_map(|item| select(item, filter)).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(fields) => select_fields(fields, children),
        _ => None,
    }
}

fn select_fields(fields: &Map<String, Value>, children: &Map<String, Value>) -> Option<Value> {
    let (matches, nested): (Vec<_>, Vec<_>) = children
        .iter()
        .partition(|(_, node)| !matches!(node, Value::Null | Value::Object(_)));

    let mut out = Map::new();
    for (key, expected) in &matches {
        match fields.get(*key) {
            Some(actual) if actual == *expected => {
                out.insert((*key).clone(), actual.clone());
            }
            _ => return None,
        }
    }

    // Only content matches: the whole matching node is selected
    if nested.is_empty() {
        return Some(Value::Object(fields.clone()));
    }

    let mut selected_any = false;
    for (key, node) in nested {
        if let Some(kept) = fields.get(key).and_then(|child| select(child, node)) {
            out.insert(key.clone(), kept);
            selected_any = true;
        }
    }

    selected_any.then_some(Value::Object(out))
}
