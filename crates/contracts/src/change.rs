//! Change feed contracts
//!
//! What the data store hands to a registered listener when the observed
//! subtree changes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::{Datastore, InstancePath};

/// How the listener's root node was touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationType {
    /// Node replaced as a whole (also the initial snapshot on registration)
    Write,
    /// Something below the node changed
    SubtreeModified,
    /// Node removed
    Delete,
}

/// One changed root in a change batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Partition the change happened in
    pub datastore: Datastore,

    /// Listener root the record describes
    pub path: InstancePath,

    pub modification: ModificationType,

    /// Data at `path` after the change (None when gone)
    pub data_after: Option<Value>,
}

impl ChangeRecord {
    pub fn has_data_after(&self) -> bool {
        matches!(&self.data_after, Some(v) if !v.is_null())
    }
}

/// Callback receiving change batches
///
/// Called from the writer's context; implementations should hand the batch
/// off instead of doing work inline.
pub type ChangeCallback = Arc<dyn Fn(Vec<ChangeRecord>) + Send + Sync>;

/// Handle to an active change-feed registration
///
/// Dropping the handle also unregisters.
pub trait ChangeListenerRegistration: Send + Sync {
    /// Stop delivering batches (idempotent)
    fn close(&self);

    /// Whether batches are still delivered
    fn is_listening(&self) -> bool;
}
