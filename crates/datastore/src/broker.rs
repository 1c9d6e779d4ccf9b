//! In-memory data broker
//!
//! Partitioned JSON trees with a subtree change feed and a table of
//! mirrored subscription records. Failure injection lets tests exercise the
//! store-unavailable and mirror-write-failed paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use contracts::{
    ChangeCallback, ChangeListenerRegistration, ChangeRecord, ContractError, DataBroker, Datastore,
    InstancePath, MirrorOperation, MirrorRecord, ModificationType, SubscriptionId,
};
use parking_lot::{Mutex, ReentrantMutex};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::tree;

/// Broker configuration (failure injection)
#[derive(Debug, Default, Clone)]
pub struct MemoryBrokerConfig {
    /// Every mirror write fails
    pub fail_mirror_writes: bool,
    /// Every snapshot read fails
    pub fail_reads: bool,
    /// Every listener registration fails
    pub fail_registrations: bool,
}

/// One entry of the mirror write log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEvent {
    pub operation: MirrorOperation,
    pub subscription_id: SubscriptionId,
    pub succeeded: bool,
}

struct ListenerEntry {
    datastore: Datastore,
    path: InstancePath,
    callback: ChangeCallback,
}

#[derive(Default)]
struct BrokerState {
    trees: HashMap<Datastore, Value>,
    listeners: HashMap<u64, ListenerEntry>,
    mirror: BTreeMap<SubscriptionId, MirrorRecord>,
    mirror_log: Vec<MirrorEvent>,
}

impl BrokerState {
    fn tree(&self, datastore: Datastore) -> Option<&Value> {
        self.trees.get(&datastore)
    }

    fn tree_mut(&mut self, datastore: Datastore) -> &mut Value {
        self.trees
            .entry(datastore)
            .or_insert_with(|| Value::Object(Map::new()))
    }

    fn read(&self, datastore: Datastore, path: &InstancePath) -> Option<Value> {
        self.tree(datastore)
            .and_then(|root| tree::get(root, path))
            .cloned()
    }
}

enum Mutation {
    Put(Value),
    Merge(Value),
    Delete,
}

/// In-memory `DataBroker`
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    /// Held across every callback fan-out so the initial batch of a
    /// registration and live change batches never interleave. Reentrant so
    /// a callback may mutate the broker from the delivering thread.
    delivery: Arc<ReentrantMutex<()>>,
    next_listener_id: Arc<AtomicU64>,
    fail_mirror_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    fail_registrations: Arc<AtomicBool>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::with_config(MemoryBrokerConfig::default())
    }

    /// Create a broker with failure injection
    pub fn with_config(config: MemoryBrokerConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            delivery: Arc::new(ReentrantMutex::new(())),
            next_listener_id: Arc::new(AtomicU64::new(1)),
            fail_mirror_writes: Arc::new(AtomicBool::new(config.fail_mirror_writes)),
            fail_reads: Arc::new(AtomicBool::new(config.fail_reads)),
            fail_registrations: Arc::new(AtomicBool::new(config.fail_registrations)),
        }
    }

    /// Toggle mirror write failures at runtime
    pub fn set_fail_mirror_writes(&self, fail: bool) {
        self.fail_mirror_writes.store(fail, Ordering::SeqCst);
    }

    /// Toggle read failures at runtime
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Replace the node at `path`
    pub fn put(&self, datastore: Datastore, path: &InstancePath, value: Value) {
        self.apply(datastore, path, Mutation::Put(value));
    }

    /// Deep-merge into the node at `path`
    pub fn merge(&self, datastore: Datastore, path: &InstancePath, value: Value) {
        self.apply(datastore, path, Mutation::Merge(value));
    }

    /// Remove the node at `path`
    ///
    /// Returns whether something was removed.
    pub fn delete(&self, datastore: Datastore, path: &InstancePath) -> bool {
        self.apply(datastore, path, Mutation::Delete)
    }

    /// Current data at `path` without failure injection
    pub fn get(&self, datastore: Datastore, path: &InstancePath) -> Option<Value> {
        self.state.lock().read(datastore, path)
    }

    /// Persisted subscription records, ordered by id
    pub fn mirror_records(&self) -> Vec<MirrorRecord> {
        self.state.lock().mirror.values().cloned().collect()
    }

    /// Persisted record for one subscription
    pub fn mirror_record(&self, id: SubscriptionId) -> Option<MirrorRecord> {
        self.state.lock().mirror.get(&id).cloned()
    }

    /// Every attempted mirror write, oldest first
    pub fn mirror_log(&self) -> Vec<MirrorEvent> {
        self.state.lock().mirror_log.clone()
    }

    /// Number of live change-feed registrations
    pub fn listener_count(&self) -> usize {
        self.state.lock().listeners.len()
    }

    /// Apply one mutation and fan the resulting change records out
    ///
    /// Callbacks run after the state lock is released so they may call back
    /// into the broker. The delivery lock stays held until every callback
    /// returned.
    fn apply(&self, datastore: Datastore, path: &InstancePath, mutation: Mutation) -> bool {
        let replaces = matches!(mutation, Mutation::Put(_));
        let _delivery = self.delivery.lock();

        let (changed, batches) = {
            let mut state = self.state.lock();

            let affected: Vec<(ChangeCallback, InstancePath, Option<Value>)> = state
                .listeners
                .values()
                .filter(|l| l.datastore == datastore && l.path.overlaps(path))
                .map(|l| {
                    let before = state.read(datastore, &l.path);
                    (l.callback.clone(), l.path.clone(), before)
                })
                .collect();

            let root = state.tree_mut(datastore);
            let changed = match mutation {
                Mutation::Put(value) => {
                    tree::put(root, path, value);
                    true
                }
                Mutation::Merge(value) => {
                    tree::merge(root, path, value);
                    true
                }
                Mutation::Delete => tree::remove(root, path).is_some(),
            };

            let batches: Vec<(ChangeCallback, ChangeRecord)> = affected
                .into_iter()
                .filter_map(|(callback, listener_path, before)| {
                    let after = state.read(datastore, &listener_path);
                    if before == after {
                        return None;
                    }
                    let modification = match (&before, &after) {
                        (_, None) => ModificationType::Delete,
                        (None, Some(_)) => ModificationType::Write,
                        _ if replaces && path.contains(&listener_path) => ModificationType::Write,
                        _ => ModificationType::SubtreeModified,
                    };
                    Some((
                        callback,
                        ChangeRecord {
                            datastore,
                            path: listener_path,
                            modification,
                            data_after: after,
                        },
                    ))
                })
                .collect();

            (changed, batches)
        };

        debug!(
            datastore = %datastore,
            path = %path,
            notified = batches.len(),
            "Store mutation applied"
        );

        for (callback, record) in batches {
            callback(vec![record]);
        }

        changed
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl DataBroker for MemoryBroker {
    #[instrument(name = "memory_broker_read", skip(self), fields(datastore = %datastore, path = %path))]
    async fn read(
        &self,
        datastore: Datastore,
        path: &InstancePath,
    ) -> Result<Option<Value>, ContractError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ContractError::store_unavailable(format!(
                "read of {datastore}:{path} rejected"
            )));
        }
        Ok(self.state.lock().read(datastore, path))
    }

    #[instrument(
        name = "memory_broker_commit_mirror",
        skip(self, record),
        fields(operation = %operation, subscription_id = %record.subscription_id)
    )]
    async fn commit_mirror(
        &self,
        operation: MirrorOperation,
        record: &MirrorRecord,
    ) -> Result<(), ContractError> {
        let id = record.subscription_id;
        let fail = self.fail_mirror_writes.load(Ordering::SeqCst);

        let mut state = self.state.lock();
        state.mirror_log.push(MirrorEvent {
            operation,
            subscription_id: id,
            succeeded: !fail,
        });

        if fail {
            warn!(subscription_id = %id, operation = %operation, "Mirror write rejected");
            return Err(ContractError::mirror_write(
                id,
                operation,
                "store rejected the transaction",
            ));
        }

        match operation {
            MirrorOperation::Establish | MirrorOperation::Modify => {
                state.mirror.insert(id, record.clone());
            }
            MirrorOperation::Delete => {
                state.mirror.remove(&id);
            }
        }
        Ok(())
    }

    fn register_change_listener(
        &self,
        datastore: Datastore,
        path: &InstancePath,
        callback: ChangeCallback,
    ) -> Result<Box<dyn ChangeListenerRegistration>, ContractError> {
        if self.fail_registrations.load(Ordering::SeqCst) {
            return Err(ContractError::store_unavailable(format!(
                "listener registration on {datastore}:{path} rejected"
            )));
        }

        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        // No mutation can fan out between the listener insert and the
        // initial batch, so the first callback is always the snapshot.
        let _delivery = self.delivery.lock();
        let initial = {
            let mut state = self.state.lock();
            state.listeners.insert(
                id,
                ListenerEntry {
                    datastore,
                    path: path.clone(),
                    callback: callback.clone(),
                },
            );
            state.read(datastore, path)
        };

        debug!(listener_id = id, datastore = %datastore, path = %path, "Change listener registered");

        callback(vec![ChangeRecord {
            datastore,
            path: path.clone(),
            modification: ModificationType::Write,
            data_after: initial,
        }]);

        Ok(Box::new(MemoryRegistration {
            id,
            state: Arc::downgrade(&self.state),
            listening: AtomicBool::new(true),
        }))
    }
}

/// Registration handle returned by `MemoryBroker`
struct MemoryRegistration {
    id: u64,
    state: Weak<Mutex<BrokerState>>,
    listening: AtomicBool,
}

impl ChangeListenerRegistration for MemoryRegistration {
    fn close(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(state) = self.state.upgrade() {
            state.lock().listeners.remove(&self.id);
            debug!(listener_id = self.id, "Change listener closed");
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }
}

impl Drop for MemoryRegistration {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{StreamKind, Subscription, SubscriptionParams};
    use serde_json::json;
    use std::time::Duration;

    fn path(s: &str) -> InstancePath {
        s.parse().unwrap()
    }

    fn collector() -> (ChangeCallback, Arc<Mutex<Vec<ChangeRecord>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |batch| sink.lock().extend(batch));
        (callback, seen)
    }

    fn record(id: u64) -> MirrorRecord {
        let params = SubscriptionParams::periodic(
            StreamKind::Operational,
            path("/a"),
            Duration::from_secs(1),
        );
        MirrorRecord::from_subscription(&Subscription::from_params(SubscriptionId::new(id), params))
    }

    #[tokio::test]
    async fn test_read_snapshot() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Operational, &path("/a/b"), json!(1));

        let value = broker.read(Datastore::Operational, &path("/a")).await.unwrap();
        assert_eq!(value, Some(json!({"b": 1})));

        let missing = broker.read(Datastore::Configuration, &path("/a")).await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_read_failure_injection() {
        let broker = MemoryBroker::with_config(MemoryBrokerConfig {
            fail_reads: true,
            ..Default::default()
        });
        let err = broker
            .read(Datastore::Operational, &path("/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::StoreUnavailable { .. }));
    }

    #[test]
    fn test_registration_delivers_initial_write() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Operational, &path("/a/b"), json!(1));

        let (callback, seen) = collector();
        let _reg = broker
            .register_change_listener(Datastore::Operational, &path("/a"), callback)
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].modification, ModificationType::Write);
        assert_eq!(seen[0].data_after, Some(json!({"b": 1})));
    }

    #[test]
    fn test_initial_batch_precedes_concurrent_change() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Operational, &path("/a/b"), json!(1));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
        let ready_tx = Mutex::new(Some(ready_tx));
        let sink = seen.clone();
        let callback: ChangeCallback = Arc::new(move |batch: Vec<ChangeRecord>| {
            if let Some(tx) = ready_tx.lock().take() {
                // let the writer race the initial delivery
                let _ = tx.send(());
                std::thread::sleep(Duration::from_millis(50));
            }
            sink.lock().extend(batch);
        });

        let writer = {
            let broker = broker.clone();
            std::thread::spawn(move || {
                ready_rx.recv().unwrap();
                broker.merge(Datastore::Operational, &path("/a"), json!({"c": 2}));
            })
        };

        let _reg = broker
            .register_change_listener(Datastore::Operational, &path("/a"), callback)
            .unwrap();
        writer.join().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].modification, ModificationType::Write);
        assert_eq!(seen[0].data_after, Some(json!({"b": 1})));
        assert_eq!(seen[1].modification, ModificationType::SubtreeModified);
        assert_eq!(seen[1].data_after, Some(json!({"b": 1, "c": 2})));
    }

    #[test]
    fn test_change_classification() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Operational, &path("/a"), json!({"b": 1}));

        let (callback, seen) = collector();
        let _reg = broker
            .register_change_listener(Datastore::Operational, &path("/a"), callback)
            .unwrap();

        // below the root
        broker.put(Datastore::Operational, &path("/a/b"), json!(2));
        // unchanged
        broker.put(Datastore::Operational, &path("/a/b"), json!(2));
        // at the root
        broker.put(Datastore::Operational, &path("/a"), json!({"c": 3}));
        // other partition
        broker.put(Datastore::Configuration, &path("/a"), json!({"c": 4}));
        // unrelated subtree
        broker.put(Datastore::Operational, &path("/z"), json!(0));
        broker.delete(Datastore::Operational, &path("/a"));

        let kinds: Vec<ModificationType> = seen.lock().iter().map(|r| r.modification).collect();
        assert_eq!(
            kinds,
            vec![
                ModificationType::Write,
                ModificationType::SubtreeModified,
                ModificationType::Write,
                ModificationType::Delete,
            ]
        );
        assert_eq!(seen.lock()[1].data_after, Some(json!({"b": 2})));
        assert_eq!(seen.lock()[3].data_after, None);
    }

    #[test]
    fn test_registration_close_and_drop() {
        let broker = MemoryBroker::new();
        let (callback, seen) = collector();
        let reg = broker
            .register_change_listener(Datastore::Operational, &path("/a"), callback.clone())
            .unwrap();
        assert_eq!(broker.listener_count(), 1);

        reg.close();
        assert!(!reg.is_listening());
        assert_eq!(broker.listener_count(), 0);
        broker.put(Datastore::Operational, &path("/a"), json!(1));
        assert_eq!(seen.lock().len(), 1);

        let reg = broker
            .register_change_listener(Datastore::Operational, &path("/a"), callback)
            .unwrap();
        drop(reg);
        assert_eq!(broker.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_mirror_table() {
        let broker = MemoryBroker::new();
        let rec = record(1);

        broker
            .commit_mirror(MirrorOperation::Establish, &rec)
            .await
            .unwrap();
        assert_eq!(broker.mirror_record(SubscriptionId::new(1)), Some(rec.clone()));

        broker
            .commit_mirror(MirrorOperation::Delete, &rec)
            .await
            .unwrap();
        assert!(broker.mirror_records().is_empty());
        assert_eq!(broker.mirror_log().len(), 2);
    }

    #[tokio::test]
    async fn test_mirror_failure_logged() {
        let broker = MemoryBroker::new();
        broker.set_fail_mirror_writes(true);

        let err = broker
            .commit_mirror(MirrorOperation::Establish, &record(7))
            .await
            .unwrap_err();
        assert!(err.is_mirror_failure());
        assert!(broker.mirror_records().is_empty());
        assert_eq!(
            broker.mirror_log(),
            vec![MirrorEvent {
                operation: MirrorOperation::Establish,
                subscription_id: SubscriptionId::new(7),
                succeeded: false,
            }]
        );
    }
}
