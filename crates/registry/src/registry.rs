//! SubscriptionRegistry - records plus their store mirror
//!
//! Every mutation holds the map lock across its mirror write, so the
//! mutations affecting one id are totally ordered and no reader observes a
//! record mid-mutation. Mirror writes are rare next to fire-time lookups,
//! which only take the lock briefly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use contracts::{
    ContractError, DataBroker, MirrorOperation, MirrorRecord, Subscription, SubscriptionId,
    SubscriptionStatus,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Subscription registry
///
/// Explicitly constructed and shared through `Arc` by the service, the
/// dispatcher and the triggers.
pub struct SubscriptionRegistry<B: DataBroker> {
    broker: Arc<B>,
    records: Mutex<HashMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl<B: DataBroker> SubscriptionRegistry<B> {
    /// Create an empty registry mirroring into `broker`
    pub fn new(broker: Arc<B>) -> Self {
        Self {
            broker,
            records: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Store backing the mirror
    pub fn broker(&self) -> &Arc<B> {
        &self.broker
    }

    /// Fresh id, strictly greater than every id handed out before
    ///
    /// The first call returns `1`.
    pub fn generate_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Insert a new record and mirror it with `establish`
    ///
    /// # Errors
    /// - `AlreadyExists` if the id is taken (nothing written)
    /// - `MirrorWriteFailed` if the store rejected the record; the local
    ///   entry is kept
    #[instrument(name = "registry_create", skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn create(&self, subscription: Subscription) -> Result<(), ContractError> {
        let id = subscription.id;
        let mut records = self.records.lock().await;

        if records.contains_key(&id) {
            return Err(ContractError::AlreadyExists { id });
        }

        let record = MirrorRecord::from_subscription(&subscription);
        records.insert(id, subscription);
        observability::record_active_subscriptions(records.len());

        self.mirror(MirrorOperation::Establish, &record).await?;
        info!(subscription_id = %id, "Subscription created");
        Ok(())
    }

    /// Overwrite an existing record and mirror it with `modify`
    ///
    /// The stored record gets the next generation and restarts `Inactive`,
    /// so triggers armed for the old parameters see it as gone.
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown (nothing written)
    /// - `MirrorWriteFailed` if the store rejected the record; the local
    ///   overwrite is kept
    #[instrument(name = "registry_modify", skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn modify(&self, mut subscription: Subscription) -> Result<Subscription, ContractError> {
        let id = subscription.id;
        let mut records = self.records.lock().await;

        let previous = records.get(&id).ok_or(ContractError::NotFound { id })?;

        subscription.generation = previous.generation + 1;
        subscription.status = SubscriptionStatus::Inactive;

        let record = MirrorRecord::from_subscription(&subscription);
        records.insert(id, subscription.clone());

        self.mirror(MirrorOperation::Modify, &record).await?;
        info!(
            subscription_id = %id,
            generation = subscription.generation,
            "Subscription modified"
        );
        Ok(subscription)
    }

    /// Remove a record and mirror the removal with `delete`
    ///
    /// The delete payload is derived from the last known record, resolved
    /// before removal. Returns that record.
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown (nothing written)
    /// - `MirrorWriteFailed` if the store rejected the removal; the local
    ///   entry stays removed
    #[instrument(name = "registry_delete", skip(self), fields(subscription_id = %id))]
    pub async fn delete(&self, id: SubscriptionId) -> Result<Subscription, ContractError> {
        let mut records = self.records.lock().await;

        let removed = records.remove(&id).ok_or(ContractError::NotFound { id })?;
        let record = MirrorRecord::from_subscription(&removed);
        observability::record_active_subscriptions(records.len());

        self.mirror(MirrorOperation::Delete, &record).await?;
        info!(subscription_id = %id, "Subscription deleted");
        Ok(removed)
    }

    /// Remove the record of `id` only while it still has `generation`
    ///
    /// Compare and remove happen under one lock acquisition, so a record
    /// replaced by a concurrent modify is left alone.
    ///
    /// # Errors
    /// - `NotFound` if the id is unknown or now carries another generation
    ///   (nothing written)
    /// - `MirrorWriteFailed` if the store rejected the removal; the local
    ///   entry stays removed
    #[instrument(name = "registry_delete_generation", skip(self), fields(subscription_id = %id))]
    pub async fn delete_generation(
        &self,
        id: SubscriptionId,
        generation: u64,
    ) -> Result<Subscription, ContractError> {
        let mut records = self.records.lock().await;

        match records.get(&id) {
            Some(sub) if sub.generation == generation => {}
            _ => return Err(ContractError::NotFound { id }),
        }
        let removed = records.remove(&id).ok_or(ContractError::NotFound { id })?;
        let record = MirrorRecord::from_subscription(&removed);
        observability::record_active_subscriptions(records.len());

        self.mirror(MirrorOperation::Delete, &record).await?;
        info!(subscription_id = %id, generation, "Subscription deleted");
        Ok(removed)
    }

    /// Current record
    pub async fn get(&self, id: SubscriptionId) -> Result<Subscription, ContractError> {
        self.records
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(ContractError::NotFound { id })
    }

    pub async fn exists(&self, id: SubscriptionId) -> bool {
        self.records.lock().await.contains_key(&id)
    }

    /// Current record if it still has `generation`
    ///
    /// Fire-time lookup for triggers; `None` means "gone" and the trigger
    /// must not act.
    pub async fn get_current(&self, id: SubscriptionId, generation: u64) -> Option<Subscription> {
        self.records
            .lock()
            .await
            .get(&id)
            .filter(|sub| sub.generation == generation)
            .cloned()
    }

    /// Compare-and-set the status of `(id, generation)`
    ///
    /// Returns `true` if the record was found in `from` and is now `to`.
    pub async fn transition_status(
        &self,
        id: SubscriptionId,
        generation: u64,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> bool {
        let mut records = self.records.lock().await;
        match records.get_mut(&id) {
            Some(sub) if sub.generation == generation && sub.status == from => {
                sub.status = to;
                debug!(subscription_id = %id, from = ?from, to = ?to, "Status changed");
                true
            }
            _ => false,
        }
    }

    /// All records ordered by id
    pub async fn list(&self) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self.records.lock().await.values().cloned().collect();
        subs.sort_by_key(|sub| sub.id);
        subs
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    async fn mirror(
        &self,
        operation: MirrorOperation,
        record: &MirrorRecord,
    ) -> Result<(), ContractError> {
        let id = record.subscription_id;
        let result = self
            .broker
            .commit_mirror(operation, record)
            .await
            .map_err(|e| match e {
                e @ ContractError::MirrorWriteFailed { .. } => e,
                other => ContractError::mirror_write(id, operation, other.to_string()),
            });

        observability::record_mirror_write(operation, result.is_ok());
        if let Err(e) = &result {
            error!(subscription_id = %id, operation = %operation, error = %e, "Mirror write failed");
        }
        result
    }
}
