//! Source collection manager
//!
//! Coordinates the ordered collection of registered vault sources:
//! membership, display order, persistence through a storage backend and
//! change notifications. This is the single owner of collection
//! membership; sources themselves are shared handles that external code
//! may hold and mutate, but only the manager adds or removes them.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::storage::StorageBackend;

use super::events::{ManagerEvents, DEFAULT_EVENT_CAPACITY};
use super::source::{SourceDescription, SourceStatus, VaultSource};
use super::{is_manager_key, storage_key_for, ManagerError, ManagerResult};

/// Collection state guarded by the manager's lock
#[derive(Default)]
struct Collection {
    sources: Vec<VaultSource>,
    /// One forwarder task per source. Aborting a handle detaches
    /// exactly the manager's own subscription to that source; other
    /// subscribers are untouched.
    forwarders: HashMap<Uuid, JoinHandle<()>>,
}

/// Manager for the ordered collection of registered vault sources
///
/// The storage backend is injected at construction and fixed for the
/// manager's lifetime. All methods take `&self`; interleaved calls are
/// serialized by the internal lock.
///
/// Ranks are kept dense: after every mutating operation each source's
/// `order` equals its position in the collection.
pub struct VaultSourceManager<S: StorageBackend> {
    storage: S,
    collection: Arc<RwLock<Collection>>,
    events: Arc<ManagerEvents>,
}

impl<S: StorageBackend> VaultSourceManager<S> {
    /// Create a manager over the given storage backend
    pub fn new(storage: S) -> Self {
        Self::with_event_capacity(storage, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a manager honouring the configured channel capacity
    pub fn with_config(storage: S, config: &ManagerConfig) -> Self {
        Self::with_event_capacity(storage, config.event_capacity)
    }

    fn with_event_capacity(storage: S, capacity: usize) -> Self {
        Self {
            storage,
            collection: Arc::new(RwLock::new(Collection::default())),
            events: Arc::new(ManagerEvents::with_capacity(capacity)),
        }
    }

    /// Notification surface for subscribing to collection changes
    pub fn events(&self) -> &ManagerEvents {
        &self.events
    }

    /// Storage backend in use
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Register a source, subscribing to its change events
    ///
    /// Adding an id that is already registered is a no-op. The new
    /// source is ranked after the existing ones and one
    /// collection-updated notification is emitted.
    pub async fn add_source(&self, source: VaultSource) {
        self.add_source_inner(source, true).await;
    }

    async fn add_source_inner(&self, source: VaultSource, emit_update: bool) {
        let mut collection = self.collection.write().await;
        if collection
            .sources
            .iter()
            .any(|existing| existing.id() == source.id())
        {
            debug!("Source {} already registered, ignoring", source.id());
            return;
        }

        info!("Registering source {}", source.id());
        let forwarder = self.spawn_forwarder(&source);
        collection.forwarders.insert(source.id(), forwarder);
        collection.sources.push(source);
        rerank(&mut collection.sources).await;

        if emit_update {
            let descriptions = describe_all(&collection.sources).await;
            drop(collection);
            self.events.emit_sources_updated(descriptions);
        }
    }

    /// Remove a registered source, detaching the manager's subscription
    ///
    /// Remaining sources are re-ranked immediately so the display order
    /// stays dense. Emits one collection-updated notification.
    ///
    /// # Returns
    /// * `Err(ManagerError::SourceNotFound)` - If no source with `id`
    ///   is registered; the collection is left unchanged
    pub async fn remove_source(&self, id: Uuid) -> ManagerResult<()> {
        let mut collection = self.collection.write().await;
        let index = collection
            .sources
            .iter()
            .position(|source| source.id() == id)
            .ok_or(ManagerError::SourceNotFound {
                op: "removing source",
                id,
            })?;

        if let Some(forwarder) = collection.forwarders.remove(&id) {
            forwarder.abort();
        }
        collection.sources.remove(index);
        for (rank, source) in collection.sources.iter().enumerate() {
            source.set_order(rank).await;
        }

        let descriptions = describe_all(&collection.sources).await;
        drop(collection);
        info!("Removed source {id}");
        self.events.emit_sources_updated(descriptions);
        Ok(())
    }

    /// Move a source to `position`, shifting later sources down
    ///
    /// Every other source whose rank is at or past `position` moves one
    /// step down before ranks are compacted back to a dense sequence.
    /// Emits one collection-updated notification.
    ///
    /// # Returns
    /// * `Err(ManagerError::SourceNotFound)` - If no source with `id`
    ///   is registered
    pub async fn reorder_source(&self, id: Uuid, position: usize) -> ManagerResult<()> {
        let mut collection = self.collection.write().await;
        if !collection.sources.iter().any(|source| source.id() == id) {
            return Err(ManagerError::SourceNotFound {
                op: "reordering source",
                id,
            });
        }

        for source in &collection.sources {
            if source.id() == id {
                source.set_order(position).await;
            } else {
                let order = source.order().await;
                if order >= position {
                    source.set_order(order + 1).await;
                }
            }
        }
        rerank(&mut collection.sources).await;

        let descriptions = describe_all(&collection.sources).await;
        drop(collection);
        debug!("Moved source {id} to position {position}");
        self.events.emit_sources_updated(descriptions);
        Ok(())
    }

    /// Re-sort the collection by rank and reassign dense ranks
    ///
    /// The sort is stable: sources with equal ranks keep their current
    /// relative position. Emits one collection-updated notification.
    pub async fn reorder_sources(&self) {
        let mut collection = self.collection.write().await;
        rerank(&mut collection.sources).await;
        let descriptions = describe_all(&collection.sources).await;
        drop(collection);
        self.events.emit_sources_updated(descriptions);
    }

    /// Persist every registered source to the storage backend
    ///
    /// Writes are issued concurrently. The first failure is returned;
    /// writes that already completed are not rolled back.
    pub async fn dehydrate(&self) -> ManagerResult<()> {
        let sources = self.collection.read().await.sources.clone();
        debug!("Dehydrating {} sources", sources.len());

        let writes = sources.iter().map(|source| async move {
            let payload = source
                .dehydrate()
                .await
                .map_err(|err| ManagerError::Dehydrate {
                    id: source.id(),
                    source: err,
                })?;
            let key = storage_key_for(source.id());
            self.storage
                .set_value(&key, &payload)
                .await
                .map_err(|err| ManagerError::Persistence { key, source: err })
        });
        future::try_join_all(writes).await?;
        Ok(())
    }

    /// Restore sources persisted in the storage backend
    ///
    /// Keys outside the manager's naming scheme are ignored. Matching
    /// records are read and reconstructed concurrently and added with
    /// notifications suppressed; one collection-updated notification is
    /// emitted for the whole batch. When a record fails, that
    /// notification still fires first, reflecting the subset that made
    /// it in, and the failure is then surfaced wrapped as a batch-level
    /// error. Ids already registered are skipped by the idempotent-add
    /// rule.
    pub async fn rehydrate(&self) -> ManagerResult<()> {
        let keys = self
            .storage
            .get_all_keys()
            .await
            .map_err(|err| ManagerError::ListKeys { source: err })?;
        let restorable: Vec<String> = keys.into_iter().filter(|key| is_manager_key(key)).collect();
        debug!("Rehydrating {} stored sources", restorable.len());

        let restores = restorable.into_iter().map(|key| async move {
            let payload = self
                .storage
                .get_value(&key)
                .await
                .map_err(|err| ManagerError::Persistence {
                    key: key.clone(),
                    source: err,
                })?;
            let source = VaultSource::rehydrate(&payload)
                .await
                .map_err(|err| ManagerError::Rehydration { key, source: err })?;
            self.add_source_inner(source, false).await;
            Ok::<(), ManagerError>(())
        });
        let results = future::join_all(restores).await;

        // Subscribers see whatever subset made it in before any failure
        // is surfaced.
        let descriptions = {
            let collection = self.collection.read().await;
            describe_all(&collection.sources).await
        };
        self.events.emit_sources_updated(descriptions);

        for result in results {
            if let Err(err) = result {
                warn!("Rehydration failed: {err}");
                return Err(ManagerError::RehydrationBatch {
                    source: Box::new(err),
                });
            }
        }
        Ok(())
    }

    /// Look up a registered source by id
    pub async fn get_source(&self, id: Uuid) -> Option<VaultSource> {
        self.collection
            .read()
            .await
            .sources
            .iter()
            .find(|source| source.id() == id)
            .cloned()
    }

    /// Display metadata for every source, in display order
    ///
    /// Computed on access; never cached.
    pub async fn sources_list(&self) -> Vec<SourceDescription> {
        let collection = self.collection.read().await;
        describe_all(&collection.sources).await
    }

    /// Sources currently unlocked, in display order
    ///
    /// Computed on access; never cached.
    pub async fn unlocked_sources(&self) -> Vec<VaultSource> {
        let collection = self.collection.read().await;
        let mut unlocked = Vec::new();
        for source in &collection.sources {
            if source.status().await == SourceStatus::Unlocked {
                unlocked.push(source.clone());
            }
        }
        unlocked
    }

    /// Number of registered sources
    pub async fn source_count(&self) -> usize {
        self.collection.read().await.sources.len()
    }

    /// Bridge one source's events into the manager's channels
    ///
    /// Each forwarded event is followed by a fresh collection-updated
    /// notification. The returned handle is the subscription token;
    /// aborting it is the teardown.
    fn spawn_forwarder(&self, source: &VaultSource) -> JoinHandle<()> {
        let mut receiver = source.subscribe();
        let events = Arc::clone(&self.events);
        let collection = Arc::clone(&self.collection);
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        events.forward(event);
                        let descriptions = {
                            let collection = collection.read().await;
                            describe_all(&collection.sources).await
                        };
                        events.emit_sources_updated(descriptions);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Source event forwarder lagged, {missed} events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// Stable-sort by rank, then assign each source its index as the new
/// rank, restoring the dense `0..n` permutation.
async fn rerank(sources: &mut Vec<VaultSource>) {
    let mut keyed = Vec::with_capacity(sources.len());
    for source in sources.drain(..) {
        keyed.push((source.order().await, source));
    }
    keyed.sort_by_key(|(order, _)| *order);
    for (rank, (_, source)) in keyed.iter().enumerate() {
        source.set_order(rank).await;
    }
    sources.extend(keyed.into_iter().map(|(_, source)| source));
}

async fn describe_all(sources: &[VaultSource]) -> Vec<SourceDescription> {
    let mut descriptions = Vec::with_capacity(sources.len());
    for source in sources {
        descriptions.push(source.description().await);
    }
    descriptions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use assert_matches::assert_matches;
    use tokio::sync::broadcast::error::TryRecvError;

    fn manager() -> VaultSourceManager<MemoryStorage> {
        VaultSourceManager::new(MemoryStorage::new())
    }

    async fn names<S: StorageBackend>(manager: &VaultSourceManager<S>) -> Vec<String> {
        manager
            .sources_list()
            .await
            .into_iter()
            .map(|description| description.name)
            .collect()
    }

    #[tokio::test]
    async fn test_add_assigns_dense_ranks() {
        let manager = manager();
        let a = VaultSource::new("a");
        let b = VaultSource::new("b");
        let c = VaultSource::new("c");
        manager.add_source(a.clone()).await;
        manager.add_source(b.clone()).await;
        manager.add_source(c.clone()).await;

        assert_eq!(a.order().await, 0);
        assert_eq!(b.order().await, 1);
        assert_eq!(c.order().await, 2);
        assert_eq!(names(&manager).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_duplicate_add_is_a_no_op() {
        let manager = manager();
        let source = VaultSource::new("a");
        manager.add_source(source.clone()).await;
        manager.add_source(source.clone()).await;

        assert_eq!(manager.source_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_emits_single_update() {
        let manager = manager();
        let mut updated = manager.events().subscribe_sources_updated();

        manager.add_source(VaultSource::new("a")).await;

        let descriptions = updated.recv().await.unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_matches!(updated.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_get_source_returns_none_when_absent() {
        let manager = manager();
        let source = VaultSource::new("a");
        manager.add_source(source.clone()).await;

        assert!(manager.get_source(source.id()).await.is_some());
        assert!(manager.get_source(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_unknown_source_errors_and_leaves_collection() {
        let manager = manager();
        manager.add_source(VaultSource::new("a")).await;

        let result = manager.remove_source(Uuid::new_v4()).await;

        assert_matches!(result, Err(ManagerError::SourceNotFound { .. }));
        assert_eq!(manager.source_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_compacts_ranks() {
        let manager = manager();
        let a = VaultSource::new("a");
        let b = VaultSource::new("b");
        let c = VaultSource::new("c");
        manager.add_source(a.clone()).await;
        manager.add_source(b.clone()).await;
        manager.add_source(c.clone()).await;

        manager.remove_source(b.id()).await.unwrap();

        assert_eq!(a.order().await, 0);
        assert_eq!(c.order().await, 1);
        assert_eq!(names(&manager).await, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_reorder_source_shifts_later_sources() {
        let manager = manager();
        let a = VaultSource::new("a");
        let b = VaultSource::new("b");
        let c = VaultSource::new("c");
        manager.add_source(a.clone()).await;
        manager.add_source(b.clone()).await;
        manager.add_source(c.clone()).await;
        let mut updated = manager.events().subscribe_sources_updated();

        manager.reorder_source(c.id(), 0).await.unwrap();

        assert_eq!(a.order().await, 1);
        assert_eq!(b.order().await, 2);
        assert_eq!(c.order().await, 0);
        let descriptions = updated.recv().await.unwrap();
        let order: Vec<&str> = descriptions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);
        assert_matches!(updated.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_reorder_unknown_source_errors() {
        let manager = manager();
        let result = manager.reorder_source(Uuid::new_v4(), 0).await;
        assert_matches!(
            result,
            Err(ManagerError::SourceNotFound {
                op: "reordering source",
                ..
            })
        );
    }

    #[tokio::test]
    async fn test_ranks_stay_dense_across_operations() {
        let manager = manager();
        let sources: Vec<VaultSource> = (0..5)
            .map(|i| VaultSource::new(format!("source-{i}")))
            .collect();
        for source in &sources {
            manager.add_source(source.clone()).await;
        }

        manager.reorder_source(sources[4].id(), 1).await.unwrap();
        manager.reorder_source(sources[0].id(), 3).await.unwrap();
        manager.remove_source(sources[2].id()).await.unwrap();
        manager.reorder_sources().await;

        let mut ranks: Vec<usize> = Vec::new();
        for description in manager.sources_list().await {
            ranks.push(description.order);
        }
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dehydrate_writes_prefixed_keys() {
        let manager = manager();
        let source = VaultSource::new("a");
        manager.add_source(source.clone()).await;

        manager.dehydrate().await.unwrap();

        let keys = manager.storage().get_all_keys().await.unwrap();
        assert_eq!(keys, vec![storage_key_for(source.id())]);
    }

    #[tokio::test]
    async fn test_round_trip_restores_id_set() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = VaultSourceManager::new(Arc::clone(&storage));
        let a = VaultSource::new("a");
        let b = VaultSource::new("b");
        manager.add_source(a.clone()).await;
        manager.add_source(b.clone()).await;
        manager.dehydrate().await.unwrap();

        let restored = VaultSourceManager::new(storage);
        restored.rehydrate().await.unwrap();

        let mut ids: Vec<Uuid> = restored
            .sources_list()
            .await
            .iter()
            .map(|description| description.id)
            .collect();
        ids.sort();
        let mut expected = vec![a.id(), b.id()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_rehydrate_emits_exactly_one_update() {
        let storage = Arc::new(MemoryStorage::new());
        let manager = VaultSourceManager::new(Arc::clone(&storage));
        for i in 0..4 {
            manager.add_source(VaultSource::new(format!("source-{i}"))).await;
        }
        manager.dehydrate().await.unwrap();

        let restored = VaultSourceManager::new(storage);
        let mut updated = restored.events().subscribe_sources_updated();
        restored.rehydrate().await.unwrap();

        let descriptions = updated.recv().await.unwrap();
        assert_eq!(descriptions.len(), 4);
        assert_matches!(updated.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_rehydrate_skips_keys_outside_naming_scheme() {
        let storage = Arc::new(MemoryStorage::new());
        let seeded = VaultSourceManager::new(Arc::clone(&storage));
        seeded.add_source(VaultSource::new("kept")).await;
        seeded.dehydrate().await.unwrap();
        storage
            .set_value("latchkey_sourcemgr_not-a-uuid", "garbage")
            .await
            .unwrap();
        storage
            .set_value(&format!("other_prefix_{}", Uuid::new_v4()), "garbage")
            .await
            .unwrap();

        let manager = VaultSourceManager::new(storage);
        manager.rehydrate().await.unwrap();

        assert_eq!(names(&manager).await, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_rehydrate_emits_partial_state_before_failing() {
        let storage = Arc::new(MemoryStorage::new());
        let seeded = VaultSourceManager::new(Arc::clone(&storage));
        seeded.add_source(VaultSource::new("good")).await;
        seeded.dehydrate().await.unwrap();
        let bad_key = storage_key_for(Uuid::new_v4());
        storage.set_value(&bad_key, "not a record").await.unwrap();

        let manager = VaultSourceManager::new(storage);
        let mut updated = manager.events().subscribe_sources_updated();
        let result = manager.rehydrate().await;

        assert_matches!(result, Err(ManagerError::RehydrationBatch { source }) => {
            assert_matches!(*source, ManagerError::Rehydration { key, .. } if key == bad_key);
        });
        // The update fired before the error surfaced, showing the subset
        // that made it in
        let descriptions = updated.recv().await.unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].name, "good");
    }

    #[tokio::test]
    async fn test_source_events_pass_through() {
        let manager = manager();
        let source = VaultSource::new("a");
        manager.add_source(source.clone()).await;
        let mut unlocked = manager.events().subscribe_source_unlocked();
        let mut updated = manager.events().subscribe_sources_updated();

        source.unlock().await;

        let details = unlocked.recv().await.unwrap();
        assert_eq!(details.id, source.id());
        // Each pass-through is followed by a collection update
        let descriptions = updated.recv().await.unwrap();
        assert_eq!(descriptions[0].status, SourceStatus::Unlocked);
    }

    #[tokio::test]
    async fn test_removal_detaches_manager_subscription() {
        let manager = manager();
        let source = VaultSource::new("a");
        manager.add_source(source.clone()).await;
        let mut locked = manager.events().subscribe_source_locked();

        manager.remove_source(source.id()).await.unwrap();
        tokio::task::yield_now().await;

        // The source still works for its other subscribers, but the
        // manager no longer re-emits its events
        source.unlock().await;
        source.lock().await;
        tokio::task::yield_now().await;
        assert_matches!(locked.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_unlocked_sources_view() {
        let manager = manager();
        let a = VaultSource::new("a");
        let b = VaultSource::new("b");
        manager.add_source(a.clone()).await;
        manager.add_source(b.clone()).await;

        b.unlock().await;

        let unlocked = manager.unlocked_sources().await;
        assert_eq!(unlocked.len(), 1);
        assert_eq!(unlocked[0].id(), b.id());
    }
}
