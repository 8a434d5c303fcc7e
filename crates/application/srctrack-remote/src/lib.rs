//! Remote tracking service: a persisted cache of the remote revision feed.
//!
//! Each org has one tracking file (`.sf/orgs/<org>/maxRevision.json`). The service
//! loads it lazily, folds new feed rows into it, and records which revisions the
//! caller has already seen. Every read-modify-write runs under one async mutex and
//! the file write itself is guarded by an advisory lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use camino::Utf8Path;
use srctrack_config::{TrackingConfig, CURRENT_FILE_VERSION, LEGACY_FILE_VERSION};
use srctrack_core::key::keys_match;
use srctrack_core::{
    ComponentStatus, DefaultRegistry, MetadataRegistry, NoopTelemetry, RemoteFeed,
    RemoteFeedRecord, RemoteRecord, RemoteSyncInput, TelemetrySink, TrackingEvent,
};
use srctrack_persistence::{StoreLayout, TrackingFileStore, TrackingState};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

mod error;
pub mod expected;
mod memory_feed;
mod poll;

pub use error::RemoteTrackingError;
pub use memory_feed::InMemoryFeed;
pub use poll::PollOutcome;

#[derive(Clone)]
pub struct RemoteServiceOptions {
    pub config: TrackingConfig,
    pub registry: Arc<dyn MetadataRegistry>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Default for RemoteServiceOptions {
    fn default() -> Self {
        Self {
            config: TrackingConfig::default(),
            registry: Arc::new(DefaultRegistry::default()),
            telemetry: Arc::new(NoopTelemetry),
        }
    }
}

impl RemoteServiceOptions {
    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

#[derive(Default)]
struct Slot {
    loaded: bool,
    state: TrackingState,
}

pub struct RemoteTrackingService {
    org: String,
    store: TrackingFileStore,
    feed: Arc<dyn RemoteFeed>,
    options: RemoteServiceOptions,
    slot: Mutex<Slot>,
    /// `from revision -> rows`, only consulted by cached retrievals.
    query_cache: StdMutex<HashMap<u64, Vec<RemoteFeedRecord>>>,
}

impl RemoteTrackingService {
    pub fn new(layout: &StoreLayout, feed: Arc<dyn RemoteFeed>, options: RemoteServiceOptions) -> Self {
        Self {
            org: layout.org().to_string(),
            store: TrackingFileStore::for_layout(layout),
            feed,
            options,
            slot: Mutex::new(Slot::default()),
            query_cache: StdMutex::new(HashMap::new()),
        }
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    pub fn file_path(&self) -> &Utf8Path {
        self.store.path()
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.options.config
    }

    pub(crate) fn registry(&self) -> &dyn MetadataRegistry {
        self.options.registry.as_ref()
    }

    pub(crate) fn telemetry(&self) -> &dyn TelemetrySink {
        self.options.telemetry.as_ref()
    }

    /// Lock the state, loading the tracking file on first use.
    async fn lock(&self) -> Result<MutexGuard<'_, Slot>, RemoteTrackingError> {
        let mut slot = self.slot.lock().await;
        if !slot.loaded {
            let store = self.store.clone();
            let loaded = tokio::task::spawn_blocking(move || store.read()).await?;
            if loaded.source_version == Some(LEGACY_FILE_VERSION) {
                info!(path = %self.store.path(), "upgraded legacy tracking file in memory");
                self.telemetry().emit(TrackingEvent::TrackingFileUpgraded {
                    from: LEGACY_FILE_VERSION,
                    to: CURRENT_FILE_VERSION,
                });
            }
            let mut state = loaded.state;
            state.normalize_max();
            slot.state = state;
            slot.loaded = true;
        }
        Ok(slot)
    }

    async fn persist(&self, state: &TrackingState) -> Result<(), RemoteTrackingError> {
        let store = self.store.clone();
        let snapshot = state.clone();
        let version = self.options.config.file_version;
        tokio::task::spawn_blocking(move || store.write(&snapshot, version)).await??;
        Ok(())
    }

    async fn query_from(&self, revision: u64, use_cache: bool) -> Result<Vec<RemoteFeedRecord>, RemoteTrackingError> {
        if use_cache {
            let cache = self.query_cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = cache.get(&revision) {
                debug!(revision, "remote query served from cache");
                return Ok(hit.clone());
            }
        }
        let records = self.feed.query_from(revision).await?;
        if use_cache {
            self.query_cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(revision, records.clone());
        }
        Ok(records)
    }

    /// Drop cached feed queries so the next cached retrieval hits the feed.
    pub fn clear_query_cache(&self) {
        self.query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Fold new feed rows into the state and return every unsynced record.
    pub async fn retrieve_updates(&self) -> Result<Vec<RemoteRecord>, RemoteTrackingError> {
        self.fetch_updates(false).await
    }

    /// Same as [`retrieve_updates`](Self::retrieve_updates) but reuses a feed query
    /// for the same revision made earlier by this instance.
    pub async fn retrieve_updates_cached(&self) -> Result<Vec<RemoteRecord>, RemoteTrackingError> {
        self.fetch_updates(true).await
    }

    async fn fetch_updates(&self, use_cache: bool) -> Result<Vec<RemoteRecord>, RemoteTrackingError> {
        let mut slot = self.lock().await?;
        let from = slot.state.server_max_revision;
        let records = self.query_from(from, use_cache).await?;
        if !records.is_empty() {
            let count = records.len();
            merge(&mut slot.state, records, false)?;
            self.persist(&slot.state).await?;
            debug!(org = %self.org, from, count, max = slot.state.server_max_revision, "remote changes merged");
        }
        Ok(slot
            .state
            .records
            .values()
            .filter(|r| !r.is_synced())
            .cloned()
            .collect())
    }

    /// Throw away all state and re-baseline from the feed.
    ///
    /// Every record returned by the feed is marked synced. Returns the tracked keys.
    pub async fn reset(&self, to_revision: Option<u64>) -> Result<Vec<String>, RemoteTrackingError> {
        let mut slot = self.lock().await?;
        let records = match to_revision {
            Some(revision) => self.feed.query_to(revision).await?,
            None => self.feed.query_from(0).await?,
        };
        let mut fresh = TrackingState::default();
        merge(&mut fresh, records, true)?;
        if let Some(revision) = to_revision {
            fresh.server_max_revision = fresh.server_max_revision.max(revision);
        }
        self.persist(&fresh).await?;
        slot.state = fresh;
        self.clear_query_cache();
        info!(
            org = %self.org,
            records = slot.state.records.len(),
            max = slot.state.server_max_revision,
            "remote tracking reset"
        );
        Ok(slot.state.records.keys().cloned().collect())
    }

    /// Mark the records behind externally reported changes as synced.
    ///
    /// Returns the keys that were marked. Inputs with no tracked record are logged.
    pub async fn sync_specified_elements(
        &self,
        inputs: &[RemoteSyncInput],
    ) -> Result<Vec<String>, RemoteTrackingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let mut slot = self.lock().await?;
        let mut synced = Vec::new();
        for input in inputs.iter().filter(|i| i.state != ComponentStatus::Failed) {
            for key in expected::sync_keys(input, self.registry()) {
                let Some(found) = find_key(&slot.state, &key) else {
                    debug!(key = %key, "no tracked remote record for synced element");
                    continue;
                };
                if let Some(record) = slot.state.records.get_mut(&found) {
                    record.mark_synced();
                    synced.push(found);
                }
            }
        }
        if !synced.is_empty() {
            self.persist(&slot.state).await?;
        }
        debug!(org = %self.org, requested = inputs.len(), synced = synced.len(), "remote elements synced");
        Ok(synced)
    }

    pub async fn server_max_revision(&self) -> Result<u64, RemoteTrackingError> {
        Ok(self.lock().await?.state.server_max_revision)
    }

    pub async fn records(&self) -> Result<Vec<RemoteRecord>, RemoteTrackingError> {
        Ok(self.lock().await?.state.records.values().cloned().collect())
    }

    /// Look a record up by key, tolerating percent-encoding differences.
    pub async fn record(&self, key: &str) -> Result<Option<RemoteRecord>, RemoteTrackingError> {
        let slot = self.lock().await?;
        Ok(find_key(&slot.state, key).and_then(|k| slot.state.records.get(&k).cloned()))
    }

    /// Forget every record and delete the tracking file.
    pub async fn clear(&self) -> Result<(), RemoteTrackingError> {
        let mut slot = self.slot.lock().await;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.remove()).await??;
        slot.state = TrackingState::default();
        slot.loaded = true;
        self.clear_query_cache();
        info!(org = %self.org, "remote tracking cleared");
        Ok(())
    }
}

/// Exact key first, then any stored key equal once both are decoded.
pub(crate) fn find_key(state: &TrackingState, key: &str) -> Option<String> {
    if state.records.contains_key(key) {
        return Some(key.to_string());
    }
    state.records.keys().find(|k| keys_match(k, key)).cloned()
}

/// Fold feed rows into `state`, returning the key of each row in feed order.
pub(crate) fn merge(
    state: &mut TrackingState,
    records: Vec<RemoteFeedRecord>,
    synced: bool,
) -> Result<Vec<String>, RemoteTrackingError> {
    if let Some(bad) = records.iter().find(|r| !r.is_well_formed()) {
        return Err(RemoteTrackingError::MalformedRecord {
            revision: bad.revision_counter,
        });
    }
    let mut keys = Vec::with_capacity(records.len());
    for record in records {
        let key = record.key();
        state.server_max_revision = state.server_max_revision.max(record.revision_counter);
        match state.records.get_mut(&key) {
            Some(existing) => {
                existing.absorb(record);
                if synced {
                    existing.mark_synced();
                }
            }
            None => {
                state
                    .records
                    .insert(key.clone(), RemoteRecord::from_feed(record, synced));
            }
        }
        keys.push(key);
    }
    Ok(keys)
}
