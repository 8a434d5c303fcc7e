//! Caller-owned caches of trackers: one local tracker per (project, org) and one
//! remote service per org.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use srctrack_config::REMOTE_INSTANCE_TTL;
use srctrack_core::RemoteFeed;
use srctrack_local::{LocalShadowTracker, LocalTrackerOptions, LocalTrackingError};
use srctrack_persistence::StoreLayout;
use srctrack_remote::{RemoteServiceOptions, RemoteTrackingService};
use tracing::debug;

struct RemoteEntry {
    service: Arc<RemoteTrackingService>,
    last_used: Instant,
}

pub struct TrackerRegistry {
    ttl: Duration,
    local: Mutex<HashMap<(Utf8PathBuf, String), Arc<LocalShadowTracker>>>,
    remote: Mutex<HashMap<String, RemoteEntry>>,
}

impl Default for TrackerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::with_ttl(REMOTE_INSTANCE_TTL)
    }

    /// Remote services idle for longer than `ttl` are dropped on the next access.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            local: Mutex::new(HashMap::new()),
            remote: Mutex::new(HashMap::new()),
        }
    }

    /// The tracker for `layout`, opened on first use and again after a delete.
    pub fn local(
        &self,
        layout: &StoreLayout,
        options: &LocalTrackerOptions,
    ) -> Result<Arc<LocalShadowTracker>, LocalTrackingError> {
        let key = (layout.project().to_path_buf(), layout.org().to_string());
        let mut cache = self.local.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tracker) = cache.get(&key) {
            if tracker.is_active() {
                return Ok(tracker.clone());
            }
            debug!(project = %key.0, org = %key.1, "local tracker was deleted, reopening");
        }
        let tracker = Arc::new(LocalShadowTracker::open(layout.clone(), options.clone())?);
        cache.insert(key, tracker.clone());
        Ok(tracker)
    }

    /// The remote service for the layout's org.
    ///
    /// Every fetch sweeps expired services and clears the returned service's
    /// query cache.
    pub fn remote(
        &self,
        layout: &StoreLayout,
        feed: Arc<dyn RemoteFeed>,
        options: &RemoteServiceOptions,
    ) -> Arc<RemoteTrackingService> {
        let now = Instant::now();
        let mut cache = self.remote.lock().unwrap_or_else(PoisonError::into_inner);
        let before = cache.len();
        cache.retain(|_, entry| now.duration_since(entry.last_used) <= self.ttl);
        if cache.len() != before {
            debug!(evicted = before - cache.len(), "expired remote tracking services");
        }

        let entry = cache
            .entry(layout.org().to_string())
            .or_insert_with(|| RemoteEntry {
                service: Arc::new(RemoteTrackingService::new(layout, feed, options.clone())),
                last_used: now,
            });
        entry.last_used = now;
        entry.service.clear_query_cache();
        entry.service.clone()
    }

    pub fn local_count(&self) -> usize {
        self.local.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn remote_count(&self) -> usize {
        self.remote.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
