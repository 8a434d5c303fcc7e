use std::sync::Arc;

use serde::Serialize;
use srctrack_config::TrackingConfig;
use srctrack_core::conflict::resolve_local_changes;
use srctrack_core::{
    find_conflicts, ChangeResult, ChangeRow, CommitOutcome, CommitRequest, ComponentResolver,
    ConflictRecord, DefaultRegistry, IgnoreRules, MetadataRegistry, NoIgnore, NoopTelemetry,
    RemoteFeed, RemoteRecord, RemoteSyncInput, TelemetrySink,
};
use srctrack_local::{LocalShadowTracker, LocalTrackerOptions};
use srctrack_persistence::StoreLayout;
use srctrack_remote::{PollOutcome, RemoteServiceOptions, RemoteTrackingService};
use tracing::{debug, info};

use crate::{TrackerRegistry, TrackingError};

const RESET_COMMIT_MESSAGE: &str = "reset local source tracking";

/// Everything needed to track one project against one org.
#[derive(Clone)]
pub struct TrackingSetup {
    pub layout: StoreLayout,
    pub package_dirs: Vec<String>,
    pub feed: Arc<dyn RemoteFeed>,
    pub resolver: Arc<dyn ComponentResolver>,
    pub registry: Arc<dyn MetadataRegistry>,
    pub ignore: Arc<dyn IgnoreRules>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub config: TrackingConfig,
}

impl TrackingSetup {
    pub fn new(
        layout: StoreLayout,
        package_dirs: impl IntoIterator<Item = impl Into<String>>,
        feed: Arc<dyn RemoteFeed>,
        resolver: Arc<dyn ComponentResolver>,
    ) -> Self {
        Self {
            layout,
            package_dirs: package_dirs.into_iter().map(Into::into).collect(),
            feed,
            resolver,
            registry: Arc::new(DefaultRegistry::default()),
            ignore: Arc::new(NoIgnore),
            telemetry: Arc::new(NoopTelemetry),
            config: TrackingConfig::from_env(),
        }
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_ignore(mut self, ignore: Arc<dyn IgnoreRules>) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }
}

/// Local and remote changes captured together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackingStatus {
    pub local: Vec<ChangeResult>,
    pub remote: Vec<ChangeResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUpdateReport {
    /// Keys marked synced from the reported elements.
    pub synced: Vec<String>,
    /// Present when polling was requested.
    pub poll: Option<PollOutcome>,
}

/// Status, conflicts and post-operation bookkeeping for one project and org.
pub struct SourceTracking {
    trackers: Arc<TrackerRegistry>,
    setup: TrackingSetup,
    local_options: LocalTrackerOptions,
    remote_options: RemoteServiceOptions,
}

impl SourceTracking {
    pub fn new(trackers: Arc<TrackerRegistry>, setup: TrackingSetup) -> Self {
        let local_options = LocalTrackerOptions::new(setup.package_dirs.clone(), setup.resolver.clone())
            .with_config(setup.config.clone())
            .with_ignore(setup.ignore.clone())
            .with_telemetry(setup.telemetry.clone());
        let remote_options = RemoteServiceOptions::default()
            .with_config(setup.config.clone())
            .with_registry(setup.registry.clone())
            .with_telemetry(setup.telemetry.clone());
        Self {
            trackers,
            setup,
            local_options,
            remote_options,
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.setup.layout
    }

    fn local(&self) -> Result<Arc<LocalShadowTracker>, TrackingError> {
        Ok(self.trackers.local(&self.setup.layout, &self.local_options)?)
    }

    fn remote(&self) -> Arc<RemoteTrackingService> {
        self.trackers
            .remote(&self.setup.layout, self.setup.feed.clone(), &self.remote_options)
    }

    async fn scan(&self, force_refresh: bool) -> Result<Vec<ChangeRow>, TrackingError> {
        let tracker = self.local()?;
        Ok(tokio::task::spawn_blocking(move || tracker.scan(force_refresh)).await??)
    }

    /// Local changes as unresolved, file-only change results.
    pub async fn local_changes(&self, force_refresh: bool) -> Result<Vec<ChangeResult>, TrackingError> {
        let rows = self.scan(force_refresh).await?;
        Ok(rows.iter().map(local_change).collect())
    }

    /// Local changes with their metadata identity filled in.
    ///
    /// Files that resolve to nothing are dropped with a warning.
    pub async fn local_components(&self, force_refresh: bool) -> Result<Vec<ChangeResult>, TrackingError> {
        let changes = self.local_changes(force_refresh).await?;
        let resolver = self.setup.resolver.clone();
        Ok(tokio::task::spawn_blocking(move || resolve_local_changes(&changes, resolver.as_ref())).await?)
    }

    /// Outstanding remote changes, located in the project where the resolver can.
    pub async fn remote_changes(&self) -> Result<Vec<ChangeResult>, TrackingError> {
        let records = self.remote().retrieve_updates().await?;
        Ok(records.iter().map(|r| self.remote_change(r)).collect())
    }

    fn remote_change(&self, record: &RemoteRecord) -> ChangeResult {
        let paths = self
            .setup
            .resolver
            .paths_for(&record.member_type, &record.member_name);
        let mut change = ChangeResult::from(record).with_filenames(paths);
        change.ignored = !change.filenames.is_empty()
            && change.filenames.iter().all(|f| self.setup.ignore.is_ignored(f));
        change
    }

    /// Local and remote changes, gathered concurrently.
    pub async fn status(&self, force_refresh: bool) -> Result<TrackingStatus, TrackingError> {
        let (local, remote) = tokio::join!(self.local_changes(force_refresh), self.remote_changes());
        let status = TrackingStatus {
            local: local?,
            remote: remote?,
        };
        debug!(local = status.local.len(), remote = status.remote.len(), "tracking status gathered");
        Ok(status)
    }

    /// Components changed on both sides since the last sync.
    pub async fn conflicts(&self, force_refresh: bool) -> Result<Vec<ConflictRecord>, TrackingError> {
        let TrackingStatus { local, remote } = self.status(force_refresh).await?;
        if local.is_empty() || remote.is_empty() {
            return Ok(Vec::new());
        }
        let resolver = self.setup.resolver.clone();
        let registry = self.setup.registry.clone();
        let conflicts = tokio::task::spawn_blocking(move || {
            find_conflicts(&local, &remote, resolver.as_ref(), registry.as_ref())
        })
        .await?;
        if !conflicts.is_empty() {
            info!(count = conflicts.len(), "local and remote changes conflict");
        }
        Ok(conflicts)
    }

    /// Record a finished deploy or retrieve in the local snapshot.
    pub async fn update_local_tracking(&self, request: CommitRequest) -> Result<CommitOutcome, TrackingError> {
        let tracker = self.local()?;
        Ok(tokio::task::spawn_blocking(move || tracker.commit(request)).await??)
    }

    /// Record remote elements the caller now has.
    ///
    /// With `poll`, first waits for the elements to appear in the feed so their
    /// new revisions are the ones marked synced.
    pub async fn update_remote_tracking(
        &self,
        elements: &[RemoteSyncInput],
        poll: bool,
    ) -> Result<RemoteUpdateReport, TrackingError> {
        let remote = self.remote();
        let poll = if poll {
            Some(
                remote
                    .poll_for_convergence(elements, self.setup.registry.as_ref())
                    .await?,
            )
        } else {
            None
        };
        let synced = remote.sync_specified_elements(elements).await?;
        Ok(RemoteUpdateReport { synced, poll })
    }

    /// Rebuild the local snapshot so every file currently on disk counts as synced.
    ///
    /// Returns the paths committed into the fresh snapshot.
    pub async fn reset_local(&self) -> Result<Vec<String>, TrackingError> {
        let removed = {
            let tracker = self.local()?;
            tokio::task::spawn_blocking(move || tracker.delete()).await??
        };
        debug!(store = %removed, "local snapshot removed");

        let tracker = self.local()?;
        let committed = tokio::task::spawn_blocking(move || {
            tracker.scan(true)?;
            let paths = tracker.non_deleted_paths();
            if !paths.is_empty() {
                tracker.commit(CommitRequest::new(RESET_COMMIT_MESSAGE).with_added(paths.clone()))?;
            }
            Ok::<_, srctrack_local::LocalTrackingError>(paths)
        })
        .await??;
        info!(files = committed.len(), "local source tracking reset");
        Ok(committed)
    }

    /// Re-baseline remote tracking at `to_revision`, or at the feed's head.
    pub async fn reset_remote(&self, to_revision: Option<u64>) -> Result<Vec<String>, TrackingError> {
        Ok(self.remote().reset(to_revision).await?)
    }
}

fn local_change(row: &ChangeRow) -> ChangeResult {
    let change = ChangeResult::local([row.path.clone()]);
    if row.is_deleted() {
        change.as_deleted()
    } else if row.is_modified() {
        change.as_modified()
    } else {
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use srctrack_core::ChangeOrigin;

    #[test]
    fn rows_map_to_local_changes() {
        let added = local_change(&ChangeRow::added("a.cls"));
        assert_eq!(added.origin, ChangeOrigin::Local);
        assert!(!added.deleted && !added.modified);

        assert!(local_change(&ChangeRow::modified("a.cls")).modified);
        let deleted = local_change(&ChangeRow::deleted("a.cls"));
        assert!(deleted.deleted);
        assert_eq!(deleted.filenames, vec!["a.cls"]);
        assert!(!deleted.is_resolved());
    }
}
