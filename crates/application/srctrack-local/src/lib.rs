//! Local shadow tracker: detects working-tree changes against a private snapshot.
//!
//! The snapshot lives in `<project>/.sf/orgs/<org>/localSourceTracking/` and only
//! moves forward when the caller commits paths (or when a scan finds moves).

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use srctrack_config::TrackingConfig;
use srctrack_core::path_utils::TrackPath;
use srctrack_core::row::paths_where;
use srctrack_core::{
    ChangeRow, CommitOutcome, CommitRequest, ComponentResolver, IgnoreRules, NoIgnore,
    NoopTelemetry, TelemetrySink, TrackingEvent,
};
use srctrack_infra::hash_files;
use srctrack_persistence::{
    ObjectStore, RedbShadowIndex, ShadowIndex, StoreLayout, TrackedFile,
};
use tracing::{debug, info, warn};

mod error;
mod moves;
mod scan;

pub use error::LocalTrackingError;

use scan::{compute_status, ScanOutcome, ScanScope};

const MOVE_COMMIT_MESSAGE: &str = "committing moved files";

/// Collaborators and settings for a tracker.
#[derive(Clone)]
pub struct LocalTrackerOptions {
    /// Project-relative directories that hold tracked source.
    pub package_dirs: Vec<String>,
    pub config: TrackingConfig,
    pub resolver: Arc<dyn ComponentResolver>,
    pub ignore: Arc<dyn IgnoreRules>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl LocalTrackerOptions {
    pub fn new(
        package_dirs: impl IntoIterator<Item = impl Into<String>>,
        resolver: Arc<dyn ComponentResolver>,
    ) -> Self {
        Self {
            package_dirs: package_dirs.into_iter().map(Into::into).collect(),
            config: TrackingConfig::default(),
            resolver,
            ignore: Arc::new(NoIgnore),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
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

#[derive(Clone)]
struct Store {
    index: RedbShadowIndex,
    objects: ObjectStore,
}

#[derive(Default)]
struct TrackerState {
    /// `None` once the store has been deleted.
    store: Option<Store>,
    /// Last scan result, dropped by every commit.
    rows: Option<Vec<ChangeRow>>,
}

impl TrackerState {
    fn store(&self) -> Result<Store, LocalTrackingError> {
        self.store.clone().ok_or(LocalTrackingError::Deleted)
    }
}

pub struct LocalShadowTracker {
    layout: StoreLayout,
    options: LocalTrackerOptions,
    state: Mutex<TrackerState>,
}

impl LocalShadowTracker {
    /// Open the shadow store for `layout`, creating it on first use.
    pub fn open(layout: StoreLayout, options: LocalTrackerOptions) -> Result<Self, LocalTrackingError> {
        let dir = layout.local_store_dir();
        let batch_size = options.config.batch_size;
        let index = RedbShadowIndex::open(&dir)
            .map_err(|e| LocalTrackingError::from_storage(e, batch_size))?;
        debug!(store = %dir, "local shadow store opened");
        Ok(Self {
            layout,
            options,
            state: Mutex::new(TrackerState {
                store: Some(Store {
                    index,
                    objects: ObjectStore::new(&dir),
                }),
                rows: None,
            }),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn store_dir(&self) -> Utf8PathBuf {
        self.layout.local_store_dir()
    }

    pub fn project(&self) -> &Utf8Path {
        self.layout.project()
    }

    /// False once `delete` has run.
    pub fn is_active(&self) -> bool {
        self.state().store.is_some()
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn batch_size(&self) -> usize {
        self.options.config.batch_size.max(1)
    }

    /// Changed rows since the last commit. Cached until `force_refresh` or a commit.
    pub fn scan(&self, force_refresh: bool) -> Result<Vec<ChangeRow>, LocalTrackingError> {
        let mut state = self.state();
        if !force_refresh {
            if let Some(rows) = &state.rows {
                return Ok(rows.clone());
            }
        }
        self.refresh(&mut state)
    }

    fn refresh(&self, state: &mut TrackerState) -> Result<Vec<ChangeRow>, LocalTrackingError> {
        let store = state.store()?;
        let scope = ScanScope {
            project: self.layout.project(),
            package_dirs: &self.options.package_dirs,
            ignore: self.options.ignore.as_ref(),
            batch_size: self.batch_size(),
        };
        let outcome = compute_status(&store.index, &scope)?;
        let rows = if self.options.config.move_detection {
            self.commit_moves(&store, outcome)?
        } else {
            outcome.rows
        };
        debug!(changed = rows.len(), "local status refreshed");
        state.rows = Some(rows.clone());
        Ok(rows)
    }

    /// Detect moves in a fresh scan, commit them, and drop them from the rows.
    fn commit_moves(&self, store: &Store, outcome: ScanOutcome) -> Result<Vec<ChangeRow>, LocalTrackingError> {
        let added = paths_where(&outcome.rows, ChangeRow::is_added);
        let deleted = paths_where(&outcome.rows, ChangeRow::is_deleted);
        let matches = moves::detect(
            &added,
            &deleted,
            &outcome.working,
            &outcome.snapshot,
            self.options.resolver.as_ref(),
        );

        if !matches.ignored.is_empty() {
            warn!(
                paths = ?matches.ignored,
                "ambiguous move candidates share content and identity; reporting them as plain adds and deletes"
            );
            self.options
                .telemetry
                .emit(TrackingEvent::AmbiguousMoveCandidates {
                    count: matches.ignored.len(),
                });
        }
        if matches.is_empty() {
            return Ok(outcome.rows);
        }

        let batch_size = self.batch_size();
        let project = self.layout.project();
        let mut staged: Vec<(String, TrackedFile)> = Vec::with_capacity(matches.full.len());
        for added_path in matches.full.keys() {
            let Some(entry) = outcome.working.get(added_path) else {
                continue;
            };
            store
                .objects
                .put_file(&entry.oid, &project.join(added_path))
                .map_err(|e| LocalTrackingError::from_storage(e, batch_size))?;
            staged.push((added_path.clone(), entry.clone()));
        }
        // Edited moves only drop the old path; the new one stays a pending add.
        let removed: Vec<String> = matches
            .full
            .values()
            .chain(matches.edited.values())
            .cloned()
            .collect();

        store
            .index
            .apply_commit(&staged, &removed, MOVE_COMMIT_MESSAGE)
            .map_err(|e| LocalTrackingError::from_storage(e, batch_size))?;
        info!(
            moved = matches.full.len(),
            moved_and_edited = matches.edited.len(),
            "committed detected moves"
        );
        self.options.telemetry.emit(TrackingEvent::MovesDetected {
            full: matches.full.len(),
            edited: matches.edited.len(),
        });

        let settled: HashSet<&str> = matches
            .full
            .keys()
            .chain(removed.iter())
            .map(String::as_str)
            .collect();
        Ok(outcome
            .rows
            .into_iter()
            .filter(|row| !settled.contains(row.path.as_str()))
            .collect())
    }

    fn last_rows(&self) -> Vec<ChangeRow> {
        self.state().rows.clone().unwrap_or_default()
    }

    pub fn changed_rows(&self) -> Vec<ChangeRow> {
        self.last_rows().into_iter().filter(ChangeRow::is_changed).collect()
    }

    pub fn added_rows(&self) -> Vec<ChangeRow> {
        self.last_rows().into_iter().filter(ChangeRow::is_added).collect()
    }

    pub fn modified_rows(&self) -> Vec<ChangeRow> {
        self.last_rows().into_iter().filter(ChangeRow::is_modified).collect()
    }

    pub fn deleted_rows(&self) -> Vec<ChangeRow> {
        self.last_rows().into_iter().filter(ChangeRow::is_deleted).collect()
    }

    pub fn changed_paths(&self) -> Vec<String> {
        paths_where(&self.last_rows(), ChangeRow::is_changed)
    }

    pub fn added_paths(&self) -> Vec<String> {
        paths_where(&self.last_rows(), ChangeRow::is_added)
    }

    pub fn modified_paths(&self) -> Vec<String> {
        paths_where(&self.last_rows(), ChangeRow::is_modified)
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        paths_where(&self.last_rows(), ChangeRow::is_deleted)
    }

    /// Added and modified paths, i.e. everything still present on disk.
    pub fn non_deleted_paths(&self) -> Vec<String> {
        paths_where(&self.last_rows(), ChangeRow::is_non_delete)
    }

    fn relativize(&self, path: &str) -> Result<String, LocalTrackingError> {
        let candidate = Utf8Path::new(path);
        let rel = if candidate.is_absolute() {
            candidate
                .strip_prefix(self.layout.project())
                .map_err(|_| LocalTrackingError::OutsideProject(path.to_string()))?
                .as_str()
                .to_string()
        } else {
            path.to_string()
        };
        let rel = TrackPath::normalize(&rel);
        if rel.is_empty() || !TrackPath::verify_safe(&rel) {
            return Err(LocalTrackingError::OutsideProject(path.to_string()));
        }
        Ok(rel)
    }

    /// Record exactly the given paths in the snapshot.
    ///
    /// Paths are applied in chunks of the configured batch size, one after another.
    /// If a chunk fails, earlier chunks stay committed and the next scan shows the
    /// real state.
    pub fn commit(&self, request: CommitRequest) -> Result<CommitOutcome, LocalTrackingError> {
        if request.is_empty() {
            debug!("commit requested with no paths");
            return Ok(CommitOutcome::NothingToCommit);
        }

        let mut state = self.state();
        let store = state.store()?;
        let result = self.commit_chunks(&store, &request);
        state.rows = None;
        let outcome = result?;

        if !request.skip_status_refresh {
            self.refresh(&mut state)?;
        }
        Ok(outcome)
    }

    fn commit_chunks(&self, store: &Store, request: &CommitRequest) -> Result<CommitOutcome, LocalTrackingError> {
        let batch_size = self.batch_size();
        let storage = |e| LocalTrackingError::from_storage(e, batch_size);
        let project = self.layout.project();

        let mut present = Vec::new();
        let mut removed = Vec::new();
        for path in &request.added_or_modified {
            let rel = self.relativize(path)?;
            if project.join(&rel).is_file() {
                present.push(rel);
            } else {
                debug!(path = %rel, "path to add is gone from disk, removing it instead");
                removed.push(rel);
            }
        }
        for path in &request.deleted {
            removed.push(self.relativize(path)?);
        }

        let mut last_commit = None;
        for chunk in present.chunks(batch_size) {
            let abs: Vec<Utf8PathBuf> = chunk.iter().map(|rel| project.join(rel)).collect();
            let mut staged = Vec::with_capacity(chunk.len());
            for ((rel, abs), hashed) in chunk.iter().zip(&abs).zip(hash_files(&abs)) {
                let oid = hashed.map_err(|e| LocalTrackingError::from_hash(e, batch_size))?;
                let meta = std::fs::metadata(abs).map_err(|e| LocalTrackingError::from_io(e, batch_size))?;
                store.objects.put_file(&oid, abs).map_err(storage)?;
                staged.push((
                    rel.clone(),
                    TrackedFile {
                        oid,
                        size: meta.len(),
                        mtime: scan::mtime(&meta),
                    },
                ));
            }
            if let Some(record) = store.index.apply_commit(&staged, &[], &request.message).map_err(storage)? {
                last_commit = Some(record.id);
            }
            store.index.update_stat_cache(&staged, &[]).map_err(storage)?;
        }
        for chunk in removed.chunks(batch_size) {
            if let Some(record) = store.index.apply_commit(&[], chunk, &request.message).map_err(storage)? {
                last_commit = Some(record.id);
            }
        }

        match last_commit {
            Some(id) => {
                info!(commit = %id, staged = present.len(), removed = removed.len(), "local changes committed");
                Ok(CommitOutcome::Committed(id))
            }
            // Snapshot already matched; report where it stands.
            None => Ok(match store.index.head().map_err(storage)? {
                Some(head) => CommitOutcome::Committed(head.id),
                None => CommitOutcome::NothingToCommit,
            }),
        }
    }

    /// Id of the latest snapshot commit, if any.
    pub fn head(&self) -> Result<Option<String>, LocalTrackingError> {
        let store = self.state().store()?;
        store
            .index
            .head()
            .map(|h| h.map(|c| c.id))
            .map_err(|e| LocalTrackingError::from_storage(e, self.batch_size()))
    }

    /// Content of `path` as of the latest commit, even if the file is gone from disk.
    pub fn committed_content(&self, path: &str) -> Result<Option<Vec<u8>>, LocalTrackingError> {
        let rel = self.relativize(path)?;
        let store = self.state().store()?;
        let storage = |e| LocalTrackingError::from_storage(e, self.batch_size());
        let snapshot = store.index.snapshot().map_err(storage)?;
        let Some(entry) = snapshot.get(&rel) else {
            return Ok(None);
        };
        store.objects.read(&entry.oid).map(Some).map_err(storage)
    }

    /// Remove the whole store directory and return its path.
    pub fn delete(&self) -> Result<Utf8PathBuf, LocalTrackingError> {
        let mut state = self.state();
        state.store = None;
        state.rows = None;
        let dir = self.layout.local_store_dir();
        RedbShadowIndex::release(&dir);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LocalTrackingError::from_io(e, self.batch_size())),
        }
        info!(store = %dir, "local source tracking deleted");
        Ok(dir)
    }
}
