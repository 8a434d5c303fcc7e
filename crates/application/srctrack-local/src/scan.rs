use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::time::UNIX_EPOCH;

use camino::{Utf8Path, Utf8PathBuf};
use srctrack_core::path_utils::TrackPath;
use srctrack_core::{ChangeRow, IgnoreRules};
use srctrack_infra::hash_files;
use srctrack_persistence::{ShadowIndex, TrackedFile};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::LocalTrackingError;

/// Result of comparing the working tree with the committed snapshot.
#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    /// Changed rows only, sorted by path.
    pub rows: Vec<ChangeRow>,
    /// Every tracked working-tree file with its current object id.
    pub working: HashMap<String, TrackedFile>,
    pub snapshot: BTreeMap<String, TrackedFile>,
}

pub(crate) struct ScanScope<'a> {
    pub project: &'a Utf8Path,
    pub package_dirs: &'a [String],
    pub ignore: &'a dyn IgnoreRules,
    pub batch_size: usize,
}

impl ScanScope<'_> {
    /// Whether a project-relative path belongs in the comparison at all.
    pub fn includes(&self, rel: &str) -> bool {
        TrackPath::is_within(rel, self.package_dirs)
            && !TrackPath::is_excluded(rel)
            && !self.ignore.is_ignored(rel)
    }
}

struct WorkingFile {
    abs: Utf8PathBuf,
    size: u64,
    mtime: u64,
}

/// Modification time in nanoseconds since the epoch, 0 when unavailable.
pub(crate) fn mtime(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn is_hidden_or_test(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| TrackPath::is_excluded(n))
}

fn walk_package_dirs(scope: &ScanScope<'_>) -> Result<BTreeMap<String, WorkingFile>, LocalTrackingError> {
    let mut files = BTreeMap::new();
    for dir in scope.package_dirs {
        let root = scope.project.join(TrackPath::normalize(dir));
        if !root.exists() {
            debug!(dir = %root, "package directory does not exist, skipping");
            continue;
        }
        for entry in WalkDir::new(&root).into_iter().filter_entry(|e| !is_hidden_or_test(e)) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => match e.into_io_error() {
                    Some(io) if srctrack_infra::is_too_many_open_files(&io) => {
                        return Err(LocalTrackingError::from_io(io, scope.batch_size));
                    }
                    other => {
                        warn!(error = ?other, "unreadable entry during scan, skipping");
                        continue;
                    }
                },
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(abs) = Utf8PathBuf::from_path_buf(entry.into_path()) else {
                warn!("non UTF-8 path during scan, skipping");
                continue;
            };
            let Ok(rel) = abs.strip_prefix(scope.project) else {
                continue;
            };
            let rel = TrackPath::normalize(rel.as_str());
            if !scope.includes(&rel) || files.contains_key(&rel) {
                continue;
            }
            let meta = match fs::metadata(&abs) {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(LocalTrackingError::from_io(e, scope.batch_size)),
            };
            files.insert(
                rel,
                WorkingFile {
                    abs,
                    size: meta.len(),
                    mtime: mtime(&meta),
                },
            );
        }
    }
    Ok(files)
}

/// Walk the package directories, hash what the stat cache cannot vouch for, and
/// diff the result against the committed snapshot.
pub(crate) fn compute_status(
    index: &dyn ShadowIndex,
    scope: &ScanScope<'_>,
) -> Result<ScanOutcome, LocalTrackingError> {
    let batch_size = scope.batch_size;
    let storage = |e| LocalTrackingError::from_storage(e, batch_size);

    let snapshot = index.snapshot().map_err(storage)?;
    let files = walk_package_dirs(scope)?;
    let cache = index.stat_cache().map_err(storage)?;

    let mut working: HashMap<String, TrackedFile> = HashMap::with_capacity(files.len());
    let mut to_hash: Vec<(&String, &WorkingFile)> = Vec::new();
    for (rel, file) in &files {
        match cache.get(rel) {
            Some(cached) if cached.size == file.size && cached.mtime == file.mtime => {
                working.insert(rel.clone(), cached.clone());
            }
            _ => to_hash.push((rel, file)),
        }
    }

    let mut upserts = Vec::with_capacity(to_hash.len());
    for chunk in to_hash.chunks(batch_size.max(1)) {
        let paths: Vec<Utf8PathBuf> = chunk.iter().map(|(_, f)| f.abs.clone()).collect();
        for ((rel, file), hashed) in chunk.iter().zip(hash_files(&paths)) {
            let oid = match hashed {
                Ok(oid) => oid,
                Err(e) if e.io_error().kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %rel, "file vanished during scan");
                    continue;
                }
                Err(e) => return Err(LocalTrackingError::from_hash(e, batch_size)),
            };
            let entry = TrackedFile {
                oid,
                size: file.size,
                mtime: file.mtime,
            };
            upserts.push(((*rel).clone(), entry.clone()));
            working.insert((*rel).clone(), entry);
        }
    }

    let stale: Vec<String> = cache
        .keys()
        .filter(|p| !working.contains_key(*p))
        .cloned()
        .collect();
    index.update_stat_cache(&upserts, &stale).map_err(storage)?;
    debug!(
        files = working.len(),
        hashed = upserts.len(),
        "working tree scanned"
    );

    let mut rows = Vec::new();
    for (rel, entry) in &working {
        match snapshot.get(rel) {
            None => rows.push(ChangeRow::added(rel.clone())),
            Some(committed) if committed.oid != entry.oid => rows.push(ChangeRow::modified(rel.clone())),
            Some(_) => {}
        }
    }
    let present: HashSet<&str> = working.keys().map(String::as_str).collect();
    for rel in snapshot.keys() {
        if !present.contains(rel.as_str()) && scope.includes(rel) {
            rows.push(ChangeRow::deleted(rel.clone()));
        }
    }
    rows.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(ScanOutcome {
        rows,
        working,
        snapshot,
    })
}
