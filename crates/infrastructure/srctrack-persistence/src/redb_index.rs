use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use srctrack_core::ObjectId;
use tracing::warn;

use crate::api::{CommitRecord, ShadowIndex, TrackedFile, CURRENT_SCHEMA, INDEX_FILENAME};
use crate::codec::{decode_commit, decode_tracked, encode_commit, encode_tracked};
use crate::paths::normalize_rel_path;
use crate::StorageError;

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("snapshot");
const STAT_CACHE: TableDefinition<&str, &[u8]> = TableDefinition::new("stat_cache");
const COMMITS: TableDefinition<u64, &[u8]> = TableDefinition::new("commits");

const META_FORMAT_KEY: &str = "format";
const META_FORMAT_VALUE: &str = "srctrack-shadow";
const META_SCHEMA_VERSION: &str = "schema_version";
const META_CREATED_AT: &str = "created_at";
const META_HEAD: &str = "head";

/// redb-backed shadow index stored at `<store>/index.redb`.
#[derive(Clone)]
pub struct RedbShadowIndex {
    path: Utf8PathBuf,
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbShadowIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbShadowIndex")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbShadowIndex {
    fn is_corrupt_open_error(err: &redb::DatabaseError) -> bool {
        match err {
            redb::DatabaseError::Storage(storage) => match storage {
                redb::StorageError::Corrupted(_) => true,
                redb::StorageError::Io(ioe) => matches!(
                    ioe.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
                ),
                _ => false,
            },
            _ => false,
        }
    }

    fn db_cache() -> &'static Mutex<HashMap<Utf8PathBuf, Arc<Database>>> {
        static CACHE: OnceLock<Mutex<HashMap<Utf8PathBuf, Arc<Database>>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    pub fn path_for_store(store_dir: &Utf8Path) -> Utf8PathBuf {
        store_dir.join(INDEX_FILENAME)
    }

    /// Open the index in `store_dir`, creating it if needed.
    ///
    /// A corrupt index is set aside and replaced by an empty one, so the next
    /// scan reports every file as added.
    pub fn open(store_dir: &Utf8Path) -> Result<Self, StorageError> {
        let path = Self::path_for_store(store_dir);
        std::fs::create_dir_all(store_dir)?;

        let mut cache = Self::db_cache().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cache.get(&path) {
            if path.exists() {
                return Ok(Self {
                    path,
                    db: existing.clone(),
                });
            }
            cache.remove(&path);
        }

        let db = match Self::open_db(&path) {
            Ok(db) => db,
            Err(StorageError::Corrupt) => {
                Self::set_aside(&path)?;
                Self::open_db(&path)?
            }
            Err(e) => return Err(e),
        };
        let db = Arc::new(db);
        cache.insert(path.clone(), db.clone());
        Ok(Self { path, db })
    }

    /// Drop the process-wide handle for `store_dir` so the files can be removed.
    pub fn release(store_dir: &Utf8Path) {
        let path = Self::path_for_store(store_dir);
        Self::db_cache()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&path);
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Rename a damaged index to `index.redb.damaged-<time>-<pid>` next to it.
    fn set_aside(path: &Utf8Path) -> Result<(), StorageError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.9f");
        let name = format!("{INDEX_FILENAME}.damaged-{stamp}-{}", std::process::id());
        let damaged = path.with_file_name(name);
        warn!(index = %path, moved_to = %damaged, "local shadow index is damaged, starting a fresh one");
        std::fs::rename(path, &damaged)?;
        Ok(())
    }

    fn open_db(path: &Utf8Path) -> Result<Database, StorageError> {
        let db = if path.exists() {
            match Database::open(path.as_std_path()) {
                Ok(db) => db,
                Err(e) if Self::is_corrupt_open_error(&e) => return Err(StorageError::Corrupt),
                Err(e) => return Err(e.into()),
            }
        } else {
            Database::create(path.as_std_path())?
        };
        Self::ensure_schema(&db)?;
        Ok(db)
    }

    fn ensure_schema(db: &Database) -> Result<(), StorageError> {
        let write_tx = db.begin_write()?;
        {
            let mut meta = write_tx.open_table(META)?;
            let format: Option<String> = meta.get(META_FORMAT_KEY)?.map(|g| g.value().to_string());
            match format.as_deref() {
                None => {
                    let schema_version = CURRENT_SCHEMA.to_string();
                    let created_at = Utc::now().to_rfc3339();
                    meta.insert(META_FORMAT_KEY, META_FORMAT_VALUE)?;
                    meta.insert(META_SCHEMA_VERSION, schema_version.as_str())?;
                    meta.insert(META_CREATED_AT, created_at.as_str())?;
                }
                Some(META_FORMAT_VALUE) => {}
                Some(_) => return Err(StorageError::Corrupt),
            }
        }
        let _ = write_tx.open_table(SNAPSHOT)?;
        let _ = write_tx.open_table(STAT_CACHE)?;
        let _ = write_tx.open_table(COMMITS)?;
        write_tx.commit()?;

        let read_tx = db.begin_read()?;
        let meta = read_tx.open_table(META)?;
        let schema_version = meta
            .get(META_SCHEMA_VERSION)?
            .and_then(|g| g.value().parse::<u32>().ok())
            .unwrap_or(0);
        if schema_version == 0 {
            return Err(StorageError::Corrupt);
        }
        if schema_version > CURRENT_SCHEMA {
            return Err(StorageError::NewerSchema {
                found: schema_version,
                supported: CURRENT_SCHEMA,
            });
        }
        Ok(())
    }

    fn commit_id(
        parent: Option<&str>,
        seq: u64,
        message: &str,
        timestamp: &str,
        staged: &[(String, TrackedFile)],
        removed: &[String],
    ) -> ObjectId {
        let mut hasher = md5::Context::new();
        hasher.consume(parent.unwrap_or("").as_bytes());
        hasher.consume(seq.to_le_bytes());
        hasher.consume(message.as_bytes());
        hasher.consume(timestamp.as_bytes());
        for (path, entry) in staged {
            hasher.consume(path.as_bytes());
            hasher.consume(entry.oid.as_bytes());
        }
        for path in removed {
            hasher.consume(b"-");
            hasher.consume(path.as_bytes());
        }
        format!("{:X}", hasher.finalize())
    }
}

impl ShadowIndex for RedbShadowIndex {
    fn snapshot(&self) -> Result<BTreeMap<String, TrackedFile>, StorageError> {
        let read_tx = self.db.begin_read()?;
        let table = read_tx.open_table(SNAPSHOT)?;
        let mut out = BTreeMap::new();
        for row in table.iter()? {
            let (k, v) = row?;
            out.insert(k.value().to_string(), decode_tracked(v.value())?);
        }
        Ok(out)
    }

    fn stat_cache(&self) -> Result<HashMap<String, TrackedFile>, StorageError> {
        let read_tx = self.db.begin_read()?;
        let table = read_tx.open_table(STAT_CACHE)?;
        let mut out = HashMap::new();
        for row in table.iter()? {
            let (k, v) = row?;
            out.insert(k.value().to_string(), decode_tracked(v.value())?);
        }
        Ok(out)
    }

    fn update_stat_cache(
        &self,
        upserts: &[(String, TrackedFile)],
        removals: &[String],
    ) -> Result<(), StorageError> {
        if upserts.is_empty() && removals.is_empty() {
            return Ok(());
        }
        let write_tx = self.db.begin_write()?;
        {
            let mut table = write_tx.open_table(STAT_CACHE)?;
            for path in removals {
                let rel = normalize_rel_path(path)?;
                let _ = table.remove(rel.as_str())?;
            }
            for (path, entry) in upserts {
                let rel = normalize_rel_path(path)?;
                let value = encode_tracked(entry)?;
                table.insert(rel.as_str(), value.as_slice())?;
            }
        }
        write_tx.commit()?;
        Ok(())
    }

    fn apply_commit(
        &self,
        staged: &[(String, TrackedFile)],
        removed: &[String],
        message: &str,
    ) -> Result<Option<CommitRecord>, StorageError> {
        let write_tx = self.db.begin_write()?;
        let mut staged_effective = Vec::new();
        let mut removed_effective = Vec::new();
        let record = {
            let mut snapshot = write_tx.open_table(SNAPSHOT)?;
            for (path, entry) in staged {
                let rel = normalize_rel_path(path)?;
                let existing = snapshot
                    .get(rel.as_str())?
                    .map(|g| decode_tracked(g.value()))
                    .transpose()?;
                if existing.as_ref().map(|e| &e.oid) == Some(&entry.oid) {
                    continue;
                }
                let value = encode_tracked(entry)?;
                snapshot.insert(rel.as_str(), value.as_slice())?;
                staged_effective.push((rel, entry.clone()));
            }
            for path in removed {
                let rel = normalize_rel_path(path)?;
                if snapshot.remove(rel.as_str())?.is_some() {
                    removed_effective.push(rel);
                }
            }

            if staged_effective.is_empty() && removed_effective.is_empty() {
                None
            } else {
                let mut commits = write_tx.open_table(COMMITS)?;
                let seq = commits.last()?.map(|(k, _)| k.value() + 1).unwrap_or(1);
                let mut meta = write_tx.open_table(META)?;
                let parent = meta.get(META_HEAD)?.map(|g| g.value().to_string());
                let timestamp = Utc::now().to_rfc3339();
                let id = Self::commit_id(
                    parent.as_deref(),
                    seq,
                    message,
                    &timestamp,
                    &staged_effective,
                    &removed_effective,
                );
                let record = CommitRecord {
                    id,
                    parent,
                    message: message.to_string(),
                    timestamp,
                    staged: staged_effective.len(),
                    removed: removed_effective.len(),
                };
                let bytes = encode_commit(&record)?;
                commits.insert(seq, bytes.as_slice())?;
                meta.insert(META_HEAD, record.id.as_str())?;
                Some(record)
            }
        };

        match record {
            Some(record) => {
                write_tx.commit()?;
                Ok(Some(record))
            }
            None => {
                write_tx.abort()?;
                Ok(None)
            }
        }
    }

    fn head(&self) -> Result<Option<CommitRecord>, StorageError> {
        let read_tx = self.db.begin_read()?;
        let commits = read_tx.open_table(COMMITS)?;
        let last = commits.last()?;
        last.map(|(_, v)| decode_commit(v.value())).transpose()
    }

    fn commit_log(&self) -> Result<Vec<CommitRecord>, StorageError> {
        let read_tx = self.db.begin_read()?;
        let commits = read_tx.open_table(COMMITS)?;
        let mut out = Vec::new();
        for row in commits.iter()? {
            let (_, v) = row?;
            out.push(decode_commit(v.value())?);
        }
        Ok(out)
    }
}
