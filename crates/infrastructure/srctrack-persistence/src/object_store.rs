use camino::{Utf8Path, Utf8PathBuf};

use crate::api::OBJECTS_DIRNAME;
use crate::StorageError;

/// Content-addressed blob directory: `<store>/objects/AB/CDEF...`.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: Utf8PathBuf,
}

impl ObjectStore {
    pub fn new(store_dir: &Utf8Path) -> Self {
        Self {
            root: store_dir.join(OBJECTS_DIRNAME),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn object_path(&self, oid: &str) -> Result<Utf8PathBuf, StorageError> {
        if oid.len() < 3 || !oid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidPath(oid.to_string()));
        }
        let (shard, rest) = oid.split_at(2);
        Ok(self.root.join(shard).join(rest))
    }

    pub fn contains(&self, oid: &str) -> bool {
        self.object_path(oid).map(|p| p.exists()).unwrap_or(false)
    }

    /// Copy `src` into the store under `oid`. Returns false when the object was
    /// already present.
    pub fn put_file(&self, oid: &str, src: &Utf8Path) -> Result<bool, StorageError> {
        let dest = self.object_path(oid)?;
        if dest.exists() {
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = dest.with_extension(format!("tmp.{}", std::process::id()));
        if let Err(e) = std::fs::copy(src, &tmp) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        std::fs::rename(&tmp, &dest)?;
        Ok(true)
    }

    pub fn read(&self, oid: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(oid)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::Missing),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objects_are_sharded_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let src = root.join("a.cls");
        std::fs::write(&src, b"body").unwrap();

        let store = ObjectStore::new(&root.join("store"));
        assert!(store.put_file("ABCDEF", &src).unwrap());
        assert!(!store.put_file("ABCDEF", &src).unwrap());
        assert!(root.join("store/objects/AB/CDEF").exists());
        assert_eq!(store.read("ABCDEF").unwrap(), b"body");
    }

    #[test]
    fn bad_ids_are_rejected() {
        let store = ObjectStore::new(Utf8Path::new("/tmp/none"));
        assert!(matches!(store.read("../x"), Err(StorageError::InvalidPath(_))));
        assert!(matches!(store.read("ABCDEF"), Err(StorageError::Missing)));
    }
}
