use camino::Utf8PathBuf;
use srctrack_persistence::{RedbShadowIndex, ShadowIndex, StorageError, StorageErrorKind, TrackedFile};

fn store_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root.join("localSourceTracking"))
}

fn entry(oid: &str) -> TrackedFile {
    TrackedFile {
        oid: oid.into(),
        size: 10,
        mtime: 1_700_000_000,
    }
}

#[test]
fn commit_updates_snapshot_and_log() {
    let (_dir, store) = store_dir();
    let index = RedbShadowIndex::open(&store).unwrap();
    assert!(index.head().unwrap().is_none());

    let first = index
        .apply_commit(
            &[("a/Foo.cls".into(), entry("AAAA")), ("a/Bar.cls".into(), entry("BBBB"))],
            &[],
            "initial",
        )
        .unwrap()
        .expect("first commit stages files");
    assert_eq!(first.staged, 2);
    assert!(first.parent.is_none());

    let second = index
        .apply_commit(&[("a/Foo.cls".into(), entry("CCCC"))], &["a/Bar.cls".into()], "edit")
        .unwrap()
        .unwrap();
    assert_eq!(second.parent.as_deref(), Some(first.id.as_str()));
    assert_eq!((second.staged, second.removed), (1, 1));

    let snapshot = index.snapshot().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["a/Foo.cls"].oid, "CCCC");
    assert_eq!(index.head().unwrap().unwrap().id, second.id);
    assert_eq!(index.commit_log().unwrap().len(), 2);
}

#[test]
fn unchanged_commit_is_a_noop() {
    let (_dir, store) = store_dir();
    let index = RedbShadowIndex::open(&store).unwrap();
    index
        .apply_commit(&[("Foo.cls".into(), entry("AAAA"))], &[], "initial")
        .unwrap();

    let again = index
        .apply_commit(&[("Foo.cls".into(), entry("AAAA"))], &["Missing.cls".into()], "again")
        .unwrap();
    assert!(again.is_none());
    assert_eq!(index.commit_log().unwrap().len(), 1);
}

#[test]
fn stat_cache_upserts_and_removes() {
    let (_dir, store) = store_dir();
    let index = RedbShadowIndex::open(&store).unwrap();
    index
        .update_stat_cache(&[("x.cls".into(), entry("AAAA")), ("y.cls".into(), entry("BBBB"))], &[])
        .unwrap();
    index.update_stat_cache(&[], &["x.cls".into()]).unwrap();

    let cache = index.stat_cache().unwrap();
    assert_eq!(cache.len(), 1);
    assert!(cache.contains_key("y.cls"));
}

#[test]
fn reopening_shares_the_same_database() {
    let (_dir, store) = store_dir();
    let a = RedbShadowIndex::open(&store).unwrap();
    a.apply_commit(&[("Foo.cls".into(), entry("AAAA"))], &[], "initial")
        .unwrap();
    let b = RedbShadowIndex::open(&store).unwrap();
    assert_eq!(b.snapshot().unwrap().len(), 1);
}

#[test]
fn damaged_index_is_set_aside_and_recreated() {
    let (_dir, store) = store_dir();
    std::fs::create_dir_all(&store).unwrap();
    let db_path = RedbShadowIndex::path_for_store(&store);
    std::fs::write(&db_path, b"definitely-not-a-redb-database").unwrap();

    let index = RedbShadowIndex::open(&store).unwrap();
    assert!(index.snapshot().unwrap().is_empty());

    let set_aside: Vec<_> = std::fs::read_dir(&store)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.starts_with("index.redb.damaged-"))
        .collect();
    assert_eq!(set_aside.len(), 1, "expected the damaged index next to the new one");
}

#[test]
fn index_held_by_another_handle_is_busy() {
    let (_dir, store) = store_dir();
    std::fs::create_dir_all(&store).unwrap();
    let db_path = RedbShadowIndex::path_for_store(&store);
    let _other = redb::Database::create(db_path.as_std_path()).unwrap();

    let err = RedbShadowIndex::open(&store).unwrap_err();
    assert!(matches!(err, StorageError::DatabaseAlreadyOpen));
    assert_eq!(err.kind(), StorageErrorKind::Busy);
}

#[test]
fn escaping_paths_are_rejected() {
    let (_dir, store) = store_dir();
    let index = RedbShadowIndex::open(&store).unwrap();
    let err = index
        .apply_commit(&[("../outside.cls".into(), entry("AAAA"))], &[], "bad")
        .unwrap_err();
    assert_eq!(err.kind(), srctrack_persistence::StorageErrorKind::InvalidPath);
}
