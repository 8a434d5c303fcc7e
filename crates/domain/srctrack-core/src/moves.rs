//! Pure pairing of added and deleted paths into moves.
//!
//! Hashing and component resolution happen in the caller; this module only sees
//! the resulting candidates and returns new collections.

use crate::component::ComponentIdentity;
use crate::path_utils::TrackPath;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCandidate {
    pub path: String,
    pub hash: String,
    pub identity: ComponentIdentity,
}

impl MoveCandidate {
    fn basename(&self) -> &str {
        TrackPath::basename(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FullKey<'a> {
    hash: &'a str,
    basename: &'a str,
    identity: &'a ComponentIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LooseKey<'a> {
    basename: &'a str,
    identity: &'a ComponentIdentity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveMatches {
    /// added path -> deleted path, identical content.
    pub full: BTreeMap<String, String>,
    /// added path -> deleted path, same identity but edited content.
    pub edited: BTreeMap<String, String>,
    /// Paths left unpaired because their key was not unique on its side.
    pub ignored: BTreeSet<String>,
}

impl MoveMatches {
    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.edited.is_empty()
    }
}

/// Keep only paths whose basename also appears on the opposite side.
pub fn basename_prefilter(added: &[String], deleted: &[String]) -> (Vec<String>, Vec<String>) {
    if added.is_empty() || deleted.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let added_names: HashSet<&str> = added.iter().map(|p| TrackPath::basename(p)).collect();
    let deleted_names: HashSet<&str> = deleted.iter().map(|p| TrackPath::basename(p)).collect();

    let keep = |paths: &[String], other: &HashSet<&str>| -> Vec<String> {
        paths
            .iter()
            .filter(|p| other.contains(TrackPath::basename(p)))
            .cloned()
            .collect()
    };

    (keep(added, &deleted_names), keep(deleted, &added_names))
}

/// Unique key -> path for one side; keys seen more than once land in the ignored set.
fn build_map<'a, K, F>(candidates: &'a [MoveCandidate], key_of: F) -> (HashMap<K, &'a str>, BTreeSet<String>)
where
    K: std::hash::Hash + Eq + Clone,
    F: Fn(&'a MoveCandidate) -> K,
{
    let (unique, dupes) = candidates.iter().fold(
        (HashMap::<K, &'a str>::new(), HashMap::<K, Vec<&'a str>>::new()),
        |(mut unique, mut dupes), candidate| {
            let key = key_of(candidate);
            if let Some(bucket) = dupes.get_mut(&key) {
                bucket.push(candidate.path.as_str());
            } else if let Some(first) = unique.remove(&key) {
                dupes.insert(key, vec![first, candidate.path.as_str()]);
            } else {
                unique.insert(key, candidate.path.as_str());
            }
            (unique, dupes)
        },
    );

    let ignored = dupes
        .into_values()
        .flatten()
        .map(str::to_string)
        .collect();
    (unique, ignored)
}

fn full_key(c: &MoveCandidate) -> FullKey<'_> {
    FullKey {
        hash: &c.hash,
        basename: c.basename(),
        identity: &c.identity,
    }
}

fn loose_key(c: &MoveCandidate) -> LooseKey<'_> {
    LooseKey {
        basename: c.basename(),
        identity: &c.identity,
    }
}

fn unpaired(unique: HashSet<&str>, paired: &HashSet<&str>, side: &[MoveCandidate]) -> Vec<MoveCandidate> {
    side.iter()
        .filter(|c| unique.contains(c.path.as_str()) && !paired.contains(c.path.as_str()))
        .cloned()
        .collect()
}

/// Pair added and deleted candidates.
///
/// Exact matches on `(hash, basename, identity)` become full moves. Whatever is left
/// on both sides is matched again without the hash; those pairs were moved and edited.
pub fn match_moves(added: &[MoveCandidate], deleted: &[MoveCandidate]) -> MoveMatches {
    if added.is_empty() || deleted.is_empty() {
        return MoveMatches::default();
    }

    let (added_map, mut ignored) = build_map(added, full_key);
    let (deleted_map, deleted_ignored) = build_map(deleted, full_key);
    ignored.extend(deleted_ignored);

    let mut full = BTreeMap::new();
    for (key, add_path) in &added_map {
        if let Some(del_path) = deleted_map.get(key) {
            full.insert(add_path.to_string(), del_path.to_string());
        }
    }

    let paired_adds: HashSet<&str> = full.keys().map(String::as_str).collect();
    let paired_dels: HashSet<&str> = full.values().map(String::as_str).collect();

    let added_left = unpaired(added_map.values().copied().collect(), &paired_adds, added);
    let deleted_left = unpaired(deleted_map.values().copied().collect(), &paired_dels, deleted);

    let (added_loose, added_loose_ignored) = build_map(&added_left, loose_key);
    let (deleted_loose, deleted_loose_ignored) = build_map(&deleted_left, loose_key);
    ignored.extend(added_loose_ignored);
    ignored.extend(deleted_loose_ignored);

    let mut edited = BTreeMap::new();
    for (key, add_path) in &added_loose {
        if let Some(del_path) = deleted_loose.get(key) {
            edited.insert(add_path.to_string(), del_path.to_string());
        }
    }

    MoveMatches {
        full,
        edited,
        ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(type_name: &str) -> ComponentIdentity {
        ComponentIdentity {
            type_name: type_name.to_string(),
            parent_type: None,
            parent_full_name: None,
        }
    }

    fn cand(path: &str, hash: &str) -> MoveCandidate {
        MoveCandidate {
            path: path.to_string(),
            hash: hash.to_string(),
            identity: identity("ApexClass"),
        }
    }

    #[test]
    fn prefilter_drops_unrelated_basenames() {
        let (a, d) = basename_prefilter(
            &["b/x.cls".into(), "b/y.cls".into()],
            &["a/x.cls".into(), "a/z.cls".into()],
        );
        assert_eq!(a, vec!["b/x.cls"]);
        assert_eq!(d, vec!["a/x.cls"]);
    }

    #[test]
    fn identical_content_is_a_full_match() {
        let m = match_moves(&[cand("b/x.cls", "h1")], &[cand("a/x.cls", "h1")]);
        assert_eq!(m.full.get("b/x.cls").map(String::as_str), Some("a/x.cls"));
        assert!(m.edited.is_empty());
    }

    #[test]
    fn edited_content_falls_back_to_identity() {
        let m = match_moves(&[cand("b/x.cls", "h2")], &[cand("a/x.cls", "h1")]);
        assert!(m.full.is_empty());
        assert_eq!(m.edited.get("b/x.cls").map(String::as_str), Some("a/x.cls"));
    }

    #[test]
    fn different_types_never_pair() {
        let mut other = cand("a/x.cls", "h1");
        other.identity = identity("ApexTrigger");
        let m = match_moves(&[cand("b/x.cls", "h1")], &[other]);
        assert!(m.is_empty());
    }

    #[test]
    fn duplicate_keys_are_ignored() {
        let added = [cand("b/x.cls", "h1"), cand("c/x.cls", "h1")];
        let deleted = [cand("a/x.cls", "h1")];
        let m = match_moves(&added, &deleted);
        assert!(m.is_empty());
        assert!(m.ignored.contains("b/x.cls"));
        assert!(m.ignored.contains("c/x.cls"));
    }

    #[test]
    fn parent_change_is_not_a_move() {
        let mut moved = cand("b/objects/Foo__c/fields/F.field", "h1");
        moved.identity.parent_type = Some("CustomObject".into());
        moved.identity.parent_full_name = Some("Foo__c".into());
        let mut gone = cand("a/objects/Bar__c/fields/F.field", "h1");
        gone.identity.parent_type = Some("CustomObject".into());
        gone.identity.parent_full_name = Some("Bar__c".into());
        assert!(match_moves(&[moved], &[gone]).is_empty());
    }
}
