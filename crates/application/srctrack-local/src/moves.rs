//! Feeds move candidates from a scan into the pure matcher.

use std::collections::{BTreeMap, HashMap};

use srctrack_core::moves::{basename_prefilter, match_moves, MoveCandidate, MoveMatches};
use srctrack_core::{Component, ComponentIdentity, ComponentResolver};
use srctrack_persistence::TrackedFile;
use tracing::{debug, warn};

fn identity_of(resolved: anyhow::Result<Vec<Component>>, path: &str) -> Option<ComponentIdentity> {
    match resolved {
        Ok(components) => {
            let identity = components.first().map(Component::identity);
            if identity.is_none() {
                debug!(path, "move candidate resolved to no component");
            }
            identity
        }
        Err(e) => {
            warn!(path, error = %e, "could not resolve move candidate, skipping");
            None
        }
    }
}

/// Pair added paths with deleted ones.
///
/// Added files are hashed from the working tree, deleted files from the committed
/// snapshot. Candidates the resolver cannot place are left out of pairing.
pub(crate) fn detect(
    added: &[String],
    deleted: &[String],
    working: &HashMap<String, TrackedFile>,
    snapshot: &BTreeMap<String, TrackedFile>,
    resolver: &dyn ComponentResolver,
) -> MoveMatches {
    if added.is_empty() || deleted.is_empty() {
        return MoveMatches::default();
    }
    let (added, deleted) = basename_prefilter(added, deleted);
    if added.is_empty() || deleted.is_empty() {
        return MoveMatches::default();
    }

    let added: Vec<MoveCandidate> = added
        .into_iter()
        .filter_map(|path| {
            let hash = working.get(&path)?.oid.clone();
            let identity = identity_of(resolver.resolve_path(&path), &path)?;
            Some(MoveCandidate {
                path,
                hash,
                identity,
            })
        })
        .collect();
    let deleted: Vec<MoveCandidate> = deleted
        .into_iter()
        .filter_map(|path| {
            let hash = snapshot.get(&path)?.oid.clone();
            let identity =
                identity_of(resolver.resolve_deleted(std::slice::from_ref(&path)), &path)?;
            Some(MoveCandidate {
                path,
                hash,
                identity,
            })
        })
        .collect();

    match_moves(&added, &deleted)
}
