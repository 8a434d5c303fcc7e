use crate::change::ChangeResult;
use crate::component::{ComponentResolver, MetadataRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// A component changed on both sides since the last sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub full_name: String,
    #[serde(rename = "type")]
    pub member_type: String,
    pub file_path: Option<String>,
}

/// Give a local change its metadata identity.
///
/// A change whose files resolve to several components fans out into one change per
/// component. Unresolvable changes are dropped with a warning.
pub fn resolve_local_changes(
    changes: &[ChangeResult],
    resolver: &dyn ComponentResolver,
) -> Vec<ChangeResult> {
    let mut resolved = Vec::new();
    for change in changes {
        if change.is_resolved() {
            resolved.push(change.clone());
            continue;
        }

        let components = if change.deleted {
            resolver.resolve_deleted(&change.filenames)
        } else {
            change
                .filenames
                .iter()
                .map(|f| resolver.resolve_path(f))
                .collect::<anyhow::Result<Vec<_>>>()
                .map(|nested| nested.into_iter().flatten().collect())
        };

        match components {
            Ok(components) if !components.is_empty() => {
                let mut seen = HashSet::new();
                for component in components {
                    if !seen.insert((component.type_name.clone(), component.full_name.clone())) {
                        continue;
                    }
                    resolved.push(ChangeResult {
                        name: Some(component.full_name),
                        member_type: Some(component.type_name),
                        ..change.clone()
                    });
                }
            }
            Ok(_) => warn!(files = ?change.filenames, "local change resolved to no component, skipping"),
            Err(e) => warn!(files = ?change.filenames, error = %e, "could not resolve local change, skipping"),
        }
    }
    resolved
}

/// Intersect local and remote changes into a de-duplicated list of conflicts.
///
/// A local change collides with a remote one when their metadata keys are equal or,
/// failing that, when any local file is also listed for a remote change.
pub fn find_conflicts(
    local: &[ChangeResult],
    remote: &[ChangeResult],
    resolver: &dyn ComponentResolver,
    registry: &dyn MetadataRegistry,
) -> Vec<ConflictRecord> {
    if local.is_empty() || remote.is_empty() {
        return Vec::new();
    }

    let by_key: HashMap<String, &ChangeResult> = remote
        .iter()
        .filter_map(|r| r.key(registry).map(|k| (k, r)))
        .collect();
    let mut by_path: HashMap<&str, Vec<&ChangeResult>> = HashMap::new();
    for r in remote {
        for f in &r.filenames {
            by_path.entry(f.as_str()).or_default().push(r);
        }
    }

    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();
    let mut push = |r: &ChangeResult, fallback_paths: &[String]| {
        let (Some(name), Some(member_type)) = (&r.name, &r.member_type) else {
            return;
        };
        let paths: Vec<Option<String>> = if !r.filenames.is_empty() {
            r.filenames.iter().cloned().map(Some).collect()
        } else if !fallback_paths.is_empty() {
            fallback_paths.iter().cloned().map(Some).collect()
        } else {
            vec![None]
        };
        for file_path in paths {
            let record = ConflictRecord {
                full_name: name.clone(),
                member_type: member_type.clone(),
                file_path,
            };
            if seen.insert(record.clone()) {
                conflicts.push(record);
            }
        }
    };

    for change in resolve_local_changes(local, resolver) {
        let key = change.key(registry);
        if let Some(remote_change) = key.as_ref().and_then(|k| by_key.get(k)) {
            push(remote_change, &change.filenames);
            continue;
        }
        for f in &change.filenames {
            for remote_change in by_path.get(f.as_str()).into_iter().flatten() {
                push(remote_change, &change.filenames);
            }
        }
    }

    debug!(count = conflicts.len(), "conflict check complete");
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, DefaultRegistry};

    struct ByFileStem;

    impl ComponentResolver for ByFileStem {
        fn resolve_path(&self, path: &str) -> anyhow::Result<Vec<Component>> {
            let stem = path.rsplit('/').next().unwrap_or(path);
            let stem = stem.split('.').next().unwrap_or(stem);
            Ok(vec![Component::new("ApexClass", stem).with_paths([path])])
        }

        fn resolve_deleted(&self, paths: &[String]) -> anyhow::Result<Vec<Component>> {
            paths.iter().map(|p| self.resolve_path(p)).collect::<anyhow::Result<Vec<_>>>().map(|v| v.concat())
        }
    }

    #[test]
    fn empty_side_short_circuits() {
        let local = vec![ChangeResult::local(["classes/Foo.cls"])];
        assert!(find_conflicts(&local, &[], &ByFileStem, &DefaultRegistry::default()).is_empty());
    }

    #[test]
    fn deleted_local_change_uses_deleted_resolution() {
        let local = vec![ChangeResult::local(["classes/Foo.cls"]).as_deleted()];
        let resolved = resolve_local_changes(&local, &ByFileStem);
        assert_eq!(resolved[0].name.as_deref(), Some("Foo"));
        assert!(resolved[0].deleted);
    }
}
