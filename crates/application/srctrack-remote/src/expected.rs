//! Mapping externally reported changes onto tracking keys.

use std::collections::{BTreeMap, BTreeSet};

use srctrack_config::PollingQuirks;
use srctrack_core::key::split_key;
use srctrack_core::path_utils::TrackPath;
use srctrack_core::{ComponentStatus, MetadataRegistry, RemoteSyncInput};

/// Every key a reported change may be tracked under.
///
/// Bundle members are tracked twice remotely: once for the bundle and once for the
/// file inside it, so a file-level input yields both keys.
pub fn sync_keys(input: &RemoteSyncInput, registry: &dyn MetadataRegistry) -> Vec<String> {
    let mut keys = vec![registry.key_for(&input.member_type, &input.full_name)];
    if registry.is_bundle_type(&input.member_type) {
        if let Some(path) = &input.file_path {
            let file = TrackPath::basename(path);
            let file_key =
                registry.key_for(&input.member_type, &format!("{}/{}", input.full_name, file));
            if !keys.contains(&file_key) {
                keys.push(file_key);
            }
        }
    }
    keys
}

/// Keys a caller can expect to show up in the feed after a deploy.
///
/// Failed and unchanged elements never produce a revision; quirk rules drop the
/// types and names the feed is known not to report.
pub fn expected_keys(
    inputs: &[RemoteSyncInput],
    registry: &dyn MetadataRegistry,
    quirks: &PollingQuirks,
) -> BTreeSet<String> {
    inputs
        .iter()
        .filter(|i| !matches!(i.state, ComponentStatus::Failed | ComponentStatus::Unchanged))
        .filter_map(|i| {
            let key = registry.key_for(&i.member_type, &i.full_name);
            (!quirks.excludes(&i.member_type, &i.full_name, &key)).then_some(key)
        })
        .collect()
}

/// `type -> [names]` for log output.
pub(crate) fn group_by_type<'a>(keys: impl IntoIterator<Item = &'a String>) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        let (type_name, name) = split_key(key).unwrap_or(("unknown", key.as_str()));
        grouped
            .entry(type_name.to_string())
            .or_default()
            .push(name.to_string());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use srctrack_core::DefaultRegistry;

    #[test]
    fn bundle_files_map_to_bundle_and_file_keys() {
        let input = RemoteSyncInput::new("LightningComponentBundle", "cardList", ComponentStatus::Changed)
            .at("force-app/lwc/cardList/cardList.js");
        let keys = sync_keys(&input, &DefaultRegistry::default());
        assert_eq!(
            keys,
            vec![
                "LightningComponentBundle###cardList",
                "LightningComponentBundle###cardList/cardList.js",
            ]
        );
    }

    #[test]
    fn plain_types_map_to_one_key() {
        let input = RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Created).at("classes/Foo.cls");
        assert_eq!(sync_keys(&input, &DefaultRegistry::default()), vec!["ApexClass###Foo"]);
    }

    #[test]
    fn expected_keys_skip_failures_and_quirks() {
        let inputs = vec![
            RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Created),
            RemoteSyncInput::new("ApexClass", "Bar", ComponentStatus::Failed),
            RemoteSyncInput::new("ApexClass", "Baz", ComponentStatus::Unchanged),
            RemoteSyncInput::new("CustomObject", "Account", ComponentStatus::Changed),
            RemoteSyncInput::new("ApexClass", "Foo", ComponentStatus::Changed),
        ];
        let keys = expected_keys(&inputs, &DefaultRegistry::default(), &PollingQuirks::default());
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["ApexClass###Foo"]);
    }

    #[test]
    fn missing_keys_group_by_type() {
        let keys = vec![
            "ApexClass###A".to_string(),
            "ApexClass###B".to_string(),
            "Layout###Account Layout".to_string(),
        ];
        let grouped = group_by_type(&keys);
        assert_eq!(grouped["ApexClass"], vec!["A", "B"]);
        assert_eq!(grouped["Layout"], vec!["Account Layout"]);
    }
}
