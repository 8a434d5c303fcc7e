use crate::component::MetadataRegistry;
use crate::remote::RemoteRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
    Local,
    Remote,
}

/// A change from either side, before or after metadata resolution.
///
/// Local changes start with `filenames` only; remote changes start with
/// `name`/`member_type` only. Resolution fills in the other half where it can.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeResult {
    pub origin: ChangeOrigin,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub member_type: Option<String>,
    pub filenames: Vec<String>,
    pub deleted: bool,
    pub modified: bool,
    pub ignored: bool,
}

impl ChangeResult {
    pub fn local(filenames: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            origin: ChangeOrigin::Local,
            name: None,
            member_type: None,
            filenames: filenames.into_iter().map(Into::into).collect(),
            deleted: false,
            modified: false,
            ignored: false,
        }
    }

    pub fn remote(member_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            origin: ChangeOrigin::Remote,
            name: Some(name.into()),
            member_type: Some(member_type.into()),
            filenames: Vec::new(),
            deleted: false,
            modified: false,
            ignored: false,
        }
    }

    pub fn with_filenames(mut self, filenames: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.filenames.extend(filenames.into_iter().map(Into::into));
        self
    }

    pub fn as_deleted(mut self) -> Self {
        self.deleted = true;
        self.modified = false;
        self
    }

    pub fn as_modified(mut self) -> Self {
        self.modified = true;
        self.deleted = false;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.name.is_some() && self.member_type.is_some()
    }

    pub fn key(&self, registry: &dyn MetadataRegistry) -> Option<String> {
        match (&self.member_type, &self.name) {
            (Some(t), Some(n)) => Some(registry.key_for(t, n)),
            _ => None,
        }
    }
}

impl From<&RemoteRecord> for ChangeResult {
    fn from(record: &RemoteRecord) -> Self {
        let change = ChangeResult::remote(&record.member_type, &record.member_name);
        if record.is_obsolete {
            change.as_deleted()
        } else if record.is_new {
            change
        } else {
            change.as_modified()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DefaultRegistry, RemoteFeedRecord};

    #[test]
    fn remote_record_flags_map_onto_change() {
        let obsolete = RemoteRecord::from_feed(RemoteFeedRecord::new("ApexClass", "Gone", 2).obsolete(), false);
        let created = RemoteRecord::from_feed(RemoteFeedRecord::new("ApexClass", "New", 3).new_member(), false);
        let edited = RemoteRecord::from_feed(RemoteFeedRecord::new("ApexClass", "Old", 4), false);

        assert!(ChangeResult::from(&obsolete).deleted);
        let created = ChangeResult::from(&created);
        assert!(!created.deleted && !created.modified);
        assert!(ChangeResult::from(&edited).modified);
    }

    #[test]
    fn unresolved_change_has_no_key() {
        let registry = DefaultRegistry::default();
        assert_eq!(ChangeResult::local(["a.cls"]).key(&registry), None);
        assert_eq!(
            ChangeResult::remote("ApexClass", "Foo").key(&registry).as_deref(),
            Some("ApexClass###Foo")
        );
    }
}
