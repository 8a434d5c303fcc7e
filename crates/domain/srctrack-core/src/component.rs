//! Ports to the metadata-type registry, which lives outside this workspace.
//!
//! Paths handed to these traits are project-relative and use forward slashes.

use crate::key::metadata_key;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParentRef {
    pub type_name: String,
    pub full_name: String,
}

/// A canonical metadata component as resolved from one or more files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub type_name: String,
    pub full_name: String,
    pub parent: Option<ParentRef>,
    pub file_paths: Vec<String>,
}

impl Component {
    pub fn new(type_name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            full_name: full_name.into(),
            parent: None,
            file_paths: Vec::new(),
        }
    }

    pub fn with_parent(mut self, type_name: impl Into<String>, full_name: impl Into<String>) -> Self {
        self.parent = Some(ParentRef {
            type_name: type_name.into(),
            full_name: full_name.into(),
        });
        self
    }

    pub fn with_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.file_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn identity(&self) -> ComponentIdentity {
        ComponentIdentity {
            type_name: self.type_name.clone(),
            parent_type: self.parent.as_ref().map(|p| p.type_name.clone()),
            parent_full_name: self.parent.as_ref().map(|p| p.full_name.clone()),
        }
    }
}

/// The part of a component that must survive a move unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentIdentity {
    pub type_name: String,
    pub parent_type: Option<String>,
    pub parent_full_name: Option<String>,
}

pub trait ComponentResolver: Send + Sync {
    /// Resolve a file that exists in the working tree.
    fn resolve_path(&self, path: &str) -> anyhow::Result<Vec<Component>>;

    /// Resolve files that no longer exist on disk.
    fn resolve_deleted(&self, paths: &[String]) -> anyhow::Result<Vec<Component>>;

    /// Files that back a component, used to give remote changes a location.
    fn paths_for(&self, _type_name: &str, _full_name: &str) -> Vec<String> {
        Vec::new()
    }
}

pub trait IgnoreRules: Send + Sync {
    fn is_ignored(&self, path: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoIgnore;

impl IgnoreRules for NoIgnore {
    fn is_ignored(&self, _path: &str) -> bool {
        false
    }
}

pub trait MetadataRegistry: Send + Sync {
    fn key_for(&self, type_name: &str, full_name: &str) -> String {
        metadata_key(type_name, full_name)
    }

    /// Bundle types are tracked remotely both per bundle and per bundle file.
    fn is_bundle_type(&self, _type_name: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct DefaultRegistry {
    bundle_types: HashSet<String>,
}

impl DefaultRegistry {
    pub fn with_bundle_types(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            bundle_types: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        Self::with_bundle_types([
            "AuraDefinitionBundle",
            "LightningComponentBundle",
            "ExperienceBundle",
            "WaveTemplateBundle",
        ])
    }
}

impl MetadataRegistry for DefaultRegistry {
    fn is_bundle_type(&self, type_name: &str) -> bool {
        self.bundle_types.contains(type_name)
    }
}
