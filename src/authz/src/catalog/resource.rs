//! Hierarchical resources
//!
//! A resource is addressed by a slash-separated path such as
//! `/studies/1/files`. Resources referenced by an action before being
//! declared are *floating*: they carry a path and nothing else until a
//! declaration gives them a description and a place in the hierarchy.

use crate::types::ResourcePath;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Shared handle to a catalog resource
pub type SharedResource = Arc<Resource>;

#[derive(Debug, Clone, Default)]
struct ResourceState {
    description: Option<String>,
    declared: bool,
    parent: Option<ResourcePath>,
    subresources: BTreeSet<ResourcePath>,
}

/// A resource in the catalog
///
/// The path never changes; the declaration state sits behind a lock so that
/// every holder of the shared handle observes the same updates.
#[derive(Debug)]
pub struct Resource {
    path: ResourcePath,
    state: RwLock<ResourceState>,
}

impl Resource {
    /// Create a floating resource at `path`
    pub fn floating(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(ResourceState::default()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }

    pub fn is_floating(&self) -> bool {
        !self.state.read().declared
    }

    pub fn description(&self) -> Option<String> {
        self.state.read().description.clone()
    }

    pub fn set_description(&self, description: Option<String>) {
        self.state.write().description = description;
    }

    /// Declared parent path, if the resource has a place in the hierarchy
    pub fn parent(&self) -> Option<ResourcePath> {
        self.state.read().parent.clone()
    }

    pub fn subresources(&self) -> Vec<ResourcePath> {
        self.state.read().subresources.iter().cloned().collect()
    }

    /// Whether a grant on this resource covers `requested`
    pub fn covers(&self, requested: &str) -> bool {
        covers(&self.path, requested)
    }

    pub(crate) fn declare(&self, description: Option<String>, parent: Option<ResourcePath>) {
        let mut state = self.state.write();
        state.declared = true;
        state.description = description;
        state.parent = parent;
    }

    /// Revert to floating, dropping hierarchy links
    pub(crate) fn make_floating(&self) {
        *self.state.write() = ResourceState::default();
    }

    pub(crate) fn set_parent(&self, parent: &str) {
        self.state.write().parent = Some(parent.to_string());
    }

    pub(crate) fn add_subresource(&self, path: &str) {
        self.state.write().subresources.insert(path.to_string());
    }

    pub(crate) fn remove_subresource(&self, path: &str) {
        self.state.write().subresources.remove(path);
    }
}

/// A grant on `granted` covers `requested` when the paths are equal or the
/// requested path continues the granted one at a `/` boundary.
pub fn covers(granted: &str, requested: &str) -> bool {
    if granted == requested {
        return true;
    }
    let base = granted.trim_end_matches('/');
    if base.is_empty() {
        // `/` covers every absolute path
        return granted.starts_with('/') && requested.starts_with('/');
    }
    requested
        .strip_prefix(base)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Absolute, non-empty segments, optional trailing slash only on `/` itself
pub fn is_valid_path(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    match path.strip_prefix('/') {
        Some(rest) => rest.split('/').all(|segment| !segment.is_empty()),
        None => false,
    }
}

/// Path one level up (`/a/b` → `/a`); `None` for top-level paths
pub fn parent_path(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

/// Join a parent path and a child name
pub fn child_path(parent: &str, name: &str) -> ResourcePath {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}
