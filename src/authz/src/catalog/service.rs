//! Services and their URI alias tables

use super::resource::SharedResource;
use crate::types::{ResourcePath, ServiceDescription, ServiceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to a catalog service
pub type SharedService = Arc<Service>;

/// A service through which actions are performed
#[derive(Debug)]
pub struct Service {
    id: ServiceId,
    uris_to_resources: RwLock<HashMap<String, SharedResource>>,
}

impl Service {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uris_to_resources: RwLock::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Look up the resource aliased by an external URI
    pub fn resolve_uri(&self, uri: &str) -> Option<SharedResource> {
        self.uris_to_resources.read().get(uri).cloned()
    }

    pub(crate) fn alias(&self, uri: impl Into<String>, resource: SharedResource) {
        self.uris_to_resources.write().insert(uri.into(), resource);
    }

    /// Whether any alias points at `path`
    pub fn references(&self, path: &str) -> bool {
        self.uris_to_resources
            .read()
            .values()
            .any(|resource| resource.path() == path)
    }

    pub fn aliases(&self) -> HashMap<String, ResourcePath> {
        self.uris_to_resources
            .read()
            .iter()
            .map(|(uri, resource)| (uri.clone(), resource.path().to_string()))
            .collect()
    }

    pub fn describe(&self) -> ServiceDescription {
        ServiceDescription {
            id: self.id.clone(),
            uris_to_resources: self.aliases(),
        }
    }
}
