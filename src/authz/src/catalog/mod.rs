//! Resource and service registries
//!
//! Both registries use find-or-create semantics: asking for an identifier
//! that is already registered returns the existing shared object, and asking
//! for a new one registers it before returning, so repeated lookups of the
//! same identifier always observe the same object.

pub mod resource;
pub mod service;

pub use resource::{Resource, SharedResource};
pub use service::{Service, SharedService};

use crate::types::{ResourcePath, ServiceId};
use std::collections::HashMap;
use std::sync::Arc;

/// Flat registries of resources (by path) and services (by ID)
#[derive(Debug, Default)]
pub struct Catalog {
    resources: HashMap<ResourcePath, SharedResource>,
    services: HashMap<ServiceId, SharedService>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_resource(&self, path: &str) -> Option<&SharedResource> {
        self.resources.get(path)
    }

    pub fn find_service(&self, id: &str) -> Option<&SharedService> {
        self.services.get(id)
    }

    /// Return the registered resource at `path`, registering a floating one if absent
    pub fn find_or_create_resource(&mut self, path: &str) -> SharedResource {
        Arc::clone(
            self.resources
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(Resource::floating(path))),
        )
    }

    /// Return the registered service `id`, registering a new one if absent
    pub fn find_or_create_service(&mut self, id: &str) -> SharedService {
        Arc::clone(
            self.services
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Service::new(id))),
        )
    }

    pub fn resource_paths(&self) -> Vec<ResourcePath> {
        self.resources.keys().cloned().collect()
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.services.keys().cloned().collect()
    }

    pub fn resources(&self) -> impl Iterator<Item = &SharedResource> {
        self.resources.values()
    }

    pub fn services(&self) -> impl Iterator<Item = &SharedService> {
        self.services.values()
    }

    /// Whether any service alias points at `path`
    pub fn aliased(&self, path: &str) -> bool {
        self.services.values().any(|service| service.references(path))
    }

    pub(crate) fn remove_resource(&mut self, path: &str) -> Option<SharedResource> {
        self.resources.remove(path)
    }

    /// Move every entry of a staged catalog into this one
    pub(crate) fn absorb(&mut self, staged: Catalog) {
        for (path, resource) in staged.resources {
            self.resources.entry(path).or_insert(resource);
        }
        for (id, service) in staged.services {
            self.services.entry(id).or_insert(service);
        }
    }
}
