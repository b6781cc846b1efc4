//! The authorization graph: role forest, permission registry and catalog
//!
//! All mutation goes through the synchronous methods here. The engine wraps
//! the graph in a reader/writer lock; these methods assume the caller holds
//! the right side of it.

use crate::catalog::resource::parent_path;
use crate::catalog::{Catalog, SharedResource};
use crate::error::{AuthzError, Result};
use crate::loader::{GraphLoader, Stage};
use crate::permission::PermissionRegistry;
use crate::role::RoleForest;
use crate::store::GraphSnapshot;
use crate::types::{
    PermissionDescription, ResourceDescription, ResourcePath, RoleDescription, RoleId,
    ServiceDescription,
};
use std::sync::Arc;

/// Default identifier of the synthetic root role
pub const DEFAULT_ROOT_ROLE: &str = "root";

#[derive(Debug)]
pub struct AuthGraph {
    forest: RoleForest,
    permissions: PermissionRegistry,
    catalog: Catalog,
}

impl AuthGraph {
    /// Create an empty graph holding only the root role
    pub fn new(root: &str) -> Result<Self> {
        Ok(Self {
            forest: RoleForest::new(root)?,
            permissions: PermissionRegistry::new(),
            catalog: Catalog::new(),
        })
    }

    /// Build a graph from a stored snapshot
    pub fn from_snapshot(root: &str, snapshot: &GraphSnapshot) -> Result<Self> {
        let mut graph = Self::new(root)?;

        let mut resources: Vec<&ResourceDescription> = snapshot.resources.iter().collect();
        resources.sort_by(|a, b| a.path.cmp(&b.path));
        for resource in resources {
            graph.load_resource(resource)?;
        }
        for service in &snapshot.services {
            graph.load_service(service)?;
        }
        for role in &snapshot.roles {
            graph.load_role(role)?;
        }

        Ok(graph)
    }

    pub fn forest(&self) -> &RoleForest {
        &self.forest
    }

    pub fn permissions(&self) -> &PermissionRegistry {
        &self.permissions
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Load a role subtree as a new child of the root
    pub fn load_role(&mut self, description: &RoleDescription) -> Result<()> {
        let root = self.forest.root_id().to_string();
        let mut loader = GraphLoader::new(self);
        loader.attach_role(description, &root)?;
        let stage = loader.finish();
        self.commit(stage);
        Ok(())
    }

    /// Merge tags, permissions and subroles into an existing role
    pub fn update_role(&mut self, id: &str, addition: &RoleDescription) -> Result<()> {
        if !self.forest.contains(id) {
            return Err(AuthzError::not_found("role", id));
        }
        let mut loader = GraphLoader::new(self);
        loader.role_addition(id, addition)?;
        let stage = loader.finish();
        self.commit(stage);
        Ok(())
    }

    /// Find-or-create the service and fill in its alias table
    pub fn load_service(&mut self, description: &ServiceDescription) -> Result<()> {
        let mut loader = GraphLoader::new(self);
        loader.service_description(description)?;
        let stage = loader.finish();
        self.commit(stage);
        Ok(())
    }

    /// Declare a resource (and nested subresources) by path
    pub fn load_resource(&mut self, description: &ResourceDescription) -> Result<()> {
        let mut loader = GraphLoader::new(self);
        loader.resource_declaration(description, None)?;
        let stage = loader.finish();
        self.commit(stage);
        Ok(())
    }

    /// Declare a resource by name under an existing parent
    pub fn load_subresource(&mut self, parent: &str, description: &ResourceDescription) -> Result<()> {
        let declared = self
            .catalog
            .find_resource(parent)
            .is_some_and(|resource| !resource.is_floating());
        if !declared {
            return Err(AuthzError::not_found("resource", parent));
        }
        let mut loader = GraphLoader::new(self);
        loader.resource_declaration(description, Some(parent))?;
        let stage = loader.finish();
        self.commit(stage);
        Ok(())
    }

    /// Make a validated stage visible
    fn commit(&mut self, stage: Stage) {
        self.catalog.absorb(stage.catalog);

        for declaration in stage.declarations {
            declaration
                .resource
                .declare(declaration.description, declaration.parent.clone());
            if let Some(parent) = declaration
                .parent
                .as_deref()
                .and_then(|parent| self.catalog.find_resource(parent))
            {
                parent.add_subresource(declaration.resource.path());
            }
            self.adopt_children(&declaration.resource);
        }

        for (service, uri, resource) in stage.aliases {
            service.alias(uri, resource);
        }

        for (_, permission) in stage.permissions {
            self.permissions.insert(permission);
        }

        for (_, role) in stage.roles {
            self.forest.insert(role);
        }

        if let Some(addition) = stage.update {
            if let Some(role) = self.forest.get_mut(&addition.id) {
                role.update(addition);
            }
        }

        for (child, parent) in stage.attachments {
            self.forest.link(&child, &parent);
        }

        for (permission, role) in stage.grants {
            self.permissions.grant(&permission, &role);
        }
    }

    /// Link declared resources that sit directly under `resource` but were
    /// declared before it
    fn adopt_children(&self, resource: &SharedResource) {
        for candidate in self.catalog.resources() {
            let orphan = !candidate.is_floating()
                && candidate.parent().is_none()
                && parent_path(candidate.path()) == Some(resource.path());
            if orphan {
                candidate.set_parent(resource.path());
                resource.add_subresource(candidate.path());
            }
        }
    }

    /// Detach a role and its descendants, dropping permissions left orphaned.
    /// Returns the identifiers removed.
    pub fn remove_role(&mut self, id: &str) -> Result<Vec<RoleId>> {
        let removed = self.forest.detach(id)?;

        let mut ids = Vec::with_capacity(removed.len());
        for role in removed {
            for permission in &role.permissions {
                self.permissions.revoke(permission, &role.id);
            }
            ids.push(role.id);
        }
        Ok(ids)
    }

    /// Drop one permission from one role. Returns true when the permission was
    /// orphaned and removed from the registry.
    pub fn revoke_permission(&mut self, role: &str, permission: &str) -> Result<bool> {
        let entry = self
            .forest
            .get_mut(role)
            .ok_or_else(|| AuthzError::not_found("role", role))?;
        if !entry.permissions.remove(permission) {
            return Err(AuthzError::not_found("permission", permission));
        }
        Ok(self.permissions.revoke(permission, role))
    }

    /// Remove a resource and its declared descendants.
    ///
    /// Resources still referenced by a permission or a service alias stay in
    /// the catalog as floating resources.
    pub fn remove_resource(&mut self, path: &str) -> Result<Vec<ResourcePath>> {
        let resource = self
            .catalog
            .find_resource(path)
            .cloned()
            .ok_or_else(|| AuthzError::not_found("resource", path))?;

        if let Some(parent) = resource
            .parent()
            .and_then(|parent| self.catalog.find_resource(&parent).cloned())
        {
            parent.remove_subresource(path);
        }

        let mut doomed = Vec::new();
        let mut stack = vec![resource];
        while let Some(current) = stack.pop() {
            for child in current.subresources() {
                if let Some(child) = self.catalog.find_resource(&child) {
                    stack.push(Arc::clone(child));
                }
            }
            doomed.push(current);
        }

        let mut removed = Vec::new();
        for resource in doomed {
            resource.make_floating();
            if !self.resource_referenced(resource.path()) {
                self.catalog.remove_resource(resource.path());
                removed.push(resource.path().to_string());
            }
        }
        Ok(removed)
    }

    fn resource_referenced(&self, path: &str) -> bool {
        self.permissions
            .iter()
            .any(|permission| permission.action.resource.path() == path)
            || self.catalog.aliased(path)
    }

    /// Reconstruct the description of a role and its subtree
    pub fn describe_role(&self, id: &str) -> Result<RoleDescription> {
        let role = self
            .forest
            .get(id)
            .ok_or_else(|| AuthzError::not_found("role", id))?;

        let mut permissions: Vec<PermissionDescription> = role
            .permissions
            .iter()
            .filter_map(|permission| self.permissions.get(permission))
            .map(|permission| permission.describe())
            .collect();
        permissions.sort_by(|a, b| a.id.cmp(&b.id));

        let mut subrole_ids: Vec<&RoleId> = role.subroles.iter().collect();
        subrole_ids.sort();
        let subroles = subrole_ids
            .into_iter()
            .map(|subrole| self.describe_role(subrole))
            .collect::<Result<Vec<_>>>()?;

        Ok(RoleDescription {
            id: role.id.clone(),
            tags: role.tags.clone(),
            permissions,
            subroles,
        })
    }

    pub fn describe_service(&self, id: &str) -> Result<ServiceDescription> {
        self.catalog
            .find_service(id)
            .map(|service| service.describe())
            .ok_or_else(|| AuthzError::not_found("service", id))
    }

    /// Describe a resource with its declared subresources nested by name
    pub fn describe_resource(&self, path: &str) -> Result<ResourceDescription> {
        let resource = self
            .catalog
            .find_resource(path)
            .ok_or_else(|| AuthzError::not_found("resource", path))?;

        let mut children = resource.subresources();
        children.sort();
        let subresources = children
            .iter()
            .filter(|child| self.catalog.find_resource(child).is_some())
            .map(|child| self.describe_resource(child))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResourceDescription {
            path: Some(resource.path().to_string()),
            name: Some(resource.name().to_string()),
            description: resource.description(),
            subresources,
        })
    }

    /// Export everything needed to rebuild this graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut resources: Vec<ResourceDescription> = self
            .catalog
            .resources()
            .filter(|resource| !resource.is_floating())
            .map(|resource| ResourceDescription {
                path: Some(resource.path().to_string()),
                description: resource.description(),
                ..Default::default()
            })
            .collect();
        resources.sort_by(|a, b| a.path.cmp(&b.path));

        let mut services: Vec<ServiceDescription> =
            self.catalog.services().map(|service| service.describe()).collect();
        services.sort_by(|a, b| a.id.cmp(&b.id));

        let mut top_level = self.forest.top_level();
        top_level.sort();
        let roles = top_level
            .iter()
            .filter_map(|id| self.describe_role(id).ok())
            .collect();

        GraphSnapshot {
            resources,
            services,
            roles,
        }
    }
}
