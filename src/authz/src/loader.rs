//! Graph loader
//!
//! Translates wire descriptions into roles, permissions, services and
//! resources. Everything a load creates is built in a [`Stage`] that only
//! reads the live graph; the graph changes only when a fully validated stage
//! is committed, so a failure anywhere in a subtree leaves no trace.

use crate::catalog::resource::{child_path, is_valid_path, parent_path};
use crate::catalog::{Catalog, SharedResource, SharedService};
use crate::error::{AuthzError, Result};
use crate::graph::AuthGraph;
use crate::permission::{Action, Permission};
use crate::role::Role;
use crate::types::{
    ActionDescription, PermissionDescription, PermissionId, ResourceDescription, ResourcePath,
    RoleDescription, RoleId, ServiceDescription,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A pending resource declaration
#[derive(Debug)]
pub(crate) struct Declaration {
    pub resource: SharedResource,
    pub description: Option<String>,
    pub parent: Option<ResourcePath>,
}

/// Everything a load will add to the graph, not yet visible to anyone
#[derive(Debug, Default)]
pub(crate) struct Stage {
    pub roles: HashMap<RoleId, Role>,
    pub permissions: HashMap<PermissionId, Permission>,
    /// (permission, role) pairs to enter in the reverse index
    pub grants: Vec<(PermissionId, RoleId)>,
    /// Services and resources created by this load
    pub catalog: Catalog,
    pub declarations: Vec<Declaration>,
    pub aliases: Vec<(SharedService, String, SharedResource)>,
    /// (child, parent) links to make on commit
    pub attachments: Vec<(RoleId, RoleId)>,
    /// Addition merged into an existing role on commit
    pub update: Option<Role>,
    reserved: HashSet<RoleId>,
    declared: HashSet<ResourcePath>,
}

/// Builds a [`Stage`] against a read-only view of the graph
pub(crate) struct GraphLoader<'g> {
    graph: &'g AuthGraph,
    stage: Stage,
}

impl<'g> GraphLoader<'g> {
    pub fn new(graph: &'g AuthGraph) -> Self {
        Self {
            graph,
            stage: Stage::default(),
        }
    }

    pub fn finish(self) -> Stage {
        self.stage
    }

    /// Stage a role subtree to be attached under `parent`
    pub fn attach_role(&mut self, description: &RoleDescription, parent: &str) -> Result<()> {
        let top = self.role_subtree(description)?;
        self.stage.attachments.push((top, parent.to_string()));
        Ok(())
    }

    /// Stage an additive update of the existing role `target`
    pub fn role_addition(&mut self, target: &str, description: &RoleDescription) -> Result<()> {
        if !description.id.is_empty() && description.id != target {
            return Err(AuthzError::InvalidIdentifier(format!(
                "update for role `{}` carries a different id `{}`",
                target, description.id
            )));
        }

        let mut addition = Role::new(target)?;
        addition.tags = description.tags.clone();

        for permission in &description.permissions {
            let id = self.permission(permission)?;
            self.stage.grants.push((id.clone(), addition.id.clone()));
            addition.permissions.insert(id);
        }

        for subrole in &description.subroles {
            let child = self.role_subtree(subrole)?;
            self.stage
                .attachments
                .push((child.clone(), addition.id.clone()));
            addition.subroles.insert(child);
        }

        self.stage.update = Some(addition);
        Ok(())
    }

    /// Depth-first: uniqueness, construction, tags, permissions, subroles,
    /// then parent links and registration in the stage.
    fn role_subtree(&mut self, description: &RoleDescription) -> Result<RoleId> {
        if self.graph.forest().contains(&description.id)
            || self.stage.reserved.contains(&description.id)
        {
            return Err(AuthzError::RoleAlreadyExists(description.id.clone()));
        }

        let mut role = Role::new(description.id.clone())?;
        self.stage.reserved.insert(role.id.clone());

        role.tags
            .extend(description.tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        for permission in &description.permissions {
            let id = self.permission(permission)?;
            self.stage.grants.push((id.clone(), role.id.clone()));
            role.permissions.insert(id);
        }

        for subrole in &description.subroles {
            let child = self.role_subtree(subrole)?;
            if let Some(staged) = self.stage.roles.get_mut(&child) {
                staged.parent = Some(role.id.clone());
            }
            role.subroles.insert(child);
        }

        let id = role.id.clone();
        self.stage.roles.insert(id.clone(), role);
        Ok(id)
    }

    /// Resolve a permission description to a registered or staged permission ID
    fn permission(&mut self, description: &PermissionDescription) -> Result<PermissionId> {
        if description.id.is_empty() {
            return Err(AuthzError::MissingRequiredField {
                entity: "permission",
                field: "id",
            });
        }

        let existing = self
            .graph
            .permissions()
            .get(&description.id)
            .or_else(|| self.stage.permissions.get(&description.id));
        if let Some(existing) = existing {
            if existing.same_definition(description) {
                return Ok(existing.id.clone());
            }
            return Err(AuthzError::PermissionConflict(format!(
                "permission `{}` is already defined differently",
                description.id
            )));
        }

        let action = self.action(&description.action)?;
        let permission = Permission::new(
            description.id.clone(),
            action,
            description.constraints.clone(),
        );
        self.stage
            .permissions
            .insert(description.id.clone(), permission);
        Ok(description.id.clone())
    }

    fn action(&mut self, description: &ActionDescription) -> Result<Action> {
        description.validate_fields()?;
        if !is_valid_path(&description.resource) {
            return Err(AuthzError::InvalidAction(format!(
                "malformed resource path `{}`",
                description.resource
            )));
        }
        Ok(Action {
            service: self.service(&description.service),
            resource: self.resource(&description.resource),
            method: description.method.clone(),
        })
    }

    fn service(&mut self, id: &str) -> SharedService {
        match self.graph.catalog().find_service(id) {
            Some(service) => Arc::clone(service),
            None => self.stage.catalog.find_or_create_service(id),
        }
    }

    fn resource(&mut self, path: &str) -> SharedResource {
        match self.graph.catalog().find_resource(path) {
            Some(resource) => Arc::clone(resource),
            None => self.stage.catalog.find_or_create_resource(path),
        }
    }

    /// Declared in the graph or earlier in this stage
    fn declared_resource(&self, path: &str) -> bool {
        self.stage.declared.contains(path)
            || self
                .graph
                .catalog()
                .find_resource(path)
                .is_some_and(|resource| !resource.is_floating())
    }

    /// Stage a service and its URI aliases
    pub fn service_description(&mut self, description: &ServiceDescription) -> Result<()> {
        if description.id.is_empty() {
            return Err(AuthzError::MissingRequiredField {
                entity: "service",
                field: "id",
            });
        }

        let service = self.service(&description.id);
        for (uri, path) in &description.uris_to_resources {
            if path.is_empty() {
                return Err(AuthzError::MissingRequiredField {
                    entity: "service alias",
                    field: "resource",
                });
            }
            if !is_valid_path(path) {
                return Err(AuthzError::InvalidIdentifier(format!(
                    "alias `{}` targets malformed resource path `{}`",
                    uri, path
                )));
            }
            let resource = self.resource(path);
            self.stage
                .aliases
                .push((Arc::clone(&service), uri.clone(), resource));
        }
        Ok(())
    }

    /// Stage a resource declaration and its nested subresources.
    ///
    /// With a `parent` the description is addressed by name; otherwise by path.
    pub fn resource_declaration(
        &mut self,
        description: &ResourceDescription,
        parent: Option<&str>,
    ) -> Result<()> {
        let path = match parent {
            Some(parent) => {
                let name = description
                    .name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .ok_or(AuthzError::MissingRequiredField {
                        entity: "resource",
                        field: "name",
                    })?;
                if name.contains('/') {
                    return Err(AuthzError::InvalidIdentifier(format!(
                        "resource name `{}` cannot contain `/`",
                        name
                    )));
                }
                child_path(parent, name)
            }
            None => description
                .path
                .clone()
                .filter(|path| !path.is_empty())
                .ok_or(AuthzError::MissingRequiredField {
                    entity: "resource",
                    field: "path",
                })?,
        };

        if !is_valid_path(&path) {
            return Err(AuthzError::InvalidIdentifier(format!(
                "malformed resource path `{}`",
                path
            )));
        }

        let declared = self
            .graph
            .catalog()
            .find_resource(&path)
            .is_some_and(|resource| !resource.is_floating());
        if declared || self.stage.declared.contains(&path) {
            return Err(AuthzError::ResourceAlreadyExists(path));
        }

        let parent_link = match parent {
            Some(parent) => Some(parent.to_string()),
            None => parent_path(&path)
                .filter(|candidate| self.declared_resource(candidate))
                .map(str::to_string),
        };

        let resource = self.resource(&path);
        self.stage.declared.insert(path.clone());
        self.stage.declarations.push(Declaration {
            resource,
            description: description.description.clone(),
            parent: parent_link,
        });

        for subresource in &description.subresources {
            self.resource_declaration(subresource, Some(&path))?;
        }
        Ok(())
    }
}
