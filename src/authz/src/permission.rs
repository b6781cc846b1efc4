//! Permissions, actions and the reference-counted permission registry

use crate::catalog::{SharedResource, SharedService};
use crate::types::{
    ActionDescription, Constraints, PermissionDescription, PermissionId, RoleId,
};
use std::collections::{HashMap, HashSet};

/// "Do `method` on `resource` via `service`"
#[derive(Debug, Clone)]
pub struct Action {
    pub service: SharedService,
    pub resource: SharedResource,
    pub method: String,
}

impl Action {
    /// Same service and the resource covers the requested path; the method is
    /// not considered.
    pub fn targets(&self, requested: &ActionDescription) -> bool {
        self.service.id() == requested.service && self.resource.covers(&requested.resource)
    }

    /// Full match against a requested action
    pub fn matches(&self, requested: &ActionDescription) -> bool {
        self.targets(requested) && self.method == requested.method
    }

    pub fn describe(&self) -> ActionDescription {
        ActionDescription::new(self.service.id(), self.resource.path(), self.method.clone())
    }
}

/// A grant of one action under a set of required constraints
#[derive(Debug, Clone)]
pub struct Permission {
    pub id: PermissionId,
    pub action: Action,
    pub constraints: Constraints,
    roles_granting: HashSet<RoleId>,
}

impl Permission {
    pub fn new(id: impl Into<String>, action: Action, constraints: Constraints) -> Self {
        Self {
            id: id.into(),
            action,
            constraints,
            roles_granting: HashSet::new(),
        }
    }

    /// Every required key is offered with an equal value; extra offered keys are ignored.
    pub fn is_satisfied_by(&self, offered: &Constraints) -> bool {
        self.constraints
            .iter()
            .all(|(key, value)| offered.get(key) == Some(value))
    }

    /// Whether `description` defines exactly this permission
    pub fn same_definition(&self, description: &PermissionDescription) -> bool {
        self.action.describe() == description.action && self.constraints == description.constraints
    }

    pub fn roles_granting(&self) -> &HashSet<RoleId> {
        &self.roles_granting
    }

    pub fn is_orphaned(&self) -> bool {
        self.roles_granting.is_empty()
    }

    pub fn describe(&self) -> PermissionDescription {
        PermissionDescription {
            id: self.id.clone(),
            action: self.action.describe(),
            constraints: self.constraints.clone(),
        }
    }
}

/// Registry of permissions keyed by ID, with a reverse index of granting roles
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    permissions: HashMap<PermissionId, Permission>,
}

impl PermissionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Permission> {
        self.permissions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.permissions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn ids(&self) -> Vec<PermissionId> {
        self.permissions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.values()
    }

    pub(crate) fn insert(&mut self, permission: Permission) {
        self.permissions.insert(permission.id.clone(), permission);
    }

    /// Record that `role` grants `permission`
    pub(crate) fn grant(&mut self, permission: &str, role: &str) {
        if let Some(permission) = self.permissions.get_mut(permission) {
            permission.roles_granting.insert(role.to_string());
        }
    }

    /// Record that `role` no longer grants `permission`; returns true when the
    /// permission became orphaned and was dropped.
    pub(crate) fn revoke(&mut self, permission: &str, role: &str) -> bool {
        if let Some(entry) = self.permissions.get_mut(permission) {
            entry.roles_granting.remove(role);
        }
        self.drop_if_orphaned(permission)
    }

    pub(crate) fn drop_if_orphaned(&mut self, permission: &str) -> bool {
        let orphaned = self
            .permissions
            .get(permission)
            .is_some_and(Permission::is_orphaned);
        if orphaned {
            self.permissions.remove(permission);
        }
        orphaned
    }
}
