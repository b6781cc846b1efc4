//! Authorization requests and responses

use crate::catalog::resource::is_valid_path;
use crate::error::{AuthzError, Result};
use crate::graph::AuthGraph;
use crate::types::{
    ActionDescription, AuthRequestDescription, Constraints, PermissionDescription, RoleId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A request whose roles have been resolved against the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Distinct role identifiers, each present in the forest
    pub roles: Vec<RoleId>,

    /// Requested action
    pub action: ActionDescription,

    /// Offered constraints
    pub constraints: Constraints,
}

impl AuthRequest {
    /// Resolve a wire request against `graph`.
    ///
    /// Duplicate role references collapse to one; unknown roles, an empty
    /// service or method, or a malformed resource path are `InvalidRequest`.
    pub fn resolve(
        description: &AuthRequestDescription,
        graph: &AuthGraph,
        max_roles: usize,
    ) -> Result<Self> {
        let action = &description.action;
        if action.service.is_empty() {
            return Err(AuthzError::InvalidRequest(
                "request action has no service".to_string(),
            ));
        }
        if action.method.is_empty() {
            return Err(AuthzError::InvalidRequest(
                "request action has no method".to_string(),
            ));
        }
        if !is_valid_path(&action.resource) {
            return Err(AuthzError::InvalidRequest(format!(
                "cannot resolve resource `{}`",
                action.resource
            )));
        }

        let mut seen = HashSet::new();
        let mut roles = Vec::with_capacity(description.roles.len());
        for role in &description.roles {
            if role == graph.forest().root_id() {
                return Err(AuthzError::InvalidRequest(format!(
                    "role `{}` cannot be named in a request",
                    role
                )));
            }
            if !graph.forest().contains(role) {
                return Err(AuthzError::InvalidRequest(format!(
                    "unknown role `{}`",
                    role
                )));
            }
            if seen.insert(role.as_str()) {
                roles.push(role.clone());
            }
        }

        if roles.len() > max_roles {
            return Err(AuthzError::InvalidRequest(format!(
                "request names {} roles, limit is {}",
                roles.len(),
                max_roles
            )));
        }

        Ok(Self {
            roles,
            action: action.clone(),
            constraints: description.constraints.clone(),
        })
    }
}

/// Outcome of an authorization check
///
/// A denial is a normal value, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub auth: bool,

    /// Role whose subtree produced the grant
    pub role_id: Option<RoleId>,

    pub permission_matching: Option<PermissionDescription>,

    /// Permissions that target the action but failed on method or
    /// constraints. Order is unspecified.
    #[serde(default)]
    pub permissions_mismatching: Vec<PermissionDescription>,
}

impl AuthResponse {
    pub fn permit(role_id: impl Into<String>, permission: PermissionDescription) -> Self {
        Self {
            auth: true,
            role_id: Some(role_id.into()),
            permission_matching: Some(permission),
            permissions_mismatching: Vec::new(),
        }
    }

    pub fn deny(permissions_mismatching: Vec<PermissionDescription>) -> Self {
        Self {
            auth: false,
            role_id: None,
            permission_matching: None,
            permissions_mismatching,
        }
    }

    /// Turn a denial into [`AuthzError::Forbidden`]
    pub fn require_permit(self) -> Result<Self> {
        if self.auth {
            Ok(self)
        } else {
            Err(AuthzError::Forbidden(format!(
                "no role grants the requested action ({} near misses)",
                self.permissions_mismatching.len()
            )))
        }
    }

    /// Identifiers of the mismatching permissions, sorted
    pub fn mismatching_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .permissions_mismatching
            .iter()
            .map(|permission| permission.id.clone())
            .collect();
        ids.sort();
        ids
    }
}
