//! Core authorization types and wire-format descriptions

use crate::error::{AuthzError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique role identifier
pub type RoleId = String;

/// Unique permission identifier
pub type PermissionId = String;

/// Unique service identifier
pub type ServiceId = String;

/// Hierarchical resource path (e.g. `/studies/1/files`)
pub type ResourcePath = String;

/// Free-form role metadata
pub type Tags = HashMap<String, String>;

/// Key/value pairs required by a permission or offered by a request
pub type Constraints = HashMap<String, String>;

/// Wire description of a role subtree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDescription {
    #[serde(default)]
    pub id: RoleId,

    #[serde(default)]
    pub tags: Tags,

    #[serde(default)]
    pub permissions: Vec<PermissionDescription>,

    #[serde(default)]
    pub subroles: Vec<RoleDescription>,
}

impl RoleDescription {
    /// Create an empty role description
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_permission(mut self, permission: PermissionDescription) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_subrole(mut self, subrole: RoleDescription) -> Self {
        self.subroles.push(subrole);
        self
    }
}

/// Wire description of a permission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDescription {
    #[serde(default)]
    pub id: PermissionId,

    #[serde(default)]
    pub action: ActionDescription,

    #[serde(default)]
    pub constraints: Constraints,
}

impl PermissionDescription {
    pub fn new(id: impl Into<String>, action: ActionDescription) -> Self {
        Self {
            id: id.into(),
            action,
            constraints: Constraints::new(),
        }
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }
}

/// Wire description of a (service, resource, method) triple
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDescription {
    #[serde(default)]
    pub service: ServiceId,

    #[serde(default)]
    pub resource: ResourcePath,

    #[serde(default)]
    pub method: String,
}

impl ActionDescription {
    pub fn new(
        service: impl Into<String>,
        resource: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            resource: resource.into(),
            method: method.into(),
        }
    }

    /// Check that service, resource and method are all present
    pub fn validate_fields(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("service", &self.service),
            ("resource", &self.resource),
            ("method", &self.method),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthzError::InvalidAction(format!(
                "action missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Wire description of a service and its URI aliases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    #[serde(default)]
    pub id: ServiceId,

    #[serde(default)]
    pub uris_to_resources: HashMap<String, ResourcePath>,
}

impl ServiceDescription {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uris_to_resources: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, uri: impl Into<String>, resource: impl Into<String>) -> Self {
        self.uris_to_resources.insert(uri.into(), resource.into());
        self
    }
}

/// Wire description of a declared resource
///
/// Top-level resources are addressed by `path`; subresources by `name`
/// relative to their parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ResourcePath>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subresources: Vec<ResourceDescription>,
}

impl ResourceDescription {
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_subresource(mut self, subresource: ResourceDescription) -> Self {
        self.subresources.push(subresource);
        self
    }
}

/// Wire form of an authorization request, before role resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequestDescription {
    #[serde(default)]
    pub roles: Vec<RoleId>,

    #[serde(default)]
    pub action: ActionDescription,

    #[serde(default)]
    pub constraints: Constraints,
}
