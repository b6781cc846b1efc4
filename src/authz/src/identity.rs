//! Identity resolution
//!
//! Turns a bearer credential into the roles and offered constraints an
//! authorization check runs with. The engine never inspects credentials
//! itself; it only consumes the resolved [`Identity`].

use crate::error::{AuthzError, Result};
use crate::types::{Constraints, RoleId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resolved caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,

    #[serde(default)]
    pub roles: Vec<RoleId>,

    #[serde(default)]
    pub constraints: Constraints,
}

impl Identity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constraints.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve a credential, failing with [`AuthzError::Unauthorized`]
    async fn resolve(&self, credential: &str) -> Result<Identity>;
}

/// Fixed credential table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    identities: HashMap<String, Identity>,
}

impl StaticIdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, credential: impl Into<String>, identity: Identity) -> Self {
        self.identities.insert(credential.into(), identity);
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentityResolver {
    async fn resolve(&self, credential: &str) -> Result<Identity> {
        self.identities
            .get(credential)
            .cloned()
            .ok_or_else(|| AuthzError::Unauthorized("unrecognised credential".to_string()))
    }
}

/// Strip an optional `Bearer ` scheme from an authorization header value
pub fn bearer_token(header: &str) -> Result<&str> {
    let header = header.trim();
    let token = match header.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ if header.eq_ignore_ascii_case("bearer") => "",
        _ => header,
    };
    if token.is_empty() {
        return Err(AuthzError::Unauthorized("empty credential".to_string()));
    }
    Ok(token)
}
