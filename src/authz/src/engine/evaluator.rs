//! Per-role subtree evaluation
//!
//! Each role named in a request is evaluated on its own task. A role grants
//! the request when any permission in its own set or in the set of any
//! descendant matches the action and is satisfied by the offered
//! constraints. The walk order is unspecified; the first grant found ends it.

use super::decision::AuthRequest;
use crate::graph::AuthGraph;
use crate::types::{PermissionDescription, RoleId};
use std::collections::HashSet;
use tracing::debug;

/// Result of evaluating one requested role's subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleVerdict {
    Granted {
        role: RoleId,
        permission: PermissionDescription,
    },
    Denied {
        role: RoleId,
        /// Permissions that target the action but did not grant it
        mismatching: Vec<PermissionDescription>,
    },
}

impl RoleVerdict {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

impl AuthGraph {
    /// Walk the subtree rooted at `role` looking for a grant.
    ///
    /// Read-only; callers hold the graph's read lock for the duration.
    pub fn evaluate_role(&self, role: &str, request: &AuthRequest) -> RoleVerdict {
        let mut mismatching = Vec::new();
        let mut recorded = HashSet::new();
        let mut stack = vec![role];

        while let Some(current) = stack.pop() {
            let Some(node) = self.forest().get(current) else {
                continue;
            };

            for id in &node.permissions {
                let Some(permission) = self.permissions().get(id) else {
                    continue;
                };
                if !permission.action.targets(&request.action) {
                    continue;
                }

                if permission.action.matches(&request.action)
                    && permission.is_satisfied_by(&request.constraints)
                {
                    debug!(role, via = current, permission = %id, "Permission grants request");
                    return RoleVerdict::Granted {
                        role: role.to_string(),
                        permission: permission.describe(),
                    };
                }

                if recorded.insert(id.as_str()) {
                    debug!(role, via = current, permission = %id, "Permission mismatches request");
                    mismatching.push(permission.describe());
                }
            }

            stack.extend(node.subroles.iter().map(String::as_str));
        }

        RoleVerdict::Denied {
            role: role.to_string(),
            mismatching,
        }
    }
}
