//! Role forest
//!
//! Roles live in a flat arena keyed by identifier. Parent and child links are
//! identifiers, never owning references, so the parent/subrole cycle needs no
//! shared ownership.
//!
//! ```text
//!              root
//!            /      \
//!       analyst    curator
//!          |
//!        intern
//! ```
//!
//! Every role except the synthetic root has exactly one parent, and a
//! parent's subrole set contains exactly the roles whose parent points back
//! to it.

use crate::error::{AuthzError, Result};
use crate::types::{PermissionId, RoleId, Tags};
use std::collections::{HashMap, HashSet};

/// A node of the authorization hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub tags: Tags,
    pub permissions: HashSet<PermissionId>,
    pub subroles: HashSet<RoleId>,
    pub parent: Option<RoleId>,
}

impl Role {
    /// Create an empty role, validating the identifier
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier(&id)?;
        Ok(Self {
            id,
            tags: Tags::new(),
            permissions: HashSet::new(),
            subroles: HashSet::new(),
            parent: None,
        })
    }

    /// Merge another role's tags, permissions and subroles into this one.
    /// Additive only; tags from `other` win on key collisions.
    pub fn update(&mut self, other: Role) {
        self.tags.extend(other.tags);
        self.permissions.extend(other.permissions);
        self.subroles.extend(other.subroles);
    }
}

/// Non-empty, no whitespace, control characters or `/`
pub fn validate_identifier(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(AuthzError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }
    if let Some(bad) = id
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || *c == '/')
    {
        return Err(AuthzError::InvalidIdentifier(format!(
            "identifier `{}` contains invalid character {:?}",
            id, bad
        )));
    }
    Ok(())
}

/// Tree of roles under a synthetic root, with O(1) lookup by identifier
#[derive(Debug, Clone)]
pub struct RoleForest {
    root: RoleId,
    roles: HashMap<RoleId, Role>,
}

impl RoleForest {
    /// Create a forest containing only the root role
    pub fn new(root: impl Into<String>) -> Result<Self> {
        let root = Role::new(root)?;
        let root_id = root.id.clone();
        let mut roles = HashMap::new();
        roles.insert(root_id.clone(), root);
        Ok(Self {
            root: root_id,
            roles,
        })
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    pub fn root(&self) -> &Role {
        &self.roles[&self.root]
    }

    pub fn get(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Role> {
        self.roles.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.roles.contains_key(id)
    }

    /// Number of roles, root included
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.roles.keys().cloned().collect()
    }

    /// Every role in the forest, in no particular order
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Roles attached directly under the root
    pub fn top_level(&self) -> Vec<RoleId> {
        self.root().subroles.iter().cloned().collect()
    }

    /// All roles strictly below `id`
    pub fn descendants(&self, id: &str) -> Vec<RoleId> {
        let mut result = Vec::new();
        let mut stack: Vec<&RoleId> = match self.roles.get(id) {
            Some(role) => role.subroles.iter().collect(),
            None => return result,
        };

        while let Some(current) = stack.pop() {
            if let Some(role) = self.roles.get(current) {
                stack.extend(role.subroles.iter());
                result.push(current.clone());
            }
        }

        result
    }

    /// Insert a validated role; the caller has checked the identifier is free
    pub(crate) fn insert(&mut self, role: Role) {
        self.roles.insert(role.id.clone(), role);
    }

    /// Point `child` at `parent` and record it in the parent's subrole set
    pub(crate) fn link(&mut self, child: &str, parent: &str) {
        if let Some(role) = self.roles.get_mut(child) {
            role.parent = Some(parent.to_string());
        }
        if let Some(parent) = self.roles.get_mut(parent) {
            parent.subroles.insert(child.to_string());
        }
    }

    /// Detach `id` from its parent and remove it and every descendant from the
    /// index. Returns the removed roles.
    pub(crate) fn detach(&mut self, id: &str) -> Result<Vec<Role>> {
        if id == self.root {
            return Err(AuthzError::InvalidIdentifier(
                "the root role cannot be detached".to_string(),
            ));
        }
        let parent = self
            .roles
            .get(id)
            .ok_or_else(|| AuthzError::not_found("role", id))?
            .parent
            .clone();

        if let Some(parent) = parent.and_then(|p| self.roles.get_mut(&p)) {
            parent.subroles.remove(id);
        }

        let mut removed = Vec::new();
        for descendant in self.descendants(id) {
            if let Some(role) = self.roles.remove(&descendant) {
                removed.push(role);
            }
        }
        if let Some(role) = self.roles.remove(id) {
            removed.push(role);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_with_parent(id: &str, parent: &str) -> Role {
        let mut role = Role::new(id).unwrap();
        role.parent = Some(parent.to_string());
        role
    }

    fn sample_forest() -> RoleForest {
        // root -> analyst -> intern, root -> curator
        let mut forest = RoleForest::new("root").unwrap();

        let mut analyst = Role::new("analyst").unwrap();
        analyst.subroles.insert("intern".to_string());
        forest.insert(analyst);
        forest.insert(role_with_parent("intern", "analyst"));
        forest.link("analyst", "root");
        forest.insert(Role::new("curator").unwrap());
        forest.link("curator", "root");

        forest
    }

    #[test]
    fn test_identifier_validation() {
        assert!(Role::new("analyst").is_ok());
        assert!(matches!(Role::new(""), Err(AuthzError::InvalidIdentifier(_))));
        assert!(matches!(Role::new("two words"), Err(AuthzError::InvalidIdentifier(_))));
        assert!(matches!(Role::new("a/b"), Err(AuthzError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_link_sets_parent_and_child() {
        let forest = sample_forest();

        assert_eq!(forest.len(), 4);
        assert_eq!(forest.get("analyst").unwrap().parent.as_deref(), Some("root"));
        assert_eq!(forest.get("intern").unwrap().parent.as_deref(), Some("analyst"));

        let mut top = forest.top_level();
        top.sort();
        assert_eq!(top, vec!["analyst".to_string(), "curator".to_string()]);
    }

    #[test]
    fn test_descendants() {
        let forest = sample_forest();

        let mut below_root = forest.descendants("root");
        below_root.sort();
        assert_eq!(below_root, vec!["analyst", "curator", "intern"]);
        assert_eq!(forest.descendants("analyst"), vec!["intern".to_string()]);
        assert!(forest.descendants("intern").is_empty());
        assert!(forest.descendants("missing").is_empty());
    }

    #[test]
    fn test_detach_cascades() {
        let mut forest = sample_forest();

        let removed = forest.detach("analyst").unwrap();
        let mut removed_ids: Vec<_> = removed.into_iter().map(|r| r.id).collect();
        removed_ids.sort();
        assert_eq!(removed_ids, vec!["analyst", "intern"]);

        assert!(!forest.contains("analyst"));
        assert!(!forest.contains("intern"));
        assert_eq!(forest.top_level(), vec!["curator".to_string()]);
    }

    #[test]
    fn test_detach_root_and_unknown() {
        let mut forest = sample_forest();
        assert!(matches!(forest.detach("root"), Err(AuthzError::InvalidIdentifier(_))));
        assert!(matches!(forest.detach("nobody"), Err(AuthzError::NotFound { .. })));
    }

    #[test]
    fn test_update_merges() {
        let mut role = Role::new("analyst").unwrap();
        role.tags.insert("team".into(), "a".into());
        role.permissions.insert("p1".into());

        let mut addition = Role::new("analyst").unwrap();
        addition.tags.insert("team".into(), "b".into());
        addition.tags.insert("site".into(), "x".into());
        addition.permissions.insert("p2".into());
        addition.subroles.insert("intern".into());

        role.update(addition);
        assert_eq!(role.tags.get("team"), Some(&"b".to_string()));
        assert_eq!(role.tags.get("site"), Some(&"x".to_string()));
        assert_eq!(role.permissions.len(), 2);
        assert!(role.subroles.contains("intern"));
    }
}
