//! Graph loading tests
//!
//! Uniqueness, atomic subtree loads, orphan cleanup and catalog identity

use canopy_authz::{
    ActionDescription, AuthRequestDescription, AuthzError, Engine, PermissionDescription,
    ResourceDescription, RoleDescription, ServiceDescription,
};
use std::sync::Arc;

fn read(resource: &str) -> ActionDescription {
    ActionDescription::new("data", resource, "read")
}

fn permission(id: &str, resource: &str) -> PermissionDescription {
    PermissionDescription::new(id, read(resource))
}

async fn sorted_roles(engine: &Engine) -> Vec<String> {
    let mut roles = engine.list_roles().await;
    roles.sort();
    roles
}

// ============================================================================
// UNIQUENESS
// ============================================================================

#[tokio::test]
async fn test_duplicate_role_rejected_without_mutation() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(
            &RoleDescription::new("analyst")
                .with_permission(permission("p1", "/studies/1"))
                .with_subrole(RoleDescription::new("intern")),
        )
        .await
        .unwrap();
    let before = engine.snapshot().await;

    // Collides with a nested role, not a top-level one
    let result = engine
        .create_role(
            &RoleDescription::new("curator")
                .with_permission(permission("p9", "/archive"))
                .with_subrole(RoleDescription::new("intern")),
        )
        .await;

    assert!(matches!(result, Err(AuthzError::RoleAlreadyExists(id)) if id == "intern"));
    assert_eq!(engine.snapshot().await, before);
    assert_eq!(sorted_roles(&engine).await, vec!["analyst", "intern"]);

    let graph = engine.graph().await;
    assert!(!graph.permissions().contains("p9"));
    assert!(graph.catalog().find_resource("/archive").is_none());
}

#[tokio::test]
async fn test_root_identifier_is_taken() {
    let engine = Engine::new().unwrap();
    let result = engine.create_role(&RoleDescription::new("root")).await;
    assert!(matches!(result, Err(AuthzError::RoleAlreadyExists(_))));
}

// ============================================================================
// ATOMIC LOADS
// ============================================================================

#[tokio::test]
async fn test_invalid_descendant_leaves_no_trace() {
    let engine = Engine::new().unwrap();

    let description = RoleDescription::new("analyst")
        .with_permission(permission("p1", "/studies/1"))
        .with_subrole(
            RoleDescription::new("intern")
                .with_permission(permission("p2", "/studies/2"))
                .with_subrole(RoleDescription::new("trainee").with_permission(PermissionDescription::new(
                    "p3",
                    ActionDescription::new("data", "/studies/3", ""),
                ))),
        );

    let result = engine.create_role(&description).await;
    assert!(matches!(result, Err(AuthzError::InvalidAction(_))));

    assert!(engine.list_roles().await.is_empty());
    assert!(engine.list_services().await.is_empty());
    assert!(engine.list_resources().await.is_empty());
    assert!(engine.graph().await.permissions().is_empty());
}

#[tokio::test]
async fn test_invalid_identifier_and_missing_fields() {
    let engine = Engine::new().unwrap();

    let result = engine
        .create_role(&RoleDescription::new("analyst").with_subrole(RoleDescription::new("bad id")))
        .await;
    assert!(matches!(result, Err(AuthzError::InvalidIdentifier(_))));

    let result = engine.create_role(&RoleDescription::new("")).await;
    assert!(matches!(result, Err(AuthzError::InvalidIdentifier(_))));

    let result = engine
        .create_role(&RoleDescription::new("analyst").with_permission(PermissionDescription::new("", read("/a"))))
        .await;
    assert!(matches!(
        result,
        Err(AuthzError::MissingRequiredField { entity: "permission", field: "id" })
    ));

    assert!(engine.list_roles().await.is_empty());
}

#[tokio::test]
async fn test_failed_update_is_atomic() {
    let engine = Engine::new().unwrap();
    engine.create_role(&RoleDescription::new("analyst")).await.unwrap();
    engine.create_role(&RoleDescription::new("curator")).await.unwrap();
    let before = engine.snapshot().await;

    let result = engine
        .update_role(
            "analyst",
            &RoleDescription::default()
                .with_tag("site", "x")
                .with_permission(permission("p1", "/a"))
                .with_subrole(RoleDescription::new("curator")),
        )
        .await;
    assert!(matches!(result, Err(AuthzError::RoleAlreadyExists(_))));
    assert_eq!(engine.snapshot().await, before);

    let result = engine
        .update_role("analyst", &RoleDescription::new("someone-else"))
        .await;
    assert!(matches!(result, Err(AuthzError::InvalidIdentifier(_))));
}

// ============================================================================
// PERMISSIONS
// ============================================================================

#[tokio::test]
async fn test_orphan_cleanup_on_delete_and_revoke() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(&RoleDescription::new("analyst").with_permission(permission("p1", "/studies")))
        .await
        .unwrap();
    engine
        .create_role(
            &RoleDescription::new("curator")
                .with_permission(permission("p1", "/studies"))
                .with_permission(permission("p2", "/archive")),
        )
        .await
        .unwrap();

    {
        let graph = engine.graph().await;
        let granting = graph.permissions().get("p1").unwrap().roles_granting().clone();
        assert_eq!(granting.len(), 2);
    }

    engine.delete_role("analyst").await.unwrap();
    assert!(engine.graph().await.permissions().contains("p1"));

    assert!(engine.revoke_permission("curator", "p1").await.unwrap());
    let graph = engine.graph().await;
    assert!(!graph.permissions().contains("p1"));
    assert!(graph.permissions().contains("p2"));
}

#[tokio::test]
async fn test_conflicting_permission_definition() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(&RoleDescription::new("analyst").with_permission(permission("p1", "/studies")))
        .await
        .unwrap();

    let result = engine
        .create_role(&RoleDescription::new("curator").with_permission(permission("p1", "/archive")))
        .await;
    assert!(matches!(result, Err(AuthzError::PermissionConflict(_))));
    assert_eq!(sorted_roles(&engine).await, vec!["analyst"]);
}

// ============================================================================
// ROLE FOREST
// ============================================================================

#[tokio::test]
async fn test_delete_cascades_to_descendants() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(
            &RoleDescription::new("analyst").with_subrole(
                RoleDescription::new("intern")
                    .with_permission(permission("p1", "/a"))
                    .with_subrole(RoleDescription::new("trainee")),
            ),
        )
        .await
        .unwrap();
    engine.create_role(&RoleDescription::new("curator")).await.unwrap();

    let mut descendants = engine.role_descendants("analyst").await.unwrap();
    descendants.sort();
    assert_eq!(descendants, vec!["intern", "trainee"]);

    let mut removed = engine.delete_role("intern").await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["intern", "trainee"]);
    assert_eq!(sorted_roles(&engine).await, vec!["analyst", "curator"]);
    assert!(engine.describe_role("analyst").await.unwrap().subroles.is_empty());
    assert!(!engine.graph().await.permissions().contains("p1"));

    assert!(matches!(engine.delete_role("root").await, Err(AuthzError::InvalidIdentifier(_))));
    assert!(matches!(engine.delete_role("intern").await, Err(AuthzError::NotFound { .. })));
    assert!(matches!(engine.role_descendants("intern").await, Err(AuthzError::NotFound { .. })));
}

#[tokio::test]
async fn test_update_adds_and_keeps_existing() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(
            &RoleDescription::new("analyst")
                .with_tag("team", "a")
                .with_permission(permission("p1", "/studies")),
        )
        .await
        .unwrap();

    engine
        .update_role(
            "analyst",
            &RoleDescription::new("analyst")
                .with_tag("team", "b")
                .with_permission(permission("p2", "/archive"))
                .with_subrole(RoleDescription::new("intern").with_permission(permission("p3", "/drafts"))),
        )
        .await
        .unwrap();

    let described = engine.describe_role("analyst").await.unwrap();
    assert_eq!(described.tags.get("team"), Some(&"b".to_string()));
    let ids: Vec<_> = described.permissions.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(described.subroles.len(), 1);
    assert_eq!(described.subroles[0].id, "intern");

    let response = engine
        .authorize(&AuthRequestDescription {
            roles: vec!["analyst".to_string()],
            action: read("/drafts/1"),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(response.auth);
}

// ============================================================================
// CATALOG
// ============================================================================

#[tokio::test]
async fn test_find_or_create_identity_across_loads() {
    let engine = Engine::new().unwrap();
    engine
        .create_role(&RoleDescription::new("analyst").with_permission(permission("p1", "/studies/1")))
        .await
        .unwrap();
    engine
        .create_role(&RoleDescription::new("curator").with_permission(
            PermissionDescription::new("p2", ActionDescription::new("data", "/studies/1", "write")),
        ))
        .await
        .unwrap();

    let graph = engine.graph().await;
    let first = &graph.permissions().get("p1").unwrap().action;
    let second = &graph.permissions().get("p2").unwrap().action;
    assert!(Arc::ptr_eq(&first.resource, &second.resource));
    assert!(Arc::ptr_eq(&first.service, &second.service));

    first.resource.set_description(Some("first study".to_string()));
    assert_eq!(second.resource.description().as_deref(), Some("first study"));
}

#[tokio::test]
async fn test_services_and_resources() {
    let engine = Engine::new().unwrap();
    engine
        .create_resource(
            &ResourceDescription::at_path("/studies")
                .with_description("all studies")
                .with_subresource(ResourceDescription::named("1")),
        )
        .await
        .unwrap();
    engine
        .create_subresource("/studies/1", &ResourceDescription::named("files"))
        .await
        .unwrap();
    engine
        .create_service(&ServiceDescription::new("data").with_alias("https://data.example.org/s/1", "/studies/1"))
        .await
        .unwrap();

    let mut resources = engine.list_resources().await;
    resources.sort();
    assert_eq!(resources, vec!["/studies", "/studies/1", "/studies/1/files"]);
    assert_eq!(engine.list_services().await, vec!["data".to_string()]);

    let described = engine.describe_resource("/studies").await.unwrap();
    assert_eq!(described.description.as_deref(), Some("all studies"));
    assert_eq!(described.subresources.len(), 1);
    assert_eq!(described.subresources[0].subresources[0].name.as_deref(), Some("files"));

    assert_eq!(
        engine
            .resolve_service_uri("data", "https://data.example.org/s/1")
            .await
            .unwrap(),
        "/studies/1"
    );
    assert!(matches!(
        engine.resolve_service_uri("data", "https://elsewhere").await,
        Err(AuthzError::NotFound { .. })
    ));
    assert!(matches!(
        engine.describe_service("billing").await,
        Err(AuthzError::NotFound { kind: "service", .. })
    ));

    assert!(matches!(
        engine.create_resource(&ResourceDescription::at_path("/studies")).await,
        Err(AuthzError::ResourceAlreadyExists(_))
    ));
    assert!(matches!(
        engine.create_subresource("/missing", &ResourceDescription::named("x")).await,
        Err(AuthzError::NotFound { .. })
    ));

    // Only the alias keeps /studies/1 alive
    let mut removed = engine.delete_resource("/studies").await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["/studies", "/studies/1/files"]);
    assert_eq!(engine.list_resources().await, vec!["/studies/1".to_string()]);
}

#[tokio::test]
async fn test_hierarchy_independent_of_declaration_order() {
    let engine = Engine::new().unwrap();
    engine
        .create_resource(&ResourceDescription::at_path("/a/b/c"))
        .await
        .unwrap();
    engine
        .create_resource(&ResourceDescription::at_path("/a/b"))
        .await
        .unwrap();
    engine
        .create_resource(&ResourceDescription::at_path("/a"))
        .await
        .unwrap();

    let described = engine.describe_resource("/a").await.unwrap();
    assert_eq!(described.subresources.len(), 1);
    assert_eq!(described.subresources[0].path.as_deref(), Some("/a/b"));
    assert_eq!(described.subresources[0].subresources.len(), 1);

    // Same shape as a graph rebuilt from the snapshot
    let rebuilt = Engine::new().unwrap();
    rebuilt.rehydrate(&engine.snapshot().await).await.unwrap();
    assert_eq!(rebuilt.describe_resource("/a").await.unwrap(), described);

    let mut removed = engine.delete_resource("/a").await.unwrap();
    removed.sort();
    assert_eq!(removed, vec!["/a", "/a/b", "/a/b/c"]);
    assert!(engine.list_resources().await.is_empty());
}

#[tokio::test]
async fn test_malformed_resource_paths_rejected() {
    let engine = Engine::new().unwrap();

    let result = engine
        .create_role(&RoleDescription::new("analyst").with_permission(permission("p1", "studies/1")))
        .await;
    assert!(matches!(result, Err(AuthzError::InvalidAction(_))));

    let result = engine
        .create_role(&RoleDescription::new("analyst").with_permission(permission("p1", "/studies//1")))
        .await;
    assert!(matches!(result, Err(AuthzError::InvalidAction(_))));

    let result = engine
        .create_service(&ServiceDescription::new("data").with_alias("uri:s1", "studies/1"))
        .await;
    assert!(matches!(result, Err(AuthzError::InvalidIdentifier(_))));

    assert!(engine.list_roles().await.is_empty());
    assert!(engine.list_services().await.is_empty());
    assert!(engine.graph().await.catalog().find_resource("studies/1").is_none());
}
