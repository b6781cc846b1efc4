//! # Canopy Authorization Engine
//!
//! Role-based authorization decisions over an in-memory graph.
//!
//! ## Features
//!
//! - **Role forest** rooted at a synthetic root, with globally unique role identifiers
//! - **Shared permissions** with reverse-indexed cleanup of orphans
//! - **Hierarchical resources**: a grant on `/a` covers `/a/b`
//! - **Atomic loading**: a rejected description leaves the graph unchanged
//! - **Concurrent evaluation**: one task per requested role, first grant wins
//! - **Persistence and identity seams** for the surrounding service
//!
//! ## Example
//!
//! ```rust
//! use canopy_authz::{ActionDescription, AuthRequestDescription, Engine, PermissionDescription, RoleDescription};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new()?;
//!
//!     engine
//!         .create_role(&RoleDescription::new("analyst").with_permission(PermissionDescription::new(
//!             "p1",
//!             ActionDescription::new("data", "/studies/1", "read"),
//!         )))
//!         .await?;
//!
//!     let response = engine
//!         .authorize(&AuthRequestDescription {
//!             roles: vec!["analyst".to_string()],
//!             action: ActionDescription::new("data", "/studies/1/files", "read"),
//!             constraints: Default::default(),
//!         })
//!         .await?;
//!
//!     assert!(response.auth);
//!     assert_eq!(response.role_id.as_deref(), Some("analyst"));
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod engine;
pub mod error;
pub mod graph;
pub mod identity;
mod loader;
pub mod permission;
pub mod role;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use catalog::{Catalog, Resource, Service, SharedResource, SharedService};
pub use engine::{
    AuthRequest, AuthResponse, Engine, EngineConfig, EngineMetrics, MetricsCollector, RoleVerdict,
};
pub use error::{AuthzError, ErrorEnvelope, Result};
pub use graph::{AuthGraph, DEFAULT_ROOT_ROLE};
pub use identity::{Identity, IdentityResolver, StaticIdentityResolver};
pub use permission::{Action, Permission, PermissionRegistry};
pub use role::{Role, RoleForest};
pub use store::{GraphSnapshot, GraphStore, InMemoryGraphStore, JsonFileStore};
pub use types::{
    ActionDescription, AuthRequestDescription, Constraints, PermissionDescription, PermissionId,
    ResourceDescription, ResourcePath, RoleDescription, RoleId, ServiceDescription, ServiceId,
    Tags,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
