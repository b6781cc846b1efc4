//! Authorization engine
//!
//! Owns the graph behind a single reader/writer lock. Mutations take the
//! write side. An authorization check takes the read side once and shares
//! that guard with every evaluation task it spawns, so the graph cannot
//! change until the last task of the check has finished, including tasks
//! still running after an early permit was returned.
//!
//! # Architecture
//!
//! ```text
//! AuthRequestDescription → resolve → fan out (one task per role) → AuthResponse
//!                                        ↓          ↓          ↓
//!                                    evaluate   evaluate   evaluate
//!                                        └──── first grant wins ────┘
//! ```

pub mod decision;
pub mod evaluator;
pub mod metrics;

pub use decision::{AuthRequest, AuthResponse};
pub use evaluator::RoleVerdict;
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::error::{AuthzError, Result};
use crate::graph::{AuthGraph, DEFAULT_ROOT_ROLE};
use crate::identity::{bearer_token, IdentityResolver};
use crate::store::{GraphSnapshot, GraphStore};
use crate::types::{
    ActionDescription, AuthRequestDescription, ResourceDescription, ResourcePath,
    RoleDescription, RoleId, ServiceDescription, ServiceId,
};

use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, OwnedRwLockReadGuard, RwLock, RwLockReadGuard};
use tracing::{debug, info, instrument, warn};

/// Engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on distinct roles named in one request
    pub max_request_roles: usize,

    /// Enable decision metrics
    pub enable_metrics: bool,

    /// Identifier of the synthetic root role
    pub root_role: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_request_roles: 256,
            enable_metrics: true,
            root_role: DEFAULT_ROOT_ROLE.to_string(),
        }
    }
}

type SharedGraph = Arc<OwnedRwLockReadGuard<AuthGraph>>;

/// Composition root: the graph, its lock, and the collaborators around it
#[derive(Clone)]
pub struct Engine {
    graph: Arc<RwLock<AuthGraph>>,

    config: EngineConfig,

    metrics: Option<Arc<MetricsCollector>>,

    /// Receives a snapshot after every committed mutation
    store: Option<Arc<dyn GraphStore>>,
}

impl Engine {
    /// Engine with the default configuration and an empty graph
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        let graph = AuthGraph::new(&config.root_role)?;
        Ok(Self::assemble(graph, config, None))
    }

    /// Rehydrate from `store` and persist every later mutation back to it
    pub async fn with_store(config: EngineConfig, store: Arc<dyn GraphStore>) -> Result<Self> {
        let snapshot = store.load().await?;
        let graph = AuthGraph::from_snapshot(&config.root_role, &snapshot)?;

        info!(
            roles = graph.forest().len() - 1,
            permissions = graph.permissions().len(),
            services = snapshot.services.len(),
            "Engine rehydrated from store"
        );

        Ok(Self::assemble(graph, config, Some(store)))
    }

    fn assemble(graph: AuthGraph, config: EngineConfig, store: Option<Arc<dyn GraphStore>>) -> Self {
        let metrics = if config.enable_metrics {
            Some(Arc::new(MetricsCollector::new()))
        } else {
            None
        };

        info!(
            root = %config.root_role,
            metrics = config.enable_metrics,
            persistent = store.is_some(),
            "Engine initialized"
        );

        Self {
            graph: Arc::new(RwLock::new(graph)),
            config,
            metrics,
            store,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read access to the graph; mutations wait until the guard drops
    pub async fn graph(&self) -> RwLockReadGuard<'_, AuthGraph> {
        self.graph.read().await
    }

    /// Run `op` under the write lock, then persist while still holding it.
    /// A failed save rolls the graph back to its state before `op`.
    async fn mutate<T>(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut AuthGraph) -> Result<T>,
    ) -> Result<T> {
        let mut graph = self.graph.write().await;
        let previous = self.store.as_ref().map(|_| graph.snapshot());

        let value = match op(&mut *graph) {
            Ok(value) => value,
            Err(e) => {
                warn!(operation, error = %e, "Rejected graph mutation");
                return Err(e);
            }
        };

        if let (Some(store), Some(previous)) = (&self.store, previous) {
            if let Err(e) = store.save(&graph.snapshot()).await {
                warn!(operation, error = %e, "Failed to persist graph, rolling back");
                *graph = AuthGraph::from_snapshot(&self.config.root_role, &previous)?;
                return Err(match e {
                    AuthzError::Storage(_) => e,
                    other => AuthzError::Storage(other.to_string()),
                });
            }
        }

        Ok(value)
    }

    // Roles

    #[instrument(skip(self, description), fields(role = %description.id))]
    pub async fn create_role(&self, description: &RoleDescription) -> Result<()> {
        self.mutate("create_role", |graph| graph.load_role(description))
            .await?;
        info!("Role loaded");
        Ok(())
    }

    #[instrument(skip(self, addition))]
    pub async fn update_role(&self, id: &str, addition: &RoleDescription) -> Result<()> {
        self.mutate("update_role", |graph| graph.update_role(id, addition))
            .await?;
        info!("Role updated");
        Ok(())
    }

    /// Delete a role and its descendants, returning the removed identifiers
    #[instrument(skip(self))]
    pub async fn delete_role(&self, id: &str) -> Result<Vec<RoleId>> {
        let removed = self
            .mutate("delete_role", |graph| graph.remove_role(id))
            .await?;
        info!(removed = removed.len(), "Role deleted");
        Ok(removed)
    }

    /// Remove one permission from one role; true when the permission was dropped
    #[instrument(skip(self))]
    pub async fn revoke_permission(&self, role: &str, permission: &str) -> Result<bool> {
        let dropped = self
            .mutate("revoke_permission", |graph| {
                graph.revoke_permission(role, permission)
            })
            .await?;
        info!(dropped, "Permission revoked");
        Ok(dropped)
    }

    pub async fn list_roles(&self) -> Vec<RoleId> {
        let graph = self.graph.read().await;
        let root = graph.forest().root_id();
        graph
            .forest()
            .role_ids()
            .into_iter()
            .filter(|id| id != root)
            .collect()
    }

    pub async fn describe_role(&self, id: &str) -> Result<RoleDescription> {
        self.graph.read().await.describe_role(id)
    }

    /// All roles strictly below `id`
    pub async fn role_descendants(&self, id: &str) -> Result<Vec<RoleId>> {
        let graph = self.graph.read().await;
        if !graph.forest().contains(id) {
            return Err(AuthzError::not_found("role", id));
        }
        Ok(graph.forest().descendants(id))
    }

    // Services

    #[instrument(skip(self, description), fields(service = %description.id))]
    pub async fn create_service(&self, description: &ServiceDescription) -> Result<()> {
        self.mutate("create_service", |graph| graph.load_service(description))
            .await?;
        info!(aliases = description.uris_to_resources.len(), "Service loaded");
        Ok(())
    }

    pub async fn list_services(&self) -> Vec<ServiceId> {
        self.graph.read().await.catalog().service_ids()
    }

    pub async fn describe_service(&self, id: &str) -> Result<ServiceDescription> {
        self.graph.read().await.describe_service(id)
    }

    /// Path of the resource a service aliases under `uri`
    pub async fn resolve_service_uri(&self, service: &str, uri: &str) -> Result<ResourcePath> {
        let graph = self.graph.read().await;
        let service = graph
            .catalog()
            .find_service(service)
            .ok_or_else(|| AuthzError::not_found("service", service))?;
        service
            .resolve_uri(uri)
            .map(|resource| resource.path().to_string())
            .ok_or_else(|| AuthzError::not_found("service alias", uri))
    }

    // Resources

    #[instrument(skip(self, description), fields(path = ?description.path))]
    pub async fn create_resource(&self, description: &ResourceDescription) -> Result<()> {
        self.mutate("create_resource", |graph| graph.load_resource(description))
            .await?;
        info!("Resource declared");
        Ok(())
    }

    #[instrument(skip(self, description), fields(name = ?description.name))]
    pub async fn create_subresource(
        &self,
        parent: &str,
        description: &ResourceDescription,
    ) -> Result<()> {
        self.mutate("create_subresource", |graph| {
            graph.load_subresource(parent, description)
        })
        .await?;
        info!("Subresource declared");
        Ok(())
    }

    /// Delete a resource subtree, returning the paths that left the catalog
    #[instrument(skip(self))]
    pub async fn delete_resource(&self, path: &str) -> Result<Vec<ResourcePath>> {
        let removed = self
            .mutate("delete_resource", |graph| graph.remove_resource(path))
            .await?;
        info!(removed = removed.len(), "Resource deleted");
        Ok(removed)
    }

    pub async fn list_resources(&self) -> Vec<ResourcePath> {
        self.graph.read().await.catalog().resource_paths()
    }

    pub async fn describe_resource(&self, path: &str) -> Result<ResourceDescription> {
        self.graph.read().await.describe_resource(path)
    }

    // Authorization

    /// Resolve a wire request against the current graph
    pub async fn resolve_request(&self, description: &AuthRequestDescription) -> Result<AuthRequest> {
        let graph = self.graph.read().await;
        self.resolve_on(description, &graph).await
    }

    /// Resolve against a held graph, counting rejections as invalid requests
    async fn resolve_on(&self, description: &AuthRequestDescription, graph: &AuthGraph) -> Result<AuthRequest> {
        let resolved = AuthRequest::resolve(description, graph, self.config.max_request_roles);
        if resolved.is_err() {
            if let Some(metrics) = &self.metrics {
                metrics.record_invalid_request().await;
            }
        }
        resolved
    }

    /// Parse and resolve a JSON authorization request
    pub async fn parse_request(&self, body: &[u8]) -> Result<AuthRequest> {
        let description: AuthRequestDescription = match serde_json::from_slice(body) {
            Ok(description) => description,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_invalid_request().await;
                }
                return Err(AuthzError::InvalidRequest(format!("malformed request body: {}", e)));
            }
        };
        self.resolve_request(&description).await
    }

    /// Evaluate an already resolved request
    #[instrument(
        skip(self, request),
        fields(
            roles = request.roles.len(),
            service = %request.action.service,
            resource = %request.action.resource,
            method = %request.action.method,
        )
    )]
    pub async fn check_auth(&self, request: AuthRequest) -> AuthResponse {
        let start = Instant::now();
        let graph = Arc::new(Arc::clone(&self.graph).read_owned().await);
        let response = Self::fan_out(graph, request).await;
        self.record(&response, start).await;
        response
    }

    /// Resolve and evaluate a wire request under a single read lock
    pub async fn authorize(&self, description: &AuthRequestDescription) -> Result<AuthResponse> {
        let start = Instant::now();
        let graph = Arc::new(Arc::clone(&self.graph).read_owned().await);

        let request = self.resolve_on(description, &graph).await?;

        let response = Self::fan_out(graph, request).await;
        self.record(&response, start).await;
        Ok(response)
    }

    /// Resolve a credential to an identity and authorize `action` for it
    pub async fn authorize_credential(
        &self,
        resolver: &dyn IdentityResolver,
        authorization: &str,
        action: ActionDescription,
    ) -> Result<AuthResponse> {
        let identity = resolver.resolve(bearer_token(authorization)?).await?;
        debug!(subject = %identity.subject, "Resolved identity");

        self.authorize(&AuthRequestDescription {
            roles: identity.roles,
            action,
            constraints: identity.constraints,
        })
        .await
    }

    /// One task per role. The first grant is returned at once; the remaining
    /// tasks run to completion and their verdicts are discarded. Without a
    /// grant every verdict is awaited and the mismatches are merged.
    async fn fan_out(graph: SharedGraph, request: AuthRequest) -> AuthResponse {
        let request = Arc::new(request);
        let (tx, mut rx) = mpsc::channel(request.roles.len().max(1));

        for role in request.roles.iter().cloned() {
            let graph = Arc::clone(&graph);
            let request = Arc::clone(&request);
            let tx = tx.clone();
            tokio::spawn(async move {
                let verdict = graph.evaluate_role(&role, &request);
                // Fails only once a grant has already been returned
                let _ = tx.send(verdict).await;
            });
        }
        drop(tx);
        drop(graph);

        let mut mismatching = Vec::new();
        let mut seen = HashSet::new();
        while let Some(verdict) = rx.recv().await {
            match verdict {
                RoleVerdict::Granted { role, permission } => {
                    info!(role = %role, permission = %permission.id, "Permit");
                    return AuthResponse::permit(role, permission);
                }
                RoleVerdict::Denied { role, mismatching: found } => {
                    debug!(role = %role, mismatching = found.len(), "Role denied");
                    for permission in found {
                        if seen.insert(permission.id.clone()) {
                            mismatching.push(permission);
                        }
                    }
                }
            }
        }

        info!(mismatching = mismatching.len(), "Deny");
        AuthResponse::deny(mismatching)
    }

    async fn record(&self, response: &AuthResponse, start: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_latency(start.elapsed()).await;
            metrics.record_decision(response.auth).await;
        }
    }

    pub async fn metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    // Persistence

    pub async fn snapshot(&self) -> GraphSnapshot {
        self.graph.read().await.snapshot()
    }

    /// Replace the whole graph with one built from `snapshot`.
    /// On failure the current graph is left untouched.
    #[instrument(skip(self, snapshot), fields(roles = snapshot.roles.len()))]
    pub async fn rehydrate(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let root = self.config.root_role.clone();
        self.mutate("rehydrate", |graph| {
            *graph = AuthGraph::from_snapshot(&root, snapshot)?;
            Ok(())
        })
        .await?;
        info!("Graph rehydrated");
        Ok(())
    }
}
