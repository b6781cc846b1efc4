//! Graph persistence
//!
//! A [`GraphSnapshot`] holds everything needed to rebuild the in-memory graph:
//! declared resources, services with their aliases, and the top-level role
//! subtrees. Stores load one at startup and save one after every committed
//! mutation.

use crate::error::{AuthzError, Result};
use crate::types::{ResourceDescription, RoleDescription, ServiceDescription};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Serializable form of the whole graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub resources: Vec<ResourceDescription>,

    #[serde(default)]
    pub services: Vec<ServiceDescription>,

    #[serde(default)]
    pub roles: Vec<RoleDescription>,
}

impl GraphSnapshot {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.services.is_empty() && self.roles.is_empty()
    }
}

/// Durable home of the graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Load the stored graph; an empty store yields an empty snapshot
    async fn load(&self) -> Result<GraphSnapshot>;

    /// Replace the stored graph
    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()>;
}

/// In-memory store, mostly for tests
#[derive(Default)]
pub struct InMemoryGraphStore {
    snapshot: Arc<RwLock<GraphSnapshot>>,
    saves: Arc<RwLock<u64>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            saves: Arc::new(RwLock::new(0)),
        }
    }

    /// Number of saves performed so far
    pub async fn save_count(&self) -> u64 {
        *self.saves.read().await
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn load(&self) -> Result<GraphSnapshot> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        *self.snapshot.write().await = snapshot.clone();
        *self.saves.write().await += 1;
        Ok(())
    }
}

/// Pretty-printed JSON file on disk
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a snapshot file directly, without going through a store
    pub async fn read_snapshot(path: impl AsRef<Path>) -> Result<GraphSnapshot> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl GraphStore for JsonFileStore {
    async fn load(&self) -> Result<GraphSnapshot> {
        if !tokio::fs::try_exists(&self.path).await? {
            debug!(path = %self.path.display(), "No snapshot file, starting empty");
            return Ok(GraphSnapshot::default());
        }
        Self::read_snapshot(&self.path).await
    }

    async fn save(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        // Write beside the target and rename so readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            AuthzError::Storage(format!(
                "failed to replace {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(path = %self.path.display(), bytes = bytes.len(), "Saved snapshot");
        Ok(())
    }
}
