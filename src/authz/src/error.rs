//! Error types for the authorization engine

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Empty or malformed identifier
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A role with this identifier already exists somewhere in the forest
    #[error("Role already exists: {0}")]
    RoleAlreadyExists(String),

    /// Action description is missing service, resource or method
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Description is missing a field the operation requires
    #[error("Missing required field `{field}` on {entity}")]
    MissingRequiredField {
        entity: &'static str,
        field: &'static str,
    },

    /// Lookup of a role, resource, service or permission failed
    #[error("No {kind} found with id: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Authorization request could not be resolved against the graph
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Credential could not be resolved to an identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credential is valid but the action is denied
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Permission identifier reused with a different definition
    #[error("Permission conflict: {0}")]
    PermissionConflict(String),

    /// Resource path is already declared
    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// HTTP-status-like code for this error kind
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidIdentifier(_)
            | Self::InvalidAction(_)
            | Self::MissingRequiredField { .. }
            | Self::InvalidRequest(_)
            | Self::Serialization(_) => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound { .. } => 404,
            Self::RoleAlreadyExists(_)
            | Self::PermissionConflict(_)
            | Self::ResourceAlreadyExists(_) => 409,
            Self::Storage(_) | Self::Io(_) => 500,
        }
    }

    /// Whether the error is the caller's mistake rather than an operational failure
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;

/// Uniform error body handed to boundary collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: u16,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }

    /// Log the envelope: operational errors at `error`, client mistakes at `info`
    pub fn log(&self) {
        if self.code >= 500 {
            error!(code = self.code, "{}", self.error);
        } else {
            info!(code = self.code, "{}", self.error);
        }
    }
}

impl From<&AuthzError> for ErrorEnvelope {
    fn from(err: &AuthzError) -> Self {
        Self::new(err.to_string(), err.status_code())
    }
}

impl From<AuthzError> for ErrorEnvelope {
    fn from(err: AuthzError) -> Self {
        Self::from(&err)
    }
}
