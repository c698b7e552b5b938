//! Error types for tenant-gate
//!
//! Denials are values (`false`, `AccessDecision`), not errors. Everything in
//! this module describes a failure to *reach* a decision, a failed mutation,
//! or a misconfiguration. `ResolutionError` in particular must never be read
//! as "access denied".

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authorization store error: {0}")]
    Store(#[from] StoreError),

    #[error("Access resolution failed: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Permission mutation failed: {0}")]
    Mutation(#[from] MutationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors talking to the backing authorization store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized: invalid or missing service key")]
    Unauthorized,

    #[error("Invalid response from store: {0}")]
    InvalidResponse(String),

    #[error("Store call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl StoreError {
    /// Create an appropriate error from an HTTP status code and response body
    pub fn from_response(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => StoreError::Unauthorized,
            404 => StoreError::NotFound {
                resource: if body.is_empty() {
                    "requested relation".into()
                } else {
                    body.to_string()
                },
            },
            429 => StoreError::RateLimited { retry_after: 60 },
            _ => StoreError::Api {
                status,
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
            },
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Request(e) => e.is_timeout() || e.is_connect(),
            StoreError::Api { status, .. } => *status >= 500,
            StoreError::RateLimited { .. } | StoreError::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Failure to reach an access decision.
///
/// Surfaced to callers as "access unknown"; the route guard maps it to its
/// error state with a retry affordance.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("access check timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Failure of a grant/revoke mutation.
///
/// A failed mutation is all-or-nothing: the cache is left untouched and no
/// audit records are written.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("permission update timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("bulk update contains no permissions")]
    EmptyBatch,
}

/// Audit sink write failure. Logged, never escalated to a decision.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit sink write failed: {0}")]
    Sink(#[from] StoreError),

    #[error("audit sink write timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

/// Session lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no active session")]
    NotSignedIn,

    #[error("subject is not a member of tenant '{0}'")]
    UnknownTenant(String),
}

/// An explicit, evaluated denial
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Access denied for '{resource}': {reason}")]
pub struct AccessDeniedError {
    pub resource: String,
    pub reason: String,
}

impl AccessDeniedError {
    pub fn new(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn not_signed_in(resource: impl Into<String>) -> Self {
        Self::new(resource, "no active session")
    }

    pub fn missing_role(resource: impl Into<String>, role: impl std::fmt::Display) -> Self {
        Self {
            resource: resource.into(),
            reason: format!("requires role '{}' or higher", role),
        }
    }

    pub fn tenant_admin_required(operation: impl Into<String>) -> Self {
        Self {
            resource: operation.into(),
            reason: "not authorized to perform this operation".into(),
        }
    }
}

/// Outcome of an `ensure_*` style authorization check
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error(transparent)]
    Denied(#[from] AccessDeniedError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl AuthorizationError {
    pub fn is_denied(&self) -> bool {
        matches!(self, AuthorizationError::Denied(_))
    }
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for backing-store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
