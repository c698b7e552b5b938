//! Backing authorization store
//!
//! The resolver never decides on its own: on a cache miss it asks an
//! [`AuthorizationStore`]. Two implementations ship with the crate:
//!
//! - [`RestAuthorizationStore`] talks to the hosted PostgREST-style backend
//! - [`MemoryAuthorizationStore`] keeps the tables in process (tests, dry runs)

pub mod memory;
pub mod rest;

pub use memory::{CallCounts, MemoryAuthorizationStore};
pub use rest::{RestAuthorizationStore, RestClient};

use crate::access_control::{AccessScope, PermissionRequirement, PermissionUpdate};
use crate::error::StoreResult;
// async_trait required for dyn-compatibility with Arc<dyn AuthorizationStore>
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Backing store consulted by the permission resolver
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Whether `scope` holds `requirement` (subject grants, then role grants)
    async fn check_permission(
        &self,
        scope: &AccessScope,
        requirement: &PermissionRequirement,
    ) -> StoreResult<bool>;

    /// The subset of `requirements` that `scope` holds, in one round trip
    async fn granted_permissions(
        &self,
        scope: &AccessScope,
        requirements: &[PermissionRequirement],
    ) -> StoreResult<HashSet<PermissionRequirement>>;

    /// Path-table lookup: does the page governing `path` admit the scope's role?
    /// Paths matching no page are denied.
    async fn can_access_path(&self, scope: &AccessScope, path: &str) -> StoreResult<bool>;

    /// Page paths active for the scope's role
    async fn accessible_paths(&self, scope: &AccessScope) -> StoreResult<Vec<String>>;

    /// Every registered page path
    async fn all_paths(&self) -> StoreResult<Vec<String>>;

    /// Apply grants and revokes all-or-nothing
    async fn apply_updates(
        &self,
        tenant_id: Option<&str>,
        updates: &[PermissionUpdate],
    ) -> StoreResult<()>;
}

/// Shared handle to an authorization store
pub type SharedAuthorizationStore = Arc<dyn AuthorizationStore>;
