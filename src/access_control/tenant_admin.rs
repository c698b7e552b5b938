//! Tenant-administration checks
//!
//! Gatekeepers for admin operations: each passes for tenant admins (and
//! above), or for subjects holding the specific permission behind the
//! operation.

use crate::access_control::resolver::PermissionResolver;
use crate::access_control::role::Role;
use crate::access_control::types::{actions, resources};
use crate::error::{AccessDeniedError, AuthorizationError};
use std::sync::Arc;
use tracing::debug;

pub struct TenantAdminChecks {
    resolver: Arc<PermissionResolver>,
}

impl TenantAdminChecks {
    pub fn new(resolver: Arc<PermissionResolver>) -> Self {
        Self { resolver }
    }

    async fn ensure(
        &self,
        operation: &str,
        resource: &str,
        action: &str,
    ) -> Result<(), AuthorizationError> {
        if self.resolver.session().is_none() {
            return Err(AccessDeniedError::not_signed_in(operation).into());
        }
        if self.resolver.has_role_or_higher(Role::TenantAdmin) {
            return Ok(());
        }
        if self.resolver.check_access(resource, action).await? {
            return Ok(());
        }
        debug!(operation, resource, action, "Tenant-admin check failed");
        Err(AccessDeniedError::tenant_admin_required(operation).into())
    }

    /// Tenant admin role, or `tenants:update`
    pub async fn ensure_tenant_admin(&self) -> Result<(), AuthorizationError> {
        self.ensure("tenant administration", resources::TENANTS, actions::UPDATE)
            .await
    }

    /// Tenant admin role, or `users:create`
    pub async fn ensure_can_manage_users(&self) -> Result<(), AuthorizationError> {
        self.ensure("user management", resources::USERS, actions::CREATE)
            .await
    }

    /// Tenant admin role, or `domains:assign`
    pub async fn ensure_can_manage_domains(&self) -> Result<(), AuthorizationError> {
        self.ensure("domain management", resources::DOMAINS, actions::ASSIGN)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::session::{Session, SessionStore, TenantMembership};
    use crate::store::MemoryAuthorizationStore;

    fn checks(session: Option<Session>, store: MemoryAuthorizationStore) -> TenantAdminChecks {
        let sessions = Arc::new(SessionStore::new());
        if let Some(session) = session {
            sessions.sign_in(session);
        }
        let resolver = PermissionResolver::new(
            sessions,
            Arc::new(store),
            Arc::new(MemoryAuditSink::default()),
        );
        TenantAdminChecks::new(Arc::new(resolver))
    }

    fn member(role: Role) -> Session {
        Session::new("u-1", "u@example.edu").with_membership(TenantMembership::new("t-1", role))
    }

    #[tokio::test]
    async fn test_tenant_admin_passes_all() {
        let checks = checks(Some(member(Role::TenantAdmin)), MemoryAuthorizationStore::new());
        assert!(checks.ensure_tenant_admin().await.is_ok());
        assert!(checks.ensure_can_manage_users().await.is_ok());
        assert!(checks.ensure_can_manage_domains().await.is_ok());
    }

    #[tokio::test]
    async fn test_platform_admin_passes() {
        let session = Session::new("root", "root@example.edu").with_platform_admin(true);
        let checks = checks(Some(session), MemoryAuthorizationStore::new());
        assert!(checks.ensure_tenant_admin().await.is_ok());
    }

    #[tokio::test]
    async fn test_teacher_with_specific_permission() {
        let store = MemoryAuthorizationStore::new().grant_role(Role::Teacher, "domains", "assign");
        let checks = checks(Some(member(Role::Teacher)), store);

        assert!(checks.ensure_can_manage_domains().await.is_ok());
        let err = checks.ensure_can_manage_users().await.unwrap_err();
        assert!(err.is_denied());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_denial() {
        let store = MemoryAuthorizationStore::new();
        store.set_failure(Some("offline"));
        let checks = checks(Some(member(Role::Student)), store);

        let err = checks.ensure_tenant_admin().await.unwrap_err();
        assert!(!err.is_denied());
    }

    #[tokio::test]
    async fn test_no_session() {
        let checks = checks(None, MemoryAuthorizationStore::new());
        let err = checks.ensure_tenant_admin().await.unwrap_err();
        assert!(err.is_denied());
    }
}
