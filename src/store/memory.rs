//! In-process authorization store
//!
//! Holds role grants, per-subject overrides and the page table in memory.
//! Every operation is counted, and failures or latency can be injected, so
//! callers can assert exactly how often the store was consulted.

use crate::access_control::{
    AccessScope, PermissionRequirement, PermissionUpdate, Role, RouteTable,
};
use crate::error::{StoreError, StoreResult};
use crate::store::AuthorizationStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Number of calls per store operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub check_permission: usize,
    pub granted_permissions: usize,
    pub can_access_path: usize,
    pub accessible_paths: usize,
    pub all_paths: usize,
    pub apply_updates: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.check_permission
            + self.granted_permissions
            + self.can_access_path
            + self.accessible_paths
            + self.all_paths
            + self.apply_updates
    }
}

#[derive(Default)]
struct Counters {
    check_permission: AtomicUsize,
    granted_permissions: AtomicUsize,
    can_access_path: AtomicUsize,
    accessible_paths: AtomicUsize,
    all_paths: AtomicUsize,
    apply_updates: AtomicUsize,
}

type SubjectKey = (String, Option<String>);

#[derive(Default)]
struct Tables {
    role_permissions: HashMap<Role, HashSet<PermissionRequirement>>,
    /// Explicit grant (true) or revoke (false), overriding role grants
    subject_permissions: HashMap<SubjectKey, HashMap<PermissionRequirement, bool>>,
    /// Page path → roles with an active page permission
    pages: Vec<(String, HashSet<Role>)>,
}

#[derive(Default)]
struct Faults {
    failure: Option<String>,
    latency: Option<Duration>,
}

/// Authorization store kept entirely in memory
#[derive(Default)]
pub struct MemoryAuthorizationStore {
    tables: RwLock<Tables>,
    counters: Counters,
    faults: Mutex<Faults>,
}

impl MemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_tables(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Grant `resource:action` to every holder of `role`
    pub fn grant_role(self, role: Role, resource: &str, action: &str) -> Self {
        self.write_tables()
            .role_permissions
            .entry(role)
            .or_default()
            .insert(PermissionRequirement::new(resource, action));
        self
    }

    /// Register a page path and the roles allowed on it
    pub fn page(self, path: &str, roles: &[Role]) -> Self {
        self.write_tables()
            .pages
            .push((path.to_string(), roles.iter().copied().collect()));
        self
    }

    /// Make every operation fail with an HTTP 503-style error until cleared
    pub fn set_failure(&self, message: Option<&str>) {
        self.lock_faults().failure = message.map(String::from);
    }

    /// Delay every operation by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock_faults().latency = latency;
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            check_permission: self.counters.check_permission.load(Ordering::SeqCst),
            granted_permissions: self.counters.granted_permissions.load(Ordering::SeqCst),
            can_access_path: self.counters.can_access_path.load(Ordering::SeqCst),
            accessible_paths: self.counters.accessible_paths.load(Ordering::SeqCst),
            all_paths: self.counters.all_paths.load(Ordering::SeqCst),
            apply_updates: self.counters.apply_updates.load(Ordering::SeqCst),
        }
    }

    /// Count the call, then apply injected latency and failure
    async fn enter(&self, counter: &AtomicUsize) -> StoreResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        let (latency, failure) = {
            let faults = self.lock_faults();
            (faults.latency, faults.failure.clone())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(message) => Err(StoreError::Api {
                status: 503,
                message,
            }),
            None => Ok(()),
        }
    }

    fn holds(tables: &Tables, scope: &AccessScope, requirement: &PermissionRequirement) -> bool {
        let key = (scope.subject_id.clone(), scope.tenant_id.clone());
        if let Some(granted) = tables
            .subject_permissions
            .get(&key)
            .and_then(|grants| grants.get(requirement))
        {
            return *granted;
        }
        scope.role.is_some_and(|role| {
            tables
                .role_permissions
                .get(&role)
                .is_some_and(|grants| grants.contains(requirement))
        })
    }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn check_permission(
        &self,
        scope: &AccessScope,
        requirement: &PermissionRequirement,
    ) -> StoreResult<bool> {
        self.enter(&self.counters.check_permission).await?;
        Ok(Self::holds(&self.read_tables(), scope, requirement))
    }

    async fn granted_permissions(
        &self,
        scope: &AccessScope,
        requirements: &[PermissionRequirement],
    ) -> StoreResult<HashSet<PermissionRequirement>> {
        self.enter(&self.counters.granted_permissions).await?;
        let tables = self.read_tables();
        Ok(requirements
            .iter()
            .filter(|req| Self::holds(&tables, scope, req))
            .cloned()
            .collect())
    }

    async fn can_access_path(&self, scope: &AccessScope, path: &str) -> StoreResult<bool> {
        self.enter(&self.counters.can_access_path).await?;
        let tables = self.read_tables();
        let paths: Vec<&str> = tables.pages.iter().map(|(p, _)| p.as_str()).collect();
        let table =
            RouteTable::new(&paths).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        let Some(matched) = table.find_match(path) else {
            return Ok(false);
        };
        Ok(scope.role.is_some_and(|role| {
            tables
                .pages
                .iter()
                .any(|(p, roles)| p == matched && roles.contains(&role))
        }))
    }

    async fn accessible_paths(&self, scope: &AccessScope) -> StoreResult<Vec<String>> {
        self.enter(&self.counters.accessible_paths).await?;
        let Some(role) = scope.role else {
            return Ok(Vec::new());
        };
        Ok(self
            .read_tables()
            .pages
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn all_paths(&self) -> StoreResult<Vec<String>> {
        self.enter(&self.counters.all_paths).await?;
        Ok(self
            .read_tables()
            .pages
            .iter()
            .map(|(path, _)| path.clone())
            .collect())
    }

    async fn apply_updates(
        &self,
        tenant_id: Option<&str>,
        updates: &[PermissionUpdate],
    ) -> StoreResult<()> {
        self.enter(&self.counters.apply_updates).await?;
        let mut tables = self.write_tables();
        for update in updates {
            tables
                .subject_permissions
                .entry((update.subject_id.clone(), tenant_id.map(String::from)))
                .or_default()
                .insert(update.requirement(), update.granted);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(role: Option<Role>) -> AccessScope {
        AccessScope {
            subject_id: "u-1".to_string(),
            tenant_id: Some("t-1".to_string()),
            role,
        }
    }

    #[tokio::test]
    async fn test_role_grants() {
        let store = MemoryAuthorizationStore::new().grant_role(Role::Teacher, "concepts", "update");
        let req = PermissionRequirement::new("concepts", "update");

        assert!(store.check_permission(&scope(Some(Role::Teacher)), &req).await.unwrap());
        assert!(!store.check_permission(&scope(Some(Role::Student)), &req).await.unwrap());
        assert!(!store.check_permission(&scope(None), &req).await.unwrap());
        assert_eq!(store.calls().check_permission, 3);
    }

    #[tokio::test]
    async fn test_subject_override_beats_role() {
        let store = MemoryAuthorizationStore::new().grant_role(Role::Teacher, "reports", "read");
        let req = PermissionRequirement::new("reports", "read");
        store
            .apply_updates(Some("t-1"), &[PermissionUpdate::revoke("u-1", "reports", "read")])
            .await
            .unwrap();

        assert!(!store.check_permission(&scope(Some(Role::Teacher)), &req).await.unwrap());
    }

    #[tokio::test]
    async fn test_pages() {
        let store = MemoryAuthorizationStore::new()
            .page("/teacher/classes", &[Role::Teacher])
            .page("/domains/:slug", &[Role::Teacher, Role::Student]);

        let teacher = scope(Some(Role::Teacher));
        let student = scope(Some(Role::Student));
        assert!(store.can_access_path(&teacher, "/teacher/classes").await.unwrap());
        assert!(!store.can_access_path(&student, "/teacher/classes").await.unwrap());
        assert!(store.can_access_path(&student, "/domains/algebra").await.unwrap());
        assert!(!store.can_access_path(&teacher, "/nowhere").await.unwrap());

        assert_eq!(store.accessible_paths(&student).await.unwrap(), vec!["/domains/:slug"]);
        assert_eq!(store.all_paths().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure_is_counted() {
        let store = MemoryAuthorizationStore::new();
        store.set_failure(Some("backend down"));
        let err = store
            .can_access_path(&scope(Some(Role::Student)), "/")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Api { status: 503, .. }));
        assert_eq!(store.calls().can_access_path, 1);

        store.set_failure(None);
        assert!(store.all_paths().await.is_ok());
        assert_eq!(store.calls().total(), 2);
    }
}
