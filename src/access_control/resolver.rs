//! Permission resolver
//!
//! Decides whether the active session may act on a resource or open a route.
//! Resolution order for every check:
//!
//! 1. No session: denied
//! 2. Platform admin: granted, without touching cache or store
//! 3. No role in the active tenant: denied, without touching the store
//! 4. Cache hit: cached answer
//! 5. Store lookup (bounded by a timeout), written back to the cache
//!
//! Store failures and timeouts surface as [`ResolutionError`], never as a
//! denial.

use crate::access_control::cache::{CacheKey, PermissionCache};
use crate::access_control::role::Role;
use crate::access_control::types::{AccessDecision, PermissionRequirement, PermissionUpdate};
use crate::audit::{AccessMetrics, AuditRecord, Outcome, SharedAuditSink, kinds};
use crate::config::AppConfig;
use crate::error::{MutationError, ResolutionError, StoreError, StoreResult};
use crate::session::{Session, SharedSessionProvider};
use crate::store::SharedAuthorizationStore;
use crate::util::millis;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_AUDIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Actor recorded when no session is present
const ANONYMOUS_ACTOR: &str = "anonymous";

/// Explicitly constructed, shareable permission service.
///
/// Wrap in an `Arc` and hand the same instance to the route guard and to
/// admin tooling so they share one cache.
pub struct PermissionResolver {
    sessions: SharedSessionProvider,
    store: SharedAuthorizationStore,
    audit: SharedAuditSink,
    cache: PermissionCache,
    metrics: Arc<AccessMetrics>,
    store_timeout: Duration,
    audit_timeout: Duration,
    check_auditing: AtomicBool,
    /// In-flight audit appends
    audit_tasks: TaskTracker,
}

impl PermissionResolver {
    pub fn new(
        sessions: SharedSessionProvider,
        store: SharedAuthorizationStore,
        audit: SharedAuditSink,
    ) -> Self {
        Self {
            sessions,
            store,
            audit,
            cache: PermissionCache::new(DEFAULT_CACHE_TTL),
            metrics: Arc::new(AccessMetrics::new()),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            audit_timeout: DEFAULT_AUDIT_TIMEOUT,
            check_auditing: AtomicBool::new(false),
            audit_tasks: TaskTracker::new(),
        }
    }

    /// Build with cache and timeouts taken from configuration
    pub fn from_config(
        config: &AppConfig,
        sessions: SharedSessionProvider,
        store: SharedAuthorizationStore,
        audit: SharedAuditSink,
    ) -> Self {
        let cache = if config.cache.enabled {
            PermissionCache::new(config.cache.ttl())
        } else {
            PermissionCache::disabled()
        };
        Self::new(sessions, store, audit)
            .with_cache(cache)
            .with_store_timeout(config.store.timeout())
            .with_audit_timeout(Duration::from_secs(config.audit.timeout_secs))
    }

    pub fn with_cache(mut self, cache: PermissionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AccessMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_audit_timeout(mut self, timeout: Duration) -> Self {
        self.audit_timeout = timeout;
        self
    }

    /// Append a `permission_check` record for every `check_access`
    pub fn set_check_auditing(&self, enabled: bool) {
        self.check_auditing.store(enabled, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> Arc<AccessMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.sessions.current()
    }

    /// Run a store call under the store timeout
    async fn bounded<T, E, F>(&self, timeout_error: fn(u64) -> E, call: F) -> Result<T, E>
    where
        F: Future<Output = StoreResult<T>>,
        E: From<StoreError>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(E::from),
            Err(_) => {
                warn!(timeout_ms = millis(self.store_timeout), "Store call timed out");
                Err(timeout_error(millis(self.store_timeout)))
            }
        }
    }

    /// Hand `record` to a background task; the caller never waits on the sink
    fn append_audit(&self, record: AuditRecord) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(kind = %record.action_kind, "No async runtime, audit record dropped");
            return;
        };
        let sink = Arc::clone(&self.audit);
        let timeout = self.audit_timeout;
        self.audit_tasks.spawn_on(
            async move {
                match tokio::time::timeout(timeout, sink.append(&record)).await {
                    Ok(Ok(())) => trace!(kind = %record.action_kind, "Audit record written"),
                    Ok(Err(e)) => {
                        warn!(error = %e, kind = %record.action_kind, "Audit write failed")
                    }
                    Err(_) => warn!(
                        timeout_ms = millis(timeout),
                        kind = %record.action_kind,
                        "Audit write timed out"
                    ),
                }
            },
            &runtime,
        );
    }

    /// Wait until every audit append queued so far has finished or timed out
    pub async fn flush_audit(&self) {
        self.audit_tasks.close();
        self.audit_tasks.wait().await;
        self.audit_tasks.reopen();
    }

    /// Whether the active session may perform `action` on `resource`
    pub async fn check_access(
        &self,
        resource: &str,
        action: &str,
    ) -> Result<bool, ResolutionError> {
        Ok(self.check_access_detailed(resource, action).await?.granted)
    }

    /// Like [`check_access`](Self::check_access), with the reason for a denial
    pub async fn check_access_detailed(
        &self,
        resource: &str,
        action: &str,
    ) -> Result<AccessDecision, ResolutionError> {
        let requirement = PermissionRequirement::new(resource, action);
        let target = requirement.to_string();

        let Some(session) = self.sessions.current() else {
            debug!(requirement = %target, "No session, denying");
            self.metrics
                .record_decision(ANONYMOUS_ACTOR, resource, &target, Outcome::Denied, false);
            return Ok(AccessDecision::denied("no active session"));
        };

        if session.is_platform_admin {
            debug!(subject = %session.subject_id, requirement = %target, "Platform admin bypass");
            self.metrics
                .record_decision(&session.subject_id, resource, &target, Outcome::Granted, false);
            self.audit_check(&session, &requirement, true);
            return Ok(AccessDecision::granted());
        }

        let scope = session.scope();
        let Some(role) = scope.role else {
            debug!(subject = %scope.subject_id, requirement = %target, "No role in active tenant");
            self.metrics
                .record_decision(&scope.subject_id, resource, &target, Outcome::Denied, false);
            self.audit_check(&session, &requirement, false);
            return Ok(AccessDecision::denied("no role in the active tenant"));
        };

        let key = CacheKey::permission(&scope, &requirement);
        let (granted, cached) = match self.cache.get(&key) {
            Some(granted) => {
                trace!(subject = %scope.subject_id, requirement = %target, "Cache hit");
                self.metrics.record_cache_hit();
                (granted, true)
            }
            None => {
                trace!(subject = %scope.subject_id, requirement = %target, "Cache miss");
                self.metrics.record_cache_miss();
                let ticket = self.cache.ticket();
                let granted = self
                    .bounded(
                        |timeout_ms| ResolutionError::Timeout { timeout_ms },
                        self.store.check_permission(&scope, &requirement),
                    )
                    .await
                    .inspect_err(|e| {
                        warn!(error = %e, requirement = %target, "Permission check failed");
                        self.metrics.record_decision(
                            &scope.subject_id,
                            resource,
                            &target,
                            Outcome::Error,
                            false,
                        );
                    })?;
                self.cache.insert(ticket, key, granted);
                (granted, false)
            }
        };

        let outcome = if granted { Outcome::Granted } else { Outcome::Denied };
        self.metrics
            .record_decision(&scope.subject_id, resource, &target, outcome, cached);
        debug!(
            subject = %scope.subject_id,
            tenant = ?scope.tenant_id,
            resource,
            action,
            granted,
            cached,
            "Permission resolved"
        );
        self.audit_check(&session, &requirement, granted);

        Ok(if granted {
            AccessDecision::granted()
        } else {
            AccessDecision::denied(format!("role '{}' does not hold '{}'", role, requirement))
        })
    }

    fn audit_check(
        &self,
        session: &Session,
        requirement: &PermissionRequirement,
        granted: bool,
    ) {
        if !self.check_auditing.load(Ordering::Relaxed) {
            return;
        }
        let record = AuditRecord::new(
            &session.subject_id,
            kinds::PERMISSION_CHECK,
            &requirement.resource,
            granted,
        )
        .with_tenant(session.current_tenant.clone())
        .with_resource_action(requirement.to_string());
        self.append_audit(record);
    }

    /// Resolve a batch in at most one store round trip.
    ///
    /// The result has exactly one entry per distinct input requirement; if
    /// the store call fails, no map is returned.
    pub async fn check_multiple_permissions(
        &self,
        requirements: &[PermissionRequirement],
    ) -> Result<HashMap<PermissionRequirement, bool>, ResolutionError> {
        let all = |granted: bool| {
            requirements
                .iter()
                .map(|req| (req.clone(), granted))
                .collect::<HashMap<_, _>>()
        };

        let Some(session) = self.sessions.current() else {
            return Ok(all(false));
        };
        if session.is_platform_admin {
            return Ok(all(true));
        }
        let scope = session.scope();
        if scope.role.is_none() {
            return Ok(all(false));
        }

        let mut decisions = HashMap::with_capacity(requirements.len());
        let mut misses = Vec::new();
        let mut seen = HashSet::new();
        for req in requirements {
            if !seen.insert(req) {
                continue;
            }
            match self.cache.get(&CacheKey::permission(&scope, req)) {
                Some(granted) => {
                    self.metrics.record_cache_hit();
                    decisions.insert(req.clone(), granted);
                }
                None => {
                    self.metrics.record_cache_miss();
                    misses.push(req.clone());
                }
            }
        }

        if !misses.is_empty() {
            let ticket = self.cache.ticket();
            let held = self
                .bounded(
                    |timeout_ms| ResolutionError::Timeout { timeout_ms },
                    self.store.granted_permissions(&scope, &misses),
                )
                .await
                .inspect_err(|e| warn!(error = %e, count = misses.len(), "Batch check failed"))?;

            let fresh: Vec<_> = misses
                .into_iter()
                .map(|req| {
                    let granted = held.contains(&req);
                    (req, granted)
                })
                .collect();
            self.cache.insert_many(
                ticket,
                fresh
                    .iter()
                    .map(|(req, granted)| (CacheKey::permission(&scope, req), *granted)),
            );
            decisions.extend(fresh);
        }

        debug!(
            subject = %scope.subject_id,
            requested = requirements.len(),
            granted = decisions.values().filter(|g| **g).count(),
            "Batch resolved"
        );
        Ok(decisions)
    }

    /// Session role equals `role` or outranks it. Never consults the store.
    pub fn has_role_or_higher(&self, role: Role) -> bool {
        self.sessions
            .current()
            .is_some_and(|session| session.has_role_or_higher(role))
    }

    pub fn is_platform_admin(&self) -> bool {
        self.sessions
            .current()
            .is_some_and(|session| session.is_platform_admin)
    }

    /// Path-table check for `path`, cached like permission checks
    pub async fn can_access_route(&self, path: &str) -> Result<bool, ResolutionError> {
        let Some(session) = self.sessions.current() else {
            return Ok(false);
        };
        if session.is_platform_admin {
            return Ok(true);
        }
        let scope = session.scope();
        if scope.role.is_none() {
            self.metrics
                .record_decision(&scope.subject_id, "route", path, Outcome::Denied, false);
            return Ok(false);
        }

        let key = CacheKey::route(&scope, path);
        if let Some(granted) = self.cache.get(&key) {
            trace!(subject = %scope.subject_id, path, "Route cache hit");
            self.metrics.record_cache_hit();
            let outcome = if granted { Outcome::Granted } else { Outcome::Denied };
            self.metrics
                .record_decision(&scope.subject_id, "route", path, outcome, true);
            return Ok(granted);
        }
        self.metrics.record_cache_miss();

        let ticket = self.cache.ticket();
        let granted = self
            .bounded(
                |timeout_ms| ResolutionError::Timeout { timeout_ms },
                self.store.can_access_path(&scope, path),
            )
            .await
            .inspect_err(|e| {
                warn!(error = %e, path, "Route check failed");
                self.metrics
                    .record_decision(&scope.subject_id, "route", path, Outcome::Error, false);
            })?;
        self.cache.insert(ticket, key, granted);

        let outcome = if granted { Outcome::Granted } else { Outcome::Denied };
        self.metrics
            .record_decision(&scope.subject_id, "route", path, outcome, false);
        debug!(subject = %scope.subject_id, path, granted, "Route resolved");
        Ok(granted)
    }

    /// Every page path for platform admins, else those active for the session's role
    pub async fn accessible_routes(&self) -> Result<Vec<String>, ResolutionError> {
        let Some(session) = self.sessions.current() else {
            return Ok(Vec::new());
        };
        let timeout_error = |timeout_ms: u64| ResolutionError::Timeout { timeout_ms };
        if session.is_platform_admin {
            return self.bounded(timeout_error, self.store.all_paths()).await;
        }
        let scope = session.scope();
        if scope.role.is_none() {
            return Ok(Vec::new());
        }
        self.bounded(timeout_error, self.store.accessible_paths(&scope))
            .await
    }

    /// Grant or revoke one permission for `subject_id` in the active tenant
    pub async fn update_permission(
        &self,
        subject_id: &str,
        resource: &str,
        action: &str,
        granted: bool,
    ) -> Result<(), MutationError> {
        let update = PermissionUpdate {
            subject_id: subject_id.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            granted,
        };
        self.bulk_update_permissions(&[update]).await
    }

    /// Apply every update or none.
    ///
    /// On success, cached decisions for each touched (resource, action) are
    /// dropped for all subjects in one step and one audit record is written
    /// per update. On failure the cache is left as it was.
    pub async fn bulk_update_permissions(
        &self,
        updates: &[PermissionUpdate],
    ) -> Result<(), MutationError> {
        if updates.is_empty() {
            return Err(MutationError::EmptyBatch);
        }
        let session = self.sessions.current();
        let tenant_id = session.as_ref().and_then(|s| s.current_tenant.clone());
        let actor = session
            .as_ref()
            .map_or(ANONYMOUS_ACTOR, |s| s.subject_id.as_str());

        self.bounded(
            |timeout_ms| MutationError::Timeout { timeout_ms },
            self.store.apply_updates(tenant_id.as_deref(), updates),
        )
        .await
        .inspect_err(|e| warn!(error = %e, count = updates.len(), "Permission update rejected"))?;

        let touched: HashSet<PermissionRequirement> =
            updates.iter().map(PermissionUpdate::requirement).collect();
        let dropped = self.cache.invalidate_requirements(&touched);
        info!(
            actor,
            tenant = ?tenant_id,
            updates = updates.len(),
            invalidated = dropped,
            "Permissions updated"
        );

        for update in updates {
            let record =
                AuditRecord::new(actor, kinds::PERMISSION_UPDATE, "permission", update.granted)
                    .with_tenant(tenant_id.clone())
                    .with_resource_action(update.requirement().to_string())
                    .with_target(Some(update.subject_id.clone()));
            self.append_audit(record);
        }
        Ok(())
    }

    /// Drop every cached decision
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("Permission cache cleared");
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Queue one audit record for an access decision already made and return
    /// immediately. Sink failures and timeouts are logged and swallowed.
    pub fn log_access(
        &self,
        action_kind: &str,
        resource_type: &str,
        target_path: Option<&str>,
        granted: bool,
    ) {
        let session = self.sessions.current();
        let actor = session
            .as_ref()
            .map_or(ANONYMOUS_ACTOR, |s| s.subject_id.as_str());
        let record = AuditRecord::new(actor, action_kind, resource_type, granted)
            .with_tenant(session.as_ref().and_then(|s| s.current_tenant.clone()))
            .with_target(target_path.map(String::from));
        self.append_audit(record);
    }
}
