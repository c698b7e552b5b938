//! Session provider seam
//!
//! The access-control core only consumes sessions. [`SessionStore`] is the
//! in-process provider: a reactive cell observers can subscribe to, used by
//! the route-guard driver to re-evaluate on sign-in, tenant switch and
//! sign-out.

use crate::error::SessionError;
use crate::session::types::Session;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Source of the current authenticated identity
pub trait SessionProvider: Send + Sync {
    /// The active session, if any
    fn current(&self) -> Option<Arc<Session>>;

    /// True while the provider is still establishing the session
    fn is_loading(&self) -> bool;
}

/// Shared handle to a session provider
pub type SharedSessionProvider = Arc<dyn SessionProvider>;

/// Value published to subscribers on every session change
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    pub session: Option<Arc<Session>>,
    pub loading: bool,
}

/// Reactive, in-process session provider
pub struct SessionStore {
    tx: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    /// A store with no session that is not loading
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self { tx }
    }

    /// A store that starts out loading
    pub fn loading() -> Self {
        let store = Self::new();
        store.begin_loading();
        store
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn begin_loading(&self) {
        self.tx.send_modify(|snapshot| snapshot.loading = true);
    }

    pub fn sign_in(&self, session: Session) {
        info!(subject = %session.subject_id, tenant = ?session.current_tenant, "Session established");
        self.tx.send_replace(SessionSnapshot {
            session: Some(Arc::new(session)),
            loading: false,
        });
    }

    /// Replace the session with one whose active tenant is `tenant_id`
    pub fn switch_tenant(&self, tenant_id: &str) -> Result<(), SessionError> {
        let current = self.current().ok_or(SessionError::NotSignedIn)?;
        let switched = current
            .switched_to(tenant_id)
            .ok_or_else(|| SessionError::UnknownTenant(tenant_id.to_string()))?;
        debug!(subject = %switched.subject_id, tenant = tenant_id, "Switching tenant");
        self.tx.send_replace(SessionSnapshot {
            session: Some(Arc::new(switched)),
            loading: false,
        });
        Ok(())
    }

    pub fn sign_out(&self) {
        info!("Session ended");
        self.tx.send_replace(SessionSnapshot::default());
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for SessionStore {
    fn current(&self) -> Option<Arc<Session>> {
        self.tx.borrow().session.clone()
    }

    fn is_loading(&self) -> bool {
        self.tx.borrow().loading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_control::Role;
    use crate::session::TenantMembership;

    fn session() -> Session {
        Session::new("u-1", "u@example.edu")
            .with_membership(TenantMembership::new("a", Role::Student))
            .with_membership(TenantMembership::new("b", Role::Teacher))
    }

    #[test]
    fn test_lifecycle() {
        let store = SessionStore::loading();
        assert!(store.is_loading());
        assert!(store.current().is_none());

        store.sign_in(session());
        assert!(!store.is_loading());
        assert_eq!(store.current().unwrap().role(), Some(Role::Student));

        store.switch_tenant("b").unwrap();
        assert_eq!(store.current().unwrap().role(), Some(Role::Teacher));

        store.sign_out();
        assert!(store.current().is_none());
    }

    #[test]
    fn test_switch_errors() {
        let store = SessionStore::new();
        assert_eq!(store.switch_tenant("a"), Err(SessionError::NotSignedIn));

        store.sign_in(session());
        assert_eq!(
            store.switch_tenant("zzz"),
            Err(SessionError::UnknownTenant("zzz".to_string()))
        );
        assert_eq!(store.current().unwrap().current_tenant.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_subscribers_see_replacement() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        let before = store.current();

        store.sign_in(session());
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        assert!(snapshot.session.is_some());
        assert!(before.is_none());
    }
}
