//! Route guard decisions
//!
//! For a non-public route the rules apply in this order:
//!
//! 1. No session: unauthenticated, redirect to login keeping the location
//! 2. Platform admin: granted, nothing else is checked or audited
//! 3. Declared role (exact or inherited) AND declared permission; the page
//!    table is consulted only when neither is declared
//! 4. Any resolution failure or timeout: error state, never a denial

use crate::access_control::{PermissionRequirement, Role};
use crate::audit::kinds;
use crate::error::ResolutionError;
use crate::guard::checker::SharedAccessChecker;
use crate::guard::config::GuardConfig;
use crate::guard::state::{GuardState, GuardView, Location, RedirectState};
use crate::session::{Session, SharedSessionProvider};
use crate::util::millis;
use tracing::{debug, warn};

/// Resource type recorded for route decisions
const ROUTE_RESOURCE: &str = "route";

#[derive(Clone)]
pub struct RouteGuard {
    sessions: SharedSessionProvider,
    checker: SharedAccessChecker,
    config: GuardConfig,
}

impl RouteGuard {
    pub fn new(
        sessions: SharedSessionProvider,
        checker: SharedAccessChecker,
        config: GuardConfig,
    ) -> Self {
        Self {
            sessions,
            checker,
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Replace the declared requirements
    pub fn set_requirements(
        &mut self,
        role: Option<Role>,
        permission: Option<PermissionRequirement>,
    ) {
        self.config.required_role = role;
        self.config.required_permission = permission;
    }

    /// Evaluate `location` to a state. Returns `CheckingAuth` while the
    /// session provider is still loading; every other result is terminal.
    pub async fn check(&self, location: &Location) -> GuardState {
        let session = self.sessions.current();

        if self.config.is_public {
            return GuardState::AccessGranted {
                admin_badge: self.admin_badge(session.as_deref()),
                bypass: true,
            };
        }
        if self.sessions.is_loading() {
            return GuardState::CheckingAuth;
        }
        let Some(session) = session else {
            debug!(path = %location.pathname, "No session, redirecting to login");
            return GuardState::Unauthenticated;
        };
        if session.is_platform_admin {
            debug!(
                subject = %session.subject_id,
                path = %location.pathname,
                "Platform admin bypass"
            );
            return GuardState::AccessGranted {
                admin_badge: self.config.show_admin_badge,
                bypass: true,
            };
        }

        let timeout = self.config.evaluation_timeout;
        let outcome = tokio::time::timeout(timeout, self.evaluate(&session, &location.pathname))
            .await
            .unwrap_or(Err(ResolutionError::Timeout {
                timeout_ms: millis(timeout),
            }));

        match outcome {
            Ok(true) => GuardState::AccessGranted {
                admin_badge: false,
                bypass: false,
            },
            Ok(false) => {
                debug!(subject = %session.subject_id, path = %location.pathname, "Route denied");
                GuardState::AccessDenied
            }
            Err(e) => {
                warn!(error = %e, path = %location.pathname, "Route evaluation failed");
                GuardState::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn admin_badge(&self, session: Option<&Session>) -> bool {
        self.config.show_admin_badge && session.is_some_and(|s| s.is_platform_admin)
    }

    /// Every declared requirement is evaluated and ANDed together
    async fn evaluate(&self, session: &Session, path: &str) -> Result<bool, ResolutionError> {
        let mut has_access = true;

        if let Some(required) = self.config.required_role {
            let role_match =
                session.role() == Some(required) || self.checker.has_role_or_higher(required);
            has_access &= role_match;
        }

        if let Some(permission) = &self.config.required_permission {
            let permitted = self
                .checker
                .check_access(&permission.resource, &permission.action)
                .await?;
            has_access &= permitted;
        }

        if self.config.required_role.is_none()
            && self.config.required_permission.is_none()
            && self.config.check_path
        {
            has_access &= self.checker.can_access_route(path).await?;
        }

        Ok(has_access)
    }

    /// Map a state to what the caller renders
    pub fn view(&self, state: &GuardState, location: &Location) -> GuardView {
        match state {
            GuardState::Idle | GuardState::CheckingAuth | GuardState::CheckingAccess => {
                GuardView::Loading {
                    custom: self.config.custom_loading,
                }
            }
            GuardState::Unauthenticated => GuardView::Redirect {
                to: self.config.login_path.clone(),
                replace: true,
                state: Some(RedirectState {
                    from: location.clone(),
                }),
            },
            GuardState::AccessGranted { admin_badge, .. } => GuardView::Render {
                admin_badge: *admin_badge,
            },
            GuardState::AccessDenied if self.config.custom_unauthorized => {
                GuardView::CustomUnauthorized
            }
            GuardState::AccessDenied => GuardView::Redirect {
                to: self.config.unauthorized_path.clone(),
                replace: true,
                state: None,
            },
            GuardState::Error { message } => GuardView::Error {
                message: message.clone(),
                retry: true,
                escape_path: self.config.home_path.clone(),
            },
        }
    }

    /// One audit append per evaluated grant or deny, when enabled.
    /// Queued on the checker, never awaited.
    pub fn record(&self, state: &GuardState, location: &Location) {
        if !self.config.enable_audit {
            return;
        }
        let granted = match state {
            GuardState::AccessGranted { bypass: false, .. } => true,
            GuardState::AccessDenied => false,
            _ => return,
        };
        let kind = if granted {
            kinds::ACCESS
        } else {
            kinds::ACCESS_DENIED
        };
        self.checker
            .log_access(kind, ROUTE_RESOURCE, Some(&location.pathname), granted);
    }

    /// Check, audit and render in one step
    pub async fn resolve(&self, location: &Location) -> GuardView {
        let state = self.check(location).await;
        let view = self.view(&state, location);
        self.record(&state, location);
        view
    }
}
