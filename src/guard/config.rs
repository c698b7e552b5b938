//! Per-route guard configuration

use crate::access_control::{PermissionRequirement, Role};
use crate::config::GuardDefaults;
use std::time::Duration;

/// What a protected route requires, and how the guard reacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub required_role: Option<Role>,
    pub required_permission: Option<PermissionRequirement>,
    /// Skip every check
    pub is_public: bool,
    /// Show the platform-admin badge when a platform admin is let through
    pub show_admin_badge: bool,
    pub login_path: String,
    pub unauthorized_path: String,
    /// Escape route offered by the error view
    pub home_path: String,
    /// Fall back to the page table when no role or permission is declared
    pub check_path: bool,
    pub enable_audit: bool,
    /// Caller renders its own loading view
    pub custom_loading: bool,
    /// Caller renders its own unauthorized view instead of redirecting
    pub custom_unauthorized: bool,
    pub evaluation_timeout: Duration,
}

impl GuardConfig {
    pub fn from_defaults(defaults: &GuardDefaults) -> Self {
        Self {
            required_role: None,
            required_permission: None,
            is_public: false,
            show_admin_badge: false,
            login_path: defaults.login_path.clone(),
            unauthorized_path: defaults.unauthorized_path.clone(),
            home_path: defaults.home_path.clone(),
            check_path: defaults.check_path,
            enable_audit: defaults.enable_audit,
            custom_loading: false,
            custom_unauthorized: false,
            evaluation_timeout: Duration::from_secs(defaults.evaluation_timeout_secs),
        }
    }

    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    pub fn require_role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn require_permission(mut self, resource: &str, action: &str) -> Self {
        self.required_permission = Some(PermissionRequirement::new(resource, action));
        self
    }

    pub fn with_admin_badge(mut self) -> Self {
        self.show_admin_badge = true;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn with_unauthorized_path(mut self, path: impl Into<String>) -> Self {
        self.unauthorized_path = path.into();
        self
    }

    pub fn with_path_check(mut self, enabled: bool) -> Self {
        self.check_path = enabled;
        self
    }

    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.enable_audit = enabled;
        self
    }

    pub fn with_custom_loading(mut self) -> Self {
        self.custom_loading = true;
        self
    }

    pub fn with_custom_unauthorized(mut self) -> Self {
        self.custom_unauthorized = true;
        self
    }

    pub fn with_evaluation_timeout(mut self, timeout: Duration) -> Self {
        self.evaluation_timeout = timeout;
        self
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::from_defaults(&GuardDefaults::default())
    }
}
