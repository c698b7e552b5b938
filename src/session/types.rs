//! Session types
//!
//! A session is read-only for the duration of a check. Tenant switches
//! produce a new session value rather than mutating the current one.

use crate::access_control::{AccessScope, Role};
use serde::{Deserialize, Serialize};

/// One tenant the subject belongs to, with the role held there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_name: Option<String>,
    pub role: Role,
}

impl TenantMembership {
    pub fn new(tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            tenant_name: None,
            role,
        }
    }
}

/// The authenticated identity as supplied by the session provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: String,
    pub email: String,
    /// Memberships in the order the provider listed them
    #[serde(default)]
    pub tenants: Vec<TenantMembership>,
    /// Active tenant id, if any
    #[serde(default)]
    pub current_tenant: Option<String>,
    #[serde(default)]
    pub is_platform_admin: bool,
}

impl Session {
    pub fn new(subject_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            email: email.into(),
            tenants: Vec::new(),
            current_tenant: None,
            is_platform_admin: false,
        }
    }

    /// Add a membership; the first one added becomes the active tenant
    pub fn with_membership(mut self, membership: TenantMembership) -> Self {
        if self.current_tenant.is_none() {
            self.current_tenant = Some(membership.tenant_id.clone());
        }
        self.tenants.push(membership);
        self
    }

    pub fn with_platform_admin(mut self, is_platform_admin: bool) -> Self {
        self.is_platform_admin = is_platform_admin;
        self
    }

    pub fn membership(&self, tenant_id: &str) -> Option<&TenantMembership> {
        self.tenants.iter().find(|m| m.tenant_id == tenant_id)
    }

    /// Membership for the active tenant
    pub fn current_membership(&self) -> Option<&TenantMembership> {
        self.current_tenant
            .as_deref()
            .and_then(|tenant| self.membership(tenant))
    }

    /// Effective role: platform admin if flagged, otherwise the role held in
    /// the active tenant
    pub fn role(&self) -> Option<Role> {
        if self.is_platform_admin {
            return Some(Role::PlatformAdmin);
        }
        self.current_membership().map(|m| m.role)
    }

    pub fn has_role_or_higher(&self, role: Role) -> bool {
        self.role().is_some_and(|held| held.inherits_from(role))
    }

    pub fn is_tenant_admin(&self) -> bool {
        self.has_role_or_higher(Role::TenantAdmin)
    }

    pub fn is_teacher(&self) -> bool {
        self.has_role_or_higher(Role::Teacher)
    }

    pub fn is_student(&self) -> bool {
        self.has_role_or_higher(Role::Student)
    }

    /// Same identity, different active tenant
    pub fn switched_to(&self, tenant_id: &str) -> Option<Session> {
        self.membership(tenant_id)?;
        Some(Session {
            current_tenant: Some(tenant_id.to_string()),
            ..self.clone()
        })
    }

    pub fn scope(&self) -> AccessScope {
        AccessScope {
            subject_id: self.subject_id.clone(),
            tenant_id: self.current_tenant.clone(),
            role: self.role(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher_session() -> Session {
        Session::new("u-1", "t@example.edu")
            .with_membership(TenantMembership::new("school-a", Role::Teacher))
            .with_membership(TenantMembership::new("school-b", Role::TenantAdmin))
    }

    #[test]
    fn test_first_membership_is_active() {
        let session = teacher_session();
        assert_eq!(session.current_tenant.as_deref(), Some("school-a"));
        assert_eq!(session.role(), Some(Role::Teacher));
        assert!(session.is_teacher());
        assert!(session.is_student());
        assert!(!session.is_tenant_admin());
    }

    #[test]
    fn test_switch_changes_role() {
        let switched = teacher_session().switched_to("school-b").unwrap();
        assert_eq!(switched.role(), Some(Role::TenantAdmin));
        assert!(switched.is_tenant_admin());
        assert!(teacher_session().switched_to("school-z").is_none());
    }

    #[test]
    fn test_platform_admin_flag_wins() {
        let session = teacher_session().with_platform_admin(true);
        assert_eq!(session.role(), Some(Role::PlatformAdmin));
        assert!(session.has_role_or_higher(Role::TenantAdmin));
    }

    #[test]
    fn test_no_tenant_no_role() {
        let session = Session::new("u-2", "x@example.edu");
        assert_eq!(session.role(), None);
        assert!(!session.is_student());
        assert_eq!(session.scope().tenant_id, None);
    }

    #[test]
    fn test_deserialize_provider_shape() {
        let json = r#"{
            "subject_id": "u-3",
            "email": "a@example.edu",
            "tenants": [{ "tenant_id": "t", "role": "student" }],
            "current_tenant": "t"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert!(!session.is_platform_admin);
        assert_eq!(session.role(), Some(Role::Student));
    }
}
