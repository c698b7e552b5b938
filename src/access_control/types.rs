//! Access control types
//!
//! Core value types shared by the resolver, the store and the route guard.

use crate::access_control::role::Role;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conventional resource names
pub mod resources {
    pub const USERS: &str = "users";
    pub const DOMAINS: &str = "domains";
    pub const CONCEPTS: &str = "concepts";
    pub const LEARNING_GOALS: &str = "learning_goals";
    pub const TENANTS: &str = "tenants";
    pub const REPORTS: &str = "reports";
}

/// Conventional action names
pub mod actions {
    pub const CREATE: &str = "create";
    pub const READ: &str = "read";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const INVITE: &str = "invite";
    pub const ASSIGN: &str = "assign";
    pub const PUBLISH: &str = "publish";
}

/// A (resource, action) pair.
///
/// The vocabulary is open; see [`resources`] and [`actions`] for the
/// conventional names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionRequirement {
    pub resource: String,
    pub action: String,
}

impl PermissionRequirement {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Parse the `resource:action` notation used on the command line
    pub fn parse(s: &str) -> Option<Self> {
        let (resource, action) = s.split_once(':')?;
        if resource.is_empty() || action.is_empty() || action.contains(':') {
            return None;
        }
        Some(Self::new(resource, action))
    }
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Who is asking, in which tenant, holding which role there.
///
/// Built from the active session for every store call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessScope {
    pub subject_id: String,
    pub tenant_id: Option<String>,
    pub role: Option<Role>,
}

/// Result of evaluating a session against one requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccessDecision {
    pub fn granted() -> Self {
        Self {
            granted: true,
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    pub fn is_denied(&self) -> bool {
        !self.granted
    }
}

/// One grant or revoke for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionUpdate {
    pub subject_id: String,
    pub resource: String,
    pub action: String,
    pub granted: bool,
}

impl PermissionUpdate {
    pub fn grant(
        subject_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            resource: resource.into(),
            action: action.into(),
            granted: true,
        }
    }

    pub fn revoke(
        subject_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            granted: false,
            ..Self::grant(subject_id, resource, action)
        }
    }

    pub fn requirement(&self) -> PermissionRequirement {
        PermissionRequirement::new(&self.resource, &self.action)
    }
}
