//! Role hierarchy
//!
//! Roles form a strict total order; a higher role satisfies any requirement
//! for a lower one:
//!
//! ```text
//! platform_admin ⊇ tenant_admin ⊇ teacher ⊇ student
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named position in the role order.
///
/// Variant order is the inheritance order (lowest first), so the derived
/// `Ord` is the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    TenantAdmin,
    PlatformAdmin,
}

impl Role {
    /// True iff `self` is `other` or a role that inherits from it
    pub fn inherits_from(self, other: Role) -> bool {
        self >= other
    }

    /// Hierarchy level as stored by the backend (lower is more privileged)
    pub const fn hierarchy_level(self) -> u8 {
        match self {
            Role::PlatformAdmin => 0,
            Role::TenantAdmin => 10,
            Role::Teacher => 20,
            Role::Student => 30,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::PlatformAdmin => "platform_admin",
            Role::TenantAdmin => "tenant_admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Try to parse a role from its stored name
    pub fn try_parse(s: &str) -> Option<Self> {
        match s {
            "platform_admin" => Some(Role::PlatformAdmin),
            "tenant_admin" => Some(Role::TenantAdmin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        }
    }

    /// All roles, most privileged first
    pub fn all() -> &'static [Role] {
        &[
            Role::PlatformAdmin,
            Role::TenantAdmin,
            Role::Teacher,
            Role::Student,
        ]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::try_parse(s).ok_or_else(|| format!("unknown role '{}'", s))
    }
}
