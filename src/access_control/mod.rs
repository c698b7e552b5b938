//! Access control core
//!
//! Role- and permission-based decisions for a multi-tenant platform.
//!
//! ## Decision Model
//!
//! Roles form a total order, each satisfying the requirements of the roles
//! below it:
//!
//! ```text
//! platform_admin > tenant_admin > teacher > student
//! ```
//!
//! A subject holds one role per tenant; the role in the active tenant is the
//! one that counts. Fine-grained permissions are `resource:action` pairs
//! granted per role, with per-subject grants and revokes on top. Routes are
//! gated by a page table whose paths may contain `:param` segments.
//!
//! Platform admins bypass every check. Everything else goes through the
//! [`PermissionResolver`], which caches decisions per subject and tenant
//! and consults the backing store on a miss.

pub mod cache;
pub mod patterns;
pub mod resolver;
pub mod role;
pub mod tenant_admin;
pub mod types;

pub use cache::{CacheKey, CacheTarget, PermissionCache};
pub use patterns::{RoutePattern, RouteTable};
pub use resolver::PermissionResolver;
pub use role::Role;
pub use tenant_admin::TenantAdminChecks;
pub use types::{
    AccessDecision, AccessScope, PermissionRequirement, PermissionUpdate, actions, resources,
};
