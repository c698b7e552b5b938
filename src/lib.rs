//! Tenant Gate
//!
//! Access control for a multi-tenant learning platform: role and permission
//! resolution with caching, route protection, and audit logging.
//!
//! ## Features
//!
//! - **Role hierarchy** `platform_admin > tenant_admin > teacher > student`
//!   with one canonical `inherits_from` comparison
//! - **Permission resolver** with single and batched checks, per-tenant
//!   caching and atomic cache invalidation on permission updates
//! - **Route guard** state machine with a reactive, last-one-wins driver
//! - **Audit trail** written to the hosted `audit_logs` table
//!
//! ## Example Configuration
//!
//! ```toml
//! [store]
//! url = "https://project.supabase.co"
//! # key from SUPABASE_SERVICE_ROLE_KEY env var
//!
//! [cache]
//! ttl_secs = 300
//!
//! [guard]
//! login_path = "/login"
//! enable_audit = true
//! ```

pub mod access_control;
pub mod audit;
pub mod config;
pub mod error;
pub mod guard;
pub mod session;
pub mod store;
pub mod util;

// Re-export main types
pub use access_control::{PermissionResolver, Role, TenantAdminChecks};
pub use config::{AppConfig, load_config};
pub use error::{AppError, Result};
pub use guard::{GuardConfig, GuardDriver, RouteGuard};
pub use session::{Session, SessionStore};
