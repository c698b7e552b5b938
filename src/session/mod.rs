//! Session module
//!
//! The authenticated identity consumed by the resolver and the route guard,
//! and the provider seam they read it through.

pub mod provider;
pub mod types;

pub use provider::{SessionProvider, SessionSnapshot, SessionStore, SharedSessionProvider};
pub use types::{Session, TenantMembership};
