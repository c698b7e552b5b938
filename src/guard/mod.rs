//! Route protection
//!
//! [`RouteGuard`] turns the session and a [`GuardConfig`] into a
//! [`GuardState`], and a state into the [`GuardView`] the caller renders.
//! [`GuardDriver`] runs it as a reactive loop.

mod checker;
mod config;
pub mod driver;
mod route_guard;
mod state;

pub use checker::{AccessChecker, SharedAccessChecker};
pub use config::GuardConfig;
pub use driver::{GuardDriver, GuardEvent, GuardHandle};
pub use route_guard::RouteGuard;
pub use state::{GuardState, GuardView, Location, RedirectState};
