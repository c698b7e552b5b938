//! Guard states and the views they render to

use serde::{Deserialize, Serialize};

/// The location being guarded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Location {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    /// Waiting for the session provider
    CheckingAuth,
    Unauthenticated,
    CheckingAccess,
    /// `bypass` is set when no check ran (public route, platform admin)
    AccessGranted { admin_badge: bool, bypass: bool },
    AccessDenied,
    Error { message: String },
}

impl GuardState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GuardState::Unauthenticated
                | GuardState::AccessGranted { .. }
                | GuardState::AccessDenied
                | GuardState::Error { .. }
        )
    }
}

/// State carried on a redirect so the caller can return afterwards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectState {
    pub from: Location,
}

/// What the caller should render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum GuardView {
    Loading {
        custom: bool,
    },
    Error {
        message: String,
        retry: bool,
        escape_path: String,
    },
    Redirect {
        to: String,
        replace: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<RedirectState>,
    },
    CustomUnauthorized,
    Render {
        admin_badge: bool,
    },
}

impl GuardView {
    pub fn is_loading(&self) -> bool {
        matches!(self, GuardView::Loading { .. })
    }
}
