//! The resolver operations the route guard depends on

use crate::access_control::{PermissionResolver, Role};
use crate::error::ResolutionError;
// async_trait required for dyn-compatibility with Arc<dyn AccessChecker>
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait AccessChecker: Send + Sync {
    async fn check_access(&self, resource: &str, action: &str) -> Result<bool, ResolutionError>;

    fn has_role_or_higher(&self, role: Role) -> bool;

    async fn can_access_route(&self, path: &str) -> Result<bool, ResolutionError>;

    /// Queue an audit append and return without waiting for the sink
    fn log_access(
        &self,
        action_kind: &str,
        resource_type: &str,
        target_path: Option<&str>,
        granted: bool,
    );
}

pub type SharedAccessChecker = Arc<dyn AccessChecker>;

#[async_trait]
impl AccessChecker for PermissionResolver {
    async fn check_access(&self, resource: &str, action: &str) -> Result<bool, ResolutionError> {
        PermissionResolver::check_access(self, resource, action).await
    }

    fn has_role_or_higher(&self, role: Role) -> bool {
        PermissionResolver::has_role_or_higher(self, role)
    }

    async fn can_access_route(&self, path: &str) -> Result<bool, ResolutionError> {
        PermissionResolver::can_access_route(self, path).await
    }

    fn log_access(
        &self,
        action_kind: &str,
        resource_type: &str,
        target_path: Option<&str>,
        granted: bool,
    ) {
        PermissionResolver::log_access(self, action_kind, resource_type, target_path, granted)
    }
}
