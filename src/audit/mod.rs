//! Audit trail for access decisions and permission mutations
//!
//! Records are append-only. The core writes them and never reads them back
//! to decide anything; sink failures are logged by the caller and dropped.

pub mod metrics;
mod sink;

pub use metrics::{AccessMetrics, DecisionRecord, MetricsSnapshot, Outcome};
pub use sink::{MemoryAuditSink, RestAuditSink};

use crate::error::AuditError;
use crate::util::unix_now;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Action kinds written by the guard and the resolver
pub mod kinds {
    pub const ACCESS: &str = "access";
    pub const ACCESS_DENIED: &str = "access_denied";
    pub const PERMISSION_CHECK: &str = "permission_check";
    pub const PERMISSION_UPDATE: &str = "permission_update";
}

/// One immutable audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub actor_id: String,
    pub tenant_id: Option<String>,
    pub action_kind: String,
    pub resource_type: String,
    /// `resource:action` for permission checks and updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_action: Option<String>,
    /// Route path or affected subject id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub granted: bool,
    /// Unix seconds
    pub timestamp: u64,
}

impl AuditRecord {
    pub fn new(
        actor_id: impl Into<String>,
        action_kind: impl Into<String>,
        resource_type: impl Into<String>,
        granted: bool,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            tenant_id: None,
            action_kind: action_kind.into(),
            resource_type: resource_type.into(),
            resource_action: None,
            target: None,
            granted,
            timestamp: unix_now(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_resource_action(mut self, resource_action: impl Into<String>) -> Self {
        self.resource_action = Some(resource_action.into());
        self
    }

    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target;
        self
    }
}

/// Append-only destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Shared handle to an audit sink
pub type SharedAuditSink = Arc<dyn AuditSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = AuditRecord::new("u-1", kinds::ACCESS_DENIED, "route", false)
            .with_tenant(Some("t-1".to_string()))
            .with_target(Some("/admin".to_string()));

        assert_eq!(record.action_kind, "access_denied");
        assert_eq!(record.target.as_deref(), Some("/admin"));
        assert!(record.timestamp > 0);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("resource_action").is_none());
        assert_eq!(json["granted"], false);
    }
}
