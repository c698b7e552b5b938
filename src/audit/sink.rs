//! Audit sink implementations

use crate::audit::{AuditRecord, AuditSink};
use crate::error::{AuditError, StoreError};
use crate::store::RestClient;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Writes records into the hosted `audit_logs` table
pub struct RestAuditSink {
    client: Arc<RestClient>,
    table: String,
}

impl RestAuditSink {
    pub fn new(client: Arc<RestClient>, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl AuditSink for RestAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let row = json!({
            "tenant_id": record.tenant_id,
            "user_id": record.actor_id,
            "action": record.action_kind,
            "resource_type": record.resource_type,
            "resource_id": record.target,
            "changes": {
                "resource_action": record.resource_action,
                "result": record.granted,
                "recorded_at": record.timestamp,
            },
        });
        self.client.insert(&self.table, &row).await?;
        Ok(())
    }
}

/// Bounded in-memory sink; the oldest record is dropped when full
pub struct MemoryAuditSink {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            failing: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("audit buffer lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Make subsequent appends fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Oldest first
    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuditError::Sink(StoreError::Api {
                status: 503,
                message: "audit sink unavailable".to_string(),
            }));
        }
        let mut records = self.lock();
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_is_bounded() {
        let sink = MemoryAuditSink::new(2);
        for path in ["/a", "/b", "/c"] {
            let record =
                AuditRecord::new("u", "access", "route", true).with_target(Some(path.to_string()));
            sink.append(&record).await.unwrap();
        }

        let targets: Vec<_> = sink
            .records()
            .into_iter()
            .filter_map(|r| r.target)
            .collect();
        assert_eq!(targets, vec!["/b", "/c"]);
    }

    #[tokio::test]
    async fn test_memory_sink_failure_toggle() {
        let sink = MemoryAuditSink::default();
        sink.set_failing(true);
        let record = AuditRecord::new("u", "access", "route", true);
        assert!(sink.append(&record).await.is_err());
        assert!(sink.is_empty());

        sink.set_failing(false);
        sink.append(&record).await.unwrap();
        assert_eq!(sink.len(), 1);
    }
}
