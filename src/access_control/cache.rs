//! Permission cache
//!
//! Decisions are keyed by subject, active tenant, role and target. Entries
//! expire after a fixed TTL and are swept once the map grows past a
//! threshold; mutations invalidate by (resource, action) across all subjects
//! under a single write lock, so no reader sees a half-invalidated pair set.

use crate::access_control::role::Role;
use crate::access_control::types::{AccessScope, PermissionRequirement};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// What a cached decision is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTarget {
    Permission(PermissionRequirement),
    Route(String),
}

/// Entry count above which inserts sweep expired entries first
const DEFAULT_SWEEP_THRESHOLD: usize = 1024;

/// Structured cache key: subject + tenant + role + target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject_id: String,
    pub tenant_id: Option<String>,
    pub role: Option<Role>,
    pub target: CacheTarget,
}

impl CacheKey {
    pub fn permission(scope: &AccessScope, requirement: &PermissionRequirement) -> Self {
        Self {
            subject_id: scope.subject_id.clone(),
            tenant_id: scope.tenant_id.clone(),
            role: scope.role,
            target: CacheTarget::Permission(requirement.clone()),
        }
    }

    pub fn route(scope: &AccessScope, path: &str) -> Self {
        Self {
            subject_id: scope.subject_id.clone(),
            tenant_id: scope.tenant_id.clone(),
            role: scope.role,
            target: CacheTarget::Route(path.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    granted: bool,
    inserted: Instant,
}

#[derive(Default)]
struct CacheData {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Bumped on every invalidation
    epoch: u64,
}

/// Epoch observed before a store round trip.
///
/// Inserting with a stale ticket is a no-op, so a slow check that started
/// before a mutation cannot write its old answer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTicket(u64);

/// TTL cache of access decisions
pub struct PermissionCache {
    ttl: Duration,
    enabled: bool,
    sweep_threshold: usize,
    data: RwLock<CacheData>,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            enabled: true,
            sweep_threshold: DEFAULT_SWEEP_THRESHOLD,
            data: RwLock::new(CacheData::default()),
        }
    }

    /// Sweep expired entries on insert once the map holds `threshold` entries
    pub fn with_sweep_threshold(mut self, threshold: usize) -> Self {
        self.sweep_threshold = threshold;
        self
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, CacheData> {
        self.data.write().unwrap_or_else(|poisoned| {
            tracing::warn!("permission cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_data(&self) -> RwLockReadGuard<'_, CacheData> {
        self.data.read().unwrap_or_else(|poisoned| {
            tracing::warn!("permission cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Cached decision, if present and unexpired
    pub fn get(&self, key: &CacheKey) -> Option<bool> {
        if !self.enabled {
            return None;
        }
        let data = self.read_data();
        data.entries
            .get(key)
            .filter(|entry| entry.inserted.elapsed() < self.ttl)
            .map(|entry| entry.granted)
    }

    pub fn ticket(&self) -> CacheTicket {
        CacheTicket(self.read_data().epoch)
    }

    /// Store a decision unless an invalidation happened since `ticket` was taken.
    /// Returns whether the entry was written.
    pub fn insert(&self, ticket: CacheTicket, key: CacheKey, granted: bool) -> bool {
        if !self.enabled {
            return false;
        }
        let mut data = self.write_data();
        if data.epoch != ticket.0 {
            return false;
        }
        self.sweep_if_full(&mut data);
        data.entries.insert(
            key,
            CacheEntry {
                granted,
                inserted: Instant::now(),
            },
        );
        true
    }

    /// Store several decisions atomically, same ticket rule as [`insert`](Self::insert)
    pub fn insert_many(
        &self,
        ticket: CacheTicket,
        decisions: impl IntoIterator<Item = (CacheKey, bool)>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let mut data = self.write_data();
        if data.epoch != ticket.0 {
            return false;
        }
        self.sweep_if_full(&mut data);
        let now = Instant::now();
        for (key, granted) in decisions {
            data.entries.insert(
                key,
                CacheEntry {
                    granted,
                    inserted: now,
                },
            );
        }
        true
    }

    /// Drop every permission entry for any of `requirements`, across all
    /// subjects and tenants. Returns the number of entries removed.
    pub fn invalidate_requirements(&self, requirements: &HashSet<PermissionRequirement>) -> usize {
        let mut data = self.write_data();
        data.epoch = data.epoch.wrapping_add(1);
        let before = data.entries.len();
        data.entries.retain(|key, _| match &key.target {
            CacheTarget::Permission(req) => !requirements.contains(req),
            CacheTarget::Route(_) => true,
        });
        before - data.entries.len()
    }

    /// Discard all entries unconditionally
    pub fn clear(&self) {
        let mut data = self.write_data();
        data.epoch = data.epoch.wrapping_add(1);
        data.entries.clear();
    }

    /// Current entry count, expired entries included until they are evicted
    pub fn len(&self) -> usize {
        self.read_data().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove expired entries. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let mut data = self.write_data();
        self.drop_expired(&mut data)
    }

    fn drop_expired(&self, data: &mut CacheData) -> usize {
        let before = data.entries.len();
        let ttl = self.ttl;
        data.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);
        before - data.entries.len()
    }

    fn sweep_if_full(&self, data: &mut CacheData) {
        if data.entries.len() < self.sweep_threshold {
            return;
        }
        let dropped = self.drop_expired(data);
        if dropped > 0 {
            tracing::trace!(dropped, remaining = data.entries.len(), "Swept expired cache entries");
        }
    }
}
