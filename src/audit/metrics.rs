//! Access decision metrics
//!
//! Thread-safe counters for grants, denials and resolution errors, cache
//! effectiveness, and per-resource statistics.

use crate::util::unix_now;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// How a decision came out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Granted,
    Denied,
    Error,
}

pub struct AccessMetrics {
    start_time: Instant,
    granted: AtomicU64,
    denied: AtomicU64,
    errors: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    data: RwLock<MetricsData>,
    max_recent: usize,
}

#[derive(Default)]
struct ResourceStatsInner {
    granted: u64,
    denied: u64,
    errors: u64,
    last_checked: u64,
}

#[derive(Default)]
struct MetricsData {
    resources: HashMap<String, ResourceStatsInner>,
    recent: VecDeque<DecisionRecord>,
}

/// A recent decision
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRecord {
    pub subject_id: String,
    /// `resource:action` or a route path
    pub target: String,
    pub outcome: Outcome,
    pub cached: bool,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceStats {
    pub name: String,
    pub granted: u64,
    pub denied: u64,
    pub errors: u64,
    pub last_checked: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub granted: u64,
    pub denied: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub resources: Vec<ResourceStats>,
    pub recent: Vec<DecisionRecord>,
}

impl AccessMetrics {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    /// Keep at most `max_recent` decisions in the ring
    pub fn with_capacity(max_recent: usize) -> Self {
        Self {
            start_time: Instant::now(),
            granted: AtomicU64::new(0),
            denied: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            data: RwLock::new(MetricsData {
                resources: HashMap::new(),
                recent: VecDeque::with_capacity(max_recent),
            }),
            max_recent: max_recent.max(1),
        }
    }

    fn write_data(&self) -> RwLockWriteGuard<'_, MetricsData> {
        self.data.write().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_data(&self) -> RwLockReadGuard<'_, MetricsData> {
        self.data.read().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one decision against `resource` (a resource name or "route")
    pub fn record_decision(
        &self,
        subject_id: &str,
        resource: &str,
        target: &str,
        outcome: Outcome,
        cached: bool,
    ) {
        let counter = match outcome {
            Outcome::Granted => &self.granted,
            Outcome::Denied => &self.denied,
            Outcome::Error => &self.errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let now = unix_now();
        let mut data = self.write_data();

        let stats = data.resources.entry(resource.to_string()).or_default();
        match outcome {
            Outcome::Granted => stats.granted += 1,
            Outcome::Denied => stats.denied += 1,
            Outcome::Error => stats.errors += 1,
        }
        stats.last_checked = now;

        if data.recent.len() >= self.max_recent {
            data.recent.pop_front();
        }
        data.recent.push_back(DecisionRecord {
            subject_id: subject_id.to_string(),
            target: target.to_string(),
            outcome,
            cached,
            timestamp: now,
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let lookups = cache_hits + cache_misses;
        let cache_hit_rate = if lookups > 0 {
            cache_hits as f64 / lookups as f64
        } else {
            0.0
        };

        let data = self.read_data();
        let mut resources: Vec<ResourceStats> = data
            .resources
            .iter()
            .map(|(name, s)| ResourceStats {
                name: name.clone(),
                granted: s.granted,
                denied: s.denied,
                errors: s.errors,
                last_checked: s.last_checked,
            })
            .collect();
        resources.sort_unstable_by(|a, b| {
            (b.granted + b.denied + b.errors).cmp(&(a.granted + a.denied + a.errors))
        });
        let recent = data.recent.iter().cloned().collect();
        drop(data);

        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            granted: self.granted.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            cache_hits,
            cache_misses,
            cache_hit_rate,
            resources,
            recent,
        }
    }

    pub fn total_decisions(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
            + self.denied.load(Ordering::Relaxed)
            + self.errors.load(Ordering::Relaxed)
    }
}

impl Default for AccessMetrics {
    fn default() -> Self {
        Self::new()
    }
}
