//! Configuration types for tenant-gate
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::util::ApiKey;
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backing authorization store connection
    pub store: StoreConfig,

    /// Permission cache settings
    pub cache: CacheConfig,

    /// Route guard defaults
    pub guard: GuardDefaults,

    /// Audit log sink settings
    pub audit: AuditConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Hosted authorization store (PostgREST-compatible) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Project URL (e.g., `https://abc.supabase.co`)
    pub url: String,

    /// Service key (prefer env var SUPABASE_SERVICE_ROLE_KEY)
    pub api_key: Option<ApiKey>,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: None,
            timeout_secs: 10,
            max_retries: 2,
        }
    }
}

impl StoreConfig {
    /// Base URL of the REST interface
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url.trim_end_matches('/'))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Permission cache settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Disable to query the store on every check
    pub enabled: bool,

    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Defaults applied to every route guard built from this configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardDefaults {
    /// Where unauthenticated visitors are sent
    pub login_path: String,

    /// Where authenticated but denied visitors are sent
    pub unauthorized_path: String,

    /// Escape route offered by the error state
    pub home_path: String,

    /// Run the path-table check when a route declares no role or permission
    pub check_path: bool,

    /// Record one audit entry per grant/deny outcome
    pub enable_audit: bool,

    /// Upper bound for one full evaluation
    pub evaluation_timeout_secs: u64,
}

impl Default for GuardDefaults {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            unauthorized_path: "/unauthorized".to_string(),
            home_path: "/".to_string(),
            check_path: true,
            enable_audit: false,
            evaluation_timeout_secs: 10,
        }
    }
}

/// Audit log sink settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Write audit records to the store; otherwise they stay in memory
    pub enabled: bool,

    /// Table receiving audit rows
    pub table: String,

    /// Write timeout in seconds
    pub timeout_secs: u64,

    /// Records retained by the in-memory sink
    pub memory_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            table: "audit_logs".to_string(),
            timeout_secs: 5,
            memory_capacity: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
