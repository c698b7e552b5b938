//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (TENANT_GATE__*)
//! 2. Configuration file (TOML)
//! 3. Conventional backend variables (SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY, ...)
//! 4. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use crate::util::ApiKey;
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "tenant-gate.toml",
    ".tenant-gate.toml",
    "~/.config/tenant-gate/config.toml",
    "/etc/tenant-gate/config.toml",
];

const URL_VARS: &[&str] = &["SUPABASE_URL", "VITE_SUPABASE_URL"];
const KEY_VARS: &[&str] = &["SUPABASE_SERVICE_ROLE_KEY", "SUPABASE_ANON_KEY"];

/// Load configuration from a TOML string (useful for testing)
///
/// Does not require a service key.
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        // Explicit path provided - must exist
        if !Path::new(path).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(path, FileFormat::Toml));
    } else {
        for path in DEFAULT_CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
                break;
            }
        }
    }

    // Conventional variables only fill gaps left by the file and TENANT_GATE__*.
    if let Some(url) = first_env(URL_VARS) {
        builder = builder
            .set_default("store.url", url)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }
    if let Some(key) = first_env(KEY_VARS) {
        builder = builder
            .set_default("store.api_key", key)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
    }

    // e.g. TENANT_GATE__STORE__URL, TENANT_GATE__CACHE__TTL_SECS
    builder = builder.add_source(
        Environment::with_prefix("TENANT_GATE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Require a usable service key; called by entry points that talk to the store.
pub fn require_api_key(config: &AppConfig) -> Result<ApiKey, ConfigError> {
    match &config.store.api_key {
        Some(key) if !key.is_empty() => Ok(key.clone()),
        _ => Err(ConfigError::Missing {
            field: "store.api_key (set SUPABASE_SERVICE_ROLE_KEY environment variable)"
                .to_string(),
        }),
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.store.url.is_empty() {
        return Err(ConfigError::Missing {
            field: "store.url".to_string(),
        });
    }

    if !config.store.url.starts_with("http://") && !config.store.url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            message: format!(
                "store.url must start with http:// or https://, got: {}",
                config.store.url
            ),
        });
    }

    if config.store.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "store.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.cache.enabled && config.cache.ttl_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "cache.ttl_secs must be greater than 0 when the cache is enabled"
                .to_string(),
        });
    }

    for (field, path) in [
        ("guard.login_path", &config.guard.login_path),
        ("guard.unauthorized_path", &config.guard.unauthorized_path),
        ("guard.home_path", &config.guard.home_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("{} must be an absolute path, got: {}", field, path),
            });
        }
    }

    if config.guard.evaluation_timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "guard.evaluation_timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.audit.timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            message: "audit.timeout_secs must be greater than 0".to_string(),
        });
    }

    if config.audit.table.trim().is_empty() {
        return Err(ConfigError::Missing {
            field: "audit.table".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;

    #[test]
    fn test_load_config_from_str_basic() {
        let toml = r#"
[store]
url = "https://abc.supabase.co"
api_key = "service-key"

[cache]
ttl_secs = 60
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.store.url, "https://abc.supabase.co");
        assert_eq!(
            config.store.api_key.as_ref().map(|k| k.expose()),
            Some("service-key")
        );
        assert_eq!(config.cache.ttl_secs, 60);
        assert!(require_api_key(&config).is_ok());
    }

    #[test]
    fn test_guard_section() {
        let toml = r#"
[guard]
login_path = "/auth/sign-in"
check_path = false
enable_audit = true

[logging]
format = "json"
"#;

        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.guard.login_path, "/auth/sign-in");
        assert_eq!(config.guard.unauthorized_path, "/unauthorized");
        assert!(!config.guard.check_path);
        assert!(config.guard.enable_audit);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_url_error() {
        let toml = r#"
[store]
url = "not-a-url"
"#;

        assert!(matches!(
            load_config_from_str(toml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_relative_login_path_rejected() {
        let toml = r#"
[guard]
login_path = "login"
"#;

        assert!(load_config_from_str(toml).is_err());
    }

    #[test]
    fn test_zero_ttl_only_rejected_when_enabled() {
        let enabled = r#"
[cache]
ttl_secs = 0
"#;
        assert!(load_config_from_str(enabled).is_err());

        let disabled = r#"
[cache]
enabled = false
ttl_secs = 0
"#;
        assert!(load_config_from_str(disabled).is_ok());
    }

    #[test]
    fn test_missing_api_key() {
        let config = load_config_from_str("").unwrap();
        assert!(matches!(
            require_api_key(&config),
            Err(ConfigError::Missing { .. })
        ));
    }
}
