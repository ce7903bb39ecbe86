//! # Controller Configuration
//!
//! Operator settings loaded from environment variables.

use crate::error::ConfigError;
use std::time::Duration;

/// Operator configuration
///
/// Identity-service credentials and the shared store location are required.
/// Everything else has a default and can be overridden via environment variables.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Base URL of the Keycloak server
    pub keycloak_url: String,
    /// Admin username for the password grant
    pub keycloak_username: String,
    /// Admin password for the password grant
    pub keycloak_password: String,
    /// Realm the admin user authenticates against
    pub keycloak_admin_realm: String,
    /// Client used for the admin password grant
    pub keycloak_admin_client_id: String,
    /// Per-request timeout for the identity service (seconds)
    pub keycloak_request_timeout_secs: u64,
    /// Connection string of the shared store holding the hashing salt
    pub redis_connection_string: String,
    /// Start watch ingestion for every kind
    pub enable_kubernetes_watchers: bool,
    /// Run the reconcile and cleanup queue consumers
    pub enable_workers: bool,
    /// Period of the full-resync and cleanup schedulers (seconds)
    pub resync_interval_secs: u64,
    /// First delay before restarting a closed watch stream (seconds)
    pub watch_restart_delay_secs: u64,
    /// Upper bound of the watch restart backoff (seconds)
    pub watch_backoff_max_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("keycloak_url", &self.keycloak_url)
            .field("keycloak_username", &self.keycloak_username)
            .field("keycloak_password", &"<redacted>")
            .field("keycloak_admin_realm", &self.keycloak_admin_realm)
            .field("keycloak_admin_client_id", &self.keycloak_admin_client_id)
            .field(
                "keycloak_request_timeout_secs",
                &self.keycloak_request_timeout_secs,
            )
            .field("redis_connection_string", &"<redacted>")
            .field("enable_kubernetes_watchers", &self.enable_kubernetes_watchers)
            .field("enable_workers", &self.enable_workers)
            .field("resync_interval_secs", &self.resync_interval_secs)
            .field("watch_restart_delay_secs", &self.watch_restart_delay_secs)
            .field("watch_backoff_max_secs", &self.watch_backoff_max_secs)
            .field("metrics_port", &self.metrics_port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source and validate it
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        use crate::constants::*;

        let vars = Vars(&lookup);
        let config = Self {
            keycloak_url: vars.required("KEYCLOAK_URL")?,
            keycloak_username: vars.required("KEYCLOAK_USERNAME")?,
            keycloak_password: vars.required("KEYCLOAK_PASSWORD")?,
            keycloak_admin_realm: vars.str_or("KEYCLOAK_ADMIN_REALM", DEFAULT_KEYCLOAK_ADMIN_REALM),
            keycloak_admin_client_id: vars
                .str_or("KEYCLOAK_ADMIN_CLIENT_ID", DEFAULT_KEYCLOAK_ADMIN_CLIENT_ID),
            keycloak_request_timeout_secs: vars.parse_or(
                "KEYCLOAK_REQUEST_TIMEOUT_SECS",
                DEFAULT_KEYCLOAK_REQUEST_TIMEOUT_SECS,
            )?,
            redis_connection_string: vars.required("REDIS_CONNECTION_STRING")?,
            enable_kubernetes_watchers: vars.bool_or("ENABLE_KUBERNETES_WATCHERS", true),
            enable_workers: vars.bool_or("ENABLE_WORKERS", true),
            resync_interval_secs: vars
                .parse_or("RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?,
            watch_restart_delay_secs: vars
                .parse_or("WATCH_RESTART_DELAY_SECS", DEFAULT_WATCH_RESTART_DELAY_SECS)?,
            watch_backoff_max_secs: vars
                .parse_or("WATCH_BACKOFF_MAX_SECS", DEFAULT_WATCH_BACKOFF_MAX_SECS)?,
            metrics_port: vars.parse_or("METRICS_PORT", DEFAULT_METRICS_PORT)?,
            log_level: vars.str_or("LOG_LEVEL", "info"),
            log_format: vars.str_or("LOG_FORMAT", "json"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints the individual parsers cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.keycloak_url.starts_with("http://") || self.keycloak_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                name: "KEYCLOAK_URL",
                reason: format!("'{}' is not an http(s) URL", self.keycloak_url),
            });
        }
        if !(self.redis_connection_string.starts_with("redis://")
            || self.redis_connection_string.starts_with("rediss://"))
        {
            return Err(ConfigError::Invalid {
                name: "REDIS_CONNECTION_STRING",
                reason: "must start with redis:// or rediss://".to_string(),
            });
        }
        if self.resync_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "RESYNC_INTERVAL_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.watch_restart_delay_secs == 0
            || self.watch_backoff_max_secs < self.watch_restart_delay_secs
        {
            return Err(ConfigError::Invalid {
                name: "WATCH_BACKOFF_MAX_SECS",
                reason: format!(
                    "restart delay {}s must be positive and not exceed the maximum {}s",
                    self.watch_restart_delay_secs, self.watch_backoff_max_secs
                ),
            });
        }
        if !matches!(self.log_format.to_lowercase().as_str(), "json" | "text") {
            return Err(ConfigError::Invalid {
                name: "LOG_FORMAT",
                reason: format!("'{}' is neither json nor text", self.log_format),
            });
        }
        Ok(())
    }

    /// Get the identity-service request timeout
    pub fn keycloak_request_timeout(&self) -> Duration {
        Duration::from_secs(self.keycloak_request_timeout_secs)
    }

    /// Get the scheduler period
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Read a variable that has no default
    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    /// Read a variable as string or return default
    fn str_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Read a variable as boolean or return default
    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map(|v| {
                let v_lower = v.to_lowercase();
                v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
            })
            .unwrap_or(default)
    }

    /// Read and parse a variable, or return default when it is unset
    fn parse_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|e| ConfigError::Invalid {
                name: key,
                reason: format!("'{v}': {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("KEYCLOAK_URL", "https://keycloak.example.com"),
            ("KEYCLOAK_USERNAME", "admin"),
            ("KEYCLOAK_PASSWORD", "admin"),
            ("REDIS_CONNECTION_STRING", "redis://localhost:6379"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<ControllerConfig, ConfigError> {
        ControllerConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults_apply_when_optional_variables_are_unset() {
        let config = load(&base()).expect("config should load");
        assert_eq!(config.keycloak_admin_realm, "master");
        assert_eq!(config.keycloak_admin_client_id, "admin-cli");
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
        assert_eq!(config.metrics_port, 8080);
        assert!(config.enable_workers);
        assert!(config.enable_kubernetes_watchers);
    }

    #[test]
    fn test_missing_required_variable_is_reported_by_name() {
        let mut vars = base();
        vars.remove("KEYCLOAK_PASSWORD");
        match load(&vars) {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "KEYCLOAK_PASSWORD"),
            other => panic!("expected missing variable error, got {other:?}"),
        }
    }

    #[test]
    fn test_booleanish_values() {
        for (raw, expected) in [("true", true), ("YES", true), ("on", true), ("1", true), ("false", false), ("0", false)] {
            let mut vars = base();
            vars.insert("ENABLE_WORKERS", raw);
            let config = load(&vars).expect("config should load");
            assert_eq!(config.enable_workers, expected, "ENABLE_WORKERS={raw}");
        }
    }

    #[test]
    fn test_redis_scheme_is_validated() {
        let mut vars = base();
        vars.insert("REDIS_CONNECTION_STRING", "localhost:6379");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "REDIS_CONNECTION_STRING", .. })
        ));
    }

    #[test]
    fn test_unparseable_number_is_an_error_not_a_default() {
        let mut vars = base();
        vars.insert("METRICS_PORT", "eighty");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid { name: "METRICS_PORT", .. })
        ));
    }

    #[test]
    fn test_debug_output_redacts_credentials() {
        let config = load(&base()).expect("config should load");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("redis://localhost"));
        assert!(rendered.contains("<redacted>"));
    }
}
