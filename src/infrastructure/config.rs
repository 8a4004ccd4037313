//! # Adapter Configuration
//!
//! Environment-driven settings for the adapter.
//!
//! Values come from the process environment, optionally seeded from a
//! `.env` file. Durations accept `500ms`, `30s`, `5m`, `1h` or a bare
//! number of seconds. Unset or empty variables fall back to defaults.
//!
//! # Examples
//!
//! ```no_run
//! use exchange_data_adapter::infrastructure::config::AdapterConfig;
//!
//! let config = AdapterConfig::from_env()?;
//! let namespace = config.resolve_namespace();
//! println!("{namespace}");
//! # Ok::<(), exchange_data_adapter::infrastructure::config::ConfigError>(())
//! ```

use crate::infrastructure::namespace::{MAX_IDENTIFIER_LEN, TenantNamespace};
use config::{Config, Environment};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment could not be read or deserialized.
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    /// A duration value could not be parsed.
    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration {
        /// Field being parsed.
        field: &'static str,
        /// Raw value.
        value: String,
    },

    /// Instance name is not a DNS label.
    #[error("invalid instance name '{name}': {reason}")]
    InvalidInstanceName {
        /// Offending name.
        name: String,
        /// Which rule failed.
        reason: &'static str,
    },
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `exchange_data_adapter=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Postgres connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Connection string.
    pub url: String,
    /// Pool ceiling.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// Age after which a connection is recycled.
    pub max_lifetime: Duration,
    /// Idle time after which a connection is closed.
    pub idle_timeout: Duration,
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("url", &redact_url(&self.url))
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("max_lifetime", &self.max_lifetime)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

/// Redis connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// Connection string.
    pub url: String,
    /// Reconnect attempts before a command fails.
    pub max_retries: usize,
    /// Deadline for establishing a connection.
    pub connect_timeout: Duration,
    /// Deadline for a single command round trip.
    pub response_timeout: Duration,
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &redact_url(&self.url))
            .field("max_retries", &self.max_retries)
            .field("connect_timeout", &self.connect_timeout)
            .field("response_timeout", &self.response_timeout)
            .finish()
    }
}

/// Complete adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Logical service name.
    pub service_name: String,
    /// Name of this deployment; equals `service_name` for singletons.
    pub service_instance_name: String,
    /// Service version advertised in the registry.
    pub service_version: String,
    /// Deployment environment label.
    pub environment: String,
    /// Explicit schema, overriding derivation.
    pub schema_name: Option<String>,
    /// Explicit cache namespace, overriding derivation.
    pub redis_namespace: Option<String>,
    /// Ledger store; `None` disables the ledger repositories.
    pub postgres: Option<PostgresConfig>,
    /// Cache cluster; `None` disables the cache and the registry.
    pub redis: Option<RedisConfig>,
    /// TTL applied when a cache write passes none.
    pub cache_ttl: Duration,
    /// Heartbeat period advertised to the caller's scheduler.
    pub heartbeat_interval: Duration,
    /// Registry lease.
    pub service_ttl: Duration,
    /// Whether to check the instance name at load time.
    pub validate_instance_name: bool,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_instance_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: "1.0.0".to_string(),
            environment: "development".to_string(),
            schema_name: None,
            redis_namespace: None,
            postgres: None,
            redis: None,
            cache_ttl: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(30),
            service_ttl: Duration::from_secs(90),
            validate_instance_name: true,
            logging: LoggingConfig::default(),
        }
    }
}

const DEFAULT_SERVICE_NAME: &str = "exchange-data-adapter";

impl AdapterConfig {
    /// Creates a configuration for `service_name` with every default.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        let service_name = service_name.into();
        Self {
            service_instance_name: service_name.clone(),
            service_name,
            ..Self::default()
        }
    }

    /// Sets the instance name.
    #[must_use]
    pub fn with_instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.service_instance_name = instance_name.into();
        self
    }

    /// Enables the ledger with default pool settings.
    #[must_use]
    pub fn with_postgres_url(mut self, url: impl Into<String>) -> Self {
        self.postgres = Some(PostgresConfig {
            url: url.into(),
            max_connections: 25,
            min_connections: 10,
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
        });
        self
    }

    /// Enables the cache and registry with default client settings.
    #[must_use]
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis = Some(RedisConfig {
            url: url.into(),
            max_retries: 3,
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(3),
        });
        self
    }

    /// Overrides the derived schema and namespace.
    #[must_use]
    pub fn with_namespace(
        mut self,
        schema_name: impl Into<String>,
        redis_namespace: impl Into<String>,
    ) -> Self {
        self.schema_name = Some(schema_name.into());
        self.redis_namespace = Some(redis_namespace.into());
        self
    }

    /// Sets the registry lease.
    #[must_use]
    pub fn with_service_ttl(mut self, service_ttl: Duration) -> Self {
        self.service_ttl = service_ttl;
        self
    }

    /// Loads `.env` if present, then the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable holds a value of the wrong type.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable .env file"),
        }
        Self::from_source(Environment::default())
    }

    /// Loads configuration from an environment source.
    ///
    /// Tests pass an `Environment` with an explicit map instead of mutating
    /// the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable holds a value of the wrong type.
    pub fn from_source(source: Environment) -> Result<Self, ConfigError> {
        let raw: RawConfig = Config::builder()
            .add_source(source.try_parsing(true))
            .build()?
            .try_deserialize()?;
        let config = raw.into_config()?;

        if config.validate_instance_name {
            if let Err(e) = validate_instance_name(&config.service_instance_name) {
                tracing::warn!(
                    instance = %config.service_instance_name,
                    error = %e,
                    "instance name is not DNS-safe, continuing"
                );
            }
        }

        Ok(config)
    }

    /// Schema and cache namespace for this instance.
    #[must_use]
    pub fn resolve_namespace(&self) -> TenantNamespace {
        TenantNamespace::resolve(
            &self.service_name,
            &self.service_instance_name,
            self.schema_name.as_deref(),
            self.redis_namespace.as_deref(),
        )
    }
}

/// Checks that `name` is a DNS label: lowercase alphanumerics and hyphens,
/// alphanumeric at both ends, at most 63 characters.
///
/// # Errors
///
/// Returns `ConfigError::InvalidInstanceName` naming the failed rule.
pub fn validate_instance_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidInstanceName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.chars().all(|c| allowed(c) || c == '-') {
        return Err(invalid("only lowercase letters, digits and hyphens are allowed"));
    }
    if !name.starts_with(allowed) || !name.ends_with(allowed) {
        return Err(invalid("must start and end with a letter or digit"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("exceeds 63 characters"));
    }
    Ok(())
}

fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let (scheme, _) = url.split_at(scheme_end);
            let (_, host) = url.split_at(at);
            format!("{scheme}://***{host}")
        }
        _ => url.to_string(),
    }
}

/// Duration as written in the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn parse(&self, field: &'static str) -> Result<Duration, ConfigError> {
        let text = match self {
            Self::Seconds(secs) => return Ok(Duration::from_secs(*secs)),
            Self::Text(text) => text.trim(),
        };
        let invalid = || ConfigError::InvalidDuration {
            field,
            value: text.to_string(),
        };

        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        match unit {
            "" | "s" => Ok(Duration::from_secs(amount)),
            "ms" => Ok(Duration::from_millis(amount)),
            "m" => Ok(Duration::from_secs(amount.saturating_mul(60))),
            "h" => Ok(Duration::from_secs(amount.saturating_mul(3600))),
            _ => Err(invalid()),
        }
    }
}

fn duration_or(
    raw: Option<RawDuration>,
    field: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(RawDuration::Text(text)) if text.trim().is_empty() => Ok(default),
        Some(raw) => raw.parse(field),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Flat view of the environment, keyed by lowercased variable name.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    service_name: Option<String>,
    service_instance_name: Option<String>,
    service_version: Option<String>,
    environment: Option<String>,
    schema_name: Option<String>,
    redis_namespace: Option<String>,
    postgres_url: Option<String>,
    max_connections: Option<u32>,
    max_idle_connections: Option<u32>,
    connection_max_lifetime: Option<RawDuration>,
    connection_max_idle_time: Option<RawDuration>,
    redis_url: Option<String>,
    redis_max_retries: Option<usize>,
    redis_dial_timeout: Option<RawDuration>,
    redis_read_timeout: Option<RawDuration>,
    redis_write_timeout: Option<RawDuration>,
    cache_ttl: Option<RawDuration>,
    heartbeat_interval: Option<RawDuration>,
    service_ttl: Option<RawDuration>,
    validate_instance_name: Option<bool>,
    log_level: Option<String>,
    log_format: Option<LogFormat>,
}

impl RawConfig {
    fn into_config(self) -> Result<AdapterConfig, ConfigError> {
        let defaults = AdapterConfig::default();
        let service_name = non_empty(self.service_name).unwrap_or(defaults.service_name);
        let service_instance_name =
            non_empty(self.service_instance_name).unwrap_or_else(|| service_name.clone());

        let postgres = match non_empty(self.postgres_url) {
            Some(url) => {
                let max_connections = self.max_connections.unwrap_or(25);
                Some(PostgresConfig {
                    url,
                    max_connections,
                    min_connections: self.max_idle_connections.unwrap_or(10).min(max_connections),
                    max_lifetime: duration_or(
                        self.connection_max_lifetime,
                        "CONNECTION_MAX_LIFETIME",
                        Duration::from_secs(300),
                    )?,
                    idle_timeout: duration_or(
                        self.connection_max_idle_time,
                        "CONNECTION_MAX_IDLE_TIME",
                        Duration::from_secs(60),
                    )?,
                })
            }
            None => None,
        };

        let redis = match non_empty(self.redis_url) {
            Some(url) => {
                let read =
                    duration_or(self.redis_read_timeout, "REDIS_READ_TIMEOUT", Duration::from_secs(3))?;
                let write = duration_or(
                    self.redis_write_timeout,
                    "REDIS_WRITE_TIMEOUT",
                    Duration::from_secs(3),
                )?;
                Some(RedisConfig {
                    url,
                    max_retries: self.redis_max_retries.unwrap_or(3),
                    connect_timeout: duration_or(
                        self.redis_dial_timeout,
                        "REDIS_DIAL_TIMEOUT",
                        Duration::from_secs(5),
                    )?,
                    response_timeout: read.max(write),
                })
            }
            None => None,
        };

        Ok(AdapterConfig {
            service_name,
            service_instance_name,
            service_version: non_empty(self.service_version).unwrap_or(defaults.service_version),
            environment: non_empty(self.environment).unwrap_or(defaults.environment),
            schema_name: non_empty(self.schema_name),
            redis_namespace: non_empty(self.redis_namespace),
            postgres,
            redis,
            cache_ttl: duration_or(self.cache_ttl, "CACHE_TTL", defaults.cache_ttl)?,
            heartbeat_interval: duration_or(
                self.heartbeat_interval,
                "HEARTBEAT_INTERVAL",
                defaults.heartbeat_interval,
            )?,
            service_ttl: duration_or(self.service_ttl, "SERVICE_TTL", defaults.service_ttl)?,
            validate_instance_name: self.validate_instance_name.unwrap_or(true),
            logging: LoggingConfig {
                level: non_empty(self.log_level).unwrap_or(defaults.logging.level),
                format: self.log_format.unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AdapterConfig, ConfigError> {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AdapterConfig::from_source(Environment::default().source(Some(map)))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.service_name, "exchange-data-adapter");
        assert_eq!(config.service_instance_name, "exchange-data-adapter");
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.service_ttl, Duration::from_secs(90));
        assert!(config.postgres.is_none());
        assert!(config.redis.is_none());
        assert!(config.validate_instance_name);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn instance_defaults_to_service_name() {
        let config = load(&[("SERVICE_NAME", "exchange-simulator")]).unwrap();
        assert_eq!(config.service_instance_name, "exchange-simulator");
        let ns = config.resolve_namespace();
        assert_eq!(ns.schema(), "exchange");
        assert_eq!(ns.cache_namespace(), "exchange");
    }

    #[test]
    fn explicit_namespace_overrides_derivation() {
        let config = load(&[
            ("SERVICE_NAME", "exchange-simulator"),
            ("SERVICE_INSTANCE_NAME", "exchange-OKX"),
            ("REDIS_NAMESPACE", "okx"),
        ])
        .unwrap();
        let ns = config.resolve_namespace();
        assert_eq!(ns.schema(), "exchange_okx");
        assert_eq!(ns.cache_namespace(), "okx");
    }

    #[test]
    fn store_sections_follow_urls() {
        let config = load(&[
            ("POSTGRES_URL", "postgres://user:secret@db:5432/exchange"),
            ("MAX_CONNECTIONS", "8"),
            ("MAX_IDLE_CONNECTIONS", "20"),
            ("CONNECTION_MAX_LIFETIME", "10m"),
            ("REDIS_URL", "redis://cache:6379"),
            ("REDIS_READ_TIMEOUT", "2s"),
            ("REDIS_WRITE_TIMEOUT", "4500ms"),
        ])
        .unwrap();
        let pg = config.postgres.unwrap();
        assert_eq!(pg.max_connections, 8);
        assert_eq!(pg.min_connections, 8);
        assert_eq!(pg.max_lifetime, Duration::from_secs(600));
        assert!(!format!("{pg:?}").contains("secret"));

        let redis = config.redis.unwrap();
        assert_eq!(redis.response_timeout, Duration::from_millis(4500));
        assert_eq!(redis.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn durations_accept_units_and_bare_seconds() {
        let config = load(&[
            ("CACHE_TTL", "1h"),
            ("HEARTBEAT_INTERVAL", "15"),
            ("SERVICE_TTL", "45s"),
        ])
        .unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.service_ttl, Duration::from_secs(45));
    }

    #[test]
    fn malformed_duration_is_rejected() {
        let err = load(&[("SERVICE_TTL", "ninety")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "SERVICE_TTL", .. }
        ));
    }

    #[test]
    fn invalid_instance_name_is_only_logged() {
        let config = load(&[("SERVICE_INSTANCE_NAME", "Exchange_OKX")]).unwrap();
        assert_eq!(config.service_instance_name, "Exchange_OKX");
    }

    #[test]
    fn log_settings_are_read() {
        let config = load(&[("LOG_LEVEL", "debug"), ("LOG_FORMAT", "pretty")]).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn instance_name_rules() {
        assert!(validate_instance_name("exchange-okx").is_ok());
        assert!(validate_instance_name("a").is_ok());
        assert!(validate_instance_name("exchange-simulator-2").is_ok());
        assert!(validate_instance_name("").is_err());
        assert!(validate_instance_name("exchange-OKX").is_err());
        assert!(validate_instance_name("-exchange").is_err());
        assert!(validate_instance_name("exchange-").is_err());
        assert!(validate_instance_name("exchange_okx").is_err());
        assert!(validate_instance_name(&"a".repeat(64)).is_err());
        assert!(validate_instance_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn redact_hides_credentials() {
        assert_eq!(
            redact_url("postgres://u:p@host/db"),
            "postgres://***@host/db"
        );
        assert_eq!(redact_url("redis://host:6379"), "redis://host:6379");
    }
}
