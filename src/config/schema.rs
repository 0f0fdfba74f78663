//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Forces debug-level logging regardless of `log.level`.
    pub debug: bool,

    /// Location of the storage file.
    pub db_path: String,

    /// Timezone used to evaluate schedules (`UTC`, `Z` or `±HH:MM`).
    pub timezone: String,

    /// Listener settings.
    pub server: ServerConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// In-memory cache settings.
    pub cache: CacheConfig,

    /// Built-in periodic task schedules.
    pub scheduler: SchedulerConfig,

    /// Metrics endpoint settings.
    pub observability: ObservabilityConfig,

    /// Webhook notification channels.
    pub notifier: NotifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            debug: false,
            db_path: "data/service.db".to_string(),
            timezone: "UTC".to_string(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            observability: ObservabilityConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl AppConfig {
    /// Address to bind for the given (already resolved) port.
    ///
    /// `host` is checked by validation, so this only fails for configs that
    /// were built in code and never validated.
    pub fn socket_addr(&self, port: u16) -> Result<SocketAddr, std::net::AddrParseError> {
        let ip: IpAddr = self.server.host.parse()?;
        Ok(SocketAddr::new(ip, port))
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// Port to bind. `0` asks the OS for an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight work before forcing it closed.
    pub shutdown_timeout_secs: u64,

    /// What to do when the accept loop hits a listener-level error.
    pub listener_errors: ListenerErrorPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            listener_errors: ListenerErrorPolicy::default(),
        }
    }
}

/// Reaction to listener-level accept errors while running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ListenerErrorPolicy {
    /// Give up immediately; the service moves to shutdown.
    #[default]
    Shutdown,
    /// Retry with exponential backoff before giving up.
    Retry {
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied by `Cache::set`.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
        }
    }
}

/// Schedules of the tasks registered at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Heartbeat log line.
    pub heartbeat: String,

    /// Removal of expired cache entries.
    pub cache_purge: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            heartbeat: "0 * * * * *".to_string(),
            cache_purge: "@every 30s".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Notification channels.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// HTTP timeout for webhook calls.
    pub timeout_secs: u64,

    /// Channel name → webhook URL.
    pub channels: BTreeMap<String, String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            channels: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.listener_errors, ListenerErrorPolicy::Shutdown);
        assert_eq!(config.scheduler.heartbeat, "0 * * * * *");
    }

    #[test]
    fn retry_policy_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [server.listener_errors]
            mode = "retry"
            max_attempts = 4
            base_delay_ms = 50
            max_delay_ms = 500
            "#,
        )
        .unwrap();
        assert_eq!(
            config.server.listener_errors,
            ListenerErrorPolicy::Retry {
                max_attempts: 4,
                base_delay_ms: 50,
                max_delay_ms: 500
            }
        );
    }

    #[test]
    fn socket_addr_combines_host_and_port() {
        let mut config = AppConfig::default();
        config.server.host = "127.0.0.1".into();
        assert_eq!(config.socket_addr(9000).unwrap().to_string(), "127.0.0.1:9000");
    }
}
