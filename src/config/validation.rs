//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, hosts and addresses parse)
//! - Check timezone, log level and webhook URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::config::schema::{AppConfig, ListenerErrorPolicy};
use crate::services::timezone::parse_offset;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint and report all violations.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.host",
            format!("`{}` is not an IP address", config.server.host),
        ));
    }
    if config.server.max_connections == 0 {
        errors.push(ValidationError::new("server.max_connections", "must be > 0"));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be > 0"));
    }
    if config.server.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new("server.shutdown_timeout_secs", "must be > 0"));
    }
    if let ListenerErrorPolicy::Retry { max_attempts: 0, .. } = config.server.listener_errors {
        errors.push(ValidationError::new(
            "server.listener_errors.max_attempts",
            "must be > 0",
        ));
    }

    if config.db_path.trim().is_empty() {
        errors.push(ValidationError::new("db_path", "must not be empty"));
    }
    if parse_offset(&config.timezone).is_none() {
        errors.push(ValidationError::new(
            "timezone",
            format!("`{}` is not UTC or a ±HH:MM offset", config.timezone),
        ));
    }

    let level = config.log.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "log.level",
            format!("unknown level `{}`", config.log.level),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    for (name, webhook) in &config.notifier.channels {
        if let Err(e) = url::Url::parse(webhook) {
            errors.push(ValidationError::new(
                "notifier.channels",
                format!("channel `{}`: {}", name, e),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
