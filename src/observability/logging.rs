//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Pick pretty or JSON output from config
//! - Resolve the level: `RUST_LOG` → `debug = true` → `log.level`

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter `{filter}`: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
}

/// The `log` singleton: what was configured and whether it took effect.
#[derive(Debug, Clone)]
pub struct Logger {
    pub filter: String,
    pub format: LogFormat,
    /// `false` when another subscriber was already installed (tests,
    /// embedding programs); events then go to that subscriber.
    pub installed: bool,
}

/// Directive used when `RUST_LOG` is not set.
pub fn default_filter(config: &LogConfig, debug: bool) -> String {
    let level = if debug { "debug" } else { config.level.as_str() };
    format!("{}={},tower_http={}", env!("CARGO_CRATE_NAME"), level, level)
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig, debug: bool) -> Result<Logger, LoggingError> {
    let filter = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| default_filter(config, debug));

    let env_filter = EnvFilter::try_new(&filter).map_err(|source| LoggingError::Filter {
        filter: filter.clone(),
        source,
    })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = match config.format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(filter = %filter, format = ?config.format, "Logging initialized");
    }

    Ok(Logger {
        filter,
        format: config.format,
        installed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_overrides_level() {
        let config = LogConfig::default();
        assert_eq!(
            default_filter(&config, true),
            "service_bootstrap=debug,tower_http=debug"
        );
        assert_eq!(
            default_filter(&config, false),
            "service_bootstrap=info,tower_http=info"
        );
    }

    #[test]
    fn second_install_is_tolerated() {
        let config = LogConfig::default();
        let _ = init_logging(&config, false).unwrap();
        let second = init_logging(&config, false).unwrap();
        assert!(!second.installed);
    }
}
