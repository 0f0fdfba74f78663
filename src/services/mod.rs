//! Default process singletons and their declared initialization order.
//!
//! # Order
//! ```text
//! config → log → metrics → timezone → cache → db → notifier → cron
//! ```
//!
//! Each initializer reads only what came before it: logging and metrics
//! read the config, the scheduler reads the timezone, storage resolves
//! `db_path` from the config.

pub mod cache;
pub mod notifier;
pub mod storage;
pub mod timezone;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::observability::logging::{self, Logger};
use crate::observability::metrics::{self, MetricsHandle};
use crate::registry::{BoxError, RegistryError, Resolver, SingletonRegistry};
use crate::scheduler::Scheduler;

pub use cache::Cache;
pub use notifier::{Notifier, NotifyError};
pub use storage::{Storage, StorageError};
pub use timezone::Timezone;

pub const CONFIG: &str = "config";
pub const LOG: &str = "log";
pub const METRICS: &str = "metrics";
pub const TIMEZONE: &str = "timezone";
pub const CACHE: &str = "cache";
pub const DB: &str = "db";
pub const NOTIFIER: &str = "notifier";
pub const CRON: &str = "cron";

/// The default singletons, in initialization order.
pub const DEFAULT_ORDER: &[&str] = &[CONFIG, LOG, METRICS, TIMEZONE, CACHE, DB, NOTIFIER, CRON];

fn config(r: &Resolver<'_>) -> Result<Arc<AppConfig>, RegistryError> {
    r.get_as::<AppConfig>(CONFIG)
}

/// Queue the default singletons on `registry`.
pub fn register_defaults(
    registry: &mut SingletonRegistry,
    app_config: Arc<AppConfig>,
) -> Result<(), RegistryError> {
    registry.register_instance(CONFIG, app_config)?;

    registry.register(LOG, |r| -> Result<Logger, BoxError> {
        let config = config(r)?;
        Ok(logging::init_logging(&config.log, config.debug)?)
    })?;

    registry.register(METRICS, |r| -> Result<MetricsHandle, BoxError> {
        let config = config(r)?;
        if !config.observability.metrics_enabled {
            return Ok(metrics::disabled());
        }
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        Ok(metrics::init_metrics(addr)?)
    })?;

    registry.register(TIMEZONE, |r| -> Result<Timezone, BoxError> {
        let config = config(r)?;
        let timezone = Timezone::parse(&config.timezone)
            .ok_or_else(|| format!("invalid timezone `{}`", config.timezone))?;
        Ok(timezone)
    })?;

    registry.register(CACHE, |r| -> Result<Cache, BoxError> {
        let config = config(r)?;
        Ok(Cache::new(Duration::from_secs(config.cache.default_ttl_secs)))
    })?;

    registry.register(DB, |r| -> Result<Storage, BoxError> {
        let config = config(r)?;
        Ok(Storage::open(&config.db_path)?)
    })?;

    registry.register(NOTIFIER, |r| -> Result<Notifier, BoxError> {
        let config = config(r)?;
        Ok(Notifier::from_config(&config.notifier)?)
    })?;

    registry.register(CRON, |r| -> Result<Scheduler, BoxError> {
        let timezone = r.get_as::<Timezone>(TIMEZONE)?;
        Ok(Scheduler::new(timezone.offset()))
    })?;

    Ok(())
}
