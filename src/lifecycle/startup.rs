//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all singletons in declared order
//! - Register startup tasks on the scheduler
//! - Build the request layer and the (unbound) server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready); binding belongs to
//!   the orchestrator

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use axum::routing::MethodRouter;

use crate::cli;
use crate::config::{
    load_config_named, validate_config, AppConfig, ConfigError, ValidationError,
    DEFAULT_CONFIG_NAME,
};
use crate::http::{build_router, AppState, ExtraRoute, RouteTable, ServerHandle, ServerOptions};
use crate::lifecycle::LifecycleError;
use crate::registry::{BoxError, RegistryError, Resolver, SingletonRegistry};
use crate::scheduler::{ScheduleError, Scheduler, TaskId, TaskResult};
use crate::services::{self, Cache, Timezone};

type SingletonHook = Box<dyn FnOnce(&mut SingletonRegistry) -> Result<(), RegistryError> + Send>;
type TaskHook = Box<dyn FnOnce(&Scheduler) -> Result<TaskId, ScheduleError> + Send>;

/// How the process was asked to start.
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Configuration source name (a path, or a path without `.toml`).
    pub config_name: String,
    /// Port from the command line; 0 keeps the configured port.
    pub port_override: u16,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            config_name: DEFAULT_CONFIG_NAME.to_string(),
            port_override: 0,
        }
    }
}

enum ConfigSource {
    Named(String),
    Provided(AppConfig),
}

/// Collects everything the embedding program adds on top of the defaults.
pub struct Bootstrap {
    source: ConfigSource,
    port_override: u16,
    singletons: Vec<SingletonHook>,
    tasks: Vec<(String, TaskHook)>,
    routes: Vec<ExtraRoute>,
}

impl Bootstrap {
    pub fn new(options: StartupOptions) -> Self {
        Self {
            source: ConfigSource::Named(options.config_name),
            port_override: options.port_override,
            singletons: Vec::new(),
            tasks: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Start from an in-memory configuration instead of a file.
    pub fn from_config(config: AppConfig) -> Self {
        let mut bootstrap = Self::new(StartupOptions::default());
        bootstrap.source = ConfigSource::Provided(config);
        bootstrap
    }

    pub fn port_override(mut self, port: u16) -> Self {
        self.port_override = port;
        self
    }

    /// Add a singleton, initialized after the defaults in the order added.
    pub fn with_singleton<T, E, F>(mut self, name: impl Into<String>, init: F) -> Self
    where
        T: std::any::Any + Send + Sync,
        E: Into<BoxError>,
        F: FnOnce(&Resolver<'_>) -> Result<T, E> + Send + 'static,
    {
        let name = name.into();
        self.singletons
            .push(Box::new(move |registry| registry.register(name, init)));
        self
    }

    /// Add a blocking periodic task.
    pub fn with_task<F>(mut self, name: impl Into<String>, expr: impl Into<String>, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let expr = expr.into();
        let task_name = name.clone();
        self.tasks.push((
            name,
            Box::new(move |scheduler| scheduler.add_named_task(task_name, &expr, callback)),
        ));
        self
    }

    /// Add an async periodic task.
    pub fn with_async_task<F, Fut>(
        mut self,
        name: impl Into<String>,
        expr: impl Into<String>,
        callback: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let name = name.into();
        let expr = expr.into();
        let task_name = name.clone();
        self.tasks.push((
            name,
            Box::new(move |scheduler| scheduler.add_async_task(task_name, &expr, callback)),
        ));
        self
    }

    /// Add a route to the request layer.
    pub fn with_route(
        mut self,
        method: Method,
        path: impl Into<String>,
        handler: MethodRouter<AppState>,
    ) -> Self {
        self.routes.push(ExtraRoute {
            method,
            path: path.into(),
            handler,
        });
        self
    }

    /// Run the startup sequence up to (not including) binding.
    pub fn build(self) -> Result<Application, LifecycleError> {
        let config = match self.source {
            ConfigSource::Named(name) => load_config_named(&name)?,
            ConfigSource::Provided(config) => {
                validate_config(&config).map_err(ConfigError::Validation)?;
                config
            }
        };
        let config = Arc::new(config);

        let mut registry = SingletonRegistry::new();
        services::register_defaults(&mut registry, Arc::clone(&config))?;
        for hook in self.singletons {
            hook(&mut registry)?;
        }
        registry.initialize_all()?;
        tracing::info!(singletons = ?registry.names(), "Singletons initialized");

        let scheduler = registry.get_as::<Scheduler>(services::CRON)?;
        register_startup_tasks(&config, &registry, &scheduler)?;
        for (task, hook) in self.tasks {
            hook(&scheduler).map_err(|source| LifecycleError::Schedule { task, source })?;
        }

        let port = cli::resolve_port(config.server.port, self.port_override);
        let addr = config.socket_addr(port).map_err(|e| {
            ConfigError::Validation(vec![ValidationError {
                field: "server.host",
                message: e.to_string(),
            }])
        })?;

        let registry = Arc::new(registry);
        let state = AppState {
            registry: Arc::clone(&registry),
            scheduler: Arc::clone(&scheduler),
            started_at: Instant::now(),
        };
        let (router, routes) = build_router(&config.server, state, self.routes);
        let server = Arc::new(ServerHandle::new(
            router,
            ServerOptions::from_config(&config.server),
        ));

        tracing::info!(address = %addr, tasks = scheduler.len(), "Startup complete");

        Ok(Application {
            config,
            registry,
            scheduler,
            server,
            addr,
            routes,
        })
    }
}

/// Heartbeat and cache purge.
fn register_startup_tasks(
    config: &AppConfig,
    registry: &SingletonRegistry,
    scheduler: &Scheduler,
) -> Result<(), LifecycleError> {
    let timezone = registry.get_as::<Timezone>(services::TIMEZONE)?;
    scheduler
        .add_named_task("heartbeat", &config.scheduler.heartbeat, move || {
            tracing::info!(time = %timezone.now(), "Scheduler heartbeat");
        })
        .map_err(|source| LifecycleError::Schedule {
            task: "heartbeat".into(),
            source,
        })?;

    let cache = registry.get_as::<Cache>(services::CACHE)?;
    scheduler
        .add_named_task("cache-purge", &config.scheduler.cache_purge, move || {
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "Expired cache entries purged");
            }
        })
        .map_err(|source| LifecycleError::Schedule {
            task: "cache-purge".into(),
            source,
        })?;

    Ok(())
}

/// A fully initialized, not yet bound, service.
#[derive(Debug)]
pub struct Application {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SingletonRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub server: Arc<ServerHandle>,
    /// Address the listener will bind.
    pub addr: SocketAddr,
    pub routes: RouteTable,
}

impl Application {
    /// Deadline for draining connections and running tasks.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.shutdown_timeout_secs)
    }
}
