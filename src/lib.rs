//! Process bootstrap and lifecycle orchestration for a long-running network service.
//!
//! # Architecture Overview
//!
//! ```text
//!  config ──▶ registry ──▶ scheduler ──▶ http server ──▶ lifecycle
//!  (load,     (ordered     (cron and     (bounded accept,  (Init → Starting →
//!  validate)  singletons)  @every tasks) graceful drain)   Running → Stopping →
//!                                                          Stopped | Failed)
//! ```
//!
//! Default singletons (`services`) cover logging, metrics, timezone, cache,
//! storage, notifications and the scheduler itself; embedding programs add
//! their own through [`lifecycle::Bootstrap`].

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod registry;
pub mod scheduler;
pub mod services;

// Cross-cutting concerns
pub mod cli;
pub mod console;
pub mod lifecycle;
pub mod observability;

pub use config::AppConfig;
pub use http::ServerHandle;
pub use lifecycle::{Bootstrap, LifecycleError, LifecycleState, Orchestrator, Shutdown};
pub use registry::SingletonRegistry;
pub use scheduler::Scheduler;
