//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! --config <name>
//!     → loader.rs (resolve name, parse TOML)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → registered as the `config` singleton, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_named, ConfigError, DEFAULT_CONFIG_NAME};
pub use validation::{validate_config, ValidationError};
pub use schema::{
    AppConfig, CacheConfig, ListenerErrorPolicy, LogConfig, LogFormat, NotifierConfig,
    ObservabilityConfig, SchedulerConfig, ServerConfig,
};
