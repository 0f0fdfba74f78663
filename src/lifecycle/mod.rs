//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Initialize singletons → Register tasks → Build server
//!
//! Run (orchestrator.rs):
//!     Bind → Start scheduler → Serve → wait for termination
//!
//! Shutdown (orchestrator.rs, shutdown.rs):
//!     Signal received → Stop accepting → Drain connections and tasks → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then singletons, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Shutdown has timeout: forced close after deadline
//! - Work abandoned at the deadline does not delay process exit
//! - States are published on a watch channel (see [`LifecycleState`])

pub mod error;
pub mod orchestrator;
pub mod runtime;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use error::LifecycleError;
pub use orchestrator::Orchestrator;
pub use runtime::block_on_then_release;
pub use shutdown::Shutdown;
pub use signals::spawn_signal_listener;
pub use startup::{Application, Bootstrap, StartupOptions};
pub use state::LifecycleState;
