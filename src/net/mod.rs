//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit)
//!     → connection.rs (id, live-connection count)
//!     → Hand off to HTTP layer (http::server)
//!
//! Accept failure
//!     → per-connection: skipped
//!     → listener-level: policy.rs (retry with backoff, or stop serving)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked so shutdown knows what it force-closed

pub mod connection;
pub mod listener;
pub mod policy;

pub use connection::{ConnectionGuard, ConnectionTracker};
pub use listener::{ConnectionPermit, ListenError, Listener};
