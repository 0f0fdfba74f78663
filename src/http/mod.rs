//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::listener)
//!     → server.rs (hyper auto HTTP/1.1 + HTTP/2, drain on shutdown)
//!     → request.rs (request ID)
//!     → routes.rs (default routes + embedding program's routes)
//!     → Send to client
//! ```

pub mod request;
pub mod routes;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use routes::{build_router, AppState, ExtraRoute, RouteInfo, RouteTable};
pub use server::{ServerHandle, ServerOptions, ShutdownError};
