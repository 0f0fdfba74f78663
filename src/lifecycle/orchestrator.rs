//! Lifecycle orchestration: bind, run, and shut down in order.
//!
//! # Data Flow
//! ```text
//! initialize(bootstrap)          Init → Starting      (or → Failed)
//! run(app, shutdown)
//!     bind                                            (error → Failed)
//!     scheduler.start, spawn serve  → Running, startup summary
//!     wait: shutdown latch | listener exit
//!     → Stopping, shutdown notice
//!     join(server.shutdown(deadline), scheduler.stop().drain(deadline))
//!     → Stopped
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::console;
use crate::lifecycle::startup::{Application, Bootstrap};
use crate::lifecycle::{LifecycleError, LifecycleState, Shutdown};
use crate::net::ListenError;

/// Drives the process through its lifecycle states.
#[derive(Debug)]
pub struct Orchestrator {
    state: watch::Sender<LifecycleState>,
    console: bool,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(LifecycleState::Init),
            console: true,
        }
    }

    /// Suppress the startup summary and shutdown notice.
    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state();
        if !previous.can_transition_to(next) {
            tracing::warn!(from = %previous, to = %next, "Ignoring invalid lifecycle transition");
            return;
        }
        self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, "Lifecycle transition");
    }

    /// Load configuration, initialize singletons and register startup tasks.
    pub fn initialize(&self, bootstrap: Bootstrap) -> Result<Application, LifecycleError> {
        match bootstrap.build() {
            Ok(app) => {
                self.transition(LifecycleState::Starting);
                Ok(app)
            }
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                self.transition(LifecycleState::Failed);
                Err(e)
            }
        }
    }

    /// Serve until `shutdown` fires or the listener fails, then stop
    /// everything within the configured deadline.
    pub async fn run(&self, app: Application, shutdown: Shutdown) -> Result<(), LifecycleError> {
        let addr = match app.server.bind(app.addr).await {
            Ok(addr) => addr,
            Err(e) => {
                tracing::error!(error = %e, "Bind failed");
                self.transition(LifecycleState::Failed);
                return Err(e.into());
            }
        };

        app.scheduler.start();
        let mut serving = tokio::spawn({
            let server = Arc::clone(&app.server);
            async move { server.serve().await }
        });

        self.transition(LifecycleState::Running);
        if self.console {
            console::print_startup_summary(&app.config, addr, &app.routes);
        }

        let mut fatal: Option<LifecycleError> = None;
        let mut serve_finished = false;
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown requested");
            }
            result = &mut serving => {
                serve_finished = true;
                match result {
                    Ok(Ok(())) => tracing::warn!("Listener exited without a shutdown request"),
                    Ok(Err(e)) => {
                        tracing::error!(error = %e, "Listener failed");
                        fatal = Some(e.into());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Listener task crashed");
                        fatal = Some(ListenError::Crashed(e.to_string()).into());
                    }
                }
            }
        }

        self.transition(LifecycleState::Stopping);
        if self.console {
            console::print_shutdown_notice();
        }

        let deadline = app.shutdown_timeout();
        let scheduler = Arc::clone(&app.scheduler);
        let (server_result, abandoned) = tokio::join!(
            app.server.shutdown(deadline),
            async move { scheduler.stop().await.drain(deadline).await },
        );
        if let Err(e) = server_result {
            tracing::warn!(error = %e, "Server did not drain in time");
        }
        if abandoned > 0 {
            tracing::warn!(abandoned, "Scheduled tasks abandoned at shutdown");
        }

        if !serve_finished {
            match serving.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Listener error during shutdown"),
                Err(e) => tracing::warn!(error = %e, "Listener task crashed during shutdown"),
            }
        }

        self.transition(LifecycleState::Stopped);
        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
