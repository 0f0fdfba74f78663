//! OS signal handling.
//!
//! # Responsibilities
//! - Register termination handlers (SIGTERM, SIGINT; Ctrl-C off Unix)
//! - Translate the first signal into a shutdown trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers stay registered after the first signal, so repeats are
//!   absorbed and logged instead of killing the process mid-drain

use std::io;

use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Registered termination signal handlers.
pub struct TerminationSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl TerminationSignals {
    pub fn install() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sigint: signal(SignalKind::interrupt())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next termination signal; returns its name.
    pub async fn recv(&mut self) -> io::Result<&'static str> {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.sigterm.recv() => Ok("SIGTERM"),
                _ = self.sigint.recv() => Ok("SIGINT"),
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await?;
            Ok("ctrl-c")
        }
    }
}

/// Trigger `shutdown` on the first termination signal and log any repeats.
pub fn spawn_signal_listener(shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
    let mut signals = TerminationSignals::install()?;

    Ok(tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(signal) if shutdown.trigger() => {
                    tracing::info!(signal, "Termination signal received");
                }
                Ok(signal) => {
                    tracing::warn!(signal, "Already shutting down, signal ignored");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Signal handler failed");
                    shutdown.trigger();
                    return;
                }
            }
        }
    }))
}
