//! HTTP server: accept loop, per-connection serving and bounded shutdown.
//!
//! # Responsibilities
//! - Own the bound listener and the request dispatcher (`axum::Router`)
//! - Serve HTTP/1.1 and HTTP/2 (auto-detected) on one task per connection
//! - Apply the listener error policy to accept failures
//! - Stop accepting on shutdown, drain connections, force-close at the deadline
//!
//! # Design Decisions
//! - Serving state travels on a `watch` channel: every connection task sees
//!   `Draining` and `Forced` without a registry of its own
//! - Shutdown is idempotent; only the first call does any work
//! - A fatal accept error drains like a shutdown, bounded by the same deadline

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::config::{ListenerErrorPolicy, ServerConfig};
use crate::net::{policy, ConnectionGuard, ConnectionPermit, ConnectionTracker, ListenError, Listener};
use crate::observability::metrics;

/// Listener settings taken from `[server]`.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_connections: usize,
    pub listener_errors: ListenerErrorPolicy,
    /// Drain bound after a fatal accept error.
    pub shutdown_timeout: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            listener_errors: config.listener_errors,
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Connections were still open when the deadline passed; they were aborted.
    #[error("{in_flight} connection(s) still open after {deadline:?}")]
    Timeout { deadline: Duration, in_flight: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServeSignal {
    Accepting,
    Draining,
    Forced,
}

/// A listener plus dispatcher, serving until shut down.
pub struct ServerHandle {
    router: Router,
    options: ServerOptions,
    signal: watch::Sender<ServeSignal>,
    stopped: watch::Sender<bool>,
    shutdown_requested: AtomicBool,
    serving: AtomicBool,
    listener: tokio::sync::Mutex<Option<Listener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    tracker: ConnectionTracker,
    injected_tx: mpsc::UnboundedSender<io::Error>,
    injected_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<io::Error>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("options", &self.options)
            .field("local_addr", &self.local_addr())
            .field("active_connections", &self.tracker.active_count())
            .finish()
    }
}

impl ServerHandle {
    pub fn new(router: Router, options: ServerOptions) -> Self {
        let (injected_tx, injected_rx) = mpsc::unbounded_channel();
        Self {
            router,
            options,
            signal: watch::Sender::new(ServeSignal::Accepting),
            stopped: watch::Sender::new(false),
            shutdown_requested: AtomicBool::new(false),
            serving: AtomicBool::new(false),
            listener: tokio::sync::Mutex::new(None),
            local_addr: Mutex::new(None),
            tracker: ConnectionTracker::new(),
            injected_tx,
            injected_rx: tokio::sync::Mutex::new(injected_rx),
        }
    }

    /// Bind the listener. Returns the bound address (useful with port 0).
    pub async fn bind(&self, addr: SocketAddr) -> Result<SocketAddr, ListenError> {
        let listener = Listener::bind(addr, self.options.max_connections).await?;
        let bound = listener.local_addr();
        *self.listener.lock().await = Some(listener);
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(bound);
        Ok(bound)
    }

    /// Address of the bound listener, if any.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently open connections.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Hand `error` to the accept loop as if the listener had returned it.
    ///
    /// It goes through the same classification and listener error policy
    /// as a real accept failure.
    pub fn inject_accept_error(&self, error: io::Error) {
        let _ = self.injected_tx.send(error);
    }

    /// Bind then serve.
    pub async fn listen_and_serve(&self, addr: SocketAddr) -> Result<(), ListenError> {
        self.bind(addr).await?;
        self.serve().await
    }

    /// Accept and serve connections until shutdown or a fatal accept error.
    ///
    /// Returns `Ok(())` after a requested shutdown has drained (or aborted)
    /// every connection.
    pub async fn serve(&self) -> Result<(), ListenError> {
        let listener = {
            let mut slot = self.listener.lock().await;
            let listener = slot.take();
            if listener.is_some() {
                self.serving.store(true, Ordering::SeqCst);
            }
            listener
        };
        let Some(listener) = listener else {
            if self.shutdown_requested.load(Ordering::SeqCst) {
                return Ok(());
            }
            return Err(ListenError::NotBound);
        };

        tracing::info!(address = %listener.local_addr(), "HTTP server starting");

        let result = self.accept_loop(&listener).await;
        drop(listener);
        tracing::info!("Listener closed");
        result
    }

    async fn accept_loop(&self, listener: &Listener) -> Result<(), ListenError> {
        let mut signal = self.signal.subscribe();
        let mut injected = self.injected_rx.lock().await;
        let mut connections = JoinSet::new();
        let mut failures = 0u32;

        let result = loop {
            if *signal.borrow_and_update() != ServeSignal::Accepting {
                break Ok(());
            }

            tokio::select! {
                _ = signal.changed() => {}
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::warn!(error = %e, "Connection task panicked");
                        }
                    }
                }
                accepted = next_accept(listener, &mut injected) => match accepted {
                    Ok((stream, peer, permit)) => {
                        failures = 0;
                        let guard = self.tracker.track();
                        tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, "Serving connection");
                        connections.spawn(serve_connection(
                            stream,
                            self.router.clone(),
                            self.signal.subscribe(),
                            permit,
                            guard,
                        ));
                    }
                    Err(e) if e.is_per_connection() => {
                        tracing::debug!(error = %e, "Skipping failed connection");
                    }
                    Err(e) => {
                        failures += 1;
                        match policy::retry_delay(&self.options.listener_errors, failures) {
                            Some(delay) => {
                                tracing::warn!(
                                    error = %e,
                                    attempt = failures,
                                    delay = ?delay,
                                    "Accept failed, retrying"
                                );
                                tokio::select! {
                                    _ = tokio::time::sleep(delay) => {}
                                    _ = signal.changed() => {}
                                }
                            }
                            None => {
                                tracing::error!(error = %e, attempts = failures, "Listener failed");
                                break Err(e);
                            }
                        }
                    }
                },
            }
        };

        if result.is_err() {
            // Nobody requested this drain, so bound it here.
            self.signal.send_if_modified(|signal| {
                let accepting = *signal == ServeSignal::Accepting;
                if accepting {
                    *signal = ServeSignal::Draining;
                }
                accepting
            });
            let force_after_deadline = async {
                tokio::time::sleep(self.options.shutdown_timeout).await;
                tracing::warn!(deadline = ?self.options.shutdown_timeout, "Drain after listener failure timed out");
                self.signal.send_replace(ServeSignal::Forced);
                std::future::pending::<()>().await
            };
            tokio::select! {
                _ = self.drain(connections) => {}
                _ = force_after_deadline => {}
            }
        } else {
            self.drain(connections).await;
        }
        self.stopped.send_replace(true);
        result
    }

    /// Wait for every connection task, aborting them all once forced.
    async fn drain(&self, mut connections: JoinSet<()>) {
        if connections.is_empty() {
            return;
        }
        tracing::info!(connections = connections.len(), "Draining connections");

        let mut signal = self.signal.subscribe();
        loop {
            tokio::select! {
                joined = connections.join_next() => match joined {
                    None => break,
                    Some(Err(e)) if e.is_panic() => {
                        tracing::warn!(error = %e, "Connection task panicked");
                    }
                    Some(_) => {}
                },
                _ = wait_for_signal(&mut signal, ServeSignal::Forced) => {
                    let aborted = connections.len();
                    connections.abort_all();
                    while connections.join_next().await.is_some() {}
                    tracing::warn!(aborted, "Connections force-closed");
                    break;
                }
            }
        }
    }

    /// Stop accepting, drain connections, and abort what remains after `deadline`.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("Server already shut down");
            return Ok(());
        }

        tracing::info!(deadline = ?deadline, "Server shutting down");
        self.signal.send_replace(ServeSignal::Draining);

        // Bound but never served: closing the listener is all there is to do.
        if self.listener.lock().await.take().is_some() {
            self.stopped.send_replace(true);
            metrics::record_shutdown("graceful");
            tracing::info!("Listener closed before serving");
            return Ok(());
        }
        if !self.serving.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut stopped = self.stopped.subscribe();
        if tokio::time::timeout(deadline, wait_stopped(&mut stopped))
            .await
            .is_ok()
        {
            metrics::record_shutdown("graceful");
            tracing::info!("Server stopped gracefully");
            return Ok(());
        }

        let in_flight = self.tracker.active_count() as usize;
        self.signal.send_replace(ServeSignal::Forced);
        wait_stopped(&mut stopped).await;
        metrics::record_shutdown("forced");
        tracing::warn!(in_flight, deadline = ?deadline, "Server shutdown deadline exceeded");

        Err(ShutdownError::Timeout {
            deadline,
            in_flight,
        })
    }
}

async fn serve_connection(
    stream: TcpStream,
    router: Router,
    mut signal: watch::Receiver<ServeSignal>,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
) {
    let builder = auto::Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!(connection_id = %guard.id(), error = %e, "Connection error");
                }
                break;
            }
            _ = wait_for_signal(&mut signal, ServeSignal::Draining), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// The next accepted connection, or an injected accept failure.
async fn next_accept(
    listener: &Listener,
    injected: &mut mpsc::UnboundedReceiver<io::Error>,
) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenError> {
    tokio::select! {
        biased;
        Some(error) = injected.recv() => Err(ListenError::Accept(error)),
        accepted = listener.accept() => accepted,
    }
}

/// Resolves once the signal reaches `at_least` (or the sender is gone).
async fn wait_for_signal(signal: &mut watch::Receiver<ServeSignal>, at_least: ServeSignal) {
    let _ = signal
        .wait_for(|current| match at_least {
            ServeSignal::Forced => *current == ServeSignal::Forced,
            _ => *current != ServeSignal::Accepting,
        })
        .await;
}

async fn wait_stopped(stopped: &mut watch::Receiver<bool>) {
    let _ = stopped.wait_for(|stopped| *stopped).await;
}
