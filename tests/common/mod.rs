//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use service_bootstrap::http::ServerHandle;
use service_bootstrap::lifecycle::{Bootstrap, LifecycleError, LifecycleState, Orchestrator, Shutdown};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Minimal configuration: loopback, ephemeral port, storage inside `dir`.
pub fn config_toml(dir: &Path, shutdown_timeout_secs: u64) -> String {
    format!(
        r#"
db_path = '{db}'
timezone = "UTC"

[server]
host = "127.0.0.1"
port = 0
shutdown_timeout_secs = {shutdown_timeout_secs}

[log]
level = "debug"
"#,
        db = dir.join("service.db").display()
    )
}

/// Write `contents` to `<dir>/<name>.toml` and return the source name without extension.
pub fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(format!("{name}.toml"));
    std::fs::write(&path, contents).unwrap();
    dir.path().join(name)
}

/// A service running on a background task.
pub struct RunningService {
    pub addr: SocketAddr,
    pub server: Arc<ServerHandle>,
    pub shutdown: Shutdown,
    pub orchestrator: Arc<Orchestrator>,
    pub handle: JoinHandle<Result<(), LifecycleError>>,
}

/// Initialize and run `bootstrap`, returning once it is `Running`.
pub async fn start(bootstrap: Bootstrap) -> RunningService {
    let orchestrator = Arc::new(Orchestrator::new().quiet());
    let app = orchestrator.initialize(bootstrap).unwrap();
    let server = Arc::clone(&app.server);
    let shutdown = Shutdown::new();

    let handle = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let shutdown = shutdown.clone();
        async move { orchestrator.run(app, shutdown).await }
    });

    let mut states = orchestrator.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == LifecycleState::Running),
    )
    .await
    .expect("service did not reach Running")
    .map(|_| ())
    .unwrap();

    RunningService {
        addr: server.local_addr().unwrap(),
        server,
        shutdown,
        orchestrator,
        handle,
    }
}

/// HTTP client that never reuses connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
