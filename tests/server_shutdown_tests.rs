//! Listener / server shutdown behaviour.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use service_bootstrap::config::ListenerErrorPolicy;
use service_bootstrap::http::{ServerHandle, ServerOptions, ShutdownError};

mod common;

fn router() -> Router {
    Router::new()
        .route("/ping", get(|| async { "pong" }))
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "done"
            }),
        )
        .route(
            "/brief",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                "done"
            }),
        )
}

fn options() -> ServerOptions {
    ServerOptions {
        max_connections: 16,
        listener_errors: ListenerErrorPolicy::Shutdown,
        shutdown_timeout: Duration::from_secs(5),
    }
}

async fn spawn_server() -> (Arc<ServerHandle>, std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let server = Arc::new(ServerHandle::new(router(), options()));
    let addr = server.bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve().await.unwrap() }
    });
    (server, addr, serving)
}

#[tokio::test]
async fn double_shutdown_is_harmless() {
    let (server, addr, serving) = spawn_server().await;
    let client = common::client();
    assert_eq!(
        client.get(format!("http://{addr}/ping")).send().await.unwrap().status(),
        200
    );

    server.shutdown(Duration::from_secs(2)).await.unwrap();
    server.shutdown(Duration::from_secs(2)).await.unwrap();
    serving.await.unwrap();
}

#[tokio::test]
async fn in_flight_request_completes_within_deadline() {
    let (server, addr, serving) = spawn_server().await;
    let request = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/brief"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    });
    while server.active_connections() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the request line reach the handler.
    tokio::time::sleep(Duration::from_millis(100)).await;

    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(request.await.unwrap(), "done");
    serving.await.unwrap();
}

#[tokio::test]
async fn deadline_shorter_than_request_times_out() {
    let (server, addr, serving) = spawn_server().await;
    let request = tokio::spawn(async move {
        common::client().get(format!("http://{addr}/slow")).send().await
    });
    while server.active_connections() == 0 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    // Let the request line reach the handler.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    let err = server.shutdown(Duration::from_millis(500)).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));
    match err {
        ShutdownError::Timeout { deadline, in_flight } => {
            assert_eq!(deadline, Duration::from_millis(500));
            assert_eq!(in_flight, 1);
        }
    }

    assert!(request.await.unwrap().is_err());
    serving.await.unwrap();
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn listen_and_serve_rejects_busy_port() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let server = ServerHandle::new(router(), options());
    let err = server
        .listen_and_serve(taken.local_addr().unwrap())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed to bind"));
}
