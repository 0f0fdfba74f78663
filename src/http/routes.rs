//! Default request layer.
//!
//! # Routes
//! - `GET /` service name and version
//! - `GET /ping` liveness probe
//! - `GET /healthz` uptime, scheduled tasks, storage, singletons
//!
//! Embedding programs append their own routes; every route is recorded in
//! a [`RouteTable`] for the startup banner.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::Method;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::registry::SingletonRegistry;
use crate::scheduler::Scheduler;
use crate::services::{self, Storage};

/// State shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<SingletonRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

/// A route added by the embedding program.
pub struct ExtraRoute {
    pub method: Method,
    pub path: String,
    pub handler: MethodRouter<AppState>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<7} {}", self.method.as_str(), self.path)
    }
}

/// Every registered route, in registration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteInfo>,
}

impl RouteTable {
    fn push(&mut self, method: Method, path: &str) {
        self.routes.push(RouteInfo {
            method,
            path: path.to_string(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteInfo> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Build the router with the default routes, `extra` routes and middleware.
#[allow(deprecated)]
pub fn build_router(
    config: &ServerConfig,
    state: AppState,
    extra: Vec<ExtraRoute>,
) -> (Router, RouteTable) {
    let mut table = RouteTable::default();
    let mut router = Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/healthz", get(healthz));
    table.push(Method::GET, "/");
    table.push(Method::GET, "/ping");
    table.push(Method::GET, "/healthz");

    for route in extra {
        table.push(route.method, &route.path);
        router = router.route(&route.path, route.handler);
    }

    let router = router
        .with_state(state)
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId));

    (router, table)
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    uptime_secs: u64,
    scheduled_tasks: usize,
    storage: Option<String>,
    singletons: Vec<String>,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let storage = state
        .registry
        .get_as::<Storage>(services::DB)
        .ok()
        .map(|storage| storage.path().display().to_string());

    Json(Health {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
        scheduled_tasks: state.scheduler.len(),
        storage,
        singletons: state.registry.names().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> AppState {
        let mut registry = SingletonRegistry::new();
        registry
            .register_instance("cron", Arc::new(Scheduler::utc()))
            .unwrap();
        registry.initialize_all().unwrap();
        let scheduler = registry.get_as::<Scheduler>("cron").unwrap();
        AppState {
            registry: Arc::new(registry),
            scheduler,
            started_at: Instant::now(),
        }
    }

    fn extra() -> Vec<ExtraRoute> {
        vec![ExtraRoute {
            method: Method::GET,
            path: "/hello".into(),
            handler: get(|| async { "hello" }),
        }]
    }

    #[test]
    fn table_lists_defaults_then_extras() {
        let (_, table) = build_router(&ServerConfig::default(), state(), extra());
        let paths: Vec<_> = table.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/ping", "/healthz", "/hello"]);
    }

    #[tokio::test]
    async fn ping_sets_request_id() {
        let (router, _) = build_router(&ServerConfig::default(), state(), vec![]);
        let response = router
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn healthz_reports_singletons() {
        let (router, _) = build_router(&ServerConfig::default(), state(), vec![]);
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let health: Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(health["status"], "ok");
        assert_eq!(health["singletons"], json!(["cron"]));
        assert_eq!(health["storage"], Value::Null);
    }
}
