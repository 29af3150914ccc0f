#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use jobhub_api::config::ServerConfig;
use jobhub_api::router::build_app_router;
use jobhub_api::state::AppState;
use jobhub_broker::MemoryBroker;
use jobhub_engine::{CallbackRegistry, EngineConfig, FleetRegistry, JobEngine, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        api_token: None,
    }
}

/// The application over an in-memory store and broker.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub broker: Arc<MemoryBroker>,
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

/// Build the full application router with all middleware layers, exactly
/// as `main.rs` does, but with in-memory backends.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let engine_config = EngineConfig::default();

    let engine = JobEngine::new(
        store.clone(),
        store.clone(),
        broker.clone(),
        CallbackRegistry::new(),
        engine_config.clone(),
    );
    let fleet = FleetRegistry::new(store.clone(), engine_config);

    let state = AppState {
        engine: Arc::new(engine),
        fleet: Arc::new(fleet),
        pool: None,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        broker,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(Method::PATCH, uri, Some(body)).await
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Bring a worker online listening on `queues` in the default zone
    /// account.
    pub async fn worker_online(&self, hostname: &str, queues: &[&str]) -> Response<Body> {
        self.post("/api/v1/workers/online", worker_event(hostname, queues))
            .await
    }
}

pub fn worker_event(hostname: &str, queues: &[&str]) -> Value {
    let queues: Vec<Value> = queues.iter().map(|q| json!({ "name": q })).collect();
    json!({
        "hostname": hostname,
        "pid": 100,
        "sw_ident": "py-celery",
        "sw_ver": "5.0.2",
        "sw_sys": "Linux",
        "details": { "queues": queues },
    })
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Log output captured by a subscriber installed with
/// [`CapturedLogs::install`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Capture events on the current thread until the guard is dropped.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn count(&self, message: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .matches(message)
            .count()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
