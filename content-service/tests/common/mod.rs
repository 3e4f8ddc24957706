#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, response::Response, Router};
use content_service::config::{ContentConfig, CorsConfig, Environment, HealthConfig, MongoConfig};
use content_service::routes;
use content_service::services::{ConnectionState, DatabaseProbe, OriginAllowlist};
use content_service::startup::{build_router, AppState, Application};
use secrecy::Secret;
use serde_json::{json, Value};
use service_core::config::Config as CoreConfig;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

pub const DEV_ORIGIN: &str = "http://localhost:5173";
pub const PROD_ORIGIN: &str = "https://content.example.app";
pub const EVIL_ORIGIN: &str = "https://evil.example";

pub fn test_config() -> ContentConfig {
    ContentConfig {
        common: CoreConfig {
            port: 0, // Random port
            log_level: "error".to_string(),
        },
        environment: Environment::Dev,
        service_name: "content-test".to_string(),
        mongodb: MongoConfig {
            uri: Secret::new(
                std::env::var("TEST_MONGODB_URI")
                    .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            ),
            database: Some("content_test".to_string()),
            connect_timeout: Duration::from_secs(2),
        },
        cors: CorsConfig {
            client_origin: Some(format!("{}/", PROD_ORIGIN)),
        },
        health: HealthConfig::default(),
        otlp_endpoint: None,
    }
}

/// In-memory stand-in for MongoDB.
///
/// Collections without a configured count fail like a missing namespace would.
pub struct FakeDatabase {
    state: Result<ConnectionState, String>,
    counts: HashMap<String, u64>,
    stats: Option<Value>,
    slow: HashMap<String, Duration>,
    barrier: Option<Arc<Barrier>>,
    pub state_reads: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
}

impl FakeDatabase {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            state: Ok(state),
            counts: HashMap::new(),
            stats: Some(json!({ "db": "content_test", "collections": 3, "objects": 42 })),
            slow: HashMap::new(),
            barrier: None,
            state_reads: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
        }
    }

    /// Connected, with counts for all default probe collections.
    pub fn connected() -> Self {
        Self::new(ConnectionState::Connected)
            .with_count("manufacturers", 12)
            .with_count("garagelevels", 40)
            .with_count("legendstore", 7)
    }

    pub fn disconnected() -> Self {
        Self::new(ConnectionState::Disconnected)
    }

    /// Every operation fails, including reading the connection state.
    pub fn broken(message: &str) -> Self {
        let mut db = Self::new(ConnectionState::Disconnected);
        db.state = Err(message.to_string());
        db.stats = None;
        db
    }

    pub fn with_count(mut self, collection: &str, count: u64) -> Self {
        self.counts.insert(collection.to_string(), count);
        self
    }

    pub fn without_count(mut self, collection: &str) -> Self {
        self.counts.remove(collection);
        self
    }

    pub fn without_stats(mut self) -> Self {
        self.stats = None;
        self
    }

    pub fn with_slow_collection(mut self, collection: &str, delay: Duration) -> Self {
        self.slow.insert(collection.to_string(), delay);
        self
    }

    /// Every count waits until `parties` counts are in flight at once.
    pub fn with_count_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub fn into_probe(self: &Arc<Self>) -> Arc<dyn DatabaseProbe> {
        self.clone()
    }
}

#[async_trait]
impl DatabaseProbe for FakeDatabase {
    fn connection_state(&self) -> Result<ConnectionState, AppError> {
        self.state_reads.fetch_add(1, Ordering::SeqCst);
        self.state
            .clone()
            .map_err(|message| AppError::InternalError(anyhow::anyhow!(message)))
    }

    fn database_name(&self) -> Option<String> {
        Some("content_test".to_string())
    }

    async fn count_collection(&self, name: &str) -> Result<u64, AppError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.slow.get(name) {
            tokio::time::sleep(*delay).await;
        }
        self.counts.get(name).copied().ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("ns does not exist: content_test.{}", name))
        })
    }

    async fn db_stats(&self) -> Result<Value, AppError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .clone()
            .ok_or_else(|| AppError::DatabaseError(anyhow::anyhow!("dbStats not permitted")))
    }
}

pub fn router(db: &Arc<FakeDatabase>) -> Router {
    router_with(test_config(), db)
}

pub fn router_with(config: ContentConfig, db: &Arc<FakeDatabase>) -> Router {
    let origins = Arc::new(OriginAllowlist::resolve(
        config.cors.client_origin.as_deref(),
    ));
    router_with_allowlist(config, db, origins)
}

pub fn router_with_allowlist(
    config: ContentConfig,
    db: &Arc<FakeDatabase>,
    origins: Arc<OriginAllowlist>,
) -> Router {
    let state = AppState::new(config, db.into_probe(), origins);
    build_router(state, routes::api())
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}

pub fn get(uri: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get_from(uri: &str, origin: &str) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .uri(uri)
        .header("Origin", origin)
        .body(Body::empty())
        .unwrap()
}

/// A running server on a random port, backed by a fake database.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: Arc<FakeDatabase>,
}

impl TestApp {
    pub async fn spawn(db: FakeDatabase) -> Self {
        let db = Arc::new(db);
        let probe = db.into_probe();

        let app = Application::build_with(test_config(), routes::api(), async move {
            Ok::<_, AppError>(probe)
        })
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/api/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp { address, port, db }
    }
}
