use crate::config::MongoConfig;
use async_trait::async_trait;
use mongodb::{
    bson::{doc, Bson, Document},
    event::sdam::{
        SdamEventHandler, ServerHeartbeatFailedEvent, ServerHeartbeatSucceededEvent,
        TopologyClosedEvent,
    },
    options::ClientOptions,
    Client as MongoClient, Database,
};
use secrecy::ExposeSecret;
use serde::{Serialize, Serializer};
use service_core::error::AppError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const FALLBACK_DATABASE: &str = "content";

/// Driver connectivity, numbered the way the `mongoState` wire field reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connected = 1,
    Connecting = 2,
    Disconnecting = 3,
}

impl ConnectionState {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ConnectionState {
    type Error = AppError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ConnectionState::Disconnected),
            1 => Ok(ConnectionState::Connected),
            2 => Ok(ConnectionState::Connecting),
            3 => Ok(ConnectionState::Disconnecting),
            other => Err(AppError::InternalError(anyhow::anyhow!(
                "unknown connection state code {}",
                other
            ))),
        }
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// What the health probes need from the database, and nothing more.
#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    /// Current connectivity. An `Err` means the state itself could not be read.
    fn connection_state(&self) -> Result<ConnectionState, AppError>;

    fn database_name(&self) -> Option<String>;

    async fn count_collection(&self, name: &str) -> Result<u64, AppError>;

    /// Database-wide storage statistics, passed through uninterpreted.
    async fn db_stats(&self) -> Result<serde_json::Value, AppError>;
}

/// Follows the driver's server monitors and keeps a [`ConnectionState`] current.
///
/// The state is `connected` while at least one server's last heartbeat
/// succeeded, `disconnected` once every known server has failed one or the
/// client has shut down, and `connecting` until the first verdict.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: AtomicU8,
    reachable: Mutex<HashSet<String>>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Connecting.code()),
            reachable: Mutex::new(HashSet::new()),
        }
    }

    pub fn state(&self) -> Result<ConnectionState, AppError> {
        ConnectionState::try_from(self.state.load(Ordering::Acquire))
    }

    pub fn server_reachable(&self, address: &str) {
        self.reachable_servers().insert(address.to_string());
        self.transition(ConnectionState::Connected);
    }

    pub fn server_unreachable(&self, address: &str) {
        let mut reachable = self.reachable_servers();
        reachable.remove(address);
        if reachable.is_empty() {
            self.transition(ConnectionState::Disconnected);
        }
    }

    pub fn closed(&self) {
        self.reachable_servers().clear();
        self.transition(ConnectionState::Disconnected);
    }

    /// A successful startup ping settles `connecting`; a later heartbeat
    /// verdict is never overridden.
    fn ping_succeeded(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting.code(),
            ConnectionState::Connected.code(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn reachable_servers(&self) -> MutexGuard<'_, HashSet<String>> {
        self.reachable.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.swap(next.code(), Ordering::AcqRel);
        if previous == next.code() {
            return;
        }
        match next {
            ConnectionState::Disconnected => {
                tracing::warn!(previous, "MongoDB connection lost")
            }
            _ => tracing::info!(previous, state = ?next, "MongoDB connection state changed"),
        }
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SdamEventHandler for ConnectionTracker {
    fn handle_server_heartbeat_succeeded_event(&self, event: ServerHeartbeatSucceededEvent) {
        self.server_reachable(&event.server_address.to_string());
    }

    fn handle_server_heartbeat_failed_event(&self, event: ServerHeartbeatFailedEvent) {
        tracing::debug!(server = %event.server_address, error = %event.failure, "MongoDB heartbeat failed");
        self.server_unreachable(&event.server_address.to_string());
    }

    fn handle_topology_closed_event(&self, _event: TopologyClosedEvent) {
        self.closed();
    }
}

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
    tracker: Arc<ConnectionTracker>,
}

impl MongoDb {
    /// Build the client and ping the server, so an unreachable database fails here
    /// rather than on the first request. Errors are returned, not logged; the
    /// startup sequence reports them.
    pub async fn connect(config: &MongoConfig) -> Result<Self, AppError> {
        let tracker = Arc::new(ConnectionTracker::new());

        let mut client_options = ClientOptions::parse(config.uri.expose_secret()).await?;
        client_options.app_name = Some("content-service".to_string());
        client_options.server_selection_timeout = Some(config.connect_timeout);
        client_options.sdam_event_handler = Some(tracker.clone() as Arc<dyn SdamEventHandler>);

        let client = MongoClient::with_options(client_options)?;
        let db = match config.database.as_deref() {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(FALLBACK_DATABASE)),
        };

        tracing::info!(database = %db.name(), "Connecting to MongoDB");

        let mongo = Self { client, db, tracker };
        mongo.health_check().await?;
        mongo.tracker.ping_succeeded();

        tracing::info!(database = %mongo.db.name(), "Successfully connected to MongoDB database");
        Ok(mongo)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseProbe for MongoDb {
    fn connection_state(&self) -> Result<ConnectionState, AppError> {
        self.tracker.state()
    }

    fn database_name(&self) -> Option<String> {
        Some(self.db.name().to_string())
    }

    async fn count_collection(&self, name: &str) -> Result<u64, AppError> {
        let count = self
            .db
            .collection::<Document>(name)
            .estimated_document_count(None)
            .await?;
        Ok(count)
    }

    async fn db_stats(&self) -> Result<serde_json::Value, AppError> {
        let stats = self.db.run_command(doc! { "dbStats": 1 }, None).await?;
        Ok(Bson::Document(stats).into_relaxed_extjson())
    }
}
