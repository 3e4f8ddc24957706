//! Health probe payloads.
//!
//! Every probe returns a flat record with a top-level `ok` flag. Only the
//! database probe touches a dependency, and only a failure to read the
//! connectivity state escapes it as an error; per-collection and stats
//! failures are folded into `null` entries.

use crate::services::database::{ConnectionState, DatabaseProbe};
use crate::services::origins::OriginAllowlist;
use crate::services::runtime::RuntimeSnapshot;
use futures::future::join_all;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Name reported by the liveness probe.
pub const SERVICE_LABEL: &str = "content";

/// Reported as the seen origin when the request carried no `Origin` header.
pub const NO_ORIGIN: &str = "(none)";

const RUNTIME_IDENTITY: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
pub struct LivenessReport {
    pub ok: bool,
    pub service: &'static str,
}

impl LivenessReport {
    pub fn new() -> Self {
        Self {
            ok: true,
            service: SERVICE_LABEL,
        }
    }
}

impl Default for LivenessReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsReport {
    pub ok: bool,
    pub allowed_origins: Vec<String>,
    pub seen_origin: String,
}

impl CorsReport {
    pub fn new(allowlist: &OriginAllowlist, seen_origin: Option<&str>) -> Self {
        Self {
            ok: true,
            allowed_origins: allowlist.as_slice().to_vec(),
            seen_origin: seen_origin.unwrap_or(NO_ORIGIN).to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    pub ok: bool,
    pub mongo_state: ConnectionState,
    pub db_name: Option<String>,
    /// `None` means the count was unavailable, never zero.
    pub counts: BTreeMap<String, Option<u64>>,
    pub stats: Option<serde_json::Value>,
}

/// Count every collection concurrently, then read storage stats.
///
/// Nothing is queried unless the connection reports `connected`. All counts
/// settle before stats are requested, and none of them is abandoned unless
/// `count_timeout` elapses for it.
pub async fn collect_database_report(
    db: &dyn DatabaseProbe,
    collections: &[String],
    count_timeout: Option<Duration>,
) -> Result<DatabaseReport, AppError> {
    let mongo_state = db.connection_state()?;
    let db_name = db.database_name();

    if mongo_state != ConnectionState::Connected {
        tracing::debug!(state = ?mongo_state, "Database not connected; skipping counts");
        return Ok(DatabaseReport {
            ok: true,
            mongo_state,
            db_name,
            counts: BTreeMap::new(),
            stats: None,
        });
    }

    let counts = join_all(collections.iter().map(|name| async move {
        (name.clone(), count_collection(db, name, count_timeout).await)
    }))
    .await
    .into_iter()
    .collect();

    let stats = match db.db_stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            tracing::warn!(error = %e, "Database stats unavailable");
            None
        }
    };

    Ok(DatabaseReport {
        ok: true,
        mongo_state,
        db_name,
        counts,
        stats,
    })
}

async fn count_collection(
    db: &dyn DatabaseProbe,
    name: &str,
    count_timeout: Option<Duration>,
) -> Option<u64> {
    let counting = db.count_collection(name);
    let result = match count_timeout {
        Some(limit) => match tokio::time::timeout(limit, counting).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    collection = %name,
                    timeout = ?limit,
                    "Collection count timed out"
                );
                return None;
            }
        },
        None => counting.await,
    };

    match result {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(collection = %name, error = %e, "Collection count unavailable");
            None
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeReport {
    pub ok: bool,
    #[serde(rename = "node")]
    pub runtime: &'static str,
    pub uptime_sec: u64,
    /// `None` when the figure could not be read, never zero.
    #[serde(rename = "rssMB")]
    pub rss_mb: Option<u64>,
    #[serde(rename = "heapUsedMB")]
    pub heap_used_mb: Option<u64>,
    pub cwd: String,
    pub env_client_origin: Option<String>,
}

impl RuntimeReport {
    pub fn new(snapshot: RuntimeSnapshot, client_origin: Option<&str>) -> Self {
        Self {
            ok: true,
            runtime: RUNTIME_IDENTITY,
            uptime_sec: snapshot.uptime_secs,
            rss_mb: snapshot.rss_mb(),
            heap_used_mb: snapshot.heap_used_mb(),
            cwd: std::env::current_dir()
                .map(|dir| dir.display().to_string())
                .unwrap_or_default(),
            env_client_origin: client_origin.map(str::to_string),
        }
    }
}
