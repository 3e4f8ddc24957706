pub mod diagnostics;
pub mod health;
pub mod metrics;

use axum::http::Uri;
use service_core::error::AppError;

pub use diagnostics::{database_stats, runtime_stats};
pub use health::{cors_echo, legacy_liveness, liveness};
pub use metrics::metrics;

pub async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(anyhow::anyhow!("No route for {}", uri.path()))
}
