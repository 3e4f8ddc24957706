use content_service::config::ContentConfig;
use content_service::services::init_metrics;
use content_service::services::runtime::{process_started_at, TrackingAllocator};
use content_service::startup::{shutdown_signal, Bootstrap};
use service_core::error::AppError;
use service_core::observability::init_tracing;

#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    process_started_at();

    // Load configuration - fail fast if invalid
    let config = ContentConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting content service"
    );

    match Bootstrap::start(config).await {
        Bootstrap::Listening(app) => {
            if let Err(e) = app.run_until_stopped().await {
                tracing::error!(error = %e, "Unexpected error");
            }
        }
        Bootstrap::Failed(_) => {
            // No listener exists; stay alive until the supervisor stops us.
            shutdown_signal().await;
        }
    }

    Ok(())
}
