use crate::services::probes::{collect_database_report, RuntimeReport};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub async fn database_stats(State(state): State<AppState>) -> impl IntoResponse {
    let health = &state.config.health;
    match collect_database_report(state.db.as_ref(), &health.collections, health.count_timeout)
        .await
    {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Database health probe failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

pub async fn runtime_stats(State(state): State<AppState>) -> Json<RuntimeReport> {
    Json(RuntimeReport::new(
        state.runtime.snapshot(),
        state.config.cors.client_origin.as_deref(),
    ))
}
