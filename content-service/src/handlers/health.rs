use crate::middleware::request_origin;
use crate::services::probes::{CorsReport, LivenessReport, NO_ORIGIN};
use crate::startup::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use serde_json::json;

pub const SEEN_ORIGIN_HEADER: &str = "x-seen-origin";

/// Wake/ping liveness. Touches no dependency.
pub async fn liveness() -> Json<LivenessReport> {
    Json(LivenessReport::new())
}

/// Reports the origin this request arrived with next to the effective allowlist.
pub async fn cors_echo(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let seen_origin = request_origin(&headers);

    let mut response_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(seen_origin.as_deref().unwrap_or(NO_ORIGIN)) {
        response_headers.insert(SEEN_ORIGIN_HEADER, value);
    }

    (
        response_headers,
        Json(CorsReport::new(&state.origins, seen_origin.as_deref())),
    )
}

/// Older clients still ping this path.
pub async fn legacy_liveness() -> impl IntoResponse {
    Json(json!({ "status": "alive" }))
}
