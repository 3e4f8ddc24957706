//! Cross-origin gating.
//!
//! Two layers cooperate: [`origin_gate`] rejects requests whose declared
//! origin is not on the allowlist before anything else runs, and
//! [`cors_layer`] echoes the permission headers for the ones that pass,
//! answering preflight requests itself. Requests without an `Origin` header
//! (curl, server-to-server, same-origin tooling) always pass.

use crate::services::origins::OriginAllowlist;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
    Method::HEAD,
];

pub const ALLOWED_HEADERS: [HeaderName; 2] = [header::CONTENT_TYPE, header::AUTHORIZATION];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorsDecision<'a> {
    /// No `Origin` header at all.
    NoOrigin,
    Allowed(&'a str),
    Blocked(&'a str),
}

impl CorsDecision<'_> {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, CorsDecision::Blocked(_))
    }
}

/// Decide whether a request with this declared origin may proceed.
///
/// Absent origin allows, listed origin allows, anything else is blocked. The
/// HTTP method plays no part, so preflights are judged like any other request.
pub fn evaluate_origin<'a>(origin: Option<&'a str>, allowlist: &OriginAllowlist) -> CorsDecision<'a> {
    match origin {
        None => CorsDecision::NoOrigin,
        Some(origin) if allowlist.contains(origin) => CorsDecision::Allowed(origin),
        Some(origin) => CorsDecision::Blocked(origin),
    }
}

/// Rejection for an origin missing from the allowlist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("CORS blocked: {0}")]
pub struct OriginBlocked(pub String);

impl IntoResponse for OriginBlocked {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Request origin as sent by the client, if any. An empty `Origin` header
/// counts as absent. Non-UTF-8 bytes are replaced rather than treated as a
/// missing header.
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::ORIGIN)
        .filter(|value| !value.is_empty())
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

pub async fn origin_gate(
    State(allowlist): State<Arc<OriginAllowlist>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = request_origin(req.headers());

    if let CorsDecision::Blocked(blocked) = evaluate_origin(origin.as_deref(), &allowlist) {
        tracing::warn!(
            origin = %blocked,
            method = %req.method(),
            uri = %req.uri(),
            "CORS blocked"
        );
        return OriginBlocked(blocked.to_string()).into_response();
    }

    next.run(req).await
}

/// Header-echo half of the policy: credentials allowed, explicit methods and headers.
pub fn cors_layer(allowlist: &OriginAllowlist) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowlist
        .as_slice()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
}
