//! Route mount table.
//!
//! Domain routers (blueprints, manufacturers, garage levels, ...) live outside
//! this crate's core and are nested under [`API_PREFIX`] after the probe
//! routes. They must not register paths the probes already own
//! (`/health`, `/health/*`, `/test`).

use crate::startup::AppState;
use axum::Router;

pub const API_PREFIX: &str = "/api";

/// Domain routes served under `/api`. Empty until domain handlers are mounted.
pub fn api() -> Router<AppState> {
    Router::new()
}

pub fn mount(router: Router<AppState>, domain: Router<AppState>) -> Router<AppState> {
    router.nest(API_PREFIX, domain)
}
