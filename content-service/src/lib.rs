pub mod config;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application, Bootstrap, BootstrapPhase};
