use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;

/// Port the API binds when neither `PORT` nor `APP__PORT` is set.
pub const DEFAULT_PORT: u16 = 3002;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        // Hosting platforms hand the port over as a bare `PORT`; an empty value counts as unset.
        let port_override = env::var("PORT").ok().filter(|p| !p.trim().is_empty());
        let log_level = env::var("LOG_LEVEL").ok().filter(|l| !l.trim().is_empty());

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .set_override_option("port", port_override)?
            .set_override_option("log_level", log_level)?
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
