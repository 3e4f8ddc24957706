use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Collections counted by `GET /api/health/db` unless `HEALTH_COLLECTIONS` says otherwise.
pub const DEFAULT_HEALTH_COLLECTIONS: [&str; 3] = ["manufacturers", "garagelevels", "legendstore"];

#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub mongodb: MongoConfig,
    pub cors: CorsConfig,
    pub health: HealthConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    /// Falls back to the database named in the URI, then to `content`.
    pub database: Option<String>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Raw `CLIENT_ORIGIN` value; trailing slashes are stripped when the allowlist is built.
    pub client_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    pub collections: Vec<String>,
    /// Deadline for each collection count. `None` leaves it to the driver.
    pub count_timeout: Option<Duration>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            collections: DEFAULT_HEALTH_COLLECTIONS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            count_timeout: None,
        }
    }
}

impl ContentConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Loads .env, configuration file, APP__ variables and PORT.
        let common_config = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        Ok(ContentConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("content"), is_prod)?,
            mongodb: MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: optional_env("MONGODB_DATABASE"),
                connect_timeout: Duration::from_millis(parse_millis(
                    "MONGODB_CONNECT_TIMEOUT_MS",
                    &get_env("MONGODB_CONNECT_TIMEOUT_MS", Some("10000"), false)?,
                )?),
            },
            cors: CorsConfig {
                client_origin: optional_env("CLIENT_ORIGIN"),
            },
            health: HealthConfig {
                collections: match optional_env("HEALTH_COLLECTIONS") {
                    Some(raw) => parse_collections(&raw),
                    None => HealthConfig::default().collections,
                },
                count_timeout: optional_env("HEALTH_COUNT_TIMEOUT_MS")
                    .map(|raw| parse_millis("HEALTH_COUNT_TIMEOUT_MS", &raw))
                    .transpose()?
                    .map(Duration::from_millis),
            },
            otlp_endpoint: optional_env("OTLP_ENDPOINT"),
        })
    }

    pub fn port(&self) -> u16 {
        self.common.port
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Split a comma-separated collection list, dropping blanks and repeats.
pub fn parse_collections(raw: &str) -> Vec<String> {
    let mut collections: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !collections.iter().any(|c| c == name) {
            collections.push(name.to_string());
        }
    }
    collections
}

fn parse_millis(key: &str, raw: &str) -> Result<u64, AppError> {
    raw.trim().parse().map_err(|e: std::num::ParseIntError| {
        AppError::ConfigError(anyhow::anyhow!("{} must be a number of milliseconds: {}", key, e))
    })
}

/// Unset and empty are the same thing here.
fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match optional_env(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
