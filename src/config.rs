//! Configuration management for image-service
//!
//! Loads configuration from environment variables. Connection parameters are
//! required; the process does not start without them. Cosmetic values fall
//! back to defaults.

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub amqp: AmqpConfig,
    pub s3: S3Config,
    pub traffic_rules_path: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AmqpConfig {
    /// Full AMQP address, e.g. `amqp://127.0.0.1:5672/%2f`
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: Option<String>,
    /// Base URL the read path redirects to, prepended to storage keys.
    pub public_base_path: String,
}

/// A required environment variable was missing at startup
#[derive(Debug, thiserror::Error)]
#[error("required environment variable {0} is not set")]
pub struct MissingEnvVar(&'static str);

fn required(name: &'static str) -> Result<String, MissingEnvVar> {
    std::env::var(name).map_err(|_| MissingEnvVar(name))
}

impl Config {
    /// Load the full serving-tier configuration from environment variables
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(Config {
            app: AppConfig {
                host: std::env::var("IMAGE_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("IMAGE_SERVICE_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig::from_env()?,
            amqp: AmqpConfig::from_env()?,
            s3: S3Config::from_env()?,
            traffic_rules_path: std::env::var("TRAFFIC_RULES_PATH").ok(),
        })
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(DatabaseConfig {
            url: required("DATABASE_URL")?,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        })
    }
}

impl AmqpConfig {
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(AmqpConfig {
            address: required("AMQP_ADDRESS")?,
        })
    }
}

impl S3Config {
    pub fn from_env() -> Result<Self, MissingEnvVar> {
        Ok(S3Config {
            bucket: required("S3_BUCKET")?,
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: required("S3_KEY_ID")?,
            secret_access_key: required("S3_ACCESS_KEY")?,
            endpoint: std::env::var("S3_ENDPOINT").ok(),
            public_base_path: required("S3_PUBLIC_BASE_PATH")?,
        })
    }
}
