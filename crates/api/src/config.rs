//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CARNET_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//!
//! ## Optional
//! - `CARNET_HOST` - Bind address (default: 127.0.0.1)
//! - `CARNET_PORT` - Listen port (default: 3000)
//! - `CARNET_GEOCODING_URL` - Geocoding API base URL
//!   (default: <https://api-adresse.data.gouv.fr>)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

/// Default base URL of the BAN geocoding API.
pub const DEFAULT_GEOCODING_URL: &str = "https://api-adresse.data.gouv.fr";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Geocoding API configuration
    pub geocoding: GeocodingConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Geocoding API configuration.
#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    /// Base URL of the search endpoint host.
    pub base_url: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOCODING_URL.to_owned(),
        }
    }
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CARNET_DATABASE_URL")?;
        let host = get_env_or_default("CARNET_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("CARNET_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("CARNET_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("CARNET_PORT".to_string(), e.to_string()))?;

        let geocoding = GeocodingConfig {
            base_url: get_env_or_default("CARNET_GEOCODING_URL", DEFAULT_GEOCODING_URL),
        };
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            database_url,
            host,
            port,
            geocoding,
            sentry_dsn,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = ApiConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            geocoding: GeocodingConfig::default(),
            sentry_dsn: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_geocoding_default_base_url() {
        let config = GeocodingConfig::default();
        assert_eq!(config.base_url, "https://api-adresse.data.gouv.fr");
    }
}
