//! Configuration management for the Bookshelf server.
//!
//! Loads configuration from environment variables with sensible defaults.
//! `DATABASE_URL` and `JWT_SECRET` are required.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or empty
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    /// A variable could not be parsed
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name
        key: &'static str,
        /// Raw value
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub database: DatabaseConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Token verification
    pub auth: AuthConfig,
    /// Engagement behavior
    pub engagement: EngagementConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// How long to wait for a connection
    pub connect_timeout: Duration,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// How long in-flight requests get after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Maximum request body size in bytes
    pub body_limit: usize,
    /// Origins allowed to make credentialed cross-origin requests
    pub cors_allowed_origins: Vec<String>,
    /// Base URL relative asset paths are resolved against
    pub public_base_url: String,
    /// Whether `/metrics` is served
    pub metrics_enabled: bool,
}

/// Authentication configuration
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Required `iss` claim, if any
    pub jwt_issuer: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .finish()
    }
}

/// Engagement configuration
#[derive(Debug, Clone)]
pub struct EngagementConfig {
    /// Retries for a rating or comment that lost an optimistic-concurrency race
    pub rating_max_retries: usize,
    /// JSON array of catalog entries loaded into an empty catalog at startup
    pub seed_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        Ok(Self {
            database: DatabaseConfig {
                url: vars.required("DATABASE_URL")?,
                max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", 10)?,
                connect_timeout: Duration::from_secs(vars.parse("DATABASE_CONNECT_TIMEOUT", 30)?),
            },
            server: ServerConfig {
                host: vars.string("HOST", "0.0.0.0"),
                port: vars.parse("PORT", 5000)?,
                shutdown_timeout: Duration::from_secs(vars.parse("SHUTDOWN_TIMEOUT", 30)?),
                body_limit: vars.parse("BODY_LIMIT_BYTES", 10 * 1024 * 1024)?,
                cors_allowed_origins: vars
                    .string(
                        "CORS_ALLOWED_ORIGINS",
                        "http://localhost:5173,http://localhost:3000",
                    )
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(String::from)
                    .collect(),
                public_base_url: vars.string("PUBLIC_BASE_URL", "http://localhost:5000"),
                metrics_enabled: vars.flag("METRICS_ENABLED", true)?,
            },
            auth: AuthConfig {
                jwt_secret: vars.required("JWT_SECRET")?,
                jwt_issuer: vars.optional("JWT_ISSUER"),
            },
            engagement: EngagementConfig {
                rating_max_retries: vars.parse("RATING_MAX_RETRIES", 5)?,
                seed_file: vars.optional("SEED_FILE").map(PathBuf::from),
            },
        })
    }
}

/// Variable source with typed accessors.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key).map(|v| v.to_ascii_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(value) => Err(ConfigError::Invalid {
                key,
                value,
                reason: "expected true or false".to_string(),
            }),
        }
    }
}
