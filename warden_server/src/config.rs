//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::net::{IpAddr, SocketAddr};

use warden::WardenConfig;
use warden::db::DatabaseConfig;
use warden::identity::ProviderConfig;
use warden::risk::geo::DEFAULT_GEOLOCATION_URL;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const MIN_SECRET_LENGTH: usize = 32;
const MIN_PEPPER_LENGTH: usize = 16;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration, `None` when running against the in-memory store
    pub database: Option<DatabaseConfig>,
    /// Security configuration
    pub security: SecurityConfig,
    /// Frontend origin, used for emailed links and post-login redirects
    pub frontend_url: String,
    /// Mark cookies `Secure`
    pub cookie_secure: bool,
    pub geolocation: GeolocationConfig,
    pub providers: ProvidersConfig,
    /// Timeout applied to outbound HTTP calls
    pub http_timeout_secs: u64,
    /// Capacity of the outbound mail queue
    pub mail_queue_capacity: usize,
    /// Reverse proxies whose forwarding headers are honored
    pub trusted_proxies: Vec<IpAddr>,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Access credential signing secret (required)
    pub access_token_secret: String,
    /// Refresh credential signing secret (required, distinct from the access secret)
    pub refresh_token_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Revoke a session when a stale refresh credential is replayed against it
    pub revoke_on_refresh_mismatch: bool,
}

#[derive(Debug, Clone)]
pub struct GeolocationConfig {
    pub enabled: bool,
    pub url: String,
}

/// Identity providers with complete credentials
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    pub google: Option<ProviderConfig>,
    pub github: Option<ProviderConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `memory` - Use the in-memory store instead of PostgreSQL
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        memory: bool,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(
            |key| std::env::var(key).ok(),
            bind_override,
            database_url_override,
            memory,
        )
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(
        lookup: F,
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        memory: bool,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match bind_override {
            Some(bind) => bind,
            None => {
                let raw = lookup("SERVER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("Not a socket address: {raw}"),
                })?
            }
        };

        let database = if memory {
            None
        } else {
            let database_url = database_url_override
                .or_else(|| lookup("DATABASE_URL"))
                .ok_or_else(|| ConfigError::MissingRequired {
                    var: "DATABASE_URL".to_string(),
                    hint: "Pass --db-url, or --memory for a throwaway in-memory store".to_string(),
                })?;

            Some(DatabaseConfig {
                database_url,
                max_connections: parse_env_or(&lookup, "DB_MAX_CONNECTIONS", 20),
                min_connections: parse_env_or(&lookup, "DB_MIN_CONNECTIONS", 2),
                connection_timeout_secs: parse_env_or(&lookup, "DB_CONNECTION_TIMEOUT", 10),
                idle_timeout_secs: parse_env_or(&lookup, "DB_IDLE_TIMEOUT", 600),
                max_lifetime_secs: parse_env_or(&lookup, "DB_MAX_LIFETIME", 1800),
            })
        };

        // Security configuration (REQUIRED)
        let access_token_secret =
            lookup("ACCESS_TOKEN_SECRET").ok_or_else(|| ConfigError::MissingRequired {
                var: "ACCESS_TOKEN_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 32".to_string(),
            })?;

        let refresh_token_secret =
            lookup("REFRESH_TOKEN_SECRET").ok_or_else(|| ConfigError::MissingRequired {
                var: "REFRESH_TOKEN_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 32".to_string(),
            })?;

        let password_pepper =
            lookup("PASSWORD_PEPPER").ok_or_else(|| ConfigError::MissingRequired {
                var: "PASSWORD_PEPPER".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let security = SecurityConfig {
            access_token_secret,
            refresh_token_secret,
            password_pepper,
            revoke_on_refresh_mismatch: parse_env_or(&lookup, "REVOKE_ON_REFRESH_MISMATCH", true),
        };

        let frontend_url = lookup("FRONTEND_URL")
            .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let geolocation = GeolocationConfig {
            enabled: parse_env_or(&lookup, "GEOLOCATION_ENABLED", true),
            url: lookup("GEOLOCATION_URL").unwrap_or_else(|| DEFAULT_GEOLOCATION_URL.to_string()),
        };

        let providers = ProvidersConfig {
            google: provider_from(&lookup, "GOOGLE"),
            github: provider_from(&lookup, "GITHUB"),
        };

        let trusted_proxies = match lookup("TRUSTED_PROXIES") {
            Some(raw) => parse_ip_list(&raw).map_err(|bad| ConfigError::Invalid {
                var: "TRUSTED_PROXIES".to_string(),
                reason: format!("Not an IP address: {bad}"),
            })?,
            None => Vec::new(),
        };

        let config = ServerConfig {
            bind,
            database,
            security,
            cookie_secure: parse_env_or(&lookup, "COOKIE_SECURE", frontend_url.starts_with("https://")),
            frontend_url,
            geolocation,
            providers,
            http_timeout_secs: parse_env_or(&lookup, "HTTP_TIMEOUT_SECS", 10),
            mail_queue_capacity: parse_env_or(&lookup, "MAIL_QUEUE_CAPACITY", 256),
            trusted_proxies,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.access_token_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid {
                var: "ACCESS_TOKEN_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.refresh_token_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.access_token_secret == self.security.refresh_token_secret {
            return Err(ConfigError::Invalid {
                var: "REFRESH_TOKEN_SECRET".to_string(),
                reason: "Must differ from ACCESS_TOKEN_SECRET".to_string(),
            });
        }

        if self.security.password_pepper.len() < MIN_PEPPER_LENGTH {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if !(self.frontend_url.starts_with("http://") || self.frontend_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid {
                var: "FRONTEND_URL".to_string(),
                reason: "Must be an http(s) origin".to_string(),
            });
        }

        if self.mail_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "MAIL_QUEUE_CAPACITY".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Core configuration derived from the server settings
    pub fn warden_config(&self) -> WardenConfig {
        let mut config = WardenConfig::new(
            self.security.access_token_secret.clone(),
            self.security.refresh_token_secret.clone(),
            self.security.password_pepper.clone(),
        );
        config.frontend_url = self.frontend_url.clone();
        config.revoke_on_refresh_mismatch = self.security.revoke_on_refresh_mismatch;
        config
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// A provider is only configured when id, secret and redirect URL are all set
fn provider_from<F>(lookup: &F, prefix: &str) -> Option<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |suffix: &str| lookup(&format!("{prefix}_{suffix}")).filter(|v| !v.is_empty());

    Some(ProviderConfig {
        client_id: non_empty("CLIENT_ID")?,
        client_secret: non_empty("CLIENT_SECRET")?,
        redirect_url: non_empty("REDIRECT_URL")?,
    })
}

/// Comma-separated IP addresses; the first unparsable entry is returned as the error
fn parse_ip_list(raw: &str) -> Result<Vec<IpAddr>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse().map_err(|_| entry.to_string()))
        .collect()
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
