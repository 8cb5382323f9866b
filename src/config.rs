//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "auth.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://auth.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// OAuth2 provider configuration
///
/// Static credentials for the single upstream identity provider.
/// All of these are required; an empty client id, client secret, or
/// redirect URI fails startup with a configuration error.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Redirect URI registered with the provider
    pub redirect_uri: String,
    /// Provider authorize endpoint (user-facing redirect target)
    pub authorize_url: String,
    /// Provider token endpoint (code exchange and refresh grants)
    pub token_url: String,
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Store entry TTL in seconds (default: 259200 = 3 days)
    pub store_ttl_seconds: u64,
    /// Client cookie max-age in seconds (default: 86400 = 1 day)
    ///
    /// The cookie may expire before the store entry does.
    pub cookie_ttl_seconds: u64,
    /// Session cookie name
    pub cookie_name: String,
    /// Cookie signing secret (32+ bytes)
    pub cookie_secret: String,
    /// Maximum entries held by the in-memory store (default: 10000)
    pub max_entries: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHRELAY_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("session.store_ttl_seconds", 259_200)?
            .set_default("session.cookie_ttl_seconds", 86_400)?
            .set_default("session.cookie_name", "authrelay_session")?
            .set_default("session.max_entries", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (AUTHRELAY_*)
            .add_source(
                Environment::with_prefix("AUTHRELAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_COOKIE_SECRET_BYTES: usize = 32;

        if self.provider.client_id.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.client_id must not be empty".to_string(),
            ));
        }

        if self.provider.client_secret.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.client_secret must not be empty".to_string(),
            ));
        }

        if self.provider.redirect_uri.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "provider.redirect_uri must not be empty".to_string(),
            ));
        }

        if self.session.cookie_secret.as_bytes().len() < MIN_COOKIE_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "session.cookie_secret must be at least {} bytes",
                MIN_COOKIE_SECRET_BYTES
            )));
        }

        if self.session.store_ttl_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "session.store_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.session.cookie_ttl_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "session.cookie_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
