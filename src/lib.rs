//! AuthRelay - A lightweight OAuth2 session proxy server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Session lifecycle endpoints                              │
//! │  - Metrics endpoint                                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Session Layer                             │
//! │  - Lifecycle state machine (login/validate/refresh/logout)  │
//! │  - TTL session store                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Provider Layer                            │
//! │  - OAuth2 token endpoint client (reqwest)                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for the session lifecycle
//! - `auth`: Cookie sealing and authentication middleware
//! - `session`: Session store and lifecycle manager
//! - `provider`: OAuth2 provider client
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod session;

use std::sync::Arc;

use crate::provider::{HttpProviderClient, ProviderClient};
use crate::session::{MemorySessionStore, SessionManager, SessionStore};

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the provider client and session manager.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// OAuth2 provider client
    pub provider: Arc<dyn ProviderClient>,

    /// Session lifecycle manager
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the provider client from static configuration
    /// 2. Initialize the in-memory session store
    /// 3. Wire up the session manager
    ///
    /// # Errors
    /// Returns error if the provider configuration is invalid
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let provider: Arc<dyn ProviderClient> =
            Arc::new(HttpProviderClient::new(config.provider.clone())?);
        tracing::info!("Provider client initialized");

        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(
            std::time::Duration::from_secs(config.session.store_ttl_seconds),
            config.session.max_entries,
        ));
        tracing::info!(
            ttl_seconds = config.session.store_ttl_seconds,
            max_entries = config.session.max_entries,
            "Session store initialized"
        );

        Ok(Self::with_collaborators(config, provider, store))
    }

    /// Assemble state from explicit collaborators.
    ///
    /// Shared by the binary and the test harness, which injects a stub
    /// provider in place of the remote endpoints.
    pub fn with_collaborators(
        config: config::AppConfig,
        provider: Arc<dyn ProviderClient>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(provider.clone(), store));

        Self {
            config: Arc::new(config),
            provider,
            sessions,
        }
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::session_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if !server.protocol.eq_ignore_ascii_case("https") {
        return CorsLayer::permissive();
    }

    let allowed_origin = server.base_url();
    match HeaderValue::from_str(&allowed_origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin([origin])
            .allow_methods(Any)
            .allow_headers(Any),
        Err(error) => {
            tracing::error!(
                %error,
                origin = %allowed_origin,
                "Failed to parse CORS origin from server base URL; denying cross-origin requests"
            );
            CorsLayer::new().allow_methods(Any).allow_headers(Any)
        }
    }
}

async fn health_check() -> &'static str {
    "OK"
}
