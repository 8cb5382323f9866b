//! Common test utilities for E2E tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::net::TcpListener;
use url::Url;

use authrelay::error::AppError;
use authrelay::provider::{AccountRecord, ProviderClient};
use authrelay::session::MemorySessionStore;
use authrelay::{AppState, config};

pub const COOKIE_SECRET: &str = "test-cookie-secret-32-bytes-long";

/// Scripted stand-in for the remote provider.
///
/// Tests queue exchange/refresh outcomes up front; each call consumes
/// the next queued response. An empty queue reads as a provider
/// rejection so a misbehaving test fails loudly instead of hanging.
pub struct StubProvider {
    exchange_responses: Mutex<VecDeque<Result<AccountRecord, AppError>>>,
    refresh_responses: Mutex<VecDeque<Result<AccountRecord, AppError>>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self {
            exchange_responses: Mutex::new(VecDeque::new()),
            refresh_responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn queue_exchange(&self, response: Result<AccountRecord, AppError>) {
        self.exchange_responses.lock().unwrap().push_back(response);
    }

    pub fn queue_refresh(&self, response: Result<AccountRecord, AppError>) {
        self.refresh_responses.lock().unwrap().push_back(response);
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    fn authorize_url(&self) -> Result<Url, AppError> {
        let mut url = Url::parse("https://provider.test/oauth/authorize").unwrap();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", "test-client-id")
            .append_pair("redirect_uri", "http://localhost/oauth/callback");
        Ok(url)
    }

    async fn exchange_code(&self, _code: &str) -> Result<AccountRecord, AppError> {
        self.exchange_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::ProviderRejected(
                    "no exchange response queued".to_string(),
                ))
            })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<AccountRecord, AppError> {
        self.refresh_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::ProviderRejected(
                    "no refresh response queued".to_string(),
                ))
            })
    }
}

/// Build a provider-shaped token payload.
pub fn account(access_token: &str, refresh_token: &str) -> AccountRecord {
    let raw = serde_json::json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "Bearer",
        "expires_in": 3600,
    });
    AccountRecord {
        access_token: access_token.to_string(),
        refresh_token: Some(refresh_token.to_string()),
        expires_at: Some(chrono::Utc::now() + chrono::Duration::seconds(3600)),
        raw,
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub provider: Arc<StubProvider>,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance with a scripted provider
    pub async fn new() -> Self {
        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            provider: config::ProviderConfig {
                client_id: "test-client-id".to_string(),
                client_secret: "test-client-secret".to_string(),
                redirect_uri: "http://localhost/oauth/callback".to_string(),
                authorize_url: "https://provider.test/oauth/authorize".to_string(),
                token_url: "https://provider.test/oauth/token".to_string(),
            },
            session: config::SessionConfig {
                store_ttl_seconds: 259_200,
                cookie_ttl_seconds: 86_400,
                cookie_name: "authrelay_session".to_string(),
                cookie_secret: COOKIE_SECRET.to_string(),
                max_entries: 100,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let provider = Arc::new(StubProvider::new());
        let store = Arc::new(MemorySessionStore::new(
            std::time::Duration::from_secs(config.session.store_ttl_seconds),
            config.session.max_entries,
        ));

        // Initialize app state with the stub provider injected
        let state = AppState::with_collaborators(config, provider.clone(), store);

        // Create HTTP client (no redirect following: the flow is asserted
        // hop by hop)
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        // Build router
        let app = authrelay::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            provider,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}

/// Pull the session cookie pair (`name=value`) out of a response.
pub fn session_cookie_pair(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .find_map(|value| {
            let raw = value.to_str().ok()?;
            let pair = raw.split(';').next()?;
            pair.starts_with("authrelay_session=").then(|| pair.to_string())
        })
}
