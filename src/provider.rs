//! OAuth2 provider client
//!
//! Thin typed wrapper over the identity provider's three remote
//! operations: authorize-URL construction, authorization-code exchange,
//! and refresh-token exchange. Holds no state beyond the shared HTTP
//! client and the static provider credentials.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::AppError;

/// Provider-issued credential bundle for one authenticated user.
///
/// `raw` preserves the provider's full token response so fields this
/// server does not interpret survive the round trip to callers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AccountRecord {
    /// The OAuth access token for provider API requests.
    pub access_token: String,

    /// OAuth refresh token, once the provider has granted one.
    pub refresh_token: Option<String>,

    /// When the access token expires, if the provider reported it.
    pub expires_at: Option<DateTime<Utc>>,

    /// The provider's full token response.
    pub raw: Value,
}

impl AccountRecord {
    /// Check if the access token is past its recorded expiry.
    ///
    /// Returns `false` when the provider reported no expiry.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now(),
            None => false,
        }
    }

    /// Build an account record from a provider token response.
    ///
    /// # Errors
    /// Returns `MalformedResponse` if the payload lacks an access token.
    pub fn from_token_response(raw: Value) -> Result<Self, AppError> {
        let access_token = raw
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::MalformedResponse("token response has no access_token".to_string())
            })?
            .to_string();

        let refresh_token = raw
            .get("refresh_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string);

        let expires_at = raw
            .get("expires_in")
            .and_then(Value::as_i64)
            .map(|expires_in| Utc::now() + Duration::seconds(expires_in));

        Ok(Self {
            access_token,
            refresh_token,
            expires_at,
            raw,
        })
    }
}

/// Grant type of a token endpoint request.
///
/// Only affects error mapping: `invalid_grant` during a refresh is the
/// provider saying the refresh token itself is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode => "authorization_code",
            Grant::RefreshToken => "refresh_token",
        }
    }
}

/// Client for the upstream OAuth2 provider.
///
/// Trait at the seam so the session manager and tests can substitute
/// a stub for the remote endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Build the user-facing authorize URL. Pure construction, no I/O.
    fn authorize_url(&self) -> Result<Url, AppError>;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<AccountRecord, AppError>;

    /// Exchange a refresh token for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<AccountRecord, AppError>;
}

/// `ProviderClient` over HTTP (reqwest).
#[derive(Debug)]
pub struct HttpProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl HttpProviderClient {
    /// Create a provider client from static configuration.
    ///
    /// # Errors
    /// Returns `Config` if the client id or redirect URI is empty, or
    /// if the configured endpoint URLs do not parse.
    pub fn new(config: ProviderConfig) -> Result<Self, AppError> {
        if config.client_id.trim().is_empty() {
            return Err(AppError::Config(
                "provider client id must not be empty".to_string(),
            ));
        }
        if config.redirect_uri.trim().is_empty() {
            return Err(AppError::Config(
                "provider redirect URI must not be empty".to_string(),
            ));
        }
        Url::parse(&config.authorize_url)
            .map_err(|e| AppError::Config(format!("invalid provider authorize_url: {e}")))?;
        Url::parse(&config.token_url)
            .map_err(|e| AppError::Config(format!("invalid provider token_url: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent("AuthRelay/0.1.0")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// POST a grant request to the token endpoint and parse the result.
    async fn token_request(
        &self,
        grant: Grant,
        params: &[(&str, &str)],
    ) -> Result<AccountRecord, AppError> {
        use crate::metrics::PROVIDER_REQUESTS_TOTAL;

        let response = self
            .http
            .post(&self.config.token_url)
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        let result = parse_token_response(grant, status.as_u16(), &body);
        let outcome = match &result {
            Ok(_) => "success",
            Err(AppError::RefreshTokenExpired) => "refresh_token_expired",
            Err(AppError::ProviderRejected(_)) => "rejected",
            Err(_) => "malformed",
        };
        PROVIDER_REQUESTS_TOTAL
            .with_label_values(&[grant.as_str(), outcome])
            .inc();

        result
    }
}

/// Map a token endpoint response to an account record or a typed error.
///
/// Pure so the failure taxonomy is testable without a network:
/// - non-2xx with `error=invalid_grant` on a refresh -> `RefreshTokenExpired`
/// - any other non-2xx -> `ProviderRejected`
/// - 2xx without a parseable access token -> `MalformedResponse`
pub fn parse_token_response(
    grant: Grant,
    status: u16,
    body: &str,
) -> Result<AccountRecord, AppError> {
    if !(200..300).contains(&status) {
        let error_code = serde_json::from_str::<Value>(body)
            .ok()
            .as_ref()
            .and_then(|value| value.get("error"))
            .and_then(Value::as_str)
            .map(ToString::to_string);

        if grant == Grant::RefreshToken && error_code.as_deref() == Some("invalid_grant") {
            return Err(AppError::RefreshTokenExpired);
        }

        let detail = error_code.unwrap_or_else(|| format!("HTTP {status}"));
        return Err(AppError::ProviderRejected(detail));
    }

    let raw: Value = serde_json::from_str(body).map_err(|e| {
        AppError::MalformedResponse(format!("token response is not JSON: {e}"))
    })?;

    AccountRecord::from_token_response(raw)
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    fn authorize_url(&self) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.config.authorize_url)
            .map_err(|e| AppError::Config(format!("invalid provider authorize_url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<AccountRecord, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ];

        tracing::debug!(grant = "authorization_code", "Requesting token exchange");
        self.token_request(Grant::AuthorizationCode, &params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AccountRecord, AppError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("refresh_token", refresh_token),
        ];

        tracing::debug!(grant = "refresh_token", "Requesting token refresh");
        self.token_request(Grant::RefreshToken, &params).await
    }
}
