//! Error types for AuthRelay
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad static setup, fatal at startup (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider rejected the code or refresh token (401)
    #[error("Provider rejected the request: {0}")]
    ProviderRejected(String),

    /// The refresh token itself is no longer valid (401, terminal)
    #[error("Refresh token expired")]
    RefreshTokenExpired,

    /// The current session is terminally expired (401)
    #[error("Session expired")]
    SessionExpired,

    /// Transport failure talking to the provider (502)
    #[error("Provider network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Provider contract violation (502)
    ///
    /// The detail is logged; the response body stays generic.
    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    /// Session store backend failure (500)
    ///
    /// Validation paths fail closed to unauthenticated instead of
    /// surfacing this variant.
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::SessionExpired => {
                (StatusCode::UNAUTHORIZED, self.to_string(), "session_expired")
            }
            AppError::RefreshTokenExpired => (
                StatusCode::UNAUTHORIZED,
                self.to_string(),
                "refresh_token_expired",
            ),
            AppError::ProviderRejected(msg) => {
                (StatusCode::UNAUTHORIZED, msg.clone(), "provider_rejected")
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), "validation"),
            AppError::Network(_) => (StatusCode::BAD_GATEWAY, self.to_string(), "network"),
            AppError::MalformedResponse(detail) => {
                tracing::error!(%detail, "Provider returned a malformed response");
                (
                    StatusCode::BAD_GATEWAY,
                    "Upstream provider error".to_string(),
                    "malformed_response",
                )
            }
            AppError::StoreUnavailable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg.clone(),
                "store_unavailable",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL
            .with_label_values(&[error_type, "unknown"])
            .inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
