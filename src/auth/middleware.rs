//! Authentication middleware
//!
//! The request-level gate in front of protected routes. Resolves an
//! inbound session identifier through the session manager and attaches
//! the account to the request, or rejects. Never refreshes: a caller
//! seeing a stale session refreshes explicitly, out of band.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use super::cookie::open_session_id;
use crate::AppState;
use crate::error::AppError;
use crate::provider::AccountRecord;
use crate::session::Validation;

/// An authenticated request's session view.
#[derive(Debug, Clone)]
pub struct AuthSession {
    /// The identifier the client presented.
    pub session_id: String,
    /// The account bound to it.
    pub account: AccountRecord,
    /// True when the access token is past its recorded expiry; the
    /// caller should refresh before using the token upstream.
    pub stale: bool,
}

/// Pull the session identifier out of an inbound request.
///
/// `Authorization: Bearer <sid>` carries the raw identifier; the
/// session cookie carries it sealed under the signing secret.
pub fn session_id_from_headers(headers: &HeaderMap, state: &AppState) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
        .or_else(|| {
            let jar = CookieJar::from_headers(headers);
            let sealed = jar.get(&state.config.session.cookie_name)?;
            open_session_id(sealed.value(), &state.config.session.cookie_secret).ok()
        })
}

async fn authenticate(session_id: String, state: &AppState) -> Result<AuthSession, AppError> {
    match state.sessions.validate(&session_id).await {
        Validation::Active(account) => Ok(AuthSession {
            session_id,
            account,
            stale: false,
        }),
        Validation::Stale(account) => Ok(AuthSession {
            session_id,
            account,
            stale: true,
        }),
        Validation::Absent => Err(AppError::Unauthorized),
    }
}

/// Middleware to require authentication
///
/// Extracts and validates the session from cookie or Authorization
/// header. Adds `AuthSession` to request extensions if valid.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/session", ...)
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session_id =
        session_id_from_headers(request.headers(), &state).ok_or(AppError::Unauthorized)?;

    let session = authenticate(session_id, &state).await?;

    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Extractor for the current authenticated session
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentAccount(session): CurrentAccount) -> impl IntoResponse {
///     Json(session.account)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentAccount(pub AuthSession);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentAccount
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<AuthSession>().cloned() {
            return Ok(CurrentAccount(session));
        }

        let state = AppState::from_ref(state);
        let session_id =
            session_id_from_headers(&parts.headers, &state).ok_or(AppError::Unauthorized)?;
        let session = authenticate(session_id, &state).await?;
        parts.extensions.insert(session.clone());

        Ok(CurrentAccount(session))
    }
}

/// Optional current session extractor
///
/// Returns None if not authenticated, instead of error.
#[derive(Debug, Clone)]
pub struct MaybeAccount(pub Option<AuthSession>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAccount
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<AuthSession>().cloned() {
            return Ok(MaybeAccount(Some(session)));
        }

        let app_state = AppState::from_ref(state);
        let session = match session_id_from_headers(&parts.headers, &app_state) {
            Some(session_id) => authenticate(session_id, &app_state).await.ok(),
            None => None,
        };

        if let Some(session) = &session {
            parts.extensions.insert(session.clone());
        }

        Ok(MaybeAccount(session))
    }
}
