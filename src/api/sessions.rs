//! Session endpoints
//!
//! The HTTP surface over the session lifecycle: kicking off the
//! provider authorize redirect, receiving the callback, refreshing,
//! and logging out. All session decisions live in the manager; these
//! handlers only translate between HTTP and the core's operations.

use axum::{
    Json, Router, middleware,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;

use crate::AppState;
use crate::auth::{CurrentAccount, MaybeAccount, require_auth, seal_session_id};
use crate::error::AppError;

/// Create session router
///
/// Routes:
/// - GET / - Landing route (login/logout redirect target)
/// - GET /sessions/create - Redirect to the provider authorize page
/// - GET /oauth/callback - Provider callback (code exchange)
/// - POST /oauth/refresh - Rotate the session via the refresh grant
/// - GET /logout - Revoke the session
/// - GET /session - Current account (authenticated)
pub fn session_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .route("/session", get(current_session))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .merge(protected_routes)
        .route("/", get(index))
        .route("/sessions/create", get(create_session))
        .route("/oauth/callback", get(oauth_callback))
        .route("/oauth/refresh", post(refresh_session))
        .route("/logout", get(logout))
}

/// Build the signed session cookie for a freshly minted identifier.
fn session_cookie(state: &AppState, session_id: &str) -> Result<Cookie<'static>, AppError> {
    let sealed = seal_session_id(session_id, &state.config.session.cookie_secret)?;

    let mut cookie = Cookie::new(state.config.session.cookie_name.clone(), sealed);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(state.config.should_use_secure_cookies());
    cookie.set_max_age(time::Duration::seconds(
        state.config.session.cookie_ttl_seconds as i64,
    ));
    Ok(cookie)
}

fn bearer_session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

// =============================================================================
// Landing
// =============================================================================

/// GET /
///
/// Landing route the login and logout redirects point at. Reports
/// whether the presented identifier (if any) resolves to a session.
async fn index(MaybeAccount(session): MaybeAccount) -> impl IntoResponse {
    Json(serde_json::json!({
        "authenticated": session.is_some(),
    }))
}

// =============================================================================
// Login
// =============================================================================

/// GET /sessions/create
///
/// Redirects the visitor to the provider's authorize page.
async fn create_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let url = state.provider.authorize_url()?;
    Ok(Redirect::to(url.as_str()))
}

/// Query parameters from the provider callback
#[derive(Debug, Deserialize)]
struct CallbackQuery {
    /// Authorization code
    code: Option<String>,
}

/// GET /oauth/callback
///
/// Handles the provider's redirect back to us.
///
/// # Steps
/// 1. Require a non-empty `code` query parameter (400 otherwise)
/// 2. Exchange the code and establish a session
/// 3. Set the signed session cookie
/// 4. Redirect to the application root
async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::Validation("missing required query parameter: code".to_string()))?;

    let session = state.sessions.login(&code).await?;

    let jar = jar.add(session_cookie(&state, &session.session_id)?);
    Ok((jar, Redirect::to("/")))
}

// =============================================================================
// Refresh
// =============================================================================

/// POST /oauth/refresh
///
/// Rotates the session bound to the bearer identifier. On success the
/// response carries the new account payload and the rotated cookie;
/// the caller must switch to the new identifier. A terminally expired
/// session yields 401 with no redirect.
async fn refresh_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let session_id = bearer_session_id(&headers).ok_or(AppError::Unauthorized)?;

    let session = state.sessions.refresh(&session_id).await?;

    let jar = jar.add(session_cookie(&state, &session.session_id)?);
    Ok((jar, Json(session.account)))
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Revokes the presented session, if any, clears the cookie, and
/// redirects to the application root. Always succeeds.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    if let Some(session_id) = crate::auth::session_id_from_headers(&headers, &state) {
        state.sessions.logout(&session_id).await?;
    }

    let mut removal = Cookie::new(state.config.session.cookie_name.clone(), "");
    removal.set_path("/");
    let jar = jar.remove(removal);
    Ok((jar, Redirect::to("/")))
}

// =============================================================================
// Current session
// =============================================================================

/// GET /session
///
/// JSON echo of the authenticated account. `stale` signals that the
/// access token is past its expiry and the caller should refresh.
async fn current_session(CurrentAccount(session): CurrentAccount) -> impl IntoResponse {
    Json(serde_json::json!({
        "account": session.account,
        "stale": session.stale,
    }))
}
