use std::convert::Infallible;
use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::user::{CurrentUser, Permission},
    services::auth as auth_service,
    state::AppState,
};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session_id";

/// Extracts the session token from the request cookies.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
///
/// # Returns
///
/// An `Option` containing the session ID if found.
pub fn extract_session_token(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Resolves the session cookie, if any, and attaches the `CurrentUser` to
/// the request. Requests without a usable session pass through anonymous.
pub async fn load_current_user(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(session_id) = extract_session_token(&cookies) {
        tracing::debug!("🔑 Found session_id: {}", session_id);
        match auth_service::current_user(state.users.as_ref(), state.sessions.as_ref(), session_id)
            .await
        {
            Ok(Some(user)) => {
                tracing::debug!("✅ User authenticated: {}", user.username);
                request.extensions_mut().insert(user);
            }
            Ok(None) => tracing::debug!("Session {} is unknown or expired", session_id),
            Err(e) => tracing::error!("❌ Session lookup failed: {}", e),
        }
    }

    next.run(request).await
}

/// A middleware that requires a logged-in user.
pub async fn require_auth(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    if request.extensions().get::<CurrentUser>().is_none() {
        tracing::warn!("❌ Anonymous request to {}", request.uri().path());
        return Err(AppError::LoginRequired {
            failed_path: request.uri().path().to_string(),
        });
    }
    Ok(next.run(request).await)
}

/// A middleware that requires the `read:stats` permission.
pub async fn require_read_stats(request: Request<Body>, next: Next) -> Result<Response, AppError> {
    require_permission(&request, Permission::ReadStats)?;
    Ok(next.run(request).await)
}

fn require_permission(request: &Request<Body>, permission: Permission) -> Result<(), AppError> {
    match request.extensions().get::<CurrentUser>() {
        None => Err(AppError::LoginRequired {
            failed_path: request.uri().path().to_string(),
        }),
        Some(user) if user.has_permission(permission) => Ok(()),
        Some(user) => {
            tracing::warn!("❌ {} lacks permission {}", user.username, permission.as_str());
            Err(AppError::Forbidden)
        }
    }
}

/// The current user on routes that also serve anonymous callers.
pub struct MaybeUser(pub Option<CurrentUser>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<CurrentUser>().cloned()))
    }
}
