use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{crypto::csrf::tokens_match, error::AppError, state::AppState};

/// Name of the CSRF cookie.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header the CSRF token is echoed in.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Checks the double-submitted CSRF token: the cookie and the header must
/// agree and the token must still be known to the session store.
pub async fn check_csrf(
    state: &AppState,
    cookies: &Cookies,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    let cookie_token = cookies
        .get(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Authentication("Missing CSRF token cookie".to_string()))?;

    let header_token = headers
        .get(CSRF_HEADER)
        .ok_or_else(|| AppError::Authentication("Missing CSRF token header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Authentication("Invalid CSRF token format".to_string()))?;

    if !tokens_match(&cookie_token, header_token) {
        return Err(AppError::Authentication("CSRF token mismatch".to_string()));
    }

    if !state.sessions.csrf_exists(&cookie_token).await? {
        return Err(AppError::Authentication(
            "CSRF token expired or invalid".to_string(),
        ));
    }

    Ok(())
}

/// A middleware that verifies the CSRF token on state-changing requests.
pub async fn verify_csrf(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    match check_csrf(&state, &cookies, req.headers()).await {
        Ok(()) => next.run(req).await,
        Err(e) => {
            tracing::warn!("❌ CSRF check failed: {}", e);
            e.into_response()
        }
    }
}
