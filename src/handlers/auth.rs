use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tower_cookies::{Cookies, Cookie};
use tower_cookies::cookie::time::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    middleware_layer::{
        auth::{extract_session_token, SESSION_COOKIE},
        csrf::CSRF_COOKIE,
    },
    models::user::{CurrentUser, User},
    services::auth::{self as auth_service, CSRF_TOKEN_TTL_SECS},
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub password2: String,
}

/// The request payload for user login.
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub failed_path: Option<String>,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

#[derive(Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// Creates a cookie scoped to the whole site. Only the CSRF cookie is
/// readable from scripts.
pub(crate) fn create_secure_cookie(
    name: &'static str,
    value: String,
    max_age_secs: i64,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if secure {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(max_age_secs));
    cookie.set_path("/");

    cookie
}

/// Issues a CSRF token and sets it as a cookie.
pub(crate) async fn set_csrf_cookie(state: &AppState, cookies: &Cookies) -> Result<String> {
    let csrf_token = auth_service::issue_csrf_token(state.sessions.as_ref()).await?;
    cookies.add(create_secure_cookie(
        CSRF_COOKIE,
        csrf_token.clone(),
        CSRF_TOKEN_TTL_SECS as i64,
        state.config.is_production(),
    ));
    Ok(csrf_token)
}

async fn log_in(state: &AppState, cookies: &Cookies, user: &User) -> Result<()> {
    let session_id = auth_service::start_session(
        state.sessions.as_ref(),
        user,
        state.config.session_duration_days,
    )
    .await?;

    cookies.add(create_secure_cookie(
        SESSION_COOKIE,
        session_id.to_string(),
        state.config.session_duration_days * 86400,
        state.config.is_production(),
    ));
    set_csrf_cookie(state, cookies).await?;
    tracing::info!("✅ Session and CSRF cookies added for {}", user.username);
    Ok(())
}

fn clear_cookie(cookies: &Cookies, name: &'static str) {
    let mut cookie = Cookie::new(name, "");
    cookie.set_max_age(Duration::seconds(0));
    cookie.set_path("/");
    cookies.remove(cookie);
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response> {
    tracing::info!("📝 Register attempt: {}", payload.username);
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;
    validate_password_confirmation(&payload.password, &payload.password2)?;

    let user = auth_service::create_user(
        state.users.as_ref(),
        &payload.username,
        payload.password,
        Vec::new(),
        state.config.kdf,
    )
    .await?;

    log_in(&state, &cookies, &user).await?;

    let response = AuthResponse {
        success: true,
        message: "Registration successful. Welcome!".to_string(),
        redirect: None,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Login attempt: {}", payload.username);
    validate_username(&payload.username)?;

    let user = auth_service::authenticate_user(
        state.users.as_ref(),
        &payload.username,
        payload.password,
    )
    .await?;

    log_in(&state, &cookies, &user).await?;

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        redirect: Some(sanitize_redirect(payload.failed_path.as_deref())),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles user logout.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    cookies: Cookies,
) -> Result<Response> {
    tracing::info!("👋 Logout for user: {}", user.username);

    let csrf_token = cookies.get(CSRF_COOKIE).map(|c| c.value().to_string());
    auth_service::end_session(
        state.sessions.as_ref(),
        extract_session_token(&cookies),
        csrf_token.as_deref(),
    )
    .await?;

    clear_cookie(&cookies, SESSION_COOKIE);
    clear_cookie(&cookies, CSRF_COOKIE);

    let response = AuthResponse {
        success: true,
        message: "Logout successful".to_string(),
        redirect: None,
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Returns the logged-in user.
pub async fn me(Extension(user): Extension<CurrentUser>) -> Json<CurrentUser> {
    Json(user)
}

/// Issues a CSRF token for forms that are used without logging in.
pub async fn csrf_token(State(state): State<AppState>, cookies: Cookies) -> Result<Json<CsrfResponse>> {
    let csrf_token = set_csrf_cookie(&state, &cookies).await?;
    Ok(Json(CsrfResponse { csrf_token }))
}
