use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers,
    middleware_layer::{self, csrf::CSRF_HEADER},
    state::AppState,
};

/// Room for the JSON envelope around a maximum size payload.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|_| AppError::Validation(format!("Invalid CORS origin: {}", o)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
            header::HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
        .expose_headers([header::HeaderName::from_static(CSRF_HEADER)])
        .max_age(Duration::from_secs(86400)))
}

/// Builds the application router.
///
/// # Arguments
///
/// * `state` - The application state.
///
/// # Returns
///
/// A `Result` containing the `Router`, or an error if the CORS or rate
/// limit settings are invalid.
pub fn app(state: AppState) -> Result<Router> {
    let throttled = |router: Router<AppState>| -> Result<Router<AppState>> {
        if state.config.rate_limit_enabled {
            middleware_layer::rate_limit::throttle_per_ip(router)
        } else {
            Ok(router)
        }
    };

    let account_routes = throttled(
        Router::new()
            .route("/api/auth/register", post(handlers::auth::register))
            .route("/api/auth/login", post(handlers::auth::login)),
    )?;

    let anonymous_routes = throttled(
        Router::new().route("/api/auth/csrf", get(handlers::auth::csrf_token)),
    )?;

    // CSRF for redeem is checked in the handler so that it fails uniformly.
    let link_routes = throttled(Router::new().route(
        "/api/messages/{id}",
        get(handlers::messages::view_pin_prompt).post(handlers::messages::redeem),
    ))?;

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        .route(
            "/api/messages",
            get(handlers::messages::list_messages).post(handlers::messages::create_message),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .route_layer(from_fn(middleware_layer::auth::require_auth));

    let admin_routes = Router::new()
        .route("/api/stats", get(handlers::stats::get_stats))
        .route_layer(from_fn(middleware_layer::auth::require_read_stats));

    let body_limit = state.config.max_payload_bytes + BODY_OVERHEAD_BYTES;

    Ok(Router::new()
        .merge(account_routes)
        .merge(anonymous_routes)
        .merge(link_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::load_current_user,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer(&state.config.cors_origins)?)
        .with_state(state))
}
