use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::auth::set_csrf_cookie,
    middleware_layer::{auth::MaybeUser, csrf::check_csrf},
    models::{message::RedeemOutcome, user::CurrentUser},
    services::messages::{parse_message_id, REDEEM_FAILED},
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub payload: String,
}

#[derive(Serialize)]
pub struct CreateMessageResponse {
    pub id: Uuid,
    pub link: String,
    pub pin: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct MessageListItem {
    pub id: Uuid,
    pub link: String,
    pub created_at: DateTime<Utc>,
    pub attempts_remaining: u32,
}

#[derive(Serialize)]
pub struct PinPromptResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct RedeemRequest {
    pub pin: String,
}

/// Borrows the plaintext so the only owned copy stays in its zeroizing buffer.
#[derive(Serialize)]
pub struct RedeemResponse<'a> {
    pub id: Uuid,
    pub content: &'a str,
}

fn redeem_failed() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(sonic_rs::json!({ "error": REDEEM_FAILED })),
    )
        .into_response()
}

/// Creates a message and returns its link and PIN to the creator.
#[axum::debug_handler]
pub async fn create_message(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<Response> {
    let created = state
        .messages
        .create_message(&payload.payload, user.as_ref())
        .await?;

    let response = CreateMessageResponse {
        id: created.id,
        link: created.link,
        pin: created.pin.value(),
        created_at: created.created_at,
    };

    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// Lists the caller's messages that can still be redeemed.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<MessageListItem>>> {
    let items = state
        .messages
        .list_messages(&user)
        .await?
        .into_iter()
        .map(|m| MessageListItem {
            link: state.messages.link_for(m.id),
            id: m.id,
            created_at: m.created_at,
            attempts_remaining: m.attempts_remaining,
        })
        .collect();

    Ok(Json(items))
}

/// The PIN prompt for a shared link. Reachable anonymously.
///
/// Hands out a fresh CSRF token for the redeem form that follows.
#[axum::debug_handler]
pub async fn view_pin_prompt(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<String>,
) -> Result<Json<PinPromptResponse>> {
    let id = parse_message_id(&id).ok_or(AppError::NotFound)?;
    let summary = state
        .messages
        .view_pin_prompt(id)
        .await?
        .ok_or(AppError::NotFound)?;

    set_csrf_cookie(&state, &cookies).await?;

    Ok(Json(PinPromptResponse {
        id: summary.id,
        created_at: summary.created_at,
    }))
}

/// Tries a PIN against a shared link.
///
/// Every failure, including a bad CSRF token or an unreadable body, gets
/// the same response.
#[axum::debug_handler]
pub async fn redeem(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: std::result::Result<Json<RedeemRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = check_csrf(&state, &cookies, &headers).await {
        tracing::warn!("❌ Redeem rejected by CSRF check: {}", e);
        return redeem_failed();
    }

    let Some(id) = parse_message_id(&id) else {
        return redeem_failed();
    };
    let Ok(Json(request)) = body else {
        tracing::warn!(message_id = %id, "Unreadable redeem body");
        return redeem_failed();
    };

    match state.messages.redeem(id, &request.pin).await {
        RedeemOutcome::Revealed(content) => (
            StatusCode::OK,
            Json(RedeemResponse {
                id,
                content: content.as_str(),
            }),
        )
            .into_response(),
        RedeemOutcome::Failed => redeem_failed(),
    }
}
