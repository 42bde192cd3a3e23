use axum::{extract::State, Json};

use crate::{
    error::Result,
    services::stats::{self, Stats},
    state::AppState,
};

/// Account and message counters. Admin only.
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    let stats = stats::collect(state.users.as_ref(), &state.messages).await?;
    tracing::debug!("📊 Stats collected: {:?}", stats);
    Ok(Json(stats))
}
