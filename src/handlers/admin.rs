use axum::Json;
use axum::extract::State;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::guard::AdminAccess;
use crate::state::AppState;

pub async fn rate_limits_handler(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    Json(serde_json::json!({
        "entries": state.rate_limiter.len(),
        "maxEntries": state.rate_limiter.max_entries(),
        "publicLimit": state.rate_limit,
        "publicWindowSecs": state.rate_window.as_secs(),
        "aiConfigured": state.assistant.is_ai_configured(),
        "webhookConfigured": state.webhook_secret.is_some(),
        "uptimeSecs": (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}

pub async fn reset_rate_limits_handler(
    _admin: AdminAccess,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    let cleared = state.rate_limiter.len();
    state.rate_limiter.reset_all();
    info!(cleared, "rate limit table cleared by admin");
    Json(serde_json::json!({ "cleared": cleared }))
}
