pub mod assist;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod llm;
pub mod metrics;
pub mod rate_limit;
pub mod security;
pub mod state;
pub mod webhook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::handlers::{
    chat_handler, health_handler, metrics_handler, rate_limits_handler, referral_handler,
    refine_symptoms_handler, report_handler, reset_rate_limits_handler, triage_handler,
    vercel_webhook_handler,
};
use crate::state::AppState;

// creating the router with routes
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/ai/triage", post(triage_handler))
        .route("/api/ai/referral", post(referral_handler))
        .route("/api/ai/report", post(report_handler))
        .route("/api/ai/refine-symptoms", post(refine_symptoms_handler))
        .route("/api/ai/chat", post(chat_handler))
        .route("/api/webhooks/vercel", post(vercel_webhook_handler))
        .route("/api/admin/rate-limits", get(rate_limits_handler))
        .route("/api/admin/rate-limits/reset", post(reset_rate_limits_handler))
        .with_state(state)
}
