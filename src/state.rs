use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

use crate::assist::Assistant;
use crate::config::Args;
use crate::llm::{HttpLlmClient, LlmClient};
use crate::rate_limit::RateLimiter;

// app's shared state
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limit: u32,       // max requests per window on AI endpoints
    pub rate_window: Duration, // duration of that window
    pub admin_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub assistant: Assistant,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn from_args(args: &Args) -> Self {
        let llm: Option<Arc<dyn LlmClient>> = args.llm_api_key().map(|key| {
            let client = HttpLlmClient::new(
                reqwest::Client::new(),
                args.llm_base_url.clone(),
                key,
                args.llm_model.clone(),
            )
            .with_timeout(args.llm_timeout());
            Arc::new(client) as Arc<dyn LlmClient>
        });

        Self {
            rate_limiter: Arc::new(RateLimiter::new(args.rate_limit_max_entries)),
            rate_limit: args.rate_limit,
            rate_window: args.rate_window(),
            admin_key: args.admin_key().map(str::to_string),
            webhook_secret: args.webhook_secret().map(str::to_string),
            assistant: Assistant::new(llm, args.llm_timeout(), args.clinic_phone.clone()),
            started_at: chrono::Utc::now(),
        }
    }
}

/// First `x-forwarded-for` hop, or `"unknown"`.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
