mod admin;
mod assist;
mod health;
mod metrics;
mod webhook;

pub use admin::{rate_limits_handler, reset_rate_limits_handler};
pub use assist::{
    chat_handler, referral_handler, refine_symptoms_handler, report_handler, triage_handler,
};
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use webhook::vercel_webhook_handler;

use axum::http::HeaderMap;
use tracing::debug;

use crate::error::GatewayError;
use crate::metrics::RATE_LIMITED_TOTAL;
use crate::state::{AppState, client_ip};

// Per-IP quota for the public AI endpoints
fn enforce_rate_limit(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
    let ip = client_ip(headers);
    let decision = state
        .rate_limiter
        .check(&ip, state.rate_limit, state.rate_window);
    if decision.success {
        return Ok(());
    }
    RATE_LIMITED_TOTAL.inc();
    debug!(%ip, reset = decision.reset, "rate limit exceeded");
    Err(GatewayError::rate_limited(decision, state.rate_limiter.now_ms()))
}

#[cfg(test)]
mod tests {
    use crate::assist::Assistant;
    use crate::assist::stubs::{FixedLlm, PHONE};
    use crate::llm::LlmClient;
    use crate::metrics::REQUEST_LATENCY;
    use crate::rate_limit::{ManualClock, MemoryStore, RateLimiter};
    use crate::state::AppState;
    use crate::webhook::{SIGNATURE_HEADER, signature_hex};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const ADMIN_KEY: &str = "test-secret";
    const WEBHOOK_SECRET: &str = "s3cr3t";

    fn state_with(llm: Option<Arc<dyn LlmClient>>, admin_key: Option<&str>) -> Arc<AppState> {
        let limiter = RateLimiter::with_parts(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            10_000,
        );
        Arc::new(AppState {
            rate_limiter: Arc::new(limiter),
            rate_limit: 10,
            rate_window: Duration::from_secs(60),
            admin_key: admin_key.map(str::to_string),
            webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            assistant: Assistant::new(llm, Duration::from_millis(200), PHONE),
            started_at: chrono::Utc::now(),
        })
    }

    fn router(state: Arc<AppState>) -> Router {
        crate::app(state)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, ip: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let response = router(state_with(None, None))
            .oneshot(get("/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn metrics_are_exposed() {
        let response = router(state_with(None, None))
            .oneshot(get("/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn triage_without_ai_reports_emergency_with_phone() {
        let response = router(state_with(None, None))
            .oneshot(post_json(
                "/api/ai/triage",
                "1.2.3.4",
                &json!({ "description": "sudden weakness and loss of consciousness" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["urgencyLevel"], "emergency");
        assert!(body["recommendedAction"].as_str().unwrap().contains(PHONE));
        assert!(body.get("suggestedSpecialty").is_some());
    }

    #[tokio::test]
    async fn eleventh_ai_request_is_throttled_with_headers() {
        let app = router(state_with(None, None));
        let body = json!({ "description": "occasional back ache" });
        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(post_json("/api/ai/triage", "1.2.3.4", &body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app
            .clone()
            .oneshot(post_json("/api/ai/triage", "1.2.3.4", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["retry-after"], "60");
        assert_eq!(headers["x-ratelimit-reset"], "1700000060000");
        assert_eq!(json_body(response).await["error"], "Too many requests");

        let other = app
            .oneshot(post_json("/api/ai/triage", "5.6.7.8", &body))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn blank_field_is_a_400_naming_the_field() {
        let response = router(state_with(None, None))
            .oneshot(post_json("/api/ai/report", "1.2.3.4", &json!({ "reportText": " " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            json_body(response).await["error"],
            "Missing or invalid field: reportText"
        );
    }

    #[tokio::test]
    async fn rejected_input_still_records_latency() {
        let before = REQUEST_LATENCY.get_sample_count();
        let response = router(state_with(None, None))
            .oneshot(post_json("/api/ai/chat", "4.4.4.4", &json!({ "message": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(REQUEST_LATENCY.get_sample_count() > before);
    }

    #[tokio::test]
    async fn malformed_json_is_a_400() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/ai/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = router(state_with(None, None))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Invalid JSON payload");
    }

    #[tokio::test]
    async fn referral_and_refine_routes_answer() {
        let answer = json!({
            "refinedText": "Neck pain radiating to the right arm.",
            "clarifyingQuestions": ["Any weakness in the grip?"]
        });
        let llm = FixedLlm::chat_content(&answer.to_string());
        let app = router(state_with(Some(llm), None));
        let response = app
            .clone()
            .oneshot(post_json(
                "/api/ai/refine-symptoms",
                "1.2.3.4",
                &json!({ "input": "neck hurts goes to arm" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await["refinedText"],
            "Neck pain radiating to the right arm."
        );

        // Same stub answer does not fit the referral shape, so the fallback answers.
        let response = app
            .oneshot(post_json(
                "/api/ai/referral",
                "1.2.3.4",
                &json!({ "referralText": "worsening lumbar canal stenosis" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["priority"], "urgent");
    }

    #[tokio::test]
    async fn admin_routes_require_the_key() {
        let app = router(state_with(None, Some(ADMIN_KEY)));

        let denied = app
            .clone()
            .oneshot(get("/api/admin/rate-limits"))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/rate-limits")
                    .header("x-admin-key", ADMIN_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        let body = json_body(allowed).await;
        assert_eq!(body["maxEntries"], 10_000);
        assert_eq!(body["aiConfigured"], false);

        let reset = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/admin/rate-limits/reset?key={ADMIN_KEY}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(reset.status(), StatusCode::OK);
        assert!(json_body(reset).await["cleared"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn admin_without_configured_key_is_a_500() {
        let response = router(state_with(None, None))
            .oneshot(
                Request::builder()
                    .uri("/api/admin/rate-limits")
                    .header("x-admin-key", ADMIN_KEY)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Server misconfigured");
    }

    fn webhook_request(body: &'static str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/webhooks/vercel")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn signed_webhook_is_accepted() {
        let body = r#"{"id":"evt_1","type":"deployment-error","payload":{"url":"x"}}"#;
        let signature = signature_hex(body.as_bytes(), WEBHOOK_SECRET);
        let response = router(state_with(None, None))
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["received"], true);
        assert_eq!(json["eventId"], "evt_1");
        assert_eq!(json["eventType"], "deployment-error");
    }

    #[tokio::test]
    async fn unsigned_or_missigned_webhooks_are_401() {
        let body = r#"{"type":"deployment.error"}"#;
        let app = router(state_with(None, None));

        let missing = app
            .clone()
            .oneshot(webhook_request(body, None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let padded = signature_hex(br#"{"type":"deployment.error"} "#, WEBHOOK_SECRET);
        let wrong = app
            .oneshot(webhook_request(body, Some(padded)))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_but_invalid_json_is_400() {
        let body = "not json";
        let signature = signature_hex(body.as_bytes(), WEBHOOK_SECRET);
        let response = router(state_with(None, None))
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn webhook_without_secret_is_500() {
        let state = state_with(None, None);
        let state = Arc::new(AppState {
            webhook_secret: None,
            rate_limiter: Arc::clone(&state.rate_limiter),
            rate_limit: state.rate_limit,
            rate_window: state.rate_window,
            admin_key: None,
            assistant: Assistant::new(None, Duration::from_millis(200), PHONE),
            started_at: state.started_at,
        });
        let body = r#"{"type":"deployment.ready"}"#;
        let signature = signature_hex(body.as_bytes(), WEBHOOK_SECRET);
        let response = router(state)
            .oneshot(webhook_request(body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
