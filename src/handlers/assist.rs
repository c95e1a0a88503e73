use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Instant;

use crate::assist::{
    ChatReply, ChatRequest, ReferralAnalysis, ReferralRequest, RefineRequest, RefinedSymptoms,
    ReportInterpretation, ReportRequest, TriageRequest, TriageResult,
};
use crate::error::{GatewayError, Result};
use crate::metrics::{REQUEST_LATENCY, REQUEST_TOTAL};
use crate::state::AppState;

use super::enforce_rate_limit;

// A throttled caller gets 429 even when its body is also malformed.
fn admit<T>(
    state: &AppState,
    headers: &HeaderMap,
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> Result<T> {
    REQUEST_TOTAL.inc();
    enforce_rate_limit(state, headers)?;
    let Json(request) = payload.map_err(|_| GatewayError::InvalidJson)?;
    Ok(request)
}

pub async fn triage_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<TriageRequest>, JsonRejection>,
) -> Result<Json<TriageResult>> {
    let request = admit(&state, &headers, payload)?;
    let start_time = Instant::now();
    let result = state.assistant.triage(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(result?))
}

pub async fn referral_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ReferralRequest>, JsonRejection>,
) -> Result<Json<ReferralAnalysis>> {
    let request = admit(&state, &headers, payload)?;
    let start_time = Instant::now();
    let result = state.assistant.analyze_referral(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(result?))
}

pub async fn report_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Json<ReportInterpretation>> {
    let request = admit(&state, &headers, payload)?;
    let start_time = Instant::now();
    let result = state.assistant.interpret_report(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(result?))
}

pub async fn refine_symptoms_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<RefineRequest>, JsonRejection>,
) -> Result<Json<RefinedSymptoms>> {
    let request = admit(&state, &headers, payload)?;
    let start_time = Instant::now();
    let result = state.assistant.refine_symptoms(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(result?))
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>> {
    let request = admit(&state, &headers, payload)?;
    let start_time = Instant::now();
    let result = state.assistant.chat(request).await;
    REQUEST_LATENCY.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(result?))
}
