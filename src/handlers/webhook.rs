use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::metrics::WEBHOOK_REJECTED;
use crate::state::{AppState, client_ip};
use crate::webhook::{
    SIGNATURE_HEADER, WebhookEnvelope, classify, needs_attention, normalize_event_type,
    verify_signature,
};

pub async fn vercel_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        warn!("webhook secret is not configured; rejecting webhook");
        return Err(GatewayError::Misconfigured);
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let verified = signature.is_some_and(|sig| verify_signature(&body, sig, secret));
    if !verified {
        WEBHOOK_REJECTED.inc();
        warn!(
            ip = %client_ip(&headers),
            signature_present = signature.is_some(),
            "webhook rejected: invalid signature"
        );
        return Err(GatewayError::Unauthorized);
    }

    // Parse only after the raw bytes have been authenticated.
    let envelope: WebhookEnvelope =
        serde_json::from_slice(&body).map_err(|_| GatewayError::InvalidJson)?;

    let event_type = normalize_event_type(&envelope.event_type);
    let family = classify(&event_type);
    if needs_attention(&event_type) {
        warn!(
            event_id = %envelope.id,
            %event_type,
            ?family,
            region = envelope.region.as_deref().unwrap_or("-"),
            payload = %envelope.payload,
            "webhook event needs attention"
        );
    } else {
        info!(
            event_id = %envelope.id,
            %event_type,
            ?family,
            created_at = ?envelope.created_at,
            "webhook event received"
        );
    }

    Ok(Json(serde_json::json!({
        "status": "success",
        "received": true,
        "eventType": envelope.event_type,
        "eventId": envelope.id,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
