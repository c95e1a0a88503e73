//! Deployment-platform webhooks: HMAC-SHA1 signature check over the raw body,
//! then event classification.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha1::Sha1;
use subtle::ConstantTimeEq;

pub const SIGNATURE_HEADER: &str = "x-vercel-signature";

type HmacSha1 = Hmac<Sha1>;

/// Check `provided_hex` against `HMAC-SHA1(secret, raw_body)`.
///
/// Must run on the bytes exactly as received, before any JSON parsing.
/// Undecodable hex or a length mismatch is a plain `false`.
pub fn verify_signature(raw_body: &[u8], provided_hex: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(provided_hex.trim()) else {
        return false;
    };
    let expected = sign(raw_body, secret);
    if provided.len() != expected.len() {
        return false;
    }
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

fn sign(raw_body: &[u8], secret: &str) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(raw_body);
    mac.finalize().into_bytes().to_vec()
}

/// Lowercase hex signature, as the sender computes it.
pub fn signature_hex(raw_body: &[u8], secret: &str) -> String {
    hex::encode(sign(raw_body, secret))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Deployment,
    Project,
    Domain,
    Integration,
    Marketplace,
    Alert,
    Other,
}

/// Legacy event names use dashes (`deployment-error`); current ones use dots.
pub fn normalize_event_type(event_type: &str) -> String {
    let normalized = event_type.trim().replace('-', ".");
    match normalized.as_str() {
        "deployment.cancelled" => "deployment.canceled".to_string(),
        _ => normalized,
    }
}

pub fn classify(normalized: &str) -> EventFamily {
    let family = normalized.split('.').next().unwrap_or_default();
    match family {
        "deployment" => EventFamily::Deployment,
        "project" => EventFamily::Project,
        "domain" => EventFamily::Domain,
        "integration" => EventFamily::Integration,
        "marketplace" => EventFamily::Marketplace,
        "alerts" => EventFamily::Alert,
        _ => EventFamily::Other,
    }
}

/// Events an operator should look at.
pub fn needs_attention(normalized: &str) -> bool {
    match classify(normalized) {
        EventFamily::Deployment => matches!(
            normalized,
            "deployment.error" | "deployment.canceled" | "deployment.checks.failed"
        ),
        EventFamily::Domain => normalized.ends_with(".failed"),
        EventFamily::Alert => normalized == "alerts.triggered",
        _ => false,
    }
}
