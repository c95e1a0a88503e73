//! Patient-facing assistants.
//!
//! Every operation follows the same layering: an emergency keyword scan that
//! needs no network, then the LLM (when credentials exist) under a hard
//! timeout, then a keyword heuristic if anything went wrong. All three paths
//! build the same struct, so callers never learn which one answered.

mod chat;
mod referral;
mod report;
mod triage;

pub use chat::{ChatReply, ChatRequest, ChatTurn};
pub use referral::{ReferralAnalysis, ReferralRequest};
pub use report::{RefineRequest, RefinedSymptoms, ReportInterpretation, ReportRequest};
pub use triage::{TriageRequest, TriageResult, triage_color};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{LlmClient, LlmRequest, extract_text, strip_code_fence};
use crate::metrics::AI_FALLBACKS;

const EMERGENCY_KEYWORDS: &[&str] = &[
    "stroke",
    "seizure",
    "unconscious",
    "loss of consciousness",
    "paralysis",
    "sudden weakness",
    "loss of vision",
    "severe headache",
    "trauma",
    "accident",
    "fall",
    "severe neck pain",
    "numbness",
    "difficulty speaking",
    "confusion",
];

const URGENT_KEYWORDS: &[&str] = &[
    "severe pain",
    "worsening",
    "progressive",
    "new onset",
    "recent",
    "increasing",
    "cannot move",
    "difficulty walking",
];

pub(crate) const SYSTEM_PROMPT: &str = "You are the assistant of a neurosurgery practice \
specialising in brain and spine surgery and minimally invasive procedures. Never give a \
definitive diagnosis. If emergency symptoms are mentioned, tell the patient to seek immediate \
emergency care. Always prioritise patient safety; when in doubt, choose the higher urgency.";

/// Closed set of urgency levels shared by every assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Routine,
    Moderate,
    Urgent,
    Emergency,
}

impl UrgencyLevel {
    pub const ALL: [&'static str; 4] = ["emergency", "urgent", "moderate", "routine"];
}

/// Keywords from `list` present in `text`, case-insensitively.
pub(crate) fn matched_keywords(text: &str, list: &[&'static str]) -> Vec<&'static str> {
    let lower = text.to_lowercase();
    list.iter().copied().filter(|k| lower.contains(k)).collect()
}

/// Emergency detection that never waits on the network.
pub fn quick_triage_check(text: &str) -> Option<UrgencyLevel> {
    let lower = text.to_lowercase();
    EMERGENCY_KEYWORDS
        .iter()
        .any(|k| lower.contains(k))
        .then_some(UrgencyLevel::Emergency)
}

/// Level the keyword heuristic assigns to free text.
pub(crate) fn heuristic_level(text: &str, symptom_count: usize) -> UrgencyLevel {
    let lower = text.to_lowercase();
    if quick_triage_check(&lower).is_some() {
        UrgencyLevel::Emergency
    } else if !matched_keywords(&lower, URGENT_KEYWORDS).is_empty() {
        UrgencyLevel::Urgent
    } else if symptom_count > 3 || lower.contains("pain") || lower.contains("discomfort") {
        UrgencyLevel::Moderate
    } else {
        UrgencyLevel::Routine
    }
}

/// Bounds a parsed LLM answer must satisfy before it is trusted.
pub(crate) trait SchemaCheck {
    fn check(&self) -> Result<(), LlmError>;
}

pub(crate) fn bounded(field: &str, value: &str, max_chars: usize) -> Result<(), LlmError> {
    let len = value.trim().chars().count();
    if len == 0 {
        return Err(LlmError::Schema(format!("{field} is empty")));
    }
    if len > max_chars {
        return Err(LlmError::Schema(format!("{field} exceeds {max_chars} characters")));
    }
    Ok(())
}

pub(crate) fn bounded_list(
    field: &str,
    values: &[String],
    max_items: usize,
    max_chars: usize,
) -> Result<(), LlmError> {
    if values.len() > max_items {
        return Err(LlmError::Schema(format!("{field} has more than {max_items} items")));
    }
    values.iter().try_for_each(|v| bounded(field, v, max_chars))
}

/// Trim and cut `text` to at most `max_chars` characters.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}

pub struct Assistant {
    llm: Option<Arc<dyn LlmClient>>,
    timeout: Duration,
    clinic_phone: String,
}

impl Assistant {
    pub fn new(
        llm: Option<Arc<dyn LlmClient>>,
        timeout: Duration,
        clinic_phone: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            timeout,
            clinic_phone: clinic_phone.into(),
        }
    }

    pub fn is_ai_configured(&self) -> bool {
        self.llm.is_some()
    }

    pub fn clinic_phone(&self) -> &str {
        &self.clinic_phone
    }

    async fn raw_text(&self, request: LlmRequest) -> Result<String, LlmError> {
        let client = self.llm.as_ref().ok_or(LlmError::NotConfigured)?;
        let raw = tokio::time::timeout(self.timeout, client.complete(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;
        let text = extract_text(&raw);
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }

    /// Ask the LLM for a schema-constrained answer and validate it.
    pub(crate) async fn structured<T>(&self, request: LlmRequest) -> Result<T, LlmError>
    where
        T: DeserializeOwned + SchemaCheck,
    {
        let text = self.raw_text(request).await?;
        let parsed: T = serde_json::from_str(strip_code_fence(&text))?;
        parsed.check()?;
        Ok(parsed)
    }

    pub(crate) async fn free_text(&self, request: LlmRequest) -> Result<String, LlmError> {
        self.raw_text(request.with_system(SYSTEM_PROMPT)).await
    }

    pub(crate) fn record_fallback(&self, operation: &str, err: &LlmError) {
        AI_FALLBACKS.with_label_values(&[operation]).inc();
        match err {
            LlmError::NotConfigured => debug!(operation, "AI not configured, using heuristic"),
            other => warn!(operation, error = %other, "AI call failed, using heuristic"),
        }
    }
}
