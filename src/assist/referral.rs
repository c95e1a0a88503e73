use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    Assistant, EMERGENCY_KEYWORDS, SYSTEM_PROMPT, SchemaCheck, URGENT_KEYWORDS, UrgencyLevel,
    bounded, bounded_list, heuristic_level, matched_keywords, quick_triage_check, truncate_chars,
};
use crate::error::{GatewayError, LlmError};
use crate::llm::LlmRequest;

const EXCERPT_CHARS: usize = 280;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRequest {
    #[serde(default)]
    pub referral_text: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

/// Doctor-facing summary of an incoming referral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralAnalysis {
    pub summary: String,
    pub priority: UrgencyLevel,
    pub key_concerns: Vec<String>,
}

impl SchemaCheck for ReferralAnalysis {
    fn check(&self) -> Result<(), LlmError> {
        bounded("summary", &self.summary, 1500)?;
        bounded_list("keyConcerns", &self.key_concerns, 10, 300)
    }
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "summary": { "type": "string" },
            "priority": { "type": "string", "enum": UrgencyLevel::ALL },
            "keyConcerns": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["summary", "priority", "keyConcerns"],
        "additionalProperties": false
    })
}

fn prompt(request: &ReferralRequest) -> String {
    let patient = match (request.age, request.gender.as_deref()) {
        (Some(age), Some(gender)) => format!("a {}-year-old {} patient", age, gender),
        (Some(age), None) => format!("a {}-year-old patient", age),
        (None, Some(gender)) => format!("a {} patient", gender),
        (None, None) => "a patient".to_string(),
    };
    format!(
        "Perform a preliminary neurosurgical review of this referral for {}: \"{}\". \
         Provide a concise professional summary, list the potential neurosurgical concerns, \
         and assign a priority. This is for doctor assistance, not a diagnosis.",
        patient, request.referral_text
    )
}

fn keyword_analysis(request: &ReferralRequest, level: UrgencyLevel) -> ReferralAnalysis {
    let text = &request.referral_text;
    let mut key_concerns: Vec<String> = matched_keywords(text, EMERGENCY_KEYWORDS)
        .into_iter()
        .chain(matched_keywords(text, URGENT_KEYWORDS))
        .map(str::to_string)
        .collect();
    if key_concerns.is_empty() {
        key_concerns.push("No red-flag keywords found; clinician review required".to_string());
    }

    let mut excerpt = truncate_chars(text, EXCERPT_CHARS);
    if text.trim().chars().count() > EXCERPT_CHARS {
        excerpt.push('…');
    }
    ReferralAnalysis {
        summary: format!("Referral received (keyword screening only): {}", excerpt),
        priority: level,
        key_concerns,
    }
}

impl Assistant {
    /// Summarise and prioritise a referral letter.
    pub async fn analyze_referral(
        &self,
        request: ReferralRequest,
    ) -> Result<ReferralAnalysis, GatewayError> {
        if request.referral_text.trim().is_empty() {
            return Err(GatewayError::invalid_input("referralText"));
        }

        if let Some(level) = quick_triage_check(&request.referral_text) {
            return Ok(keyword_analysis(&request, level));
        }

        let llm_request = LlmRequest::prompt(prompt(&request))
            .with_system(SYSTEM_PROMPT)
            .with_schema("referral_analysis", schema());

        match self.structured::<ReferralAnalysis>(llm_request).await {
            Ok(analysis) => Ok(analysis),
            Err(err) => {
                self.record_fallback("referral", &err);
                let level = heuristic_level(&request.referral_text, 0);
                Ok(keyword_analysis(&request, level))
            }
        }
    }
}
