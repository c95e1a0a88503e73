use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    Assistant, SYSTEM_PROMPT, SchemaCheck, UrgencyLevel, bounded, bounded_list, heuristic_level,
    quick_triage_check,
};
use crate::error::{GatewayError, LlmError};
use crate::llm::LlmRequest;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageRequest {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub age: Option<u32>,
    pub medical_history: Option<String>,
    pub current_medications: Option<Vec<String>>,
}

impl TriageRequest {
    fn all_text(&self) -> String {
        format!("{} {}", self.description, self.symptoms.join(" "))
    }

    fn prompt(&self) -> String {
        let mut lines = vec![
            "Analyze the following patient information and provide a triage assessment."
                .to_string(),
            String::new(),
            "Patient Information:".to_string(),
            format!("- Symptoms: {}", self.symptoms.join(", ")),
            format!("- Description: {}", self.description),
        ];
        if let Some(age) = self.age {
            lines.push(format!("- Age: {}", age));
        }
        if let Some(history) = &self.medical_history {
            lines.push(format!("- Medical History: {}", history));
        }
        if let Some(meds) = &self.current_medications {
            lines.push(format!("- Current Medications: {}", meds.join(", ")));
        }
        lines.push(String::new());
        lines.push(
            "Guidelines:\n\
             - EMERGENCY (90-100): stroke symptoms, seizures, severe trauma, sudden paralysis, loss of consciousness, severe neurological deficits\n\
             - URGENT (70-89): progressive neurological symptoms, severe pain, new onset significant symptoms, worsening conditions\n\
             - MODERATE (40-69): chronic conditions with new concerns, moderate pain, follow-up needs\n\
             - ROUTINE (0-39): general inquiries, preventive care, non-urgent consultations"
                .to_string(),
        );
        lines.join("\n")
    }
}

/// Triage outcome. Optional fields are serialized as `null` so every code
/// path produces the same set of keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageResult {
    pub urgency_level: UrgencyLevel,
    pub urgency_score: u8,
    pub recommended_action: String,
    pub time_to_seek_care: String,
    #[serde(default)]
    pub suggested_specialty: Option<String>,
    pub risk_factors: Vec<String>,
    pub reasoning: String,
    #[serde(default)]
    pub follow_up_questions: Option<Vec<String>>,
}

impl SchemaCheck for TriageResult {
    fn check(&self) -> Result<(), LlmError> {
        if self.urgency_score > 100 {
            return Err(LlmError::Schema("urgencyScore above 100".to_string()));
        }
        bounded("recommendedAction", &self.recommended_action, 600)?;
        bounded("timeToSeekCare", &self.time_to_seek_care, 80)?;
        bounded("reasoning", &self.reasoning, 1200)?;
        if let Some(specialty) = &self.suggested_specialty {
            bounded("suggestedSpecialty", specialty, 120)?;
        }
        bounded_list("riskFactors", &self.risk_factors, 10, 200)?;
        if let Some(questions) = &self.follow_up_questions {
            bounded_list("followUpQuestions", questions, 5, 300)?;
        }
        Ok(())
    }
}

// Length bounds are enforced by `check` after parsing.
fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "urgencyLevel": { "type": "string", "enum": UrgencyLevel::ALL },
            "urgencyScore": { "type": "integer", "minimum": 0, "maximum": 100 },
            "recommendedAction": { "type": "string" },
            "timeToSeekCare": { "type": "string" },
            "suggestedSpecialty": { "type": ["string", "null"] },
            "riskFactors": { "type": "array", "items": { "type": "string" } },
            "reasoning": { "type": "string" },
            "followUpQuestions": { "type": ["array", "null"], "items": { "type": "string" } }
        },
        "required": [
            "urgencyLevel", "urgencyScore", "recommendedAction", "timeToSeekCare",
            "suggestedSpecialty", "riskFactors", "reasoning", "followUpQuestions"
        ],
        "additionalProperties": false
    })
}

pub(super) fn emergency_result(phone: &str) -> TriageResult {
    TriageResult {
        urgency_level: UrgencyLevel::Emergency,
        urgency_score: 95,
        recommended_action: format!(
            "Call emergency services immediately or visit the nearest emergency room. \
             For neurosurgical emergencies, call {}.",
            phone
        ),
        time_to_seek_care: "immediately".to_string(),
        suggested_specialty: None,
        risk_factors: vec!["Potential life-threatening condition detected".to_string()],
        reasoning: "Emergency keywords detected in patient description. Immediate medical \
                    attention required."
            .to_string(),
        follow_up_questions: None,
    }
}

fn basic_triage(request: &TriageRequest, phone: &str) -> TriageResult {
    let level = heuristic_level(&request.all_text(), request.symptoms.len());
    if level == UrgencyLevel::Emergency {
        return emergency_result(phone);
    }
    let (score, time_to_seek_care, action) = match level {
        UrgencyLevel::Urgent => (
            75,
            "within 24 hours",
            "Schedule an appointment within 24 hours.",
        ),
        UrgencyLevel::Moderate => (
            50,
            "within 3-5 days",
            "Schedule a consultation within the next few days.",
        ),
        _ => (
            30,
            "within 1 week",
            "Schedule a consultation at your convenience.",
        ),
    };
    TriageResult {
        urgency_level: level,
        urgency_score: score,
        recommended_action: format!("{} Call {}.", action, phone),
        time_to_seek_care: time_to_seek_care.to_string(),
        suggested_specialty: None,
        risk_factors: Vec::new(),
        reasoning: "Basic triage assessment based on symptom keywords.".to_string(),
        follow_up_questions: None,
    }
}

/// UI colour for an urgency level.
pub fn triage_color(level: UrgencyLevel) -> &'static str {
    match level {
        UrgencyLevel::Emergency => "red",
        UrgencyLevel::Urgent => "orange",
        UrgencyLevel::Moderate => "yellow",
        UrgencyLevel::Routine => "green",
    }
}

impl Assistant {
    /// Triage free-text symptoms. Fails only when `description` is blank.
    pub async fn triage(&self, request: TriageRequest) -> Result<TriageResult, GatewayError> {
        if request.description.trim().is_empty() {
            return Err(GatewayError::invalid_input("description"));
        }

        if quick_triage_check(&request.all_text()).is_some() {
            return Ok(emergency_result(self.clinic_phone()));
        }

        let llm_request = LlmRequest::prompt(request.prompt())
            .with_system(SYSTEM_PROMPT)
            .with_schema("triage_assessment", schema());

        match self.structured::<TriageResult>(llm_request).await {
            Ok(result) => Ok(result),
            Err(err) => {
                self.record_fallback("triage", &err);
                Ok(basic_triage(&request, self.clinic_phone()))
            }
        }
    }
}
