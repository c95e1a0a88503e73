use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Assistant, SYSTEM_PROMPT, SchemaCheck, bounded, bounded_list, truncate_chars};
use crate::error::{GatewayError, LlmError};
use crate::llm::LlmRequest;

const REPORT_MAX_CHARS: usize = 8_000;
const REFINE_MAX_CHARS: usize = 2_000;

const DISCLAIMER: &str = "This is an automated interpretation, not a diagnosis. \
Please discuss your report with the surgeon before making any decision.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(default)]
    pub report_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInterpretation {
    pub plain_english_summary: String,
    pub key_takeaways: Vec<String>,
    pub disclaimer: String,
}

// What the model is asked for; the disclaimer is always added locally.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInterpretation {
    plain_english_summary: String,
    key_takeaways: Vec<String>,
}

impl SchemaCheck for ModelInterpretation {
    fn check(&self) -> Result<(), LlmError> {
        bounded("plainEnglishSummary", &self.plain_english_summary, 2000)?;
        bounded_list("keyTakeaways", &self.key_takeaways, 5, 400)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefineRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefinedSymptoms {
    pub refined_text: String,
    pub clarifying_questions: Vec<String>,
}

impl SchemaCheck for RefinedSymptoms {
    fn check(&self) -> Result<(), LlmError> {
        bounded("refinedText", &self.refined_text, 3000)?;
        bounded_list("clarifyingQuestions", &self.clarifying_questions, 5, 300)
    }
}

fn default_questions() -> Vec<String> {
    [
        "Does the pain or tingling travel into your arms or legs?",
        "Have you noticed any change in bowel or bladder control?",
        "What makes the symptoms better or worse (sitting, walking, bending)?",
    ]
    .iter()
    .map(|q| q.to_string())
    .collect()
}

impl Assistant {
    /// Explain a radiology or surgical report in plain language.
    pub async fn interpret_report(
        &self,
        request: ReportRequest,
    ) -> Result<ReportInterpretation, GatewayError> {
        if request.report_text.trim().is_empty() {
            return Err(GatewayError::invalid_input("reportText"));
        }
        let report = truncate_chars(&request.report_text, REPORT_MAX_CHARS);

        let llm_request = LlmRequest::prompt(format!(
            "Analyze this neurosurgical report excerpt: \"{}\". Translate the medical jargon \
             into plain English for a patient and identify 3 key takeaway points.",
            report
        ))
        .with_system(SYSTEM_PROMPT)
        .with_schema(
            "report_interpretation",
            json!({
                "type": "object",
                "properties": {
                    "plainEnglishSummary": { "type": "string" },
                    "keyTakeaways": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["plainEnglishSummary", "keyTakeaways"],
                "additionalProperties": false
            }),
        );

        let (plain_english_summary, key_takeaways) =
            match self.structured::<ModelInterpretation>(llm_request).await {
                Ok(model) => (model.plain_english_summary, model.key_takeaways),
                Err(err) => {
                    self.record_fallback("report", &err);
                    (
                        "We could not generate an automatic explanation of this report right now. \
                         Reports often use technical terms that sound more serious than they are."
                            .to_string(),
                        vec![
                            "Bring the full report and images to your consultation.".to_string(),
                            "Write down the terms you would like explained.".to_string(),
                            format!("To book a review, call {}.", self.clinic_phone()),
                        ],
                    )
                }
            };

        Ok(ReportInterpretation {
            plain_english_summary,
            key_takeaways,
            disclaimer: DISCLAIMER.to_string(),
        })
    }

    /// Turn a patient's draft symptom description into a clearer one.
    pub async fn refine_symptoms(
        &self,
        request: RefineRequest,
    ) -> Result<RefinedSymptoms, GatewayError> {
        if request.input.trim().is_empty() {
            return Err(GatewayError::invalid_input("input"));
        }
        let input = truncate_chars(&request.input, REFINE_MAX_CHARS);

        let llm_request = LlmRequest::prompt(format!(
            "The following is a patient's draft description of their symptoms: \"{}\". \
             Rewrite it as a structured, clinical but easy-to-read version and ask 2-3 \
             clarifying questions a neurosurgeon would find helpful (for example about \
             radiculopathy, bowel or bladder control, or pain triggers).",
            input
        ))
        .with_system(SYSTEM_PROMPT)
        .with_schema(
            "refined_symptoms",
            json!({
                "type": "object",
                "properties": {
                    "refinedText": { "type": "string" },
                    "clarifyingQuestions": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["refinedText", "clarifyingQuestions"],
                "additionalProperties": false
            }),
        );

        match self.structured::<RefinedSymptoms>(llm_request).await {
            Ok(refined) => Ok(refined),
            Err(err) => {
                self.record_fallback("refine_symptoms", &err);
                Ok(RefinedSymptoms {
                    refined_text: input.split_whitespace().collect::<Vec<_>>().join(" "),
                    clarifying_questions: default_questions(),
                })
            }
        }
    }
}
