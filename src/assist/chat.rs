use serde::{Deserialize, Serialize};

use super::{Assistant, UrgencyLevel, quick_triage_check, truncate_chars};
use crate::error::GatewayError;
use crate::llm::{ChatMessage, LlmRequest};

const MESSAGE_MAX_CHARS: usize = 2_000;
const HISTORY_MAX_TURNS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub reply: String,
    pub urgency_level: UrgencyLevel,
}

impl ChatRequest {
    // Recent turns only, with roles the upstream accepts.
    fn messages(&self) -> Vec<ChatMessage> {
        let skip = self.conversation_history.len().saturating_sub(HISTORY_MAX_TURNS);
        let mut messages: Vec<ChatMessage> = self
            .conversation_history
            .iter()
            .skip(skip)
            .filter(|turn| matches!(turn.role.as_str(), "user" | "assistant"))
            .map(|turn| ChatMessage {
                role: turn.role.clone(),
                content: truncate_chars(&turn.content, MESSAGE_MAX_CHARS),
            })
            .collect();
        messages.push(ChatMessage::user(truncate_chars(&self.message, MESSAGE_MAX_CHARS)));
        messages
    }
}

impl Assistant {
    /// Free-text conversation with the clinic assistant.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatReply, GatewayError> {
        if request.message.trim().is_empty() {
            return Err(GatewayError::invalid_input("message"));
        }

        if quick_triage_check(&request.message).is_some() {
            return Ok(ChatReply {
                reply: format!(
                    "What you describe may need emergency care. Please call emergency services \
                     or go to the nearest emergency room now. For neurosurgical emergencies, \
                     call {}.",
                    self.clinic_phone()
                ),
                urgency_level: UrgencyLevel::Emergency,
            });
        }

        let llm_request = LlmRequest {
            messages: request.messages(),
            temperature: 0.7,
            ..LlmRequest::prompt("")
        };

        let reply = match self.free_text(llm_request).await {
            Ok(text) => text.trim().to_string(),
            Err(err) => {
                self.record_fallback("chat", &err);
                format!(
                    "Our assistant is unavailable at the moment. To ask a question or book a \
                     consultation, please call {}.",
                    self.clinic_phone()
                )
            }
        };

        Ok(ChatReply {
            reply,
            urgency_level: UrgencyLevel::Routine,
        })
    }
}
