//! Narrow client for a hosted, OpenAI-compatible chat completion API.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::LlmError;

/// Strict output format the model is asked to follow.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub schema: Option<OutputSchema>,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::user(prompt)],
            schema: None,
            temperature: 0.3,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, name: &'static str, schema: Value) -> Self {
        self.schema = Some(OutputSchema { name, schema });
        self
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Anything able to answer an [`LlmRequest`] with a raw JSON response.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> Result<Value, LlmError>;
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl HttpLlmClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        for message in &request.messages {
            messages.push(serde_json::json!({ "role": message.role, "content": message.content }));
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                }
            });
        }
        body
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: LlmRequest) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, "calling LLM");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(&request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}

/// Known layouts of a model response, checked in this order.
#[derive(Debug)]
enum ResponseShape<'a> {
    /// The whole response is the text.
    Bare(&'a str),
    /// `{ "text": "..." }`
    TextField(&'a str),
    /// `{ "output": [ { "content": [ { "text": "..." } ] } ] }`
    OutputParts(&'a [Value]),
    /// `{ "choices": [ { "message": { "content": "..." } } ] }`
    Choices(&'a [Value]),
    /// `{ "candidates": [ { "content": { "parts": [ { "text": "..." } ] } } ] }`
    Candidates(&'a [Value]),
    Unknown,
}

fn classify(response: &Value) -> ResponseShape<'_> {
    if let Some(text) = response.as_str() {
        return ResponseShape::Bare(text);
    }
    if let Some(text) = response.get("text").and_then(Value::as_str) {
        return ResponseShape::TextField(text);
    }
    if let Some(items) = response.get("output").and_then(Value::as_array) {
        return ResponseShape::OutputParts(items);
    }
    if let Some(choices) = response.get("choices").and_then(Value::as_array) {
        return ResponseShape::Choices(choices);
    }
    if let Some(candidates) = response.get("candidates").and_then(Value::as_array) {
        return ResponseShape::Candidates(candidates);
    }
    ResponseShape::Unknown
}

/// Pull the generated text out of a response. Returns an empty string when
/// the layout is not recognised.
pub fn extract_text(response: &Value) -> String {
    let first_text = |parts: Option<&Vec<Value>>| {
        parts
            .into_iter()
            .flatten()
            .find_map(|part| part.get("text").and_then(Value::as_str))
            .map(str::to_string)
    };

    match classify(response) {
        ResponseShape::Bare(text) | ResponseShape::TextField(text) => text.to_string(),
        ResponseShape::OutputParts(items) => items
            .iter()
            .find_map(|item| first_text(item.get("content").and_then(Value::as_array)))
            .unwrap_or_default(),
        ResponseShape::Choices(choices) => choices
            .first()
            .and_then(|c| c.pointer("/message/content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        ResponseShape::Candidates(candidates) => candidates
            .first()
            .and_then(|c| first_text(c.pointer("/content/parts").and_then(Value::as_array)))
            .unwrap_or_default(),
        ResponseShape::Unknown => String::new(),
    }
}

/// Drop a surrounding markdown code fence, which some models add even when
/// asked for raw JSON.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    inner.trim()
}
