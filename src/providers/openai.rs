use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    CompletionRequest, Endpoint, LlmProvider, ProviderId, RawCompletion, empty_response,
    transport_error,
};
use crate::error::{Result, SongwrightError};
use crate::transport::HttpRequest;

/// Models that reject `response_format: json_object`.
const NO_JSON_MODE: [&str; 1] = ["gpt-4"];

const JSON_ONLY_SUFFIX: &str = "\n\nRespond with valid JSON only.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

/// OpenAI-compatible chat completions.
pub struct OpenAiProvider {
    endpoint: Endpoint,
}

impl OpenAiProvider {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    fn chat_request(&self, request: &CompletionRequest) -> ChatRequest {
        let json_mode = request.json_output && !NO_JSON_MODE.contains(&self.endpoint.model.as_str());

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        let mut user = request.user.clone();
        if request.json_output && !json_mode {
            user.push_str(JSON_ONLY_SUFFIX);
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user,
        });

        ChatRequest {
            model: self.endpoint.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: json_mode.then(|| serde_json::json!({"type": "json_object"})),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenAi
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        let body = serde_json::to_value(self.chat_request(request))?;
        tracing::debug!(
            model = %self.endpoint.model,
            prompt_len = request.user.len(),
            "Sending OpenAI chat completion"
        );

        let http = HttpRequest::new(self.endpoint.url("/chat/completions"), body)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key));
        let value = self
            .endpoint
            .tx
            .post_json(http)
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        let response: ChatResponse = serde_json::from_value(value).map_err(|e| {
            SongwrightError::provider(self.id().name(), format!("unexpected response shape: {e}"))
        })?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| empty_response(self.id()))?;

        Ok(RawCompletion {
            text,
            tokens_used: response.usage.and_then(|u| u.total_tokens),
        })
    }
}
