use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    CompletionRequest, Endpoint, LlmProvider, ProviderId, RawCompletion, empty_response,
    transport_error,
};
use crate::error::{Result, SongwrightError};
use crate::transport::HttpRequest;

pub const API_VERSION: &str = "2023-06-01";

/// The Messages API has no JSON mode, so JSON requests carry this instead.
const JSON_ONLY_SUFFIX: &str = "\n\nRespond with valid JSON only.";

#[derive(Debug, Serialize, Clone)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Clone)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
}

/// Anthropic Messages API.
pub struct AnthropicProvider {
    endpoint: Endpoint,
}

impl AnthropicProvider {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    fn messages_request(&self, request: &CompletionRequest) -> MessagesRequest {
        let mut user = request.user.clone();
        if request.json_output {
            user.push_str(JSON_ONLY_SUFFIX);
        }
        MessagesRequest {
            model: self.endpoint.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: user,
            }],
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        let body = serde_json::to_value(self.messages_request(request))?;
        tracing::debug!(
            model = %self.endpoint.model,
            prompt_len = request.user.len(),
            "Sending Anthropic messages request"
        );

        let http = HttpRequest::new(self.endpoint.url("/v1/messages"), body)
            .header("x-api-key", self.endpoint.api_key.clone())
            .header("anthropic-version", API_VERSION);
        let value = self
            .endpoint
            .tx
            .post_json(http)
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        let response: MessagesResponse = serde_json::from_value(value).map_err(|e| {
            SongwrightError::provider(self.id().name(), format!("unexpected response shape: {e}"))
        })?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            return Err(empty_response(self.id()));
        }

        let tokens_used = response.usage.and_then(|u| match (u.input_tokens, u.output_tokens) {
            (None, None) => None,
            (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
        });

        Ok(RawCompletion { text, tokens_used })
    }
}
