use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    CompletionRequest, Endpoint, LlmProvider, ProviderId, RawCompletion, empty_response,
    transport_error,
};
use crate::error::{Result, SongwrightError};
use crate::transport::HttpRequest;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

/// Gemini `generateContent`.
pub struct GoogleProvider {
    endpoint: Endpoint,
}

impl GoogleProvider {
    pub(crate) fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    fn content_request(&self, request: &CompletionRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![text_content(Some("user"), &request.user)],
            system_instruction: request.system.as_deref().map(|s| text_content(None, s)),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request
                    .json_output
                    .then(|| "application/json".to_string()),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GoogleProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn model(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion> {
        let body = serde_json::to_value(self.content_request(request))?;
        tracing::debug!(
            model = %self.endpoint.model,
            prompt_len = request.user.len(),
            "Sending Gemini generateContent request"
        );

        let path = format!("/v1beta/models/{}:generateContent", self.endpoint.model);
        let http = HttpRequest::new(self.endpoint.url(&path), body)
            .header("x-goog-api-key", self.endpoint.api_key.clone());
        let value = self
            .endpoint
            .tx
            .post_json(http)
            .await
            .map_err(|e| transport_error(self.id(), e))?;

        let response: GenerateContentResponse = serde_json::from_value(value).map_err(|e| {
            SongwrightError::provider(self.id().name(), format!("unexpected response shape: {e}"))
        })?;

        let text: String = response
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(empty_response(self.id()));
        }

        Ok(RawCompletion {
            text,
            tokens_used: response.usage_metadata.and_then(|u| u.total_token_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvidersConfig;
    use crate::providers::testing::ScriptedTransport;
    use crate::providers::{ProviderConfig, build_provider};
    use serde_json::json;
    use std::sync::Arc;

    fn provider(tx: Arc<ScriptedTransport>) -> Arc<dyn LlmProvider> {
        let mut config = ProviderConfig::new(ProviderId::Google, "gemini-1.5-flash");
        config.credential = Some("g-key".to_string());
        build_provider(&config, &ProvidersConfig::default(), tx).unwrap()
    }

    #[tokio::test]
    async fn test_generate_request_shape() {
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"lyrics\""}, {"text": ":\"hi\"}"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "totalTokenCount": 42}
        }))]));
        let completion = provider(tx.clone())
            .generate("persona", "directive", 0.8, 2500)
            .await
            .unwrap();
        assert_eq!(completion.text, "{\"lyrics\":\"hi\"}");
        assert_eq!(completion.tokens_used, Some(42));

        let sent = &tx.requests()[0];
        assert_eq!(
            sent.url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent"
        );
        assert!(sent.headers.contains(&("x-goog-api-key".to_string(), "g-key".to_string())));
        assert_eq!(sent.body["systemInstruction"]["parts"][0]["text"], "persona");
        assert_eq!(sent.body["contents"][0]["parts"][0]["text"], "directive");
        assert_eq!(sent.body["generationConfig"]["maxOutputTokens"], 2500);
        assert_eq!(
            sent.body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_translate_omits_mime_type() {
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(json!({
            "candidates": [{"content": {"parts": [{"text": "I love you\n"}]}}]
        }))]));
        let text = provider(tx.clone()).translate("Te quiero", "English").await.unwrap();
        assert_eq!(text, "I love you");
        let sent = &tx.requests()[0];
        assert!(sent.body["generationConfig"].get("responseMimeType").is_none());
        assert!(sent.body.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_blocked_candidate_is_provider_error() {
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(json!({
            "candidates": [{"finishReason": "SAFETY"}]
        }))]));
        match provider(tx).generate("p", "d", 0.8, 10).await {
            Err(SongwrightError::Provider { provider, message }) => {
                assert_eq!(provider, "google");
                assert!(message.contains("no text"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }
}
