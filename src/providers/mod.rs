//! Vendor adapters behind one `LlmProvider` trait.
//!
//! Adapters translate a `CompletionRequest` into the vendor's HTTP payload,
//! send it through the shared `Transport`, and hand back the vendor's text
//! untouched. They never retry and never parse the text as JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::error::{Result, SongwrightError};
use crate::transport::{Transport, TransportError};

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;

/// Sampling settings for translation calls.
pub const TRANSLATION_TEMPERATURE: f32 = 0.3;
pub const TRANSLATION_MAX_TOKENS: u32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::OpenAi, ProviderId::Anthropic, ProviderId::Google];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Google => "google",
        }
    }

    /// Environment variable holding the vendor credential.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI_API_KEY",
            ProviderId::Anthropic => "ANTHROPIC_API_KEY",
            ProviderId::Google => "GOOGLE_API_KEY",
        }
    }

    pub fn base_url_env(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI_BASE_URL",
            ProviderId::Anthropic => "ANTHROPIC_BASE_URL",
            ProviderId::Google => "GOOGLE_BASE_URL",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderId {
    type Err = SongwrightError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                SongwrightError::validation(
                    "provider",
                    format!("'{s}' must be openai, anthropic or google"),
                )
            })
    }
}

/// Which vendor and model one call should use.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
pub struct ProviderConfig {
    #[schemars(description = "openai, anthropic or google")]
    pub provider: ProviderId,

    #[schemars(description = "Model name; empty selects the provider's default model")]
    #[serde(default)]
    pub model: String,

    #[schemars(description = "API key for this call; falls back to the server's configured key")]
    #[serde(default)]
    pub credential: Option<String>,
}

impl ProviderConfig {
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            credential: None,
        }
    }
}

/// One vendor call, independent of wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask for a JSON object where the vendor supports it.
    pub json_output: bool,
}

/// The vendor's answer: text exactly as returned, plus token usage if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCompletion {
    pub text: String,
    pub tokens_used: Option<u64>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn model(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion>;

    /// A structured-lyrics generation call.
    async fn generate(
        &self,
        persona: &str,
        directive: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<RawCompletion> {
        self.complete(&CompletionRequest {
            system: Some(persona.to_string()),
            user: directive.to_string(),
            temperature,
            max_tokens,
            json_output: true,
        })
        .await
    }

    /// Translates free text. The whole reply, trimmed, is the translation.
    async fn translate(&self, text: &str, target_language: &str) -> Result<String> {
        self.translate_with(
            text,
            target_language,
            TRANSLATION_TEMPERATURE,
            TRANSLATION_MAX_TOKENS,
        )
        .await
    }

    async fn translate_with(
        &self,
        text: &str,
        target_language: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let completion = self
            .complete(&CompletionRequest {
                system: None,
                user: crate::prompt::translation_prompt(text, target_language),
                temperature,
                max_tokens,
                json_output: false,
            })
            .await?;
        Ok(completion.text.trim().to_string())
    }
}

/// Shared state every adapter carries.
pub(crate) struct Endpoint {
    pub tx: Arc<dyn Transport>,
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl Endpoint {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

pub(crate) fn transport_error(id: ProviderId, err: TransportError) -> SongwrightError {
    tracing::error!(provider = %id, "Vendor request failed: {}", err);
    SongwrightError::provider(id.name(), err.to_string())
}

pub(crate) fn empty_response(id: ProviderId) -> SongwrightError {
    tracing::error!(provider = %id, "Vendor returned no text");
    SongwrightError::provider(id.name(), "response contained no text")
}

/// Builds the adapter for `config`. Model and credential are checked here,
/// so a bad call fails before any network traffic.
pub fn build_provider(
    config: &ProviderConfig,
    providers: &ProvidersConfig,
    tx: Arc<dyn Transport>,
) -> Result<Arc<dyn LlmProvider>> {
    let settings = providers.get(config.provider);

    let model = match config.model.trim() {
        "" => settings.default_model.clone(),
        model => model.to_string(),
    };
    if !settings.supports(&model) {
        return Err(SongwrightError::validation(
            "model",
            format!(
                "'{model}' is not supported by {}. Supported: {}",
                config.provider,
                settings.models.join(", ")
            ),
        ));
    }

    let present = |key: &Option<String>| {
        key.as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    };
    let api_key = present(&config.credential)
        .or_else(|| present(&settings.api_key))
        .ok_or_else(|| SongwrightError::Auth {
            provider: config.provider.name().to_string(),
            reason: format!(
                "no API key provided and {} is not set",
                config.provider.api_key_env()
            ),
        })?;

    let endpoint = Endpoint {
        tx,
        base_url: settings.base_url.clone(),
        model,
        api_key,
    };

    tracing::info!(provider = %config.provider, model = %endpoint.model, "Built provider adapter");

    Ok(match config.provider {
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new(endpoint)),
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new(endpoint)),
        ProviderId::Google => Arc::new(GoogleProvider::new(endpoint)),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    use crate::transport::{HttpRequest, Transport, TransportError};

    /// A minimal OpenAI chat completion carrying `content`.
    pub fn openai_reply(content: &str) -> Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 400, "completion_tokens": 200, "total_tokens": 600}
        })
    }

    /// Replays canned responses in order and records every request.
    pub struct ScriptedTransport {
        responses: Mutex<Vec<Result<Value, TransportError>>>,
        pub requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(mut responses: Vec<Result<Value, TransportError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("Scripted transport mutex should not be poisoned")
                .clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, request: HttpRequest) -> Result<Value, TransportError> {
            self.requests
                .lock()
                .expect("Scripted transport mutex should not be poisoned")
                .push(request);
            self.responses
                .lock()
                .expect("Scripted transport mutex should not be poisoned")
                .pop()
                .unwrap_or_else(|| Err(TransportError::Network("no more scripted responses".to_string())))
        }
    }
}
