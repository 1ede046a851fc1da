use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, tool::Parameters},
    model::{CallToolResult, Content, ErrorData, ServerCapabilities, ServerInfo},
};
use rmcp_macros::{tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::display::format_lyrics;
use crate::error::SongwrightError;
use crate::export::ExportFormat;
use crate::models::{GenerationOutcome, GenerationRequest, GenerationResult};
use crate::payload::FormInput;
use crate::providers::{ProviderConfig, ProviderId};
use crate::service::SongwrightService;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GenerateLyricsParams {
    #[schemars(description = "Song parameters collected from the form")]
    pub form: FormInput,
    #[schemars(description = "Provider, model and optional API key")]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReviseLyricsParams {
    #[schemars(description = "What to change in the latest lyrics")]
    pub instructions: String,
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TranslateLyricsParams {
    #[schemars(description = "Target language, e.g. 'English'")]
    pub target_language: String,
    #[schemars(description = "Text to translate; omit to translate the latest lyrics")]
    #[serde(default)]
    pub text: Option<String>,
    pub provider: ProviderConfig,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct ExportLyricsParams {
    #[schemars(description = "text or json (default text)")]
    #[serde(default)]
    pub format: ExportFormat,
    #[schemars(description = "Subdirectory of the configured export directory; relative, no '..'")]
    #[serde(default)]
    pub directory: Option<String>,
    #[schemars(description = "File name without extension")]
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct EmptyParams {}

#[derive(Serialize)]
struct GenerateResponse {
    #[serde(flatten)]
    outcome: GenerationOutcome,
    formatted_lyrics: String,
}

#[derive(Serialize)]
struct LatestResponse<'a> {
    request_id: uuid::Uuid,
    generated_at: String,
    provider: ProviderId,
    model: &'a str,
    attempts: u32,
    warnings: &'a [String],
    request: &'a GenerationRequest,
    result: &'a GenerationResult,
    formatted_lyrics: String,
}

/// Maps a service failure onto an MCP error. Problems the caller can fix
/// are `invalid_params`; credential problems are `invalid_request`.
pub fn to_error_data(err: &SongwrightError) -> ErrorData {
    match err {
        SongwrightError::Auth { .. } => ErrorData::invalid_request(err.to_string(), None),
        e if e.is_user_error() => ErrorData::invalid_params(err.to_string(), None),
        _ => ErrorData::internal_error(err.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: T) -> std::result::Result<CallToolResult, ErrorData> {
    let content = Content::json(value).map_err(|e| {
        ErrorData::internal_error(format!("Failed to create JSON content: {e}"), None)
    })?;
    Ok(CallToolResult::success(vec![content]))
}

fn tool_error(tool: &str, err: SongwrightError) -> ErrorData {
    if err.is_user_error() {
        tracing::warn!("{} rejected: {}", tool, err);
    } else {
        tracing::error!("{} failed: {}", tool, err);
    }
    to_error_data(&err)
}

/// MCP front end for the lyric generator.
#[derive(Clone)]
pub struct SongwrightServer {
    tool_router: ToolRouter<Self>,
    service: Arc<SongwrightService>,
}

impl SongwrightServer {
    pub fn new(service: Arc<SongwrightService>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
        }
    }
}

#[tool_router]
impl SongwrightServer {
    #[tool(
        description = "Generate song lyrics from genre, type, vibe, energy, language and singer settings using the chosen LLM provider"
    )]
    pub async fn generate_lyrics(
        &self,
        params: Parameters<GenerateLyricsParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let GenerateLyricsParams { form, provider } = params.0;
        let outcome = self
            .service
            .generate(form, provider)
            .await
            .map_err(|e| tool_error("generate_lyrics", e))?;
        let formatted_lyrics = format_lyrics(&outcome.result.lyrics);
        json_result(GenerateResponse {
            outcome,
            formatted_lyrics,
        })
    }

    #[tool(description = "Revise the latest generated lyrics according to instructions")]
    pub async fn revise_lyrics(
        &self,
        params: Parameters<ReviseLyricsParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let ReviseLyricsParams {
            instructions,
            provider,
        } = params.0;
        let outcome = self
            .service
            .revise(&instructions, provider)
            .await
            .map_err(|e| tool_error("revise_lyrics", e))?;
        let formatted_lyrics = format_lyrics(&outcome.result.lyrics);
        json_result(GenerateResponse {
            outcome,
            formatted_lyrics,
        })
    }

    #[tool(description = "Translate the given text, or the latest lyrics, into another language")]
    pub async fn translate_lyrics(
        &self,
        params: Parameters<TranslateLyricsParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let TranslateLyricsParams {
            target_language,
            text,
            provider,
        } = params.0;
        let outcome = self
            .service
            .translate(text.as_deref(), &target_language, provider)
            .await
            .map_err(|e| tool_error("translate_lyrics", e))?;
        json_result(outcome)
    }

    #[tool(description = "Write the latest lyrics to a text or JSON file and return its path")]
    pub async fn export_lyrics(
        &self,
        params: Parameters<ExportLyricsParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let ExportLyricsParams {
            format,
            directory,
            file_name,
        } = params.0;
        let path = self
            .service
            .export(format, directory.map(PathBuf::from), file_name.as_deref())
            .await
            .map_err(|e| tool_error("export_lyrics", e))?;
        json_result(serde_json::json!({
            "format": format,
            "path": path.display().to_string(),
        }))
    }

    #[tool(description = "Show the latest generated lyrics with their parameters and warnings")]
    pub async fn latest_result(
        &self,
        _params: Parameters<EmptyParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let entry = self
            .service
            .session()
            .require_latest()
            .await
            .map_err(|e| tool_error("latest_result", e))?;
        json_result(LatestResponse {
            request_id: entry.request_id,
            generated_at: entry.generated_at.to_rfc3339(),
            provider: entry.provider,
            model: &entry.model,
            attempts: entry.attempts,
            warnings: &entry.warnings,
            request: &entry.request,
            result: &entry.result,
            formatted_lyrics: format_lyrics(&entry.result.lyrics),
        })
    }

    #[tool(description = "List the allowed genres, song types, vibes and structure templates")]
    pub async fn catalog(
        &self,
        _params: Parameters<EmptyParams>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        json_result(self.service.catalog())
    }
}

#[tool_handler]
impl ServerHandler for SongwrightServer {
    fn get_info(&self) -> ServerInfo {
        let server = &self.service.config().server;
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            server_info: rmcp::model::Implementation {
                name: server.name.clone(),
                version: server.version.clone(),
            },
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(
                "Songwright writes song lyrics with OpenAI, Anthropic or Google models. \
                 Call catalog for the allowed values, generate_lyrics to write a song, \
                 then revise_lyrics, translate_lyrics or export_lyrics to work on the \
                 latest result."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TEST_CATALOG};
    use crate::config::Config;
    use crate::transport::MockTransport;
    use rmcp::model::ErrorCode;

    fn server() -> SongwrightServer {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(0);
        let service = SongwrightService::new(
            Arc::new(Config::default()),
            Arc::new(Catalog::from_yaml_str(TEST_CATALOG).unwrap()),
            Arc::new(mock),
        );
        SongwrightServer::new(Arc::new(service))
    }

    #[test]
    fn test_error_mapping() {
        let invalid = to_error_data(&SongwrightError::validation("genre", "is required"));
        assert_eq!(invalid.code, ErrorCode::INVALID_PARAMS);
        assert!(invalid.message.contains("genre"));

        let busy = to_error_data(&SongwrightError::Busy("generation".to_string()));
        assert_eq!(busy.code, ErrorCode::INVALID_PARAMS);

        let auth = to_error_data(&SongwrightError::Auth {
            provider: "google".to_string(),
            reason: "no key".to_string(),
        });
        assert_eq!(auth.code, ErrorCode::INVALID_REQUEST);

        let vendor = to_error_data(&SongwrightError::provider("openai", "HTTP 500"));
        assert_eq!(vendor.code, ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_latest_result_before_generation() {
        let err = server()
            .latest_result(Parameters(EmptyParams {}))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_generate_without_credential_is_invalid_request() {
        let params = GenerateLyricsParams {
            form: crate::payload::sample_form(),
            provider: ProviderConfig::new(ProviderId::Google, ""),
        };
        let err = server()
            .generate_lyrics(Parameters(params))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_catalog_tool() {
        let result = server().catalog(Parameters(EmptyParams {})).await.unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[test]
    fn test_server_info_uses_config() {
        let info = server().get_info();
        assert_eq!(info.server_info.name, Config::default().server.name);
        assert!(info.capabilities.tools.is_some());
    }
}
