use chrono::Utc;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::display::format_lyrics;
use crate::error::{Result, SongwrightError};
use crate::export::{self, ExportFormat};
use crate::models::{GenerationOutcome, GenerationRequest, GenerationResult};
use crate::parser;
use crate::payload::{FormInput, build_request};
use crate::prompt::{self, render_directive_with_retry, render_revision};
use crate::providers::{LlmProvider, ProviderConfig, build_provider};
use crate::retry::{FailureReason, RetryState, is_retryable};
use crate::session::{Session, SessionEntry};
use crate::transport::Transport;
use crate::validation::{ResponseValidator, enrich};

/// Result of one translation call.
#[derive(Debug, Clone, Serialize)]
pub struct TranslationOutcome {
    pub target_language: String,
    pub translation: String,
    /// True when the latest generated lyrics were translated.
    pub from_latest: bool,
}

/// What the bounded attempt loop produced.
struct Attempts {
    result: GenerationResult,
    attempts: u32,
    tokens_used: Option<u64>,
}

/// Orchestrates one user action from form values to a stored result.
pub struct SongwrightService {
    config: Arc<Config>,
    catalog: Arc<Catalog>,
    transport: Arc<dyn Transport>,
    session: Session,
}

impl SongwrightService {
    pub fn new(config: Arc<Config>, catalog: Arc<Catalog>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            catalog,
            transport,
            session: Session::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Builds and checks the request. A structure override naming a catalog
    /// template is replaced by that template's pattern.
    pub fn prepare_request(&self, form: &FormInput) -> Result<GenerationRequest> {
        let mut request = build_request(form)?;
        self.catalog.validate(&request)?;
        if let Some(pattern) = request
            .structure_override
            .as_deref()
            .and_then(|name| self.catalog.structure(name))
        {
            request.structure_override = Some(pattern.to_string());
        }
        Ok(request)
    }

    pub async fn generate(
        &self,
        form: FormInput,
        provider: ProviderConfig,
    ) -> Result<GenerationOutcome> {
        let _gate = self.session.begin_generation()?;
        let request = Arc::new(self.prepare_request(&form)?);
        let llm = build_provider(&provider, &self.config.providers, Arc::clone(&self.transport))?;

        tracing::info!(
            provider = %llm.id(),
            model = llm.model(),
            genre = %request.genre,
            song_type = %request.song_type,
            "Generating lyrics"
        );

        let attempts = self
            .run_attempts(llm.as_ref(), |state| {
                render_directive_with_retry(&request, state)
            })
            .await?;
        self.finish(request, llm.as_ref(), attempts).await
    }

    /// Refines the latest result according to `instructions`.
    pub async fn revise(
        &self,
        instructions: &str,
        provider: ProviderConfig,
    ) -> Result<GenerationOutcome> {
        let _gate = self.session.begin_generation()?;
        if instructions.trim().is_empty() {
            return Err(SongwrightError::validation("instructions", "is required"));
        }
        let latest = self.session.require_latest().await?;
        let llm = build_provider(&provider, &self.config.providers, Arc::clone(&self.transport))?;

        tracing::info!(
            provider = %llm.id(),
            model = llm.model(),
            previous = %latest.request_id,
            "Revising lyrics"
        );

        let base = render_revision(&latest.request, &latest.result, instructions);
        let attempts = self
            .run_attempts(llm.as_ref(), |state| {
                if state.is_retry() {
                    format!("{base}\n\n{}", state.corrective_note())
                } else {
                    base.clone()
                }
            })
            .await?;
        self.finish(Arc::clone(&latest.request), llm.as_ref(), attempts)
            .await
    }

    /// Translates `text`, or the latest lyrics when `text` is blank.
    pub async fn translate(
        &self,
        text: Option<&str>,
        target_language: &str,
        provider: ProviderConfig,
    ) -> Result<TranslationOutcome> {
        let _gate = self.session.begin_translation()?;
        let target_language = target_language.trim();
        if target_language.is_empty() {
            return Err(SongwrightError::validation("target_language", "is required"));
        }

        let (source, from_latest) = match text.map(str::trim).filter(|t| !t.is_empty()) {
            Some(text) => (text.to_string(), false),
            None => {
                let latest = self.session.require_latest().await?;
                let lyrics = format_lyrics(&latest.result.lyrics);
                if lyrics.trim().is_empty() {
                    return Err(SongwrightError::NoResult);
                }
                (lyrics, true)
            }
        };

        let llm = build_provider(&provider, &self.config.providers, Arc::clone(&self.transport))?;
        tracing::info!(
            provider = %llm.id(),
            target_language,
            chars = source.len(),
            "Translating lyrics"
        );
        let generation = &self.config.generation;
        let translation = llm
            .translate_with(
                &source,
                target_language,
                generation.translation_temperature,
                generation.translation_max_tokens,
            )
            .await?;

        Ok(TranslationOutcome {
            target_language: target_language.to_string(),
            translation,
            from_latest,
        })
    }

    /// Renders the latest result and writes it to the configured export
    /// directory, or to `directory` resolved inside it.
    pub async fn export(
        &self,
        format: ExportFormat,
        directory: Option<PathBuf>,
        file_name: Option<&str>,
    ) -> Result<PathBuf> {
        let latest = self.session.require_latest().await?;
        let contents = export::render(format, &latest.request, &latest.result, latest.generated_at)?;
        let stem = file_name
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("songwright_{}", latest.generated_at.format("%Y%m%d_%H%M%S"))
            });
        let directory =
            export::resolve_export_dir(&self.config.export.directory, directory.as_deref())?;
        export::write_export(directory, &stem, format, &contents)
    }

    pub async fn latest(&self) -> Option<Arc<SessionEntry>> {
        self.session.latest().await
    }

    /// Bounded attempt loop. Provider errors and lyric-less results are
    /// retried with a corrective note; everything else returns at once.
    async fn run_attempts<F>(&self, llm: &dyn LlmProvider, render: F) -> Result<Attempts>
    where
        F: Fn(&RetryState) -> String + Send + Sync,
    {
        let persona = prompt::persona();
        let generation = &self.config.generation;
        let mut state = RetryState::first(self.config.retry.max_attempts);
        let mut tokens_used: Option<u64> = None;

        loop {
            let directive = render(&state);
            match llm
                .generate(&persona, &directive, generation.temperature, generation.max_tokens)
                .await
            {
                Ok(completion) => {
                    if let Some(tokens) = completion.tokens_used {
                        tokens_used = Some(tokens_used.unwrap_or(0) + tokens);
                    }
                    let result = parser::parse(&completion.text);
                    if result.lyrics.has_content() {
                        return Ok(Attempts {
                            result,
                            attempts: state.attempt,
                            tokens_used,
                        });
                    }
                    match state.advance(FailureReason::MissingLyrics) {
                        Some(next) => {
                            tracing::warn!(
                                attempt = state.attempt,
                                "Response contained no lyrics, retrying"
                            );
                            state = next;
                        }
                        None => {
                            tracing::warn!(
                                attempts = state.attempt,
                                "Response still contained no lyrics after the last attempt"
                            );
                            return Ok(Attempts {
                                result,
                                attempts: state.attempt,
                                tokens_used,
                            });
                        }
                    }
                }
                Err(e) if is_retryable(&e) => {
                    match state.advance(FailureReason::Provider(e.to_string())) {
                        Some(next) => {
                            tracing::warn!(attempt = state.attempt, "{}, retrying", e);
                            state = next;
                        }
                        None => {
                            tracing::error!(attempts = state.attempt, "Giving up: {}", e);
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn finish(
        &self,
        request: Arc<GenerationRequest>,
        llm: &dyn LlmProvider,
        attempts: Attempts,
    ) -> Result<GenerationOutcome> {
        let Attempts {
            mut result,
            attempts,
            tokens_used,
        } = attempts;
        enrich(&mut result, &request, llm.model(), tokens_used);
        let warnings = ResponseValidator::review(&request, &result);
        let degraded = result.is_degraded();
        if degraded {
            tracing::warn!("Returning unstructured model output");
        }

        let entry = self
            .session
            .store(SessionEntry {
                request_id: Uuid::new_v4(),
                request,
                result,
                generated_at: Utc::now(),
                provider: llm.id(),
                model: llm.model().to_string(),
                attempts,
                warnings: warnings.clone(),
            })
            .await;

        tracing::info!(
            request_id = %entry.request_id,
            attempts,
            degraded,
            warnings = warnings.len(),
            "Generation complete"
        );

        Ok(GenerationOutcome {
            request_id: entry.request_id,
            generated_at: entry.generated_at,
            attempts,
            degraded,
            warnings,
            result: entry.result.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TEST_CATALOG;
    use crate::payload::sample_form;
    use crate::providers::ProviderId;
    use crate::providers::testing::{ScriptedTransport, openai_reply};
    use crate::transport::{MockTransport, TransportError};
    use serde_json::Value;

    const GOOD: &str = r#"{"lyrics":{"verse_1":"uno\ndos","chorus":"oh oh","verse_2":"tres","pre_chorus":"ya","chanteo":"eh"},"phonetics":{"rhythm_notes":"easy"}}"#;

    fn service_with(tx: Arc<dyn Transport>) -> SongwrightService {
        service_exporting_to(tx, PathBuf::from("exports"))
    }

    fn service_exporting_to(tx: Arc<dyn Transport>, export_dir: PathBuf) -> SongwrightService {
        let mut config = Config::default();
        config.providers.openai.api_key = Some("sk-test".to_string());
        config.export.directory = export_dir;
        SongwrightService::new(
            Arc::new(config),
            Arc::new(Catalog::from_yaml_str(TEST_CATALOG).unwrap()),
            tx,
        )
    }

    fn openai() -> ProviderConfig {
        ProviderConfig::new(ProviderId::OpenAi, "gpt-4o")
    }

    fn user_message(body: &Value) -> String {
        body["messages"][1]["content"].as_str().unwrap_or_default().to_string()
    }

    #[tokio::test]
    async fn test_generate_stores_enriched_result() {
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(openai_reply(GOOD))]));
        let service = service_with(tx.clone());
        let outcome = service.generate(sample_form(), openai()).await.unwrap();

        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.degraded);
        assert!(outcome.warnings.is_empty(), "{:?}", outcome.warnings);
        assert_eq!(outcome.result.lyrics.get("chorus"), Some("oh oh"));
        assert_eq!(outcome.result.metadata.model_used.as_deref(), Some("gpt-4o"));
        assert_eq!(outcome.result.metadata.tokens_used, Some(600));
        assert_eq!(outcome.result.metadata.total_lines, Some(6));

        let latest = service.latest().await.unwrap();
        assert_eq!(latest.request_id, outcome.request_id);
        assert_eq!(latest.request.genre, "Reggaeton");
        assert_eq!(tx.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_calls() {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(0);
        let service = service_with(Arc::new(mock));
        let result = service
            .generate(sample_form(), ProviderConfig::new(ProviderId::Anthropic, ""))
            .await;
        assert!(matches!(result, Err(SongwrightError::Auth { .. })));
        assert!(service.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_catalog_rejection_makes_no_calls() {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(0);
        let service = service_with(Arc::new(mock));
        let mut form = sample_form();
        form.genre = "Polka".to_string();
        match service.generate(form, openai()).await {
            Err(SongwrightError::Validation { field, .. }) => assert_eq!(field, "genre"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_provider_error_is_retried() {
        let tx = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Status {
                status: 500,
                body: "boom".to_string(),
            }),
            Ok(openai_reply(GOOD)),
        ]));
        let service = service_with(tx.clone());
        let outcome = service.generate(sample_form(), openai()).await.unwrap();
        assert_eq!(outcome.attempts, 2);

        let requests = tx.requests();
        assert!(!user_message(&requests[0].body).contains("RETRY"));
        let second = user_message(&requests[1].body);
        assert!(second.contains("RETRY (attempt 2 of 3)"));
        assert!(second.contains("HTTP 500: boom"));
    }

    #[tokio::test]
    async fn test_missing_lyrics_retried_with_corrective_note() {
        let tx = Arc::new(ScriptedTransport::new(vec![
            Ok(openai_reply(r#"{"lyrics": {}, "qa_log": "sorry"}"#)),
            Ok(openai_reply(GOOD)),
        ]));
        let service = service_with(tx.clone());
        let outcome = service.generate(sample_form(), openai()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.result.metadata.tokens_used, Some(1200));
        assert!(user_message(&tx.requests()[1].body).contains("did not contain any lyrics"));
    }

    #[tokio::test]
    async fn test_exhausted_provider_errors_surface_vendor() {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(3).returning(|_| {
            Err(TransportError::Network("connection reset".to_string()))
        });
        let service = service_with(Arc::new(mock));
        match service.generate(sample_form(), openai()).await {
            Err(SongwrightError::Provider { provider, message }) => {
                assert_eq!(provider, "openai");
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lyricless_result_returned_with_warning_after_last_attempt() {
        let empty = || Ok(openai_reply(r#"{"lyrics": ""}"#));
        let tx = Arc::new(ScriptedTransport::new(vec![empty(), empty(), empty()]));
        let service = service_with(tx.clone());
        let outcome = service.generate(sample_form(), openai()).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.warnings.contains(&"No lyrics were returned".to_string()));
        assert_eq!(tx.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_prose_reply_is_degraded_not_retried() {
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(openai_reply(
            "Here is a song about the sea",
        ))]));
        let service = service_with(tx.clone());
        let outcome = service.generate(sample_form(), openai()).await.unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(
            outcome.result.lyrics.full_text(),
            Some("Here is a song about the sea")
        );
    }

    #[tokio::test]
    async fn test_concurrent_generation_is_busy() {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(0);
        let service = service_with(Arc::new(mock));
        let _held = service.session().begin_generation().unwrap();
        assert!(matches!(
            service.generate(sample_form(), openai()).await,
            Err(SongwrightError::Busy(_))
        ));
        assert!(matches!(
            service.revise("shorter", openai()).await,
            Err(SongwrightError::Busy(_))
        ));
    }

    #[tokio::test]
    async fn test_structure_template_name_expands() {
        let mut mock = MockTransport::new();
        mock.expect_post_json().times(0);
        let service = service_with(Arc::new(mock));
        let mut form = sample_form();
        form.structure_override = "urban simple".to_string();
        let request = service.prepare_request(&form).unwrap();
        assert_eq!(
            request.structure_override.as_deref(),
            Some("[verse 1] → [chorus] → [verse 2] → [chorus]")
        );
    }

    #[tokio::test]
    async fn test_revise_uses_latest_draft() {
        let tx = Arc::new(ScriptedTransport::new(vec![
            Ok(openai_reply(GOOD)),
            Ok(openai_reply(
                r#"{"lyrics":{"verse_1":"uno\ndos","chorus":"ah ah"},"qa_log":{"revision_notes":"new hook"}}"#,
            )),
        ]));
        let service = service_with(tx.clone());
        assert!(matches!(
            service.revise("punchier", openai()).await,
            Err(SongwrightError::NoResult)
        ));

        let first = service.generate(sample_form(), openai()).await.unwrap();
        let revised = service.revise("punchier hook", openai()).await.unwrap();
        assert_ne!(first.request_id, revised.request_id);
        assert_eq!(revised.result.lyrics.get("chorus"), Some("ah ah"));

        let prompt = user_message(&tx.requests()[1].body);
        assert!(prompt.starts_with("REVISION REQUEST\npunchier hook"));
        assert!(prompt.contains("[chorus]\noh oh"));
        assert_eq!(
            service.latest().await.unwrap().result.qa_log.revision_notes.as_deref(),
            Some("new hook")
        );
    }

    #[tokio::test]
    async fn test_translate_latest_or_given_text() {
        let tx = Arc::new(ScriptedTransport::new(vec![
            Ok(openai_reply(GOOD)),
            Ok(openai_reply(" [VERSE 1]\none\ntwo ")),
            Ok(openai_reply("Hello")),
        ]));
        let service = service_with(tx.clone());
        assert!(matches!(
            service.translate(None, "English", openai()).await,
            Err(SongwrightError::NoResult)
        ));

        service.generate(sample_form(), openai()).await.unwrap();
        let outcome = service.translate(None, "English", openai()).await.unwrap();
        assert!(outcome.from_latest);
        assert_eq!(outcome.translation, "[VERSE 1]\none\ntwo");
        let sent = &tx.requests()[1].body;
        assert_eq!(sent["messages"].as_array().unwrap().len(), 1);
        assert!(
            sent["messages"][0]["content"]
                .as_str()
                .unwrap()
                .ends_with("[VERSE 1]\nuno\ndos\n\n[PRE-CHORUS]\nya\n\n[CHORUS]\noh oh\n\n[VERSE 2]\ntres\n\n[CHANTEO]\neh")
        );

        let outcome = service.translate(Some("Hola"), "English", openai()).await.unwrap();
        assert!(!outcome.from_latest);
        assert_eq!(outcome.translation, "Hello");

        assert!(matches!(
            service.translate(Some("Hola"), "  ", openai()).await,
            Err(SongwrightError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_export_latest() {
        let base = std::env::temp_dir().join(format!("songwright-service-{}", Uuid::new_v4()));
        let tx = Arc::new(ScriptedTransport::new(vec![Ok(openai_reply(GOOD))]));
        let service = service_exporting_to(tx, base.clone());
        assert!(matches!(
            service.export(ExportFormat::Text, None, None).await,
            Err(SongwrightError::NoResult)
        ));

        service.generate(sample_form(), openai()).await.unwrap();
        let path = service
            .export(ExportFormat::Json, Some(PathBuf::from("takes")), Some("demo"))
            .await
            .unwrap();
        assert_eq!(path, base.join("takes").join("demo.json"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["result"]["lyrics"]["chorus"], "oh oh");

        let text_path = service.export(ExportFormat::Text, None, None).await.unwrap();
        assert_eq!(text_path.parent(), Some(base.as_path()));
        assert!(
            text_path
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("songwright_")
        );

        let outside = std::env::temp_dir().join(format!("songwright-outside-{}", Uuid::new_v4()));
        for requested in [outside.clone(), PathBuf::from("../escape")] {
            match service
                .export(ExportFormat::Text, Some(requested), Some("demo"))
                .await
            {
                Err(SongwrightError::Validation { field, .. }) => assert_eq!(field, "directory"),
                other => panic!("expected validation error, got {other:?}"),
            }
        }
        assert!(!outside.exists());
        std::fs::remove_dir_all(&base).unwrap();
    }
}
