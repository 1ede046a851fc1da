use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::ProviderId;

/// Main configuration structure for songwright
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub retry: RetryConfig,
    pub http: HttpConfig,
    pub catalog: CatalogConfig,
    pub export: ExportConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub translation_temperature: f32,
    pub translation_max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub directory: PathBuf,
}

/// Connection settings for one vendor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Resolved credential. Filled from the vendor's environment variable at
    /// load time when not set in the file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub default_model: String,
    /// Supported models. Left empty in the file, the built-in list applies.
    pub models: Vec<String>,
    /// Accept model names outside `models`, e.g. for a self-hosted gateway.
    pub allow_any_model: bool,
}

impl ProviderSettings {
    fn new(base_url: &str, default_model: &str, models: &[&str]) -> Self {
        Self {
            api_key: None,
            base_url: base_url.to_string(),
            default_model: default_model.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            allow_any_model: false,
        }
    }

    pub fn supports(&self, model: &str) -> bool {
        self.allow_any_model || self.models.iter().any(|m| m == model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub google: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAi => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Google => &self.google,
        }
    }

    fn get_mut(&mut self, id: ProviderId) -> &mut ProviderSettings {
        match id {
            ProviderId::OpenAi => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Google => &mut self.google,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "songwright".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 2500,
            translation_temperature: 0.3,
            translation_max_tokens: 2000,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::retry::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: crate::transport::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("catalog.yaml"),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("exports"),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderSettings::new(
                "https://api.openai.com/v1",
                "gpt-4o",
                &["gpt-4o", "gpt-4o-mini", "gpt-4-turbo", "gpt-4-turbo-preview", "gpt-4"],
            ),
            anthropic: ProviderSettings::new(
                "https://api.anthropic.com",
                "claude-3-5-sonnet-20240620",
                &[
                    "claude-3-5-sonnet-20240620",
                    "claude-3-opus-20240229",
                    "claude-3-sonnet-20240229",
                    "claude-3-haiku-20240307",
                ],
            ),
            google: ProviderSettings::new(
                "https://generativelanguage.googleapis.com",
                "gemini-1.5-pro",
                &["gemini-1.5-pro", "gemini-1.5-flash"],
            ),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::warn!(
                "No .env file found in any expected location - continuing with env vars only"
            );
        }

        let config_path =
            env::var("SONGWRIGHT_CONFIG_PATH").unwrap_or_else(|_| "songwright.yaml".to_string());

        let mut config = Self::from_file(&config_path);
        config.apply_overrides(|key| env::var(key).ok());

        for warning in config.validate() {
            tracing::warn!("Config validation warning: {} - continuing anyway", warning);
        }

        config
    }

    /// Reads a YAML config file, falling back to defaults when it is missing
    /// or unreadable.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Config file not found at {} - using defaults", path.display());
            return Self::default();
        }
        match fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(mut config) => {
                    tracing::info!("Loaded configuration from {}", path.display());
                    config.fill_provider_defaults();
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// A provider section given in the file without `base_url`,
    /// `default_model` or `models` gets the built-in values for those keys.
    pub fn fill_provider_defaults(&mut self) {
        let defaults = ProvidersConfig::default();
        for id in ProviderId::ALL {
            let fallback = defaults.get(id);
            let settings = self.providers.get_mut(id);
            if settings.base_url.trim().is_empty() {
                settings.base_url = fallback.base_url.clone();
            }
            if settings.default_model.trim().is_empty() {
                settings.default_model = fallback.default_model.clone();
            }
            if settings.models.is_empty() {
                settings.models = fallback.models.clone();
            }
        }
    }

    /// Apply overrides from `lookup`, normally the process environment.
    /// Unparseable numbers are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring {}: '{}' is not a valid value", key, raw);
                    None
                }
            }
        }

        for id in ProviderId::ALL {
            let settings = self.providers.get_mut(id);
            if let Some(key) = lookup(id.api_key_env()) {
                settings.api_key = Some(key);
            }
            if let Some(url) = lookup(id.base_url_env()) {
                settings.base_url = url;
            }
        }

        if let Some(v) = parsed("SONGWRIGHT_TEMPERATURE", lookup("SONGWRIGHT_TEMPERATURE")) {
            self.generation.temperature = v;
        }
        if let Some(v) = parsed("SONGWRIGHT_MAX_TOKENS", lookup("SONGWRIGHT_MAX_TOKENS")) {
            self.generation.max_tokens = v;
        }
        if let Some(v) = parsed(
            "SONGWRIGHT_RETRY_MAX_ATTEMPTS",
            lookup("SONGWRIGHT_RETRY_MAX_ATTEMPTS"),
        ) {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parsed(
            "SONGWRIGHT_HTTP_TIMEOUT_SECONDS",
            lookup("SONGWRIGHT_HTTP_TIMEOUT_SECONDS"),
        ) {
            self.http.timeout_seconds = v;
        }
        if let Some(path) = lookup("SONGWRIGHT_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SONGWRIGHT_EXPORT_DIR") {
            self.export.directory = PathBuf::from(dir);
        }
    }

    /// Validate configuration. Returns warnings; nothing here is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            warnings.push(format!(
                "generation.temperature {} is outside 0.0-2.0",
                self.generation.temperature
            ));
        }
        if self.generation.max_tokens == 0 {
            warnings.push("generation.max_tokens cannot be 0".to_string());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; one attempt will still be made".to_string());
        }
        if self.http.timeout_seconds == 0 {
            warnings.push("http.timeout_seconds cannot be 0".to_string());
        }

        for id in ProviderId::ALL {
            let settings = self.providers.get(id);
            if settings.api_key.is_none() {
                warnings.push(format!(
                    "{} is not set; {} requests need an explicit credential",
                    id.api_key_env(),
                    id
                ));
            }
            if !settings.supports(&settings.default_model) {
                warnings.push(format!(
                    "providers.{id}.default_model '{}' is not in its model list",
                    settings.default_model
                ));
            }
        }

        warnings
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds.max(1))
    }
}
