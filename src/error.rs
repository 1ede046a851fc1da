use thiserror::Error;

/// Error taxonomy for songwright.
///
/// There is no parser variant: a malformed model response
/// always yields a fallback `GenerationResult`, never an error.
#[derive(Error, Debug)]
pub enum SongwrightError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{provider} credential error: {reason}")]
    Auth { provider: String, reason: String },

    #[error("{provider} request failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Another {0} is already in progress for this session")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No generated lyrics in this session yet")]
    NoResult,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SongwrightError {
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// True for errors the caller should fix locally before trying again.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Busy(_) | Self::NoResult)
    }
}

pub type Result<T> = std::result::Result<T, SongwrightError>;
