use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::error::{Result, SongwrightError};
use crate::models::{GenerationRequest, GenerationResult};
use crate::providers::ProviderId;

/// The most recent generation, kept so it can be revised, translated and
/// exported.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub request_id: Uuid,
    pub request: Arc<GenerationRequest>,
    pub result: GenerationResult,
    pub generated_at: DateTime<Utc>,
    pub provider: ProviderId,
    pub model: String,
    pub attempts: u32,
    pub warnings: Vec<String>,
}

/// Ephemeral per-process state: the latest entry plus one gate per kind of
/// long-running call.
#[derive(Default)]
pub struct Session {
    latest: RwLock<Option<Arc<SessionEntry>>>,
    generation: Mutex<()>,
    translation: Mutex<()>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the generation slot. A second concurrent claim fails instead
    /// of queueing.
    pub fn begin_generation(&self) -> Result<MutexGuard<'_, ()>> {
        self.generation
            .try_lock()
            .map_err(|_| SongwrightError::Busy("generation".to_string()))
    }

    pub fn begin_translation(&self) -> Result<MutexGuard<'_, ()>> {
        self.translation
            .try_lock()
            .map_err(|_| SongwrightError::Busy("translation".to_string()))
    }

    pub async fn latest(&self) -> Option<Arc<SessionEntry>> {
        self.latest.read().await.clone()
    }

    pub async fn require_latest(&self) -> Result<Arc<SessionEntry>> {
        self.latest().await.ok_or(SongwrightError::NoResult)
    }

    /// Replaces the latest entry.
    pub async fn store(&self, entry: SessionEntry) -> Arc<SessionEntry> {
        let entry = Arc::new(entry);
        *self.latest.write().await = Some(Arc::clone(&entry));
        tracing::debug!(request_id = %entry.request_id, "Stored latest generation");
        entry
    }
}
