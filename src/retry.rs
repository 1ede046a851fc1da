//! Bounded retry bookkeeping for generation calls.
//!
//! The loop itself lives in the service; adapters never retry. Each attempt
//! carries an explicit `RetryState` that the prompt renderer turns into a
//! corrective note.

use crate::error::SongwrightError;

/// Default number of attempts per generation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Longest slice of a provider error quoted back to the model.
const MAX_FAILURE_DETAIL: usize = 160;

/// First line of `message`, cut to `MAX_FAILURE_DETAIL` characters. Vendor
/// error bodies can be whole HTML pages.
fn failure_detail(message: &str) -> String {
    let line = message.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= MAX_FAILURE_DETAIL {
        return line.to_string();
    }
    let mut cut: String = line.chars().take(MAX_FAILURE_DETAIL).collect();
    cut.push_str("...");
    cut
}

/// Why the previous attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The response parsed but carried no lyric text.
    MissingLyrics,
    /// The vendor call failed; holds the provider error message.
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// 1-based attempt number.
    pub attempt: u32,
    pub max_attempts: u32,
    pub prior_failure: Option<FailureReason>,
}

impl RetryState {
    pub fn first(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts: max_attempts.max(1),
            prior_failure: None,
        }
    }

    /// The next attempt, or `None` once attempts are exhausted.
    pub fn advance(&self, reason: FailureReason) -> Option<Self> {
        (self.attempt < self.max_attempts).then(|| Self {
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
            prior_failure: Some(reason),
        })
    }

    pub fn is_retry(&self) -> bool {
        self.prior_failure.is_some()
    }

    pub fn is_last(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Text appended to the directive on a retry. Empty on the first attempt.
    pub fn corrective_note(&self) -> String {
        let Some(reason) = &self.prior_failure else {
            return String::new();
        };
        let cause = match reason {
            FailureReason::MissingLyrics => {
                "The previous response did not contain any lyrics. The \"lyrics\" object \
                 must hold the full text of every requested section."
                    .to_string()
            }
            FailureReason::Provider(message) => {
                format!("The previous request failed ({}).", failure_detail(message))
            }
        };
        format!(
            "RETRY (attempt {} of {}): {cause} Return ONLY valid JSON matching the required \
             output format, with no commentary before or after it.",
            self.attempt, self.max_attempts
        )
    }
}

/// Only vendor failures are worth another attempt; everything else is
/// deterministic.
pub fn is_retryable(error: &SongwrightError) -> bool {
    matches!(error, SongwrightError::Provider { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_until_exhausted() {
        let first = RetryState::first(3);
        assert!(!first.is_retry());
        assert!(first.corrective_note().is_empty());

        let second = first.advance(FailureReason::MissingLyrics).unwrap();
        assert_eq!(second.attempt, 2);
        assert!(second.is_retry());

        let third = second
            .advance(FailureReason::Provider("HTTP 500".to_string()))
            .unwrap();
        assert!(third.is_last());
        assert!(third.advance(FailureReason::MissingLyrics).is_none());
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let state = RetryState::first(0);
        assert_eq!(state.max_attempts, 1);
        assert!(state.is_last());
    }

    #[test]
    fn test_corrective_note_mentions_cause() {
        let state = RetryState::first(3)
            .advance(FailureReason::MissingLyrics)
            .unwrap();
        let note = state.corrective_note();
        assert!(note.starts_with("RETRY (attempt 2 of 3)"));
        assert!(note.contains("did not contain any lyrics"));

        let state = RetryState::first(2)
            .advance(FailureReason::Provider("timeout".to_string()))
            .unwrap();
        assert!(state.corrective_note().contains("(timeout)"));
    }

    #[test]
    fn test_corrective_note_shortens_vendor_bodies() {
        let body = format!(
            "openai request failed: HTTP 502: <html>{}</html>\n<body>gateway</body>",
            "x".repeat(5000)
        );
        let note = RetryState::first(3)
            .advance(FailureReason::Provider(body))
            .unwrap()
            .corrective_note();
        assert!(note.contains("HTTP 502"));
        assert!(note.contains("...)."));
        assert!(!note.contains("<body>"));
        assert!(note.len() < 500);
    }

    #[test]
    fn test_only_provider_errors_retry() {
        assert!(is_retryable(&SongwrightError::provider("openai", "HTTP 502")));
        assert!(!is_retryable(&SongwrightError::validation("genre", "is required")));
        assert!(!is_retryable(&SongwrightError::Auth {
            provider: "openai".to_string(),
            reason: "missing".to_string(),
        }));
    }
}
