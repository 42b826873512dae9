//! Error types for the debate voice system.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::provider::ProviderKind;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("{provider} returned {status}: {body}")]
    HttpStatus {
        provider: ProviderKind,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio decode error: {0}")]
    Decode(String),

    #[error("TTS error: {0}")]
    TtsError(String),

    #[error("Synthesis timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cannot synthesize empty text")]
    EmptyText,

    #[error("Playback error: {0}")]
    PlaybackError(String),

    #[error("All TTS services failed: {}", FailureList(.0))]
    AllProvidersFailed(Vec<ProviderFailure>),
}

/// The last error recorded for one provider during a fallback run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub message: String,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

struct FailureList<'a>(&'a [ProviderFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no providers in fallback order");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_providers_failed_lists_each_provider() {
        let err = DebateError::AllProvidersFailed(vec![
            ProviderFailure {
                provider: ProviderKind::ElevenLabs,
                message: "401 Unauthorized".to_string(),
            },
            ProviderFailure {
                provider: ProviderKind::Gtts,
                message: "connection reset".to_string(),
            },
        ]);

        assert_eq!(
            err.to_string(),
            "All TTS services failed: elevenlabs: 401 Unauthorized; gtts: connection reset"
        );
    }

    #[test]
    fn test_all_providers_failed_empty() {
        let err = DebateError::AllProvidersFailed(Vec::new());
        assert!(err.to_string().contains("no providers"));
    }
}
