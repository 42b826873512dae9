//! Speech synthesis backends.
//!
//! Each backend turns one piece of text into one audio artifact. Callers are
//! responsible for keeping the text within [`SpeechProvider::max_chars`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioArtifact;
use crate::error::DebateError;

pub mod elevenlabs;
pub mod gtts;
pub mod kokoro;
#[cfg(test)]
pub(crate) mod test_server;

pub use elevenlabs::ElevenLabsProvider;
pub use gtts::GttsProvider;
pub use kokoro::KokoroProvider;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// ElevenLabs cloud voices. Honors voice identity.
    ElevenLabs,
    /// Kokoro running locally.
    Kokoro,
    /// Google Translate speech endpoint.
    Gtts,
}

impl ProviderKind {
    /// All providers, best voice fidelity first.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::ElevenLabs,
        ProviderKind::Kokoro,
        ProviderKind::Gtts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::ElevenLabs => "elevenlabs",
            ProviderKind::Kokoro => "kokoro",
            ProviderKind::Gtts => "gtts",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                DebateError::ConfigError(format!(
                    "Unknown TTS provider '{}'. Available providers: {}",
                    s,
                    ProviderKind::ALL.map(|k| k.name()).join(", ")
                ))
            })
    }
}

/// What the orchestrator knows about a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    /// Decided once at startup and never revisited.
    pub available: bool,
    pub max_chars: usize,
    pub voice_identity: bool,
}

/// Run blocking synthesis work on tokio's blocking pool.
///
/// Keeps the runtime responsive and lets a call timeout fire while the work
/// is still running. The work itself is not interrupted.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, DebateError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DebateError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DebateError::TtsError(format!("Synthesis task failed: {}", e)))?
}

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Longest text accepted in one request.
    fn max_chars(&self) -> usize;

    /// Whether `voice_id` passed to [`synthesize`](Self::synthesize) selects the voice.
    fn supports_voice_identity(&self) -> bool {
        false
    }

    /// Synthesize `text` into a new tracked artifact.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioArtifact, DebateError>;
}
