//! Google Translate text-to-speech.
//!
//! The endpoint only accepts short requests, so text is sent in word-bounded
//! pieces of at most [`REQUEST_CHARS`] characters and the returned MP3 frames
//! are concatenated. The MP3 is then converted to WAV.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ProviderKind, SpeechProvider};
use crate::audio::{self, AudioArtifact, AudioFormat};
use crate::config::GttsConfig;
use crate::error::DebateError;
use crate::tracker::ArtifactStore;

/// Longest text sent in one request.
pub const REQUEST_CHARS: usize = 100;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)";

pub struct GttsProvider {
    client: reqwest::Client,
    config: GttsConfig,
    store: ArtifactStore,
}

impl GttsProvider {
    pub fn new(config: GttsConfig, store: ArtifactStore) -> Result<Self, DebateError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            store,
        })
    }

    fn endpoint(&self) -> String {
        match &self.config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://translate.google.{}/translate_tts", self.config.tld),
        }
    }

    async fn fetch_piece(&self, piece: &str, idx: usize, total: usize) -> Result<Vec<u8>, DebateError> {
        let total = total.to_string();
        let idx = idx.to_string();
        let textlen = piece.chars().count().to_string();

        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", self.config.lang.as_str()),
                ("q", piece),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebateError::HttpStatus {
                provider: ProviderKind::Gtts,
                status,
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechProvider for GttsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gtts
    }

    fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioArtifact, DebateError> {
        let pieces = split_words(text, REQUEST_CHARS);
        if pieces.is_empty() {
            return Err(DebateError::EmptyText);
        }

        let mut mp3 = Vec::new();
        for (idx, piece) in pieces.iter().enumerate() {
            mp3.extend(self.fetch_piece(piece, idx, pieces.len()).await?);
        }
        debug!("gTTS returned {} bytes in {} requests", mp3.len(), pieces.len());

        let artifact = self.store.write(AudioFormat::Mp3, &mp3)?;
        audio::normalize_to_wav(&self.store, artifact).await
    }
}

/// Split text on whitespace into pieces of at most `max_chars` characters.
/// Words longer than `max_chars` are cut.
fn split_words(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if current_len > 0 && current_len + 1 + word_len > max_chars {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if word_len > max_chars {
            let chars: Vec<char> = word.chars().collect();
            for part in chars.chunks(max_chars) {
                pieces.push(part.iter().collect());
            }
            continue;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if current_len > 0 {
        pieces.push(current);
    }

    pieces
}
