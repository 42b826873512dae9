//! ElevenLabs text-to-speech over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ProviderKind, SpeechProvider};
use crate::audio::{AudioArtifact, AudioFormat};
use crate::config::ElevenLabsConfig;
use crate::error::DebateError;
use crate::tracker::ArtifactStore;

pub struct ElevenLabsProvider {
    client: reqwest::Client,
    api_key: String,
    config: ElevenLabsConfig,
    store: ArtifactStore,
}

impl ElevenLabsProvider {
    /// Create the provider. Fails when no API key is configured.
    pub fn new(
        api_key: impl Into<String>,
        config: ElevenLabsConfig,
        store: ArtifactStore,
    ) -> Result<Self, DebateError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DebateError::ConfigError(
                "ELEVEN_LABS_API_KEY is not set".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
            store,
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            },
        })
    }
}

#[async_trait]
impl SpeechProvider for ElevenLabsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ElevenLabs
    }

    fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    fn supports_voice_identity(&self) -> bool {
        true
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioArtifact, DebateError> {
        let url = format!(
            "{}/text-to-speech/{}",
            self.config.api_base.trim_end_matches('/'),
            voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&self.request_body(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DebateError::HttpStatus {
                provider: ProviderKind::ElevenLabs,
                status,
                body,
            });
        }

        let bytes = response.bytes().await?;
        let artifact = self.store.write(AudioFormat::Mp3, &bytes)?;
        debug!(
            "ElevenLabs returned {} bytes for {} chars",
            bytes.len(),
            text.chars().count()
        );
        Ok(artifact)
    }
}
