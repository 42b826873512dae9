//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::provider::ProviderKind;
use crate::retry::RetryPolicy;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tts: TtsConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub kokoro: KokoroConfig,
    pub gtts: GttsConfig,
    pub llm: LlmConfig,
}

/// Synthesis pipeline settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Providers to try, in order.
    pub fallback_order: Vec<ProviderKind>,
    /// Attempts per chunk before a provider is abandoned.
    pub retry_attempts: u32,
    /// Fixed pause between attempts.
    pub retry_backoff_ms: u64,
    /// Upper bound on a single provider call. Zero disables the bound.
    pub call_timeout_secs: u64,
    /// Scratch directory for generated audio. Defaults to the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Voice identity used when the caller does not pick one.
    pub default_voice_id: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            fallback_order: ProviderKind::ALL.to_vec(),
            retry_attempts: 3,
            retry_backoff_ms: 1000,
            call_timeout_secs: 60,
            temp_dir: None,
            default_voice_id: "21m00Tcm4TlvDq8ikWAM".to_string(),
        }
    }
}

impl TtsConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        let timeout = (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs));
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_backoff_ms))
            .with_call_timeout(timeout)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("debatevoice"))
    }
}

/// ElevenLabs settings. The API key comes from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub api_base: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub max_chars: usize,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.elevenlabs.io/v1".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            max_chars: 2500,
        }
    }
}

/// Local Kokoro engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KokoroConfig {
    pub enabled: bool,
    pub voice: String,
    pub max_chars: usize,
}

impl Default for KokoroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            voice: "af_sky".to_string(),
            max_chars: 5000,
        }
    }
}

/// Google Translate TTS settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GttsConfig {
    pub lang: String,
    pub tld: String,
    /// Full `translate_tts` URL. Derived from `tld` when unset.
    pub endpoint: Option<String>,
    pub max_chars: usize,
}

impl Default for GttsConfig {
    fn default() -> Self {
        Self {
            lang: "en".to_string(),
            tld: "com".to_string(),
            endpoint: None,
            max_chars: 5000,
        }
    }
}

/// Language model settings for rebuttal generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 5000,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.tts.fallback_order.is_empty() {
            return Err(DebateError::ConfigError(
                "tts.fallback_order must name at least one provider".to_string(),
            ));
        }
        if self.tts.retry_attempts == 0 {
            return Err(DebateError::ConfigError(
                "tts.retry_attempts must be at least 1".to_string(),
            ));
        }
        for (name, max) in [
            ("elevenlabs", self.elevenlabs.max_chars),
            ("kokoro", self.kokoro.max_chars),
            ("gtts", self.gtts.max_chars),
        ] {
            if max == 0 {
                return Err(DebateError::ConfigError(format!(
                    "{}.max_chars must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Character budget configured for a provider.
    pub fn max_chars(&self, kind: ProviderKind) -> usize {
        match kind {
            ProviderKind::ElevenLabs => self.elevenlabs.max_chars,
            ProviderKind::Kokoro => self.kokoro.max_chars,
            ProviderKind::Gtts => self.gtts.max_chars,
        }
    }
}

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a skilled debate bot. Your role is to:
When given a debate motion and position (for/against), provide strong opening arguments.
When responding to opponents, focus on rebutting their specific points.

1. Listen to arguments carefully and respond thoughtfully
2. Formulate logical and well-structured rebuttals
3. Maintain a respectful but assertive tone
4. Use facts and reasoning to support your points
5. Stay focused on the current topic
6. Be transparent about your AI nature when relevant

Keep responses concise and clear, suitable for speech synthesis.
Output ONLY your spoken words - no stage directions, no markdown, no asterisks.
"#;
