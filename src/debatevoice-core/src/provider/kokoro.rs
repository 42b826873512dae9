//! Local synthesis with the Kokoro engine (kokoro-tiny).

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use tracing::{debug, info};

use super::{ProviderKind, SpeechProvider, run_blocking};
use crate::audio::{self, AudioArtifact, Waveform};
use crate::chunker::chunk_text;
use crate::config::KokoroConfig;
use crate::error::DebateError;
use crate::tracker::ArtifactStore;

/// Output sample rate of the engine.
pub const SAMPLE_RATE: u32 = 24000;

/// Kokoro is unreliable past roughly this many characters per call.
const ENGINE_CHARS: usize = 200;

/// Silence between engine calls (0.3 seconds at 24kHz).
const PIECE_GAP_SAMPLES: usize = 7200;

/// Kokoro synthesizer. Speaks every request with its configured voice.
///
/// The engine is CPU-bound and synchronous, so rendering runs on the
/// blocking pool.
pub struct KokoroProvider {
    engine: Arc<Mutex<TtsEngine>>,
    config: KokoroConfig,
    store: ArtifactStore,
}

impl KokoroProvider {
    /// Initialize the engine (downloads the model on first run) and check the
    /// configured voice exists.
    pub async fn new(config: KokoroConfig, store: ArtifactStore) -> Result<Self, DebateError> {
        if !config.enabled {
            return Err(DebateError::ConfigError("kokoro is disabled".to_string()));
        }

        let engine = TtsEngine::new()
            .await
            .map_err(|e| DebateError::TtsError(format!("Failed to initialize Kokoro: {}", e)))?;

        let available_voices = engine.voices();
        validate_voice(&config.voice, &available_voices)?;
        info!(
            "Kokoro ready with voice {} ({} voices installed)",
            config.voice,
            available_voices.len()
        );

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            config,
            store,
        })
    }
}

#[async_trait]
impl SpeechProvider for KokoroProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Kokoro
    }

    fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioArtifact, DebateError> {
        let engine = Arc::clone(&self.engine);
        let voice = self.config.voice.clone();
        let text = text.to_string();
        let samples = run_blocking(move || render(&engine, &voice, &text)).await?;
        if samples.is_empty() {
            return Err(DebateError::EmptyText);
        }

        let waveform = Waveform {
            samples,
            sample_rate: SAMPLE_RATE,
        };
        debug!("Kokoro rendered {:.1}s of audio", waveform.duration_secs());
        audio::save_waveform(&self.store, &waveform)
    }
}

/// Render `text` in engine-sized pieces separated by short silences.
fn render(engine: &Mutex<TtsEngine>, voice: &str, text: &str) -> Result<Vec<f32>, DebateError> {
    let mut engine = engine
        .lock()
        .map_err(|_| DebateError::TtsError("Kokoro engine lock poisoned".to_string()))?;

    let mut samples = Vec::new();
    for (i, piece) in chunk_text(text, ENGINE_CHARS).enumerate() {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if i > 0 {
            samples.extend(std::iter::repeat_n(0.0, PIECE_GAP_SAMPLES));
        }

        let rendered = engine
            .synthesize(piece, Some(voice))
            .map_err(|e| DebateError::TtsError(format!("Synthesis failed: {}", e)))?;
        samples.extend(rendered);
    }

    Ok(samples)
}

/// Check that a voice ID is one of `available`.
fn validate_voice(voice_id: &str, available: &[String]) -> Result<(), DebateError> {
    if voice_id.is_empty() {
        return Err(DebateError::TtsError(format!(
            "Voice ID cannot be empty. Available voices:\n{}",
            format_english_voices(available)
        )));
    }

    if !available.iter().any(|v| v == voice_id) {
        return Err(DebateError::TtsError(format!(
            "Unknown voice '{}'. Available voices:\n{}",
            voice_id,
            format_english_voices(available)
        )));
    }

    Ok(())
}

/// Format the English voices for display.
fn format_english_voices(available: &[String]) -> String {
    let mut english: Vec<&String> = available
        .iter()
        .filter(|v| {
            v.starts_with("af_") || v.starts_with("am_") || v.starts_with("bf_") || v.starts_with("bm_")
        })
        .collect();
    english.sort();

    english
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}
