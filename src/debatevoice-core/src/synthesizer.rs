//! Multi-provider speech synthesis with fallback.
//!
//! [`Synthesizer::speak`] walks the fallback order. For each available
//! provider the text is chunked to that provider's budget and every chunk is
//! synthesized with retry. A provider is all-or-nothing: if any chunk exhausts
//! its retries, the chunks already produced are discarded and the next
//! provider starts again from the first chunk. The first provider to get
//! through every chunk wins; its pieces are combined into one artifact.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::audio::{self, AudioArtifact};
use crate::chunker::chunk_text;
use crate::config::Config;
use crate::error::{DebateError, ProviderFailure};
use crate::provider::{
    ElevenLabsProvider, GttsProvider, KokoroProvider, ProviderDescriptor, ProviderKind,
    SpeechProvider,
};
use crate::retry::RetryPolicy;
use crate::tracker::{ArtifactStore, ResourceTracker};

/// Callback for synthesis progress.
pub type SynthesisCallback = Box<dyn Fn(SynthesisEvent) + Send + Sync>;

/// Events emitted while a request moves through the fallback order.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisEvent {
    /// The provider was unavailable at startup and was not tried.
    ProviderSkipped { provider: ProviderKind },
    /// The provider is about to synthesize `chunks` pieces.
    ProviderStarted { provider: ProviderKind, chunks: usize },
    /// A chunk failed and will be attempted again.
    ChunkRetry {
        provider: ProviderKind,
        chunk: usize,
        attempt: u32,
        error: String,
    },
    /// The provider gave up; the next one will be tried.
    ProviderFailed { provider: ProviderKind, error: String },
    /// Synthesis finished.
    Completed { provider: ProviderKind, path: PathBuf },
}

struct ProviderSlot {
    descriptor: ProviderDescriptor,
    provider: Option<Arc<dyn SpeechProvider>>,
}

/// Turns text into a playable artifact using whichever provider works.
pub struct Synthesizer {
    store: ArtifactStore,
    slots: Vec<ProviderSlot>,
    fallback_order: Vec<ProviderKind>,
    retry: RetryPolicy,
    callback: Option<SynthesisCallback>,
}

impl Synthesizer {
    /// Create a synthesizer with no providers.
    pub fn new(store: ArtifactStore) -> Self {
        Self {
            store,
            slots: Vec::new(),
            fallback_order: ProviderKind::ALL.to_vec(),
            retry: RetryPolicy::default(),
            callback: None,
        }
    }

    /// Initialize every provider from configuration.
    ///
    /// A provider that fails to initialize is logged and marked unavailable
    /// for the lifetime of this synthesizer.
    pub async fn from_config(
        config: &Config,
        elevenlabs_api_key: Option<String>,
        tracker: Arc<ResourceTracker>,
    ) -> Self {
        let store = ArtifactStore::new(tracker, config.tts.temp_dir());
        let mut synthesizer = Self::new(store.clone())
            .with_fallback_order(config.tts.fallback_order.clone())
            .with_retry_policy(config.tts.retry_policy());

        let elevenlabs = ElevenLabsProvider::new(
            elevenlabs_api_key.unwrap_or_default(),
            config.elevenlabs.clone(),
            store.clone(),
        );
        synthesizer = match elevenlabs {
            Ok(provider) => synthesizer.with_provider(Arc::new(provider)),
            Err(e) => {
                warn!("ElevenLabs initialization failed: {}", e);
                synthesizer.with_unavailable(
                    ProviderKind::ElevenLabs,
                    config.max_chars(ProviderKind::ElevenLabs),
                )
            }
        };

        synthesizer = match KokoroProvider::new(config.kokoro.clone(), store.clone()).await {
            Ok(provider) => synthesizer.with_provider(Arc::new(provider)),
            Err(e) => {
                warn!("Kokoro initialization failed: {}", e);
                synthesizer.with_unavailable(ProviderKind::Kokoro, config.max_chars(ProviderKind::Kokoro))
            }
        };

        match GttsProvider::new(config.gtts.clone(), store) {
            Ok(provider) => synthesizer.with_provider(Arc::new(provider)),
            Err(e) => {
                warn!("gTTS initialization failed: {}", e);
                synthesizer.with_unavailable(ProviderKind::Gtts, config.max_chars(ProviderKind::Gtts))
            }
        }
    }

    /// Register an available provider, replacing any slot of the same kind.
    pub fn with_provider(mut self, provider: Arc<dyn SpeechProvider>) -> Self {
        let descriptor = ProviderDescriptor {
            kind: provider.kind(),
            available: true,
            max_chars: provider.max_chars(),
            voice_identity: provider.supports_voice_identity(),
        };
        self.set_slot(ProviderSlot {
            descriptor,
            provider: Some(provider),
        });
        self
    }

    /// Record a provider that could not be initialized.
    pub fn with_unavailable(mut self, kind: ProviderKind, max_chars: usize) -> Self {
        let descriptor = ProviderDescriptor {
            kind,
            available: false,
            max_chars,
            voice_identity: kind == ProviderKind::ElevenLabs,
        };
        self.set_slot(ProviderSlot {
            descriptor,
            provider: None,
        });
        self
    }

    /// Set the order used by [`speak`](Self::speak).
    pub fn with_fallback_order(mut self, order: Vec<ProviderKind>) -> Self {
        self.fallback_order = order;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set a callback for synthesis events.
    pub fn with_callback(mut self, callback: SynthesisCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    fn set_slot(&mut self, slot: ProviderSlot) {
        let kind = slot.descriptor.kind;
        match self.slots.iter_mut().find(|s| s.descriptor.kind == kind) {
            Some(existing) => *existing = slot,
            None => self.slots.push(slot),
        }
    }

    /// Descriptors of every known provider.
    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.slots.iter().map(|s| s.descriptor.clone()).collect()
    }

    pub fn fallback_order(&self) -> &[ProviderKind] {
        &self.fallback_order
    }

    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        self.store.tracker()
    }

    /// Synthesize `text` using the configured fallback order.
    pub async fn speak(&self, text: &str, voice_id: &str) -> Result<AudioArtifact, DebateError> {
        self.speak_with_order(text, voice_id, &self.fallback_order).await
    }

    /// Synthesize `text`, trying providers in `order`.
    ///
    /// Fails only when every provider in `order` is unavailable or exhausted;
    /// the error then carries one entry per provider.
    pub async fn speak_with_order(
        &self,
        text: &str,
        voice_id: &str,
        order: &[ProviderKind],
    ) -> Result<AudioArtifact, DebateError> {
        if text.trim().is_empty() {
            return Err(DebateError::EmptyText);
        }

        let mut failures = Vec::new();

        for &kind in order {
            let Some(provider) = self.available(kind) else {
                debug!("Skipping unavailable provider {}", kind);
                self.emit_event(SynthesisEvent::ProviderSkipped { provider: kind });
                failures.push(ProviderFailure {
                    provider: kind,
                    message: "provider unavailable".to_string(),
                });
                continue;
            };

            match self.synthesize_with(provider.as_ref(), text, voice_id).await {
                Ok(artifact) => {
                    info!("Synthesized speech with {}", kind);
                    self.emit_event(SynthesisEvent::Completed {
                        provider: kind,
                        path: artifact.path.clone(),
                    });
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {}", kind, e);
                    self.emit_event(SynthesisEvent::ProviderFailed {
                        provider: kind,
                        error: e.to_string(),
                    });
                    failures.push(ProviderFailure {
                        provider: kind,
                        message: e.to_string(),
                    });
                }
            }
        }

        let err = DebateError::AllProvidersFailed(failures);
        error!("{}", err);
        Err(err)
    }

    /// Hand a finished artifact back for deletion.
    pub async fn release(&self, artifact: &AudioArtifact) {
        self.store.release(artifact).await;
    }

    fn available(&self, kind: ProviderKind) -> Option<Arc<dyn SpeechProvider>> {
        self.slots
            .iter()
            .find(|s| s.descriptor.kind == kind)
            .and_then(|s| s.provider.clone())
    }

    /// Run one provider over every chunk of `text`.
    async fn synthesize_with(
        &self,
        provider: &dyn SpeechProvider,
        text: &str,
        voice_id: &str,
    ) -> Result<AudioArtifact, DebateError> {
        let kind = provider.kind();
        let chunks: Vec<&str> = chunk_text(text, provider.max_chars()).collect();
        self.emit_event(SynthesisEvent::ProviderStarted {
            provider: kind,
            chunks: chunks.len(),
        });

        let mut pieces = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let result = self
                .retry
                .run(
                    |_| provider.synthesize(chunk, voice_id),
                    |attempt, e| {
                        warn!(
                            "{} chunk {}/{} attempt {} failed: {}",
                            kind,
                            index + 1,
                            chunks.len(),
                            attempt,
                            e
                        );
                        self.emit_event(SynthesisEvent::ChunkRetry {
                            provider: kind,
                            chunk: index,
                            attempt,
                            error: e.to_string(),
                        });
                    },
                )
                .await;

            match result {
                Ok(artifact) => pieces.push(artifact),
                Err(e) => {
                    self.release_all(&pieces).await;
                    return Err(e);
                }
            }
        }

        if pieces.len() == 1 {
            if let Some(only) = pieces.pop() {
                return Ok(only);
            }
        }

        let combined = audio::combine(&self.store, &pieces);
        self.release_all(&pieces).await;
        combined
    }

    async fn release_all(&self, artifacts: &[AudioArtifact]) {
        for artifact in artifacts {
            self.store.release(artifact).await;
        }
    }

    /// Emit an event if a callback is registered.
    fn emit_event(&self, event: SynthesisEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, Waveform};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    type Behavior = Box<dyn Fn(usize, &str) -> Result<(), DebateError> + Send + Sync>;

    /// Provider whose outcome is scripted per call. On success it writes a
    /// 100-sample WAV whose level is the chunk length / 1000.
    struct FakeProvider {
        kind: ProviderKind,
        max_chars: usize,
        store: ArtifactStore,
        behavior: Behavior,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(kind: ProviderKind, max_chars: usize, store: &ArtifactStore, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                max_chars,
                store: store.clone(),
                behavior,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn ok(kind: ProviderKind, max_chars: usize, store: &ArtifactStore) -> Arc<Self> {
            Self::new(kind, max_chars, store, Box::new(|_, _| Ok(())))
        }

        fn failing(kind: ProviderKind, store: &ArtifactStore) -> Arc<Self> {
            Self::new(
                kind,
                1000,
                store,
                Box::new(move |_, _| Err(DebateError::TtsError(format!("{} is down", kind)))),
            )
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SpeechProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn max_chars(&self) -> usize {
            self.max_chars
        }

        async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<AudioArtifact, DebateError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(text.to_string());
                calls.len()
            };
            (self.behavior)(call, text)?;
            let waveform = Waveform {
                samples: vec![text.chars().count() as f32 / 1000.0; 100],
                sample_rate: 8000,
            };
            audio::save_waveform(&self.store, &waveform)
        }
    }

    fn setup() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Arc::new(ResourceTracker::new()), dir.path());
        (dir, store)
    }

    fn no_wait() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_unavailable_provider_skipped_and_later_ones_untouched() {
        let (_dir, store) = setup();
        let b = FakeProvider::ok(ProviderKind::Kokoro, 1000, &store);
        let c = FakeProvider::ok(ProviderKind::Gtts, 1000, &store);

        let synth = Synthesizer::new(store.clone())
            .with_unavailable(ProviderKind::ElevenLabs, 2500)
            .with_provider(b.clone())
            .with_provider(c.clone())
            .with_retry_policy(no_wait());

        let artifact = synth.speak("Hello there.", "voice").await.unwrap();

        assert!(artifact.path.exists());
        assert_eq!(b.calls(), vec!["Hello there."]);
        assert!(c.calls().is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_fail_names_each_provider() {
        let (_dir, store) = setup();
        let synth = Synthesizer::new(store.clone())
            .with_provider(FakeProvider::failing(ProviderKind::ElevenLabs, &store))
            .with_unavailable(ProviderKind::Kokoro, 5000)
            .with_provider(FakeProvider::failing(ProviderKind::Gtts, &store))
            .with_retry_policy(no_wait());

        let err = synth.speak("Hello.", "voice").await.unwrap_err();
        let msg = err.to_string();

        assert!(msg.starts_with("All TTS services failed: "));
        assert!(msg.contains("elevenlabs: TTS error: elevenlabs is down"));
        assert!(msg.contains("kokoro: provider unavailable"));
        assert!(msg.contains("gtts: TTS error: gtts is down"));
        match err {
            DebateError::AllProvidersFailed(failures) => assert_eq!(failures.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_absorbed_by_retry() {
        let (_dir, store) = setup();
        let a = FakeProvider::new(
            ProviderKind::ElevenLabs,
            2500,
            &store,
            Box::new(|call, _| {
                if call < 3 {
                    Err(DebateError::TtsError("503 Service Unavailable".to_string()))
                } else {
                    Ok(())
                }
            }),
        );
        let b = FakeProvider::ok(ProviderKind::Gtts, 5000, &store);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let synth = Synthesizer::new(store.clone())
            .with_provider(a.clone())
            .with_provider(b.clone())
            .with_retry_policy(RetryPolicy::new(3, Duration::from_secs(1)))
            .with_callback(Box::new(move |e| sink.lock().unwrap().push(e)));

        let start = tokio::time::Instant::now();
        let artifact = synth.speak("Rebuttal.", "voice").await.unwrap();

        assert_eq!(a.calls().len(), 3);
        assert!(b.calls().is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        let events = events.lock().unwrap();
        let retries = events
            .iter()
            .filter(|e| matches!(e, SynthesisEvent::ChunkRetry { .. }))
            .count();
        assert_eq!(retries, 2);
        assert_eq!(
            events.last(),
            Some(&SynthesisEvent::Completed {
                provider: ProviderKind::ElevenLabs,
                path: artifact.path.clone(),
            })
        );
    }

    #[tokio::test]
    async fn test_partial_failure_discards_provider_and_restarts_from_first_chunk() {
        let (_dir, store) = setup();
        let text = "First sentence here. Second sentence here. Third sentence here.";

        // Chunk 2 of 3 never succeeds.
        let a = FakeProvider::new(
            ProviderKind::ElevenLabs,
            25,
            &store,
            Box::new(|_, text| {
                if text.starts_with("Second") {
                    Err(DebateError::TtsError("quota exceeded".to_string()))
                } else {
                    Ok(())
                }
            }),
        );
        let b = FakeProvider::ok(ProviderKind::Kokoro, 25, &store);

        let synth = Synthesizer::new(store.clone())
            .with_provider(a.clone())
            .with_provider(b.clone())
            .with_retry_policy(no_wait());

        let artifact = synth.speak(text, "voice").await.unwrap();

        assert_eq!(
            a.calls(),
            vec![
                "First sentence here.",
                "Second sentence here.",
                "Second sentence here.",
                "Second sentence here.",
            ]
        );
        assert_eq!(
            b.calls(),
            vec![
                "First sentence here.",
                "Second sentence here.",
                "Third sentence here.",
            ]
        );

        // Only the combined artifact survives.
        assert_eq!(store.tracker().tracked_paths(), vec![artifact.path.clone()]);
    }

    #[tokio::test]
    async fn test_combined_audio_follows_chunk_order() {
        let (_dir, store) = setup();
        // Chunks of 10, 19 and 29 characters.
        let c1 = "Nine char.";
        let c2 = "Nineteen chars now.";
        let c3 = "Twenty-nine characters in it.";
        let text = format!("{} {} {}", c1, c2, c3);

        let a = FakeProvider::ok(ProviderKind::Gtts, 25, &store);
        let synth = Synthesizer::new(store.clone())
            .with_provider(a.clone())
            .with_retry_policy(no_wait());

        let artifact = synth.speak(&text, "voice").await.unwrap();
        assert_eq!(a.calls(), vec![c1, c2, c3]);
        assert_eq!(artifact.format, AudioFormat::Wav);

        let waveform = audio::decode(&artifact).unwrap();
        assert_eq!(waveform.samples.len(), 300);
        let levels: Vec<f32> = waveform.samples.chunks(100).map(|c| c[50]).collect();
        let expected: Vec<f32> = [c1, c2, c3]
            .iter()
            .map(|c| c.chars().count() as f32 / 1000.0)
            .collect();
        for (got, want) in levels.iter().zip(&expected) {
            assert!((got - want).abs() < 0.001, "got {} want {}", got, want);
        }
    }

    #[tokio::test]
    async fn test_single_chunk_passes_through() {
        let (_dir, store) = setup();
        let a = FakeProvider::ok(ProviderKind::Gtts, 5000, &store);
        let synth = Synthesizer::new(store.clone()).with_provider(a);

        let artifact = synth.speak("Short reply.", "voice").await.unwrap();
        assert_eq!(store.tracker().tracked_paths(), vec![artifact.path.clone()]);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_without_calls() {
        let (_dir, store) = setup();
        let a = FakeProvider::ok(ProviderKind::Gtts, 5000, &store);
        let synth = Synthesizer::new(store.clone()).with_provider(a.clone());

        let err = synth.speak("   ", "voice").await.unwrap_err();
        assert!(matches!(err, DebateError::EmptyText));
        assert!(a.calls().is_empty());
    }

    #[tokio::test]
    async fn test_order_override() {
        let (_dir, store) = setup();
        let a = FakeProvider::ok(ProviderKind::ElevenLabs, 2500, &store);
        let c = FakeProvider::ok(ProviderKind::Gtts, 5000, &store);
        let synth = Synthesizer::new(store.clone())
            .with_provider(a.clone())
            .with_provider(c.clone());

        synth
            .speak_with_order("Hello.", "voice", &[ProviderKind::Gtts, ProviderKind::ElevenLabs])
            .await
            .unwrap();

        assert!(a.calls().is_empty());
        assert_eq!(c.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_release_deletes_and_is_idempotent() {
        let (_dir, store) = setup();
        let synth = Synthesizer::new(store.clone())
            .with_provider(FakeProvider::ok(ProviderKind::Gtts, 5000, &store));

        let artifact = synth.speak("Hello.", "voice").await.unwrap();
        assert!(artifact.path.exists());

        synth.release(&artifact).await;
        assert!(!artifact.path.exists());
        synth.release(&artifact).await;
        assert!(synth.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_descriptors() {
        let (_dir, store) = setup();
        let synth = Synthesizer::new(store.clone())
            .with_unavailable(ProviderKind::ElevenLabs, 2500)
            .with_provider(FakeProvider::ok(ProviderKind::Gtts, 5000, &store));

        let descriptors = synth.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert!(!descriptors[0].available);
        assert!(descriptors[0].voice_identity);
        assert!(descriptors[1].available);
        assert_eq!(descriptors[1].max_chars, 5000);
    }
}
