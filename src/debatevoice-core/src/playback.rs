//! Audio playback through the default output device.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::audio::{self, AudioArtifact, AudioFormat};
use crate::error::DebateError;
use crate::tracker::ResourceTracker;

/// Plays artifacts one at a time.
///
/// While an artifact plays, its tracker lock is held, so a concurrent
/// release waits for playback to finish.
pub struct Player {
    tracker: Arc<ResourceTracker>,
    queue: AsyncMutex<()>,
}

impl Player {
    pub fn new(tracker: Arc<ResourceTracker>) -> Self {
        Self {
            tracker,
            queue: AsyncMutex::new(()),
        }
    }

    /// Play an artifact to completion.
    pub async fn play(&self, artifact: &AudioArtifact) -> Result<(), DebateError> {
        check_playable(artifact)?;

        let _turn = self.queue.lock().await;
        let _file = self.tracker.lock(&artifact.path).await;

        let path = artifact.path.clone();
        let started = Instant::now();
        tokio::task::spawn_blocking(move || play_blocking(&path))
            .await
            .map_err(|e| DebateError::PlaybackError(format!("Playback task failed: {}", e)))??;

        debug!(
            "Played {} in {:.1}s",
            artifact.path.display(),
            started.elapsed().as_secs_f32()
        );
        Ok(())
    }
}

/// Reject missing files and malformed WAV headers before touching the device.
fn check_playable(artifact: &AudioArtifact) -> Result<(), DebateError> {
    if !artifact.path.exists() {
        return Err(DebateError::PlaybackError(format!(
            "Audio file not found: {}",
            artifact.path.display()
        )));
    }

    if artifact.format == AudioFormat::Wav {
        audio::validate_wav(&artifact.path)
            .map_err(|e| DebateError::PlaybackError(format!("Invalid audio file: {}", e)))?;
    }

    Ok(())
}

fn play_blocking(path: &Path) -> Result<(), DebateError> {
    let stream = rodio::OutputStreamBuilder::open_default_stream()
        .map_err(|e| DebateError::PlaybackError(format!("Failed to open audio output: {}", e)))?;
    let sink = rodio::Sink::connect_new(stream.mixer());

    let file = File::open(path)?;
    let source = rodio::Decoder::new(BufReader::new(file))
        .map_err(|e| DebateError::PlaybackError(format!("Failed to decode audio: {}", e)))?;

    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ArtifactStore;

    #[tokio::test]
    async fn test_missing_file_rejected() {
        let player = Player::new(Arc::new(ResourceTracker::new()));
        let artifact = AudioArtifact::new("/definitely/not/here.wav", AudioFormat::Wav);

        let err = player.play(&artifact).await.unwrap_err();
        assert!(err.to_string().contains("Audio file not found"));
    }

    #[tokio::test]
    async fn test_malformed_wav_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Arc::new(ResourceTracker::new());
        let store = ArtifactStore::new(tracker.clone(), dir.path());
        let artifact = store.write(AudioFormat::Wav, b"RIFF0000WAVE").unwrap();

        let player = Player::new(tracker);
        let err = player.play(&artifact).await.unwrap_err();
        assert!(err.to_string().contains("Invalid audio file"));
    }
}
