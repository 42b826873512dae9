//! Audio artifacts and the helpers that decode, normalize and combine them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rodio::Source;
use tracing::debug;

use crate::error::DebateError;
use crate::tracker::ArtifactStore;

/// Container format of an artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }
}

/// A generated audio file. Owned by the [`ResourceTracker`](crate::tracker::ResourceTracker)
/// once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub format: AudioFormat,
}

impl AudioArtifact {
    pub fn new(path: impl Into<PathBuf>, format: AudioFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }
}

/// Decoded mono waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode an artifact into a mono waveform.
pub fn decode(artifact: &AudioArtifact) -> Result<Waveform, DebateError> {
    match artifact.format {
        AudioFormat::Wav => decode_wav(&artifact.path),
        AudioFormat::Mp3 => decode_mp3(&artifact.path),
    }
}

fn decode_wav(path: &Path) -> Result<Waveform, DebateError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(Waveform {
        samples: downmix(interleaved, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

fn decode_mp3(path: &Path) -> Result<Waveform, DebateError> {
    let file = File::open(path)?;
    let decoder = rodio::Decoder::new(BufReader::new(file))
        .map_err(|e| DebateError::Decode(format!("{}: {}", path.display(), e)))?;

    let channels = u16::from(decoder.channels());
    let sample_rate = u32::from(decoder.sample_rate());
    let interleaved: Vec<f32> = decoder.collect();

    if interleaved.is_empty() {
        return Err(DebateError::Decode(format!(
            "{}: no audio frames",
            path.display()
        )));
    }

    Ok(Waveform {
        samples: downmix(interleaved, channels),
        sample_rate,
    })
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }
    let channels = channels as usize;
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample using linear interpolation.
pub fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples;
    }

    let step = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / step) as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * step;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else if src_idx < samples.len() {
            result.push(samples[src_idx]);
        }
    }

    result
}

/// Concatenate waveforms in order at the rate of the first one.
pub fn concatenate(segments: Vec<Waveform>) -> Waveform {
    let sample_rate = segments.first().map(|w| w.sample_rate).unwrap_or(0);
    let mut combined = Vec::with_capacity(segments.iter().map(|w| w.samples.len()).sum());

    for segment in segments {
        combined.extend(resample(segment.samples, segment.sample_rate, sample_rate));
    }

    Waveform {
        samples: combined,
        sample_rate,
    }
}

/// Write a waveform as 16-bit mono PCM WAV.
pub fn write_wav(path: &Path, waveform: &Waveform) -> Result<(), DebateError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in &waveform.samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Check that a WAV file has a usable header.
pub fn validate_wav(path: &Path) -> Result<(), DebateError> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.bits_per_sample == 0 {
        return Err(DebateError::PlaybackError(format!(
            "Invalid WAV file format: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Store a waveform as a new tracked WAV artifact.
pub fn save_waveform(store: &ArtifactStore, waveform: &Waveform) -> Result<AudioArtifact, DebateError> {
    let artifact = store.create(AudioFormat::Wav)?;
    write_wav(&artifact.path, waveform)?;
    Ok(artifact)
}

/// Convert an artifact to WAV. The source artifact is released once converted.
pub async fn normalize_to_wav(
    store: &ArtifactStore,
    artifact: AudioArtifact,
) -> Result<AudioArtifact, DebateError> {
    if artifact.format == AudioFormat::Wav {
        return Ok(artifact);
    }

    let converted = decode(&artifact).and_then(|waveform| save_waveform(store, &waveform));
    store.release(&artifact).await;

    let converted =
        converted.map_err(|e| DebateError::Decode(format!("Audio conversion failed: {}", e)))?;
    debug!(
        "Converted {} to {}",
        artifact.path.display(),
        converted.path.display()
    );
    Ok(converted)
}

/// Join several artifacts, in order, into one WAV artifact.
///
/// No gap is inserted between pieces. Inputs are left in place; the caller
/// decides when to release them.
pub fn combine(store: &ArtifactStore, artifacts: &[AudioArtifact]) -> Result<AudioArtifact, DebateError> {
    let segments = artifacts
        .iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()?;

    let combined = concatenate(segments);
    let artifact = save_waveform(store, &combined)?;
    debug!(
        "Combined {} pieces into {} ({:.1}s)",
        artifacts.len(),
        artifact.path.display(),
        combined.duration_secs()
    );
    Ok(artifact)
}
