//! DebateVoice Core Library
//!
//! Turns debate replies into speech: sentence-aware chunking, synthesis
//! across several providers with retry and fallback, audio combination,
//! playback, and tracked cleanup of every temporary audio file.

pub mod audio;
pub mod chunker;
pub mod config;
pub mod error;
pub mod playback;
pub mod provider;
pub mod rebuttal;
pub mod retry;
pub mod synthesizer;
pub mod tracker;

pub use audio::{AudioArtifact, AudioFormat};
pub use chunker::chunk_text;
pub use config::Config;
pub use error::{DebateError, ProviderFailure};
pub use playback::Player;
pub use provider::{ProviderDescriptor, ProviderKind, SpeechProvider};
pub use rebuttal::{Position, RebuttalGenerator};
pub use retry::RetryPolicy;
pub use synthesizer::{SynthesisCallback, SynthesisEvent, Synthesizer};
pub use tracker::{ArtifactStore, FileGuard, ResourceTracker};
