//! Speech-to-text fallback for videos without captions.

mod whisper;

pub use whisper::{is_api_key_configured, WhisperTranscriber};

use crate::audio::AudioTrack;
use crate::error::Result;
use crate::transcript::TranscriptSegment;
use async_trait::async_trait;

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an audio track into timestamped segments.
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Vec<TranscriptSegment>>;
}
