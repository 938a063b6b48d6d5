//! Audio download and processing for the transcription fallback.

mod downloader;

pub use downloader::{probe_duration, split_audio, YtDlpFetcher};

use crate::error::Result;
use crate::transcript::VideoId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A downloaded audio track ready for transcription.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub video_id: VideoId,
    pub path: PathBuf,
}

impl AudioTrack {
    pub fn new(video_id: VideoId, path: impl Into<PathBuf>) -> Self {
        Self {
            video_id,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Trait for fetching the audio of a video.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the audio track of a video.
    async fn download_audio(&self, video_id: &VideoId) -> Result<AudioTrack>;
}
