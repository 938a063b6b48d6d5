//! Splitting transcripts into retrieval chunks.
//!
//! Chunks always cover whole segments. A chunk closes when the next segment
//! would push it over the character or duration budget, or when the speaker
//! pauses for longer than the pause threshold.

use crate::config::ChunkingSettings;
use crate::transcript::{format_timestamp, TranscriptSegment};
use serde::{Deserialize, Serialize};

/// A contiguous run of transcript segments, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in the video, starting at 0.
    pub id: usize,
    /// Space-joined text of the covered segments.
    pub text: String,
    /// Start of the first covered segment.
    pub start: f64,
    /// End of the last covered segment.
    pub end: f64,
    /// Index of the first covered segment.
    pub first_segment: usize,
    /// Index of the last covered segment (inclusive).
    pub last_segment: usize,
}

impl Chunk {
    /// Duration of this chunk in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// `MM:SS - MM:SS` span label.
    pub fn time_range(&self) -> String {
        format!("{} - {}", format_timestamp(self.start), format_timestamp(self.end))
    }
}

/// Chunk budgets.
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub max_duration_seconds: f64,
    pub pause_threshold_seconds: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&ChunkingSettings::default())
    }
}

impl From<&ChunkingSettings> for ChunkingConfig {
    fn from(settings: &ChunkingSettings) -> Self {
        Self {
            max_chars: settings.max_chars.max(1),
            max_duration_seconds: settings.max_duration_seconds,
            pause_threshold_seconds: settings.pause_threshold_seconds,
        }
    }
}

/// Deterministic segment-aligned chunker.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

struct Pending {
    first: usize,
    last: usize,
    start: f64,
    end: f64,
    text: String,
}

impl Pending {
    fn open(index: usize, segment: &TranscriptSegment) -> Self {
        Self {
            first: index,
            last: index,
            start: segment.start,
            end: segment.end(),
            text: segment.text.clone(),
        }
    }

    fn push(&mut self, index: usize, segment: &TranscriptSegment) {
        self.last = index;
        self.end = segment.end();
        self.text.push(' ');
        self.text.push_str(&segment.text);
    }

    fn close(self, id: usize) -> Chunk {
        Chunk {
            id,
            text: self.text,
            start: self.start,
            end: self.end,
            first_segment: self.first,
            last_segment: self.last,
        }
    }
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Split normalized segments into chunks with ids `0..n`.
    pub fn chunk(&self, segments: &[TranscriptSegment]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut pending: Option<Pending> = None;

        for (index, segment) in segments.iter().enumerate() {
            pending = Some(match pending.take() {
                None => Pending::open(index, segment),
                Some(mut current) => {
                    if self.should_close(&current, segment) {
                        chunks.push(current.close(chunks.len()));
                        Pending::open(index, segment)
                    } else {
                        current.push(index, segment);
                        current
                    }
                }
            });
        }

        if let Some(current) = pending {
            chunks.push(current.close(chunks.len()));
        }

        chunks
    }

    fn should_close(&self, current: &Pending, next: &TranscriptSegment) -> bool {
        let chars = current.text.chars().count() + 1 + next.text.chars().count();
        let duration = next.end() - current.start;
        let gap = next.start - current.end;

        chars > self.config.max_chars
            || duration > self.config.max_duration_seconds
            || gap > self.config.pause_threshold_seconds
    }
}
