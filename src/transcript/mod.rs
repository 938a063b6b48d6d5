//! Transcript acquisition.
//!
//! Captions are fetched first; when a video has none, its audio is downloaded
//! and transcribed. Either way the result is a normalized, ordered list of
//! [`TranscriptSegment`]s.

mod acquirer;
mod captions;
mod video_id;

pub use acquirer::TranscriptAcquirer;
pub use captions::{parse_json3, YtDlpCaptionSource};
pub use video_id::VideoId;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single timed piece of a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Spoken text.
    pub text: String,
    /// Start time in seconds.
    pub start: f64,
    /// Duration in seconds.
    pub duration: f64,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start: f64, duration: f64) -> Self {
        Self {
            text: text.into(),
            start,
            duration,
        }
    }

    /// End time in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Trait for caption providers.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch captions for a video; `None` when the video has no usable track.
    async fn fetch_captions(&self, video_id: &VideoId) -> Result<Option<Vec<TranscriptSegment>>>;
}

/// Bring raw provider segments into transcript order.
///
/// Empty text is dropped and segments are sorted by start. Segments sharing a
/// start collapse into one spanning the longest of them, overlaps are clipped
/// so every segment ends where the next one begins at the latest, and a
/// zero-length segment stretches forward to its successor's start.
pub fn normalize_segments(raw: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = raw
        .into_iter()
        .filter_map(|s| {
            let text = s.text.split_whitespace().collect::<Vec<_>>().join(" ");
            if text.is_empty() || !s.start.is_finite() || !s.duration.is_finite() {
                return None;
            }
            Some(TranscriptSegment::new(text, s.start.max(0.0), s.duration.max(0.0)))
        })
        .collect();

    // Stable, so equal-start runs keep provider order.
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut collapsed: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match collapsed.last_mut() {
            Some(prev) if prev.start == segment.start => {
                prev.text.push(' ');
                prev.text.push_str(&segment.text);
                prev.duration = prev.duration.max(segment.duration);
            }
            _ => collapsed.push(segment),
        }
    }

    let next_starts: Vec<Option<f64>> = (0..collapsed.len())
        .map(|i| collapsed.get(i + 1).map(|n| n.start))
        .collect();

    collapsed
        .into_iter()
        .zip(next_starts)
        .map(|(mut segment, next_start)| {
            match next_start {
                Some(next) if segment.duration <= 0.0 || segment.end() > next => {
                    segment.duration = next - segment.start;
                }
                None if segment.duration <= 0.0 => segment.duration = f64::EPSILON,
                _ => {}
            }
            segment
        })
        .collect()
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
