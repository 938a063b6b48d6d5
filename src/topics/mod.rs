//! Topic segmentation.
//!
//! Adjacent chunks whose vectors drift apart mark a topic change. Blocks are
//! held between a minimum and maximum duration and always consist of whole
//! segments, so the blocks of a video concatenate back to its transcript.

mod titler;

pub use titler::{OpenAITitler, Titler};

use crate::chunking::Chunk;
use crate::config::TopicSettings;
use crate::embedding::{cosine_similarity, Embedding};
use crate::retry::RetryPolicy;
use crate::transcript::TranscriptSegment;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Title used when chunks and transcript disagree.
const WHOLE_VIDEO_TITLE: &str = "Full Video Content";

/// Upper bound on the excerpt sent to the titler.
const TITLE_INPUT_CHARS: usize = 3000;

/// A titled, contiguous run of transcript segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBlock {
    pub title: String,
    /// Start of the first segment, in seconds.
    pub start: f64,
    pub segments: Vec<TranscriptSegment>,
}

impl TopicBlock {
    /// End of the last segment, in seconds.
    pub fn end(&self) -> f64 {
        self.segments.last().map(|s| s.end()).unwrap_or(self.start)
    }

    pub fn text(&self) -> String {
        join_text(&self.segments)
    }
}

/// Splits a processed video into titled topic blocks.
pub struct TopicSegmenter {
    titler: Arc<dyn Titler>,
    settings: TopicSettings,
    retry: RetryPolicy,
    timeout: Duration,
}

impl TopicSegmenter {
    /// `retry` and `timeout` apply per title request; one retry at most.
    pub fn new(
        titler: Arc<dyn Titler>,
        settings: TopicSettings,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            titler,
            settings,
            retry: retry.with_attempts(retry.max_attempts().min(2)),
            timeout,
        }
    }

    /// Partition the transcript into titled blocks.
    ///
    /// Never fails: missing vectors fall back to fixed windows and failed
    /// titles fall back to an excerpt.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn segment(
        &self,
        chunks: &[Chunk],
        embeddings: &[Embedding],
        segments: &[TranscriptSegment],
    ) -> Vec<TopicBlock> {
        if chunks.is_empty() || segments.is_empty() {
            return Vec::new();
        }

        if !chunks_cover(chunks, segments) {
            warn!("Chunks do not line up with the transcript, using a single block");
            return vec![TopicBlock {
                title: WHOLE_VIDEO_TITLE.to_string(),
                start: segments[0].start,
                segments: segments.to_vec(),
            }];
        }

        let groups = if vectors_match(chunks, embeddings) {
            similarity_groups(chunks, embeddings, &self.settings)
        } else {
            warn!("Embeddings missing or inconsistent, grouping by duration");
            window_groups(chunks, self.settings.max_topic_seconds)
        };
        info!("Found {} topics", groups.len());

        stream::iter(groups)
            .map(|group| self.titled_block(chunks, segments, group))
            .buffered(self.settings.max_concurrent_titles.max(1))
            .collect()
            .await
    }

    async fn titled_block(
        &self,
        chunks: &[Chunk],
        segments: &[TranscriptSegment],
        group: Range<usize>,
    ) -> TopicBlock {
        let first = &chunks[group.start];
        let last = &chunks[group.end - 1];
        let block_segments = segments[first.first_segment..=last.last_segment].to_vec();

        let excerpt = truncate_at_word(&join_text(&block_segments), TITLE_INPUT_CHARS);
        let generated = self
            .retry
            .run("topic title", self.timeout, || self.titler.title(&excerpt))
            .await;

        let title = match generated {
            Ok(raw) => clean_title(&raw, self.settings.title_max_words),
            Err(e) => {
                warn!(error = %e, "Title generation failed, using excerpt");
                None
            }
        }
        .unwrap_or_else(|| excerpt_title(&first.text, self.settings.excerpt_chars));

        debug!(%title, start = first.start, "Topic block");
        TopicBlock {
            title,
            start: block_segments[0].start,
            segments: block_segments,
        }
    }
}

fn join_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Chunks are contiguous, start at segment 0 and end at the last segment.
fn chunks_cover(chunks: &[Chunk], segments: &[TranscriptSegment]) -> bool {
    let mut next = 0;
    for chunk in chunks {
        if chunk.first_segment != next || chunk.last_segment < chunk.first_segment {
            return false;
        }
        next = chunk.last_segment + 1;
    }
    next == segments.len()
}

fn vectors_match(chunks: &[Chunk], embeddings: &[Embedding]) -> bool {
    let dims = embeddings.first().map(|e| e.vector.len()).unwrap_or(0);
    chunks.len() == embeddings.len()
        && dims > 0
        && chunks
            .iter()
            .zip(embeddings)
            .all(|(c, e)| c.id == e.chunk_id && e.vector.len() == dims)
}

/// Adaptive similarity threshold: mean minus half a standard deviation.
fn adaptive_threshold(similarities: &[f32]) -> f32 {
    if similarities.is_empty() {
        return 0.0;
    }
    let n = similarities.len() as f32;
    let mean = similarities.iter().sum::<f32>() / n;
    let variance = similarities.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    mean - 0.5 * variance.sqrt()
}

/// Chunk ranges split where adjacent similarity drops, within duration bounds.
fn similarity_groups(
    chunks: &[Chunk],
    embeddings: &[Embedding],
    settings: &TopicSettings,
) -> Vec<Range<usize>> {
    let similarities: Vec<f32> = embeddings
        .windows(2)
        .map(|pair| cosine_similarity(&pair[0].vector, &pair[1].vector))
        .collect();

    let threshold = settings
        .similarity_threshold
        .unwrap_or_else(|| adaptive_threshold(&similarities));
    debug!(threshold, "Topic boundary threshold");

    let mut groups = Vec::new();
    let mut block_start = 0;
    for (i, &similarity) in similarities.iter().enumerate() {
        let elapsed = chunks[i].end - chunks[block_start].start;
        let with_next = chunks[i + 1].end - chunks[block_start].start;

        if elapsed >= settings.min_topic_seconds
            && (similarity < threshold || with_next > settings.max_topic_seconds)
        {
            groups.push(block_start..i + 1);
            block_start = i + 1;
        }
    }
    groups.push(block_start..chunks.len());
    groups
}

/// Chunk ranges of at most `max_seconds` each (a single long chunk excepted).
fn window_groups(chunks: &[Chunk], max_seconds: f64) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut block_start = 0;
    for i in 1..chunks.len() {
        if chunks[i].end - chunks[block_start].start > max_seconds {
            groups.push(block_start..i);
            block_start = i;
        }
    }
    groups.push(block_start..chunks.len());
    groups
}

/// Normalize a model-produced title; `None` when nothing usable is left.
pub fn clean_title(raw: &str, max_words: usize) -> Option<String> {
    const TRIM: &[char] = &['"', '\'', '`', '*', '#', '“', '”', '‘', '’', '.', ':', ' '];

    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("Title:")
        .or_else(|| line.strip_prefix("title:"))
        .unwrap_or(line);

    let words: Vec<&str> = line
        .trim_matches(TRIM)
        .split_whitespace()
        .take(max_words.max(1))
        .collect();

    let title = words.join(" ").trim_matches(TRIM).to_string();
    (!title.is_empty()).then_some(title)
}

/// Fallback title: the opening of a chunk, cut at a word boundary.
pub fn excerpt_title(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    format!("{}...", truncate_at_word(text, max_chars))
}

fn truncate_at_word(text: &str, max_chars: usize) -> String {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return text.to_string();
    };
    let head = &text[..cut];
    match head.rfind(char::is_whitespace) {
        Some(space) if space > 0 => head[..space].trim_end().to_string(),
        _ => head.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TubeqaError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTitler {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Titler for FixedTitler {
        async fn title(&self, _excerpt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| TubeqaError::Provider("model unavailable".into()))
        }
    }

    fn segmenter(reply: Option<&'static str>) -> (TopicSegmenter, Arc<FixedTitler>) {
        let titler = Arc::new(FixedTitler {
            reply,
            calls: AtomicUsize::new(0),
        });
        let settings = TopicSettings {
            similarity_threshold: Some(0.5),
            min_topic_seconds: 20.0,
            max_topic_seconds: 100.0,
            ..TopicSettings::default()
        };
        let segmenter = TopicSegmenter::new(
            titler.clone(),
            settings,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
            Duration::from_secs(5),
        );
        (segmenter, titler)
    }

    /// One segment per chunk, 10 seconds each.
    fn fixture(directions: &[[f32; 2]]) -> (Vec<TranscriptSegment>, Vec<Chunk>, Vec<Embedding>) {
        let segments: Vec<_> = (0..directions.len())
            .map(|i| TranscriptSegment::new(format!("part {i} of the talk"), i as f64 * 10.0, 10.0))
            .collect();
        let chunks = segments
            .iter()
            .enumerate()
            .map(|(i, s)| Chunk {
                id: i,
                text: s.text.clone(),
                start: s.start,
                end: s.end(),
                first_segment: i,
                last_segment: i,
            })
            .collect();
        let embeddings = directions
            .iter()
            .enumerate()
            .map(|(i, d)| Embedding {
                chunk_id: i,
                vector: d.to_vec(),
            })
            .collect();
        (segments, chunks, embeddings)
    }

    fn assert_partition(blocks: &[TopicBlock], segments: &[TranscriptSegment]) {
        let rejoined: Vec<TranscriptSegment> =
            blocks.iter().flat_map(|b| b.segments.clone()).collect();
        assert_eq!(rejoined, segments);
        for block in blocks {
            assert_eq!(block.start, block.segments[0].start);
        }
    }

    #[tokio::test]
    async fn test_similarity_drop_splits_after_min_duration() {
        let (segments, chunks, embeddings) =
            fixture(&[[1.0, 0.0], [1.0, 0.1], [1.0, 0.0], [0.0, 1.0], [0.1, 1.0], [0.0, 1.0]]);
        let (segmenter, _) = segmenter(Some("Opening Remarks"));

        let blocks = segmenter.segment(&chunks, &embeddings, &segments).await;
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].segments.len(), 3);
        assert_eq!(blocks[1].start, 30.0);
        assert_eq!(blocks[0].title, "Opening Remarks");
        assert_partition(&blocks, &segments);
    }

    #[tokio::test]
    async fn test_min_duration_blocks_early_split() {
        let (segments, chunks, embeddings) = fixture(&[[1.0, 0.0], [0.0, 1.0], [0.0, 1.0]]);
        let (segmenter, _) = segmenter(Some("Only Topic"));

        let blocks = segmenter.segment(&chunks, &embeddings, &segments).await;
        // The drop after 10s is ignored because the block is still under 20s.
        assert_eq!(blocks.len(), 1);
        assert_partition(&blocks, &segments);
    }

    #[tokio::test]
    async fn test_max_duration_forces_split() {
        let directions = vec![[1.0, 0.0]; 25];
        let (segments, chunks, embeddings) = fixture(&directions);
        let (segmenter, _) = segmenter(Some("Same Thing Again"));

        let blocks = segmenter.segment(&chunks, &embeddings, &segments).await;
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.end() - b.start <= 100.0));
        assert_partition(&blocks, &segments);
    }

    #[tokio::test]
    async fn test_missing_embeddings_use_windows() {
        let directions = vec![[1.0, 0.0]; 25];
        let (segments, chunks, _) = fixture(&directions);
        let (segmenter, _) = segmenter(Some("Windowed"));

        let blocks = segmenter.segment(&chunks, &[], &segments).await;
        assert_eq!(blocks.len(), 3);
        assert_partition(&blocks, &segments);
    }

    #[tokio::test]
    async fn test_failed_titles_fall_back_to_excerpt() {
        let (segments, chunks, embeddings) = fixture(&[[1.0, 0.0], [1.0, 0.0]]);
        let (segmenter, titler) = segmenter(None);

        let blocks = segmenter.segment(&chunks, &embeddings, &segments).await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].title, "part 0 of the talk");
        // One retry at most.
        assert_eq!(titler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_chunks_no_blocks() {
        let (segmenter, _) = segmenter(Some("x"));
        assert!(segmenter.segment(&[], &[], &[]).await.is_empty());
    }

    #[test]
    fn test_adaptive_threshold() {
        assert!((adaptive_threshold(&[0.8, 0.8, 0.8]) - 0.8).abs() < 1e-6);
        let t = adaptive_threshold(&[0.9, 0.9, 0.1, 0.9]);
        assert!(t < 0.9 && t > 0.1);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("  \"Intro to Rust.\"  ", 8).as_deref(), Some("Intro to Rust"));
        assert_eq!(clean_title("Title: Memory Safety\nextra", 8).as_deref(), Some("Memory Safety"));
        assert_eq!(
            clean_title("one two three four five six seven eight nine ten", 8).as_deref(),
            Some("one two three four five six seven eight")
        );
        assert_eq!(clean_title(" \"\" ", 8), None);
    }

    #[test]
    fn test_excerpt_title_cuts_at_word() {
        assert_eq!(excerpt_title("short text", 60), "short text");
        assert_eq!(
            excerpt_title("the quick brown fox jumps over the lazy dog", 18),
            "the quick brown..."
        );
    }
}
