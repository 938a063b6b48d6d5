//! Persistent per-video artifact cache.
//!
//! One [`CacheEntry`] holds everything a processed video needs to answer
//! questions: transcript, chunks, vectors and topics. Entries are written in
//! one piece and read back in one piece; anything partial is a miss.

mod memory;
mod sqlite;

pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

use crate::chunking::Chunk;
use crate::embedding::Embedding;
use crate::error::{Result, TubeqaError};
use crate::index::VideoIndex;
use crate::topics::TopicBlock;
use crate::transcript::{TranscriptSegment, VideoId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// All artifacts of one processed video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub video_id: VideoId,
    pub transcript: Vec<TranscriptSegment>,
    pub chunks: Vec<Chunk>,
    /// One per chunk, in chunk order.
    pub embeddings: Vec<Embedding>,
    pub topics: Vec<TopicBlock>,
    /// Pipeline configuration the artifacts were produced with.
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// End of the last segment.
    pub fn duration_seconds(&self) -> f64 {
        self.transcript.last().map(|s| s.end()).unwrap_or(0.0)
    }

    /// Vector length of the stored embeddings.
    pub fn dimensions(&self) -> usize {
        self.embeddings.first().map(|e| e.vector.len()).unwrap_or(0)
    }

    /// Whether the stored vectors came from the embedder described by
    /// `signature` (see `Settings::embedding_signature`).
    pub fn embedded_with(&self, signature: &str) -> bool {
        self.fingerprint.split(';').any(|part| part == signature)
    }

    /// Rebuild the searchable index from stored vectors.
    pub fn index(&self) -> Result<VideoIndex> {
        VideoIndex::from_parts(&self.chunks, &self.embeddings)
    }

    fn check_key(&self, video_id: &VideoId) -> Result<()> {
        if &self.video_id != video_id {
            return Err(TubeqaError::Cache(format!(
                "Entry for {} cannot be stored under {}",
                self.video_id, video_id
            )));
        }
        if self.chunks.len() != self.embeddings.len() {
            return Err(TubeqaError::Cache(format!(
                "Entry for {} has {} chunks but {} embeddings",
                self.video_id,
                self.chunks.len(),
                self.embeddings.len()
            )));
        }
        Ok(())
    }
}

/// Summary of a cached video for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CachedVideo {
    pub video_id: VideoId,
    pub segment_count: usize,
    pub chunk_count: usize,
    pub topic_count: usize,
    pub duration_seconds: f64,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

impl CachedVideo {
    fn from_entry(entry: &CacheEntry, accessed_at: DateTime<Utc>) -> Self {
        Self {
            video_id: entry.video_id.clone(),
            segment_count: entry.transcript.len(),
            chunk_count: entry.chunks.len(),
            topic_count: entry.topics.len(),
            duration_seconds: entry.duration_seconds(),
            fingerprint: entry.fingerprint.clone(),
            created_at: entry.created_at,
            accessed_at,
        }
    }
}

/// Trait for cache backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Complete entry for a video, or `None`. Records the access.
    async fn get(&self, video_id: &VideoId) -> Result<Option<CacheEntry>>;

    /// Store an entry atomically, replacing any previous one.
    async fn put(&self, video_id: &VideoId, entry: &CacheEntry) -> Result<()>;

    /// Whether an entry exists, without recording an access.
    async fn contains(&self, video_id: &VideoId) -> Result<bool>;

    /// Summaries of all entries, most recently used first.
    async fn list(&self) -> Result<Vec<CachedVideo>>;

    /// Drop an entry. Returns whether one existed.
    async fn remove(&self, video_id: &VideoId) -> Result<bool>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_entry(id: &str, fingerprint: &str) -> CacheEntry {
        let video_id = VideoId::parse(id).unwrap();
        let transcript = vec![
            TranscriptSegment::new("hello and welcome", 0.0, 4.0),
            TranscriptSegment::new("today we talk about caches", 4.0, 5.0),
            TranscriptSegment::new("thanks for watching", 30.0, 3.0),
        ];
        let chunks = vec![
            Chunk {
                id: 0,
                text: "hello and welcome today we talk about caches".into(),
                start: 0.0,
                end: 9.0,
                first_segment: 0,
                last_segment: 1,
            },
            Chunk {
                id: 1,
                text: "thanks for watching".into(),
                start: 30.0,
                end: 33.0,
                first_segment: 2,
                last_segment: 2,
            },
        ];
        let embeddings = vec![
            Embedding {
                chunk_id: 0,
                vector: vec![0.25, -1.5, 3.0],
            },
            Embedding {
                chunk_id: 1,
                vector: vec![1.0, 0.0, -0.125],
            },
        ];
        let topics = vec![TopicBlock {
            title: "Caches".into(),
            start: 0.0,
            segments: transcript.clone(),
        }];

        CacheEntry {
            video_id,
            transcript,
            chunks,
            embeddings,
            topics,
            fingerprint: fingerprint.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_entry_index_and_duration() {
        let entry = sample_entry("dQw4w9WgXcQ", "fp");
        assert_eq!(entry.duration_seconds(), 33.0);
        assert_eq!(entry.dimensions(), 3);
        assert_eq!(entry.index().unwrap().len(), 2);
    }

    #[test]
    fn test_embedded_with_matches_whole_section() {
        let entry = sample_entry("dQw4w9WgXcQ", "chunk:800c/60.0s/2.00p;embed:small/1536;topics:adaptive/30-600s");
        assert!(entry.embedded_with("embed:small/1536"));
        assert!(!entry.embedded_with("embed:small/153"));
        assert!(!entry.embedded_with("embed:large/1536"));
    }

    #[test]
    fn test_check_key() {
        let entry = sample_entry("dQw4w9WgXcQ", "fp");
        let other = VideoId::parse("aaaaaaaaaaa").unwrap();
        assert!(entry.check_key(&entry.video_id).is_ok());
        assert!(matches!(entry.check_key(&other), Err(TubeqaError::Cache(_))));
    }
}
