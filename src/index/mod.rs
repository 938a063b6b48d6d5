//! Per-video vector index.
//!
//! A [`VideoIndex`] is built once per ingestion and never mutated afterwards;
//! it is shared behind an `Arc` by concurrent queries. [`VectorIndex`] holds
//! the embedder and the retry policy used to build and query indexes.

use crate::chunking::Chunk;
use crate::embedding::{cosine_similarity, Embedder, Embedding};
use crate::error::{Result, TubeqaError};
use crate::retry::RetryPolicy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// A chunk with its similarity to a question.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity; only meaningful relative to other scores.
    pub score: f32,
}

/// Immutable chunk vectors of one video.
#[derive(Debug, Clone)]
pub struct VideoIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    dimensions: usize,
}

impl VideoIndex {
    /// Assemble an index from stored chunks and embeddings.
    ///
    /// Every chunk needs exactly one vector and all vectors share one length.
    pub fn from_parts(chunks: &[Chunk], embeddings: &[Embedding]) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(TubeqaError::IndexBuildFailed(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let by_id: HashMap<usize, &Vec<f32>> =
            embeddings.iter().map(|e| (e.chunk_id, &e.vector)).collect();

        let entries = chunks
            .iter()
            .map(|chunk| {
                by_id
                    .get(&chunk.id)
                    .map(|v| (chunk.clone(), (*v).clone()))
                    .ok_or_else(|| {
                        TubeqaError::IndexBuildFailed(format!("No embedding for chunk {}", chunk.id))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<(Chunk, Vec<f32>)>) -> Result<Self> {
        let dimensions = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((chunk, v)) = entries.iter().find(|(_, v)| v.len() != dimensions || v.is_empty()) {
            return Err(TubeqaError::IndexBuildFailed(format!(
                "Chunk {} has a {}-dimensional vector, expected {}",
                chunk.id,
                v.len(),
                dimensions
            )));
        }
        Ok(Self { entries, dimensions })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector length; 0 for an empty index.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(c, _)| c)
    }

    /// Stored vectors as embeddings, in chunk order.
    pub fn embeddings(&self) -> Vec<Embedding> {
        self.entries
            .iter()
            .map(|(c, v)| Embedding {
                chunk_id: c.id,
                vector: v.clone(),
            })
            .collect()
    }

    /// Exact nearest neighbours of `vector`.
    ///
    /// Ordered by descending score, ties by ascending chunk id.
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimensions {
            return Err(TubeqaError::Embedding(format!(
                "Question vector has {} dimensions, index has {}",
                vector.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|(chunk, v)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(vector, v),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Builds and queries [`VideoIndex`]es with one embedder.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    timeout: Duration,
    batch_size: usize,
}

impl VectorIndex {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retry: RetryPolicy,
        timeout: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            retry,
            timeout,
            batch_size: batch_size.max(1),
        }
    }

    /// Embed every chunk.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<VideoIndex> {
        self.build_reusing(chunks, None).await
    }

    /// Embed chunks, taking vectors of unchanged chunk text from `previous`.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn build_reusing(
        &self,
        chunks: &[Chunk],
        previous: Option<&VideoIndex>,
    ) -> Result<VideoIndex> {
        let expected = self.embedder.dimensions();
        let reusable: HashMap<&str, &Vec<f32>> = previous
            .filter(|p| p.dimensions() == expected)
            .map(|p| p.entries.iter().map(|(c, v)| (c.text.as_str(), v)).collect())
            .unwrap_or_default();

        let mut vectors: Vec<Option<Vec<f32>>> = chunks
            .iter()
            .map(|c| reusable.get(c.text.as_str()).map(|v| (*v).clone()))
            .collect();

        let missing: Vec<usize> = (0..chunks.len()).filter(|&i| vectors[i].is_none()).collect();
        info!(
            reused = chunks.len() - missing.len(),
            embedding = missing.len(),
            "Building vector index"
        );

        for (batch_no, batch) in missing.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();

            let embedded = self
                .retry
                .run("embedding batch", self.timeout, || self.embedder.embed_batch(&texts))
                .await
                .map_err(|e| {
                    TubeqaError::IndexBuildFailed(format!("Embedding batch {} failed: {}", batch_no, e))
                })?;

            if embedded.len() != texts.len() {
                return Err(TubeqaError::IndexBuildFailed(format!(
                    "Embedding batch {} returned {} vectors for {} texts",
                    batch_no,
                    embedded.len(),
                    texts.len()
                )));
            }

            debug!("Embedded batch {} ({} texts)", batch_no, texts.len());
            for (&i, vector) in batch.iter().zip(embedded) {
                vectors[i] = Some(vector);
            }
        }

        let entries = chunks
            .iter()
            .cloned()
            .zip(vectors.into_iter().map(Option::unwrap_or_default))
            .collect();

        VideoIndex::from_entries(entries)
    }

    /// Top `k` chunks for a question.
    #[instrument(skip(self, index, question))]
    pub async fn query(&self, index: &VideoIndex, question: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self
            .retry
            .run("question embedding", self.timeout, || self.embedder.embed(question))
            .await?;

        index.search(&vector, k)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Bag-of-letters embedder: deterministic and sensitive to wording.
    pub(crate) struct LetterEmbedder {
        pub calls: AtomicUsize,
        pub texts: AtomicUsize,
    }

    impl LetterEmbedder {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts: AtomicUsize::new(0),
            }
        }

        pub(crate) fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0; 26];
            for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            v
        }
    }

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(Self::vector(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }

        fn dimensions(&self) -> usize {
            26
        }
    }

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            id,
            text: text.to_string(),
            start: id as f64 * 10.0,
            end: id as f64 * 10.0 + 10.0,
            first_segment: id,
            last_segment: id,
        }
    }

    fn index_with(embedder: Arc<LetterEmbedder>, batch_size: usize) -> VectorIndex {
        VectorIndex::new(
            embedder,
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
            Duration::from_secs(5),
            batch_size,
        )
    }

    #[tokio::test]
    async fn test_build_batches_and_query() {
        let embedder = Arc::new(LetterEmbedder::new());
        let vectors = index_with(embedder.clone(), 2);
        let chunks = vec![
            chunk(0, "cats and kittens"),
            chunk(1, "rust borrow checker"),
            chunk(2, "zebra"),
        ];

        let index = vectors.build(&chunks).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimensions(), 26);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

        let results = vectors.query(&index, "borrow checker in rust", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, 1);
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_query_is_deterministic_with_id_tiebreak() {
        let vectors = index_with(Arc::new(LetterEmbedder::new()), 64);
        let chunks = vec![chunk(0, "abc"), chunk(1, "xyz"), chunk(2, "cba"), chunk(3, "bca")];
        let index = vectors.build(&chunks).await.unwrap();

        let first = vectors.query(&index, "abc", 4).await.unwrap();
        let second = vectors.query(&index, "abc", 4).await.unwrap();

        let ids: Vec<usize> = first.iter().map(|s| s.chunk.id).collect();
        assert_eq!(ids, vec![0, 2, 3, 1]);
        assert_eq!(ids, second.iter().map(|s| s.chunk.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_build_reusing_embeds_only_new_text() {
        let embedder = Arc::new(LetterEmbedder::new());
        let vectors = index_with(embedder.clone(), 64);

        let old = vectors
            .build(&[chunk(0, "first part"), chunk(1, "second part")])
            .await
            .unwrap();
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 2);

        let rebuilt = vectors
            .build_reusing(
                &[chunk(0, "first part"), chunk(1, "second part and more")],
                Some(&old),
            )
            .await
            .unwrap();
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_wrong_question_dimension() {
        let index = VideoIndex::from_parts(
            &[chunk(0, "a")],
            &[Embedding {
                chunk_id: 0,
                vector: vec![1.0, 0.0],
            }],
        )
        .unwrap();

        assert!(matches!(index.search(&[1.0, 0.0, 0.0], 1), Err(TubeqaError::Embedding(_))));
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let chunks = [chunk(0, "a"), chunk(1, "b")];
        let embeddings = [
            Embedding {
                chunk_id: 0,
                vector: vec![1.0, 0.0],
            },
            Embedding {
                chunk_id: 1,
                vector: vec![1.0],
            },
        ];

        assert!(matches!(
            VideoIndex::from_parts(&chunks, &embeddings),
            Err(TubeqaError::IndexBuildFailed(_))
        ));
        assert!(VideoIndex::from_parts(&chunks, &embeddings[..1]).is_err());
    }

    #[tokio::test]
    async fn test_empty_index_query() {
        let vectors = index_with(Arc::new(LetterEmbedder::new()), 64);
        let index = vectors.build(&[]).await.unwrap();
        assert!(index.is_empty());
        assert!(vectors.query(&index, "anything", 5).await.unwrap().is_empty());
    }
}
