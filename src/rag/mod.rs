//! Question answering over a processed video.
//!
//! Retrieval looks only at the question; conversation history is handed to
//! the completer untouched, so earlier turns never shift which chunks are
//! retrieved.

mod completer;
pub mod context;

pub use completer::OpenAICompleter;
pub use context::{format_context, recent_history, NO_CONTEXT_MARKER};

use crate::cache::CacheStore;
use crate::config::RagSettings;
use crate::error::{Result, TubeqaError};
use crate::index::{ScoredChunk, VectorIndex};
use crate::retry::RetryPolicy;
use crate::transcript::VideoId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// One prior exchange, owned by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
    /// Position in the conversation, increasing from 1.
    pub timestamp: u64,
}

impl ChatTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, timestamp: u64) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            timestamp,
        }
    }

    /// The turn that comes after `history`.
    pub fn following(history: &[ChatTurn], question: impl Into<String>, answer: impl Into<String>) -> Self {
        let timestamp = history.last().map_or(1, |t| t.timestamp + 1);
        Self::new(question, answer, timestamp)
    }
}

/// A generated answer and the chunks it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Completer output, verbatim.
    pub text: String,
    /// Retrieved chunks, best match first.
    pub sources: Vec<ScoredChunk>,
}

/// Trait for grounded text generation.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Answer `question` from `context`, continuing the given conversation.
    async fn complete(&self, context: &str, question: &str, history: &[ChatTurn]) -> Result<String>;
}

/// Retrieval plus grounded completion for cached videos.
pub struct AnswerEngine {
    cache: Arc<dyn CacheStore>,
    index: Arc<VectorIndex>,
    completer: Arc<dyn Completer>,
    settings: RagSettings,
    embedding_signature: String,
    retry: RetryPolicy,
    timeout: Duration,
}

impl AnswerEngine {
    /// Completions are retried once at most. Entries whose vectors were not
    /// produced under `embedding_signature` are treated as not indexed.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        index: Arc<VectorIndex>,
        completer: Arc<dyn Completer>,
        settings: RagSettings,
        embedding_signature: String,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            cache,
            index,
            completer,
            settings,
            embedding_signature,
            retry: retry.with_attempts(retry.max_attempts().min(2)),
            timeout,
        }
    }

    /// Answer a question about a processed video. Has no side effects.
    #[instrument(skip(self, question, history), fields(video_id = %video_id, history = history.len()))]
    pub async fn answer(&self, video_id: &VideoId, question: &str, history: &[ChatTurn]) -> Result<Answer> {
        let entry = self
            .cache
            .get(video_id)
            .await?
            .ok_or_else(|| TubeqaError::VideoNotIndexed(video_id.to_string()))?;

        if !entry.embedded_with(&self.embedding_signature) {
            warn!(
                cached = %entry.fingerprint,
                current = %self.embedding_signature,
                "Stored vectors come from another embedder, re-process the video"
            );
            return Err(TubeqaError::VideoNotIndexed(video_id.to_string()));
        }

        let index = entry.index()?;
        let sources = self.index.query(&index, question, self.settings.top_k).await?;
        debug!("Retrieved {} chunks", sources.len());

        let context = format_context(&sources);
        let history = recent_history(history, self.settings.max_history_turns);

        let text = self
            .retry
            .run("completion", self.timeout, || {
                self.completer.complete(&context, question, history)
            })
            .await
            .map_err(|e| TubeqaError::AnswerGenerationFailed(e.to_string()))?;

        info!("Answered with {} sources", sources.len());
        Ok(Answer { text, sources })
    }
}
