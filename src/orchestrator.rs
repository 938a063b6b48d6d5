//! Pipeline orchestrator for tubeqa.
//!
//! Coordinates transcript acquisition, chunking, indexing and topic
//! segmentation, and serves topic and question queries from the cache.
//!
//! Ingestion is single-flight per video: concurrent `process` calls for the
//! same cold id share one build. The cache write is the last step of a
//! build, so a cancelled or failed build never leaves anything behind.

use crate::audio::{MediaFetcher, YtDlpFetcher};
use crate::cache::{CacheEntry, CacheStore, CachedVideo, MemoryCacheStore, SqliteCacheStore};
use crate::chunking::{Chunker, ChunkingConfig};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, TubeqaError};
use crate::index::{VectorIndex, VideoIndex};
use crate::rag::{Answer, AnswerEngine, ChatTurn, Completer, OpenAICompleter};
use crate::retry::RetryPolicy;
use crate::topics::{OpenAITitler, TopicBlock, TopicSegmenter, Titler};
use crate::transcript::{
    TranscriptAcquirer, TranscriptSegment, TranscriptSource, VideoId, YtDlpCaptionSource,
};
use crate::transcription::{Transcriber, WhisperTranscriber};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Shared outcome of one ingestion: the entry and whether it came from the cache.
type Ingested = std::result::Result<(Arc<CacheEntry>, bool), Arc<TubeqaError>>;
type InFlight = Shared<BoxFuture<'static, Ingested>>;
type InFlightMap = Mutex<HashMap<VideoId, (Uuid, InFlight)>>;

/// Capability implementations used by a [`Pipeline`].
pub struct Components {
    pub captions: Arc<dyn TranscriptSource>,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
    pub titler: Arc<dyn Titler>,
    pub cache: Arc<dyn CacheStore>,
}

/// Result of processing a video.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub video_id: VideoId,
    /// Number of transcript segments.
    pub num_segments: usize,
    pub segments: Vec<TranscriptSegment>,
    /// Served from the cache without running ingestion.
    pub cached: bool,
}

impl ProcessResult {
    fn from_entry(entry: &CacheEntry, cached: bool) -> Self {
        Self {
            video_id: entry.video_id.clone(),
            num_segments: entry.transcript.len(),
            segments: entry.transcript.clone(),
            cached,
        }
    }
}

/// Everything a build needs, owned so the build future can outlive its caller.
struct Ingestor {
    acquirer: TranscriptAcquirer,
    chunker: Chunker,
    index: Arc<VectorIndex>,
    segmenter: TopicSegmenter,
    cache: Arc<dyn CacheStore>,
    fingerprint: String,
    embedding_signature: String,
}

impl Ingestor {
    async fn ingest(self: Arc<Self>, video_id: VideoId, force: bool) -> Result<(Arc<CacheEntry>, bool)> {
        let previous = self.cache.get(&video_id).await?;

        if !force {
            if let Some(entry) = previous.as_ref().filter(|e| e.fingerprint == self.fingerprint) {
                info!("Another caller already processed this video");
                return Ok((Arc::new(entry.clone()), true));
            }
        }

        let transcript = self.acquirer.acquire(&video_id).await?;
        let chunks = self.chunker.chunk(&transcript);
        info!("Created {} chunks from {} segments", chunks.len(), transcript.len());

        let reusable: Option<VideoIndex> = previous
            .as_ref()
            .filter(|entry| entry.embedded_with(&self.embedding_signature))
            .and_then(|entry| match entry.index() {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("Previous vectors are unusable, embedding from scratch: {}", e);
                    None
                }
            });
        let index = self.index.build_reusing(&chunks, reusable.as_ref()).await?;
        let embeddings = index.embeddings();

        let topics = self.segmenter.segment(&chunks, &embeddings, &transcript).await;
        info!("Segmented into {} topics", topics.len());

        let entry = CacheEntry {
            video_id: video_id.clone(),
            transcript,
            chunks,
            embeddings,
            topics,
            fingerprint: self.fingerprint.clone(),
            created_at: chrono::Utc::now(),
        };

        // Publish last: nothing is stored unless every stage succeeded.
        self.cache.put(&video_id, &entry).await?;
        info!("Stored artifacts for {}", video_id);

        Ok((Arc::new(entry), false))
    }
}

/// The main entry point: process videos, list topics, answer questions.
pub struct Pipeline {
    settings: Settings,
    cache: Arc<dyn CacheStore>,
    ingestor: Arc<Ingestor>,
    answers: AnswerEngine,
    in_flight: InFlightMap,
}

impl Pipeline {
    /// Create a pipeline backed by yt-dlp, Whisper and OpenAI.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let cache: Arc<dyn CacheStore> = match settings.cache.provider.as_str() {
            "sqlite" => Arc::new(SqliteCacheStore::new(
                &settings.sqlite_path(),
                settings.cache.max_entries,
            )?),
            "memory" => Arc::new(MemoryCacheStore::new(settings.cache.max_entries)),
            other => {
                return Err(TubeqaError::Config(format!(
                    "Unknown cache provider '{}' (expected sqlite or memory)",
                    other
                )))
            }
        };

        let components = Components {
            captions: Arc::new(YtDlpCaptionSource::new(&settings.transcript)),
            fetcher: Arc::new(YtDlpFetcher::new(temp_dir)),
            transcriber: Arc::new(WhisperTranscriber::new(&settings.transcription)?),
            embedder: Arc::new(OpenAIEmbedder::new(&settings.embedding)?),
            completer: Arc::new(OpenAICompleter::new(&settings.rag, prompts.clone())?),
            titler: Arc::new(OpenAITitler::new(
                &settings.topics.model,
                prompts,
                settings.topics.title_max_words,
            )?),
            cache,
        };

        Ok(Self::with_components(settings, components))
    }

    /// Create a pipeline with custom components.
    pub fn with_components(settings: Settings, components: Components) -> Self {
        let retry = RetryPolicy::from_settings(&settings.network);
        let network = &settings.network;

        let index = Arc::new(VectorIndex::new(
            components.embedder,
            retry,
            network.embedding_timeout(),
            settings.embedding.batch_size,
        ));

        let ingestor = Arc::new(Ingestor {
            acquirer: TranscriptAcquirer::new(
                components.captions,
                components.fetcher,
                components.transcriber,
                network.clone(),
            ),
            chunker: Chunker::new(ChunkingConfig::from(&settings.chunking)),
            index: index.clone(),
            segmenter: TopicSegmenter::new(
                components.titler,
                settings.topics.clone(),
                retry,
                network.completion_timeout(),
            ),
            cache: components.cache.clone(),
            fingerprint: settings.pipeline_fingerprint(),
            embedding_signature: settings.embedding_signature(),
        });

        let answers = AnswerEngine::new(
            components.cache.clone(),
            index,
            components.completer,
            settings.rag.clone(),
            settings.embedding_signature(),
            retry,
            network.completion_timeout(),
        );

        Self {
            settings,
            cache: components.cache,
            ingestor,
            answers,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get the cache store.
    pub fn cache(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    /// Ingest a video unless it is already cached with the current settings.
    pub async fn process(&self, input: &str) -> Result<ProcessResult> {
        self.run(input, false, None).await
    }

    /// Re-run ingestion even when cached. Vectors of unchanged chunks are reused.
    pub async fn process_forced(&self, input: &str) -> Result<ProcessResult> {
        self.run(input, true, None).await
    }

    /// Like [`Pipeline::process`] (or [`Pipeline::process_forced`] when
    /// `force` is set), giving up once `cancel` turns `true`.
    ///
    /// The shared build is dropped only when no other caller is waiting on it.
    pub async fn process_with_cancel(
        &self,
        input: &str,
        force: bool,
        cancel: watch::Receiver<bool>,
    ) -> Result<ProcessResult> {
        self.run(input, force, Some(cancel)).await
    }

    #[instrument(skip(self, cancel), fields(video_id))]
    async fn run(
        &self,
        input: &str,
        force: bool,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ProcessResult> {
        let video_id = VideoId::parse(input)?;
        tracing::Span::current().record("video_id", video_id.as_str());

        if !force {
            if let Some(entry) = self.cache.get(&video_id).await? {
                if entry.fingerprint == self.ingestor.fingerprint {
                    info!("Cache hit");
                    return Ok(ProcessResult::from_entry(&entry, true));
                }
                info!(
                    cached = %entry.fingerprint,
                    current = %self.ingestor.fingerprint,
                    "Cached artifacts were built with other settings, re-processing"
                );
            }
        }

        if cancel.as_ref().is_some_and(|c| *c.borrow()) {
            return Err(TubeqaError::Cancelled(video_id.to_string()));
        }

        let mut attachment = self.attach(&video_id, force)?;

        let outcome = match cancel {
            None => (&mut attachment.flight).await,
            Some(mut cancel) => {
                tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => {
                        warn!("Ingestion cancelled");
                        return Err(TubeqaError::Cancelled(video_id.to_string()));
                    }
                    outcome = &mut attachment.flight => outcome,
                }
            }
        };
        attachment.done = true;

        match outcome {
            Ok((entry, cached)) => Ok(ProcessResult::from_entry(&entry, cached)),
            Err(e) => Err(Arc::try_unwrap(e).unwrap_or_else(|shared| shared.duplicate())),
        }
    }

    /// Attach to the running build for `video_id`, or start one.
    fn attach(&self, video_id: &VideoId, force: bool) -> Result<Attachment<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|e| TubeqaError::Cache(format!("Failed to acquire lock: {}", e)))?;

        let (run_id, flight) = match in_flight.get(video_id) {
            Some((run_id, flight)) => {
                info!(%run_id, "Joining in-flight ingestion");
                (*run_id, flight.clone())
            }
            None => {
                let run_id = Uuid::new_v4();
                let span = info_span!("ingest", video_id = %video_id, %run_id, force);
                let flight = self
                    .ingestor
                    .clone()
                    .ingest(video_id.clone(), force)
                    .instrument(span)
                    .map(|result| result.map_err(Arc::new))
                    .boxed()
                    .shared();
                in_flight.insert(video_id.clone(), (run_id, flight.clone()));
                (run_id, flight)
            }
        };

        Ok(Attachment {
            in_flight: &self.in_flight,
            video_id: video_id.clone(),
            run_id,
            flight,
            done: false,
        })
    }

    /// Topic blocks of a processed video.
    #[instrument(skip(self))]
    pub async fn topics(&self, video_id: &str) -> Result<Vec<TopicBlock>> {
        let video_id = VideoId::parse(video_id)?;
        let entry = self
            .cache
            .get(&video_id)
            .await?
            .ok_or_else(|| TubeqaError::VideoNotIndexed(video_id.to_string()))?;
        Ok(entry.topics)
    }

    /// Answer a question about a processed video.
    pub async fn search(&self, question: &str, video_id: &str, history: &[ChatTurn]) -> Result<Answer> {
        let video_id = VideoId::parse(video_id)?;
        self.answers.answer(&video_id, question, history).await
    }

    /// Cached videos, most recently used first.
    pub async fn list(&self) -> Result<Vec<CachedVideo>> {
        self.cache.list().await
    }

    /// Forget a processed video. Returns whether it was cached.
    ///
    /// An ingestion already running for the id still publishes when it finishes.
    pub async fn remove(&self, video_id: &str) -> Result<bool> {
        let video_id = VideoId::parse(video_id)?;
        self.cache.remove(&video_id).await
    }
}

/// One caller's handle on a shared build.
///
/// Dropping it before the build finishes detaches the caller; the last
/// caller to detach takes the build out of the map, which drops it.
struct Attachment<'a> {
    in_flight: &'a InFlightMap,
    video_id: VideoId,
    run_id: Uuid,
    flight: InFlight,
    done: bool,
}

impl Drop for Attachment<'_> {
    fn drop(&mut self) {
        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let registered = in_flight
            .get(&self.video_id)
            .is_some_and(|(run_id, _)| *run_id == self.run_id);
        // Unfinished handles: the map's and ours means nobody else is waiting.
        if registered && (self.done || self.flight.strong_count() == Some(2)) {
            let removed = in_flight.remove(&self.video_id);
            drop(in_flight);
            if !self.done {
                info!(run_id = %self.run_id, "Last caller left, dropping ingestion");
            }
            drop(removed);
        }
    }
}

/// Resolves once the flag is set. Never resolves if the sender goes away first.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
