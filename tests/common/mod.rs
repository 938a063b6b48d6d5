//! In-process fakes for pipeline tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tubeqa::audio::{AudioTrack, MediaFetcher};
use tubeqa::cache::{CacheStore, MemoryCacheStore};
use tubeqa::config::Settings;
use tubeqa::embedding::Embedder;
use tubeqa::orchestrator::{Components, Pipeline};
use tubeqa::rag::{ChatTurn, Completer};
use tubeqa::topics::Titler;
use tubeqa::transcript::{TranscriptSegment, TranscriptSource, VideoId};
use tubeqa::transcription::Transcriber;
use tubeqa::{Result, TubeqaError};

pub const VIDEO: &str = "dQw4w9WgXcQ";

/// Six minutes of talk: cats first, rockets second.
pub fn transcript() -> Vec<TranscriptSegment> {
    (0..36)
        .map(|i| {
            let text = if i < 18 {
                format!("cats purr softly while whiskers twitch {}", i)
            } else {
                format!("rockets launch into orbit burning fuel {}", i)
            };
            TranscriptSegment::new(text, i as f64 * 10.0, 10.0)
        })
        .collect()
}

/// Caption source with a call counter and an adjustable delay.
pub struct FakeCaptions {
    pub segments: Option<Vec<TranscriptSegment>>,
    pub calls: AtomicUsize,
    pub delay_ms: AtomicU64,
}

impl FakeCaptions {
    pub fn new(segments: Option<Vec<TranscriptSegment>>) -> Self {
        Self {
            segments,
            calls: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl TranscriptSource for FakeCaptions {
    async fn fetch_captions(&self, _: &VideoId) -> Result<Option<Vec<TranscriptSegment>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(self.segments.clone())
    }
}

/// Audio download that never works.
pub struct NoAudio {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaFetcher for NoAudio {
    async fn download_audio(&self, _: &VideoId) -> Result<AudioTrack> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TubeqaError::ToolNotFound("yt-dlp".into()))
    }
}

pub struct NoTranscriber;

#[async_trait]
impl Transcriber for NoTranscriber {
    async fn transcribe(&self, _: &AudioTrack) -> Result<Vec<TranscriptSegment>> {
        Err(TubeqaError::Transcription("no speech model in tests".into()))
    }
}

/// Bag-of-letters embedder counting batch calls and embedded texts.
#[derive(Default)]
pub struct LetterEmbedder {
    pub batches: AtomicUsize,
    pub texts: AtomicUsize,
}

impl LetterEmbedder {
    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
            v[(c as u8 - b'a') as usize] += 1.0;
        }
        v
    }

    pub fn texts(&self) -> usize {
        self.texts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for LetterEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        26
    }
}

/// Completer that records what it was given.
#[derive(Default)]
pub struct RecordingCompleter {
    pub seen: Mutex<Vec<(String, Vec<ChatTurn>)>>,
}

#[async_trait]
impl Completer for RecordingCompleter {
    async fn complete(&self, context: &str, question: &str, history: &[ChatTurn]) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((context.to_string(), history.to_vec()));
        Ok(format!("answer to: {}", question))
    }
}

pub struct FixedTitler;

#[async_trait]
impl Titler for FixedTitler {
    async fn title(&self, excerpt: &str) -> Result<String> {
        if excerpt.contains("rockets") {
            Ok("Rocket Launches".to_string())
        } else {
            Ok("Cat Behaviour".to_string())
        }
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.network.backoff_base_ms = 1;
    settings.network.backoff_max_ms = 2;
    settings
}

/// Handles on the fakes behind a pipeline.
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub captions: Arc<FakeCaptions>,
    pub embedder: Arc<LetterEmbedder>,
    pub completer: Arc<RecordingCompleter>,
    pub cache: Arc<dyn CacheStore>,
}

pub fn harness() -> Harness {
    harness_with(settings(), Some(transcript()), Arc::new(MemoryCacheStore::default()))
}

pub fn harness_with(
    settings: Settings,
    captions: Option<Vec<TranscriptSegment>>,
    cache: Arc<dyn CacheStore>,
) -> Harness {
    let captions = Arc::new(FakeCaptions::new(captions));
    let embedder = Arc::new(LetterEmbedder::default());
    let completer = Arc::new(RecordingCompleter::default());

    let pipeline = Arc::new(Pipeline::with_components(
        settings,
        Components {
            captions: captions.clone(),
            fetcher: Arc::new(NoAudio {
                calls: AtomicUsize::new(0),
            }),
            transcriber: Arc::new(NoTranscriber),
            embedder: embedder.clone(),
            completer: completer.clone(),
            titler: Arc::new(FixedTitler),
            cache: cache.clone(),
        },
    ));

    Harness {
        pipeline,
        captions,
        embedder,
        completer,
        cache,
    }
}
