//! Captions first, transcription second.

use super::{normalize_segments, TranscriptSegment, TranscriptSource, VideoId};
use crate::audio::MediaFetcher;
use crate::config::NetworkSettings;
use crate::error::{Result, TubeqaError};
use crate::retry::RetryPolicy;
use crate::transcription::Transcriber;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Produces a normalized transcript for a video.
///
/// Never touches the cache; the pipeline decides what gets stored.
pub struct TranscriptAcquirer {
    source: Arc<dyn TranscriptSource>,
    fetcher: Arc<dyn MediaFetcher>,
    transcriber: Arc<dyn Transcriber>,
    retry: RetryPolicy,
    network: NetworkSettings,
}

impl TranscriptAcquirer {
    pub fn new(
        source: Arc<dyn TranscriptSource>,
        fetcher: Arc<dyn MediaFetcher>,
        transcriber: Arc<dyn Transcriber>,
        network: NetworkSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            transcriber,
            retry: RetryPolicy::from_settings(&network),
            network,
        }
    }

    /// Fetch captions, falling back to audio transcription.
    ///
    /// Fails with [`TubeqaError::TranscriptUnavailable`] only when both paths
    /// come up empty.
    #[instrument(skip(self), fields(video_id = %video_id))]
    pub async fn acquire(&self, video_id: &VideoId) -> Result<Vec<TranscriptSegment>> {
        let caption_issue = match self
            .retry
            .run("caption lookup", self.network.captions_timeout(), || {
                self.source.fetch_captions(video_id)
            })
            .await
        {
            Ok(Some(raw)) => {
                let segments = normalize_segments(raw);
                if !segments.is_empty() {
                    info!("Using {} caption segments", segments.len());
                    return Ok(segments);
                }
                "captions were empty".to_string()
            }
            Ok(None) => "no captions".to_string(),
            Err(e) => {
                warn!(error = %e, "Caption lookup failed, falling back to transcription");
                format!("caption lookup failed: {}", e)
            }
        };

        info!("Falling back to audio transcription ({})", caption_issue);

        let unavailable = |reason: String| TubeqaError::TranscriptUnavailable {
            video_id: video_id.to_string(),
            reason: format!("{}; {}", caption_issue, reason),
        };

        let audio = self
            .retry
            .run("audio download", self.network.download_timeout(), || {
                self.fetcher.download_audio(video_id)
            })
            .await
            .map_err(|e| unavailable(format!("audio download failed: {}", e)))?;

        let raw = self
            .retry
            .run("transcription", self.network.transcription_timeout(), || {
                self.transcriber.transcribe(&audio)
            })
            .await
            .map_err(|e| unavailable(format!("transcription failed: {}", e)))?;

        let segments = normalize_segments(raw);
        if segments.is_empty() {
            return Err(unavailable("transcription produced no speech".to_string()));
        }

        info!("Using {} transcribed segments", segments.len());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioTrack;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeCaptions {
        result: fn() -> Result<Option<Vec<TranscriptSegment>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranscriptSource for FakeCaptions {
        async fn fetch_captions(&self, _: &VideoId) -> Result<Option<Vec<TranscriptSegment>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct FakeFetcher {
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn download_audio(&self, video_id: &VideoId) -> Result<AudioTrack> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TubeqaError::ToolNotFound("yt-dlp".into()))
            } else {
                Ok(AudioTrack::new(video_id.clone(), "/tmp/fake.mp3"))
            }
        }
    }

    struct FakeTranscriber;

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, _: &AudioTrack) -> Result<Vec<TranscriptSegment>> {
            Ok(vec![
                TranscriptSegment::new("spoken words", 0.0, 4.0),
                TranscriptSegment::new("more words", 4.0, 3.0),
            ])
        }
    }

    fn network() -> NetworkSettings {
        NetworkSettings {
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            ..NetworkSettings::default()
        }
    }

    fn acquirer(
        captions: fn() -> Result<Option<Vec<TranscriptSegment>>>,
        fetch_fails: bool,
    ) -> (TranscriptAcquirer, Arc<FakeCaptions>, Arc<FakeFetcher>) {
        let source = Arc::new(FakeCaptions {
            result: captions,
            calls: AtomicUsize::new(0),
        });
        let fetcher = Arc::new(FakeFetcher {
            fail: fetch_fails,
            calls: AtomicUsize::new(0),
        });
        let acquirer = TranscriptAcquirer::new(
            source.clone(),
            fetcher.clone(),
            Arc::new(FakeTranscriber),
            network(),
        );
        (acquirer, source, fetcher)
    }

    fn id() -> VideoId {
        VideoId::parse("dQw4w9WgXcQ").unwrap()
    }

    #[tokio::test]
    async fn test_captions_win() {
        let (acquirer, _, fetcher) = acquirer(
            || Ok(Some(vec![TranscriptSegment::new(" caption ", 1.0, 2.0)])),
            false,
        );

        let segments = acquirer.acquire(&id()).await.unwrap();
        assert_eq!(segments, vec![TranscriptSegment::new("caption", 1.0, 2.0)]);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_captions_fall_back() {
        let (acquirer, source, fetcher) = acquirer(|| Ok(None), false);

        let segments = acquirer.acquire(&id()).await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_captions_are_retried_then_fall_back() {
        let (acquirer, source, _) =
            acquirer(|| Err(TubeqaError::Provider("503".into())), false);

        let segments = acquirer.acquire(&id()).await.unwrap();
        assert_eq!(segments[0].text, "spoken words");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_both_paths_failing_is_unavailable() {
        let (acquirer, _, fetcher) = acquirer(|| Ok(Some(Vec::new())), true);

        let err = acquirer.acquire(&id()).await.unwrap_err();
        match err {
            TubeqaError::TranscriptUnavailable { video_id, reason } => {
                assert_eq!(video_id, "dQw4w9WgXcQ");
                assert!(reason.contains("captions were empty"));
                assert!(reason.contains("yt-dlp"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Missing tools are not retried.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }
}
