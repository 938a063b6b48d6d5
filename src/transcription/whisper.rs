//! OpenAI Whisper transcription.

use super::Transcriber;
use crate::audio::{split_audio, AudioTrack};
use crate::config::TranscriptionSettings;
use crate::error::{Result, TubeqaError};
use crate::openai::create_client;
use crate::transcript::TranscriptSegment;
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, info, instrument};

/// OpenAI Whisper-based transcriber.
///
/// Long audio is split with ffmpeg and the pieces are transcribed
/// concurrently; segment times are shifted by each piece's offset.
pub struct WhisperTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
    piece_seconds: u32,
    max_concurrent_pieces: usize,
    language: Option<String>,
}

impl WhisperTranscriber {
    pub fn new(settings: &TranscriptionSettings) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: settings.model.clone(),
            piece_seconds: settings.chunk_duration_seconds,
            max_concurrent_pieces: settings.max_concurrent_chunks.max(1),
            language: settings.language.clone(),
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn transcribe_piece(&self, path: &Path) -> Result<Vec<TranscriptSegment>> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mut builder = CreateTranscriptionRequestArgs::default();
        builder
            .file(AudioInput::from_vec_u8(file_name, bytes))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);

        if let Some(lang) = &self.language {
            builder.language(lang);
        }

        let request = builder
            .build()
            .map_err(|e| TubeqaError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| TubeqaError::Provider(format!("Whisper API error: {}", e)))?;

        let segments = match response.segments {
            Some(segs) => segs
                .iter()
                .map(|s| {
                    TranscriptSegment::new(
                        s.text.trim(),
                        f64::from(s.start),
                        f64::from(s.end - s.start),
                    )
                })
                .collect(),
            None => vec![TranscriptSegment::new(
                response.text.trim(),
                0.0,
                f64::from(response.duration),
            )],
        };

        debug!("Transcribed {} segments", segments.len());
        Ok(segments)
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self, audio), fields(video_id = %audio.video_id))]
    async fn transcribe(&self, audio: &AudioTrack) -> Result<Vec<TranscriptSegment>> {
        let scratch = tempfile::tempdir()?;
        let pieces = split_audio(audio.path(), scratch.path(), self.piece_seconds).await?;

        if pieces.len() == 1 {
            return self.transcribe_piece(audio.path()).await;
        }

        let count = pieces.len();
        info!("Transcribing {} audio pieces with {}", count, self.model);

        let pb = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  {spinner:.green} Whisper   [{bar:30.cyan/blue}] {pos}/{len}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }

        let mut stream = stream::iter(pieces.into_iter().enumerate())
            .map(|(idx, (path, offset))| async move {
                (idx, offset, self.transcribe_piece(&path).await)
            })
            .buffer_unordered(self.max_concurrent_pieces);

        let mut results = Vec::with_capacity(count);
        while let Some((idx, offset, result)) = stream.next().await {
            pb.inc(1);
            match result {
                Ok(segments) => results.push((idx, offset, segments)),
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(match e {
                        TubeqaError::Provider(msg) => TubeqaError::Provider(format!(
                            "Piece {} at {:.0}s failed: {}",
                            idx, offset, msg
                        )),
                        other => other,
                    });
                }
            }
        }
        pb.finish_and_clear();

        Ok(merge_pieces(results))
    }
}

/// Order transcribed pieces and move their segments onto the full timeline.
fn merge_pieces(mut pieces: Vec<(usize, f64, Vec<TranscriptSegment>)>) -> Vec<TranscriptSegment> {
    pieces.sort_by_key(|(idx, _, _)| *idx);
    pieces
        .into_iter()
        .flat_map(|(_, offset, segments)| {
            segments.into_iter().map(move |mut s| {
                s.start += offset;
                s
            })
        })
        .collect()
}

/// Check if the OpenAI API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY")
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_pieces_offsets_and_orders() {
        let pieces = vec![
            (1, 600.0, vec![TranscriptSegment::new("later", 2.0, 3.0)]),
            (
                0,
                0.0,
                vec![
                    TranscriptSegment::new("intro", 0.0, 2.0),
                    TranscriptSegment::new("more", 2.0, 4.0),
                ],
            ),
        ];

        let merged = merge_pieces(pieces);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].text, "intro");
        assert_eq!(merged[2].text, "later");
        assert_eq!(merged[2].start, 602.0);
        assert_eq!(merged[2].duration, 3.0);
    }
}
