//! Caption lookup through yt-dlp metadata and json3 subtitle tracks.

use super::{TranscriptSegment, TranscriptSource, VideoId};
use crate::config::TranscriptSettings;
use crate::error::{Result, TubeqaError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Caption source backed by `yt-dlp --dump-json` and a direct track download.
pub struct YtDlpCaptionSource {
    http: reqwest::Client,
    languages: Vec<String>,
    prefer_manual: bool,
}

#[derive(Debug, Deserialize)]
struct TrackFormat {
    #[serde(default)]
    ext: String,
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    subtitles: HashMap<String, Vec<TrackFormat>>,
    #[serde(default)]
    automatic_captions: HashMap<String, Vec<TrackFormat>>,
}

#[derive(Debug, Deserialize)]
struct Json3 {
    #[serde(default)]
    events: Vec<Json3Event>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Json3Event {
    t_start_ms: Option<u64>,
    d_duration_ms: Option<u64>,
    #[serde(default)]
    segs: Vec<Json3Seg>,
}

#[derive(Debug, Deserialize)]
struct Json3Seg {
    #[serde(default)]
    utf8: String,
}

impl YtDlpCaptionSource {
    pub fn new(settings: &TranscriptSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            languages: settings.languages.clone(),
            prefer_manual: settings.prefer_manual,
        }
    }

    async fn dump_info(&self, video_id: &VideoId) -> Result<VideoInfo> {
        let url = video_id.watch_url(None);

        let output = tokio::process::Command::new("yt-dlp")
            .args(["--dump-json", "--skip-download", "--no-warnings", "--no-playlist", url.as_str()])
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TubeqaError::ToolNotFound("yt-dlp".to_string())
                } else {
                    TubeqaError::ToolFailed(format!("Failed to run yt-dlp: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TubeqaError::ToolFailed(format!(
                "yt-dlp could not read {}: {}",
                video_id,
                stderr.trim()
            )));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }

    /// Pick the json3 track URL, walking languages in preference order.
    fn select_track<'a>(&self, info: &'a VideoInfo) -> Option<&'a str> {
        let (first, second) = if self.prefer_manual {
            (&info.subtitles, &info.automatic_captions)
        } else {
            (&info.automatic_captions, &info.subtitles)
        };

        for tracks in [first, second] {
            for lang in &self.languages {
                let candidates = tracks
                    .iter()
                    .filter(|(code, _)| *code == lang || code.starts_with(&format!("{}-", lang)));
                for (_, formats) in candidates {
                    if let Some(track) = formats.iter().find(|f| f.ext == "json3") {
                        return Some(&track.url);
                    }
                }
            }
        }
        None
    }
}

#[async_trait]
impl TranscriptSource for YtDlpCaptionSource {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn fetch_captions(&self, video_id: &VideoId) -> Result<Option<Vec<TranscriptSegment>>> {
        let info = self.dump_info(video_id).await?;

        let Some(track_url) = self.select_track(&info) else {
            info!("No caption track in {:?}", self.languages);
            return Ok(None);
        };

        debug!("Downloading caption track");
        let body = self
            .http
            .get(track_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let segments = parse_json3(&body)?;
        Ok((!segments.is_empty()).then_some(segments))
    }
}

/// Parse a YouTube json3 caption document into raw segments.
///
/// Events without text (window and style markers) are skipped.
pub fn parse_json3(body: &str) -> Result<Vec<TranscriptSegment>> {
    let doc: Json3 = serde_json::from_str(body)?;

    Ok(doc
        .events
        .into_iter()
        .filter_map(|event| {
            let start = event.t_start_ms? as f64 / 1000.0;
            let duration = event.d_duration_ms.unwrap_or(0) as f64 / 1000.0;
            let text: String = event.segs.iter().map(|s| s.utf8.as_str()).collect();
            let text = text.trim();
            (!text.is_empty()).then(|| TranscriptSegment::new(text, start, duration))
        })
        .collect())
}
