//! yt-dlp audio download and ffmpeg splitting.

use super::{AudioTrack, MediaFetcher};
use crate::error::{Result, TubeqaError};
use crate::transcript::VideoId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Downloads audio with yt-dlp into a scratch directory.
///
/// An existing `<video_id>.mp3` in the directory is reused.
pub struct YtDlpFetcher {
    output_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    #[instrument(skip(self), fields(video_id = %video_id))]
    async fn download_audio(&self, video_id: &VideoId) -> Result<AudioTrack> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let target = self.output_dir.join(format!("{}.mp3", video_id));
        if tokio::fs::try_exists(&target).await? {
            info!("Using cached audio file");
            return Ok(AudioTrack::new(video_id.clone(), target));
        }

        info!("Downloading audio");
        let template = self.output_dir.join(format!("{}.%(ext)s", video_id));

        let result = Command::new("yt-dlp")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--audio-quality")
            .arg("0")
            .arg("--output")
            .arg(&template)
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            .arg(video_id.watch_url(None))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match result {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TubeqaError::ToolNotFound("yt-dlp".into()));
            }
            Err(e) => {
                return Err(TubeqaError::AudioDownload(format!("yt-dlp execution failed: {e}")));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TubeqaError::AudioDownload(format!("yt-dlp failed: {}", stderr.trim())));
        }

        let downloaded = find_audio_file(&self.output_dir, video_id.as_str())?;
        if downloaded != target {
            convert_to_mp3(&downloaded, &target).await?;
            let _ = tokio::fs::remove_file(&downloaded).await;
        }

        Ok(AudioTrack::new(video_id.clone(), target))
    }
}

fn find_audio_file(dir: &Path, video_id: &str) -> Result<PathBuf> {
    for ext in ["mp3", "opus", "m4a", "webm", "ogg"] {
        let candidate = dir.join(format!("{}.{}", video_id, ext));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| TubeqaError::AudioDownload(format!("Cannot read directory: {e}")))?;

    entries
        .flatten()
        .find(|entry| entry.file_name().to_string_lossy().starts_with(video_id))
        .map(|entry| entry.path())
        .ok_or_else(|| TubeqaError::AudioDownload("Audio file not found after download".into()))
}

async fn convert_to_mp3(source: &Path, dest: &Path) -> Result<()> {
    debug!("Converting {:?} to MP3", source);
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i")
        .arg(source)
        .args(["-vn", "-codec:a", "libmp3lame", "-qscale:a", "2"]);
    run_ffmpeg(cmd, dest).await
}

/// Split audio into pieces of at most `piece_seconds`.
///
/// Returns `(path, offset_seconds)` per piece, in order. Audio that already
/// fits is returned as the single piece at offset zero.
#[instrument(skip_all)]
pub async fn split_audio(
    source: &Path,
    output_dir: &Path,
    piece_seconds: u32,
) -> Result<Vec<(PathBuf, f64)>> {
    tokio::fs::create_dir_all(output_dir).await?;

    let total = probe_duration(source).await?;
    let piece_len = f64::from(piece_seconds.max(1));
    info!("Total audio duration: {:.1}s", total);

    if total <= piece_len {
        return Ok(vec![(source.to_path_buf(), 0.0)]);
    }

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");

    let mut pieces = Vec::new();
    let mut offset = 0.0;
    while offset < total {
        let path = output_dir.join(format!("{}_{:04}.mp3", stem, pieces.len()));
        extract_piece(source, &path, offset, piece_len.min(total - offset)).await?;
        debug!("Created piece {} at offset {:.1}s", pieces.len(), offset);
        pieces.push((path, offset));
        offset += piece_len;
    }

    info!("Split audio into {} pieces", pieces.len());
    Ok(pieces)
}

async fn extract_piece(source: &Path, dest: &Path, start: f64, length: f64) -> Result<()> {
    let start = format!("{:.3}", start);
    let length = format!("{:.3}", length);

    let copied = Command::new("ffmpeg")
        .args(["-ss", start.as_str(), "-i"])
        .arg(source)
        .args(["-t", length.as_str(), "-c", "copy", "-y", "-loglevel", "warning"])
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    if matches!(copied, Ok(status) if status.success()) && dest.exists() {
        return Ok(());
    }

    warn!("Stream copy failed, re-encoding piece");
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-ss", start.as_str(), "-i"])
        .arg(source)
        .args(["-t", length.as_str(), "-codec:a", "libmp3lame", "-qscale:a", "2"]);
    run_ffmpeg(cmd, dest).await
}

async fn run_ffmpeg(mut cmd: Command, dest: &Path) -> Result<()> {
    let result = cmd
        .args(["-y", "-loglevel", "error"])
        .arg(dest)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await;

    match result {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => {
            let err = String::from_utf8_lossy(&out.stderr);
            Err(TubeqaError::ToolFailed(format!("ffmpeg failed: {}", err.trim())))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(TubeqaError::ToolNotFound("ffmpeg".into()))
        }
        Err(e) => Err(TubeqaError::ToolFailed(format!("ffmpeg error: {e}"))),
    }
}

/// Audio duration in seconds, read with ffprobe.
pub async fn probe_duration(path: &Path) -> Result<f64> {
    let result = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .await;

    let output = match result {
        Ok(o) => o,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TubeqaError::ToolNotFound("ffprobe".into()));
        }
        Err(e) => return Err(TubeqaError::ToolFailed(format!("ffprobe failed: {e}"))),
    };

    if !output.status.success() {
        return Err(TubeqaError::ToolFailed("ffprobe returned error".into()));
    }

    parse_probe_duration(&output.stdout)
}

fn parse_probe_duration(stdout: &[u8]) -> Result<f64> {
    let parsed: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|_| TubeqaError::ToolFailed("Invalid ffprobe output".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| TubeqaError::ToolFailed("Could not determine audio duration".into()))
}
