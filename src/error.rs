//! Error types for tubeqa.

use thiserror::Error;

/// Library-level error type for tubeqa operations.
#[derive(Error, Debug)]
pub enum TubeqaError {
    #[error("Invalid YouTube video id or URL: {0}")]
    InvalidVideoId(String),

    #[error("Transcript unavailable for {video_id}: {reason}")]
    TranscriptUnavailable { video_id: String, reason: String },

    #[error("Index build failed: {0}")]
    IndexBuildFailed(String),

    #[error("Video {0} has not been processed yet")]
    VideoNotIndexed(String),

    #[error("Answer generation failed: {0}")]
    AnswerGenerationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider call failed: {0}")]
    Provider(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Ingestion of {0} was cancelled")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl TubeqaError {
    /// Whether a failed capability call is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TubeqaError::Provider(_)
                | TubeqaError::Timeout(_)
                | TubeqaError::Embedding(_)
                | TubeqaError::AudioDownload(_)
                | TubeqaError::Transcription(_)
                | TubeqaError::ToolFailed(_)
                | TubeqaError::Io(_)
                | TubeqaError::Http(_)
        )
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TubeqaError::InvalidVideoId(_) => "invalid_video_id",
            TubeqaError::TranscriptUnavailable { .. } => "transcript_unavailable",
            TubeqaError::IndexBuildFailed(_) => "index_build_failed",
            TubeqaError::VideoNotIndexed(_) => "video_not_indexed",
            TubeqaError::AnswerGenerationFailed(_) => "answer_generation_failed",
            TubeqaError::Cancelled(_) => "cancelled",
            TubeqaError::Config(_) => "config",
            _ => "internal",
        }
    }

    /// Copy an error for callers that share one ingestion.
    ///
    /// Taxonomy variants are reproduced exactly; wrapped library errors keep
    /// their message.
    pub fn duplicate(&self) -> Self {
        match self {
            TubeqaError::InvalidVideoId(s) => TubeqaError::InvalidVideoId(s.clone()),
            TubeqaError::TranscriptUnavailable { video_id, reason } => {
                TubeqaError::TranscriptUnavailable {
                    video_id: video_id.clone(),
                    reason: reason.clone(),
                }
            }
            TubeqaError::IndexBuildFailed(s) => TubeqaError::IndexBuildFailed(s.clone()),
            TubeqaError::VideoNotIndexed(s) => TubeqaError::VideoNotIndexed(s.clone()),
            TubeqaError::AnswerGenerationFailed(s) => {
                TubeqaError::AnswerGenerationFailed(s.clone())
            }
            TubeqaError::Config(s) => TubeqaError::Config(s.clone()),
            TubeqaError::Provider(s) => TubeqaError::Provider(s.clone()),
            TubeqaError::Timeout(s) => TubeqaError::Timeout(s.clone()),
            TubeqaError::Embedding(s) => TubeqaError::Embedding(s.clone()),
            TubeqaError::AudioDownload(s) => TubeqaError::AudioDownload(s.clone()),
            TubeqaError::Transcription(s) => TubeqaError::Transcription(s.clone()),
            TubeqaError::ToolNotFound(s) => TubeqaError::ToolNotFound(s.clone()),
            TubeqaError::ToolFailed(s) => TubeqaError::ToolFailed(s.clone()),
            TubeqaError::Cache(s) => TubeqaError::Cache(s.clone()),
            TubeqaError::Cancelled(s) => TubeqaError::Cancelled(s.clone()),
            TubeqaError::Io(e) => TubeqaError::Io(std::io::Error::new(e.kind(), e.to_string())),
            TubeqaError::Json(e) => TubeqaError::Cache(format!("JSON error: {}", e)),
            TubeqaError::TomlParse(e) => TubeqaError::Config(e.to_string()),
            TubeqaError::Http(e) => TubeqaError::Provider(format!("HTTP error: {}", e)),
            TubeqaError::Database(e) => TubeqaError::Cache(format!("Database error: {}", e)),
        }
    }
}

/// Result type alias for tubeqa operations.
pub type Result<T> = std::result::Result<T, TubeqaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_is_not_transient() {
        assert!(!TubeqaError::InvalidVideoId("x".into()).is_transient());
        assert!(!TubeqaError::VideoNotIndexed("x".into()).is_transient());
        assert!(!TubeqaError::IndexBuildFailed("x".into()).is_transient());
        assert!(TubeqaError::Timeout("embed".into()).is_transient());
        assert!(TubeqaError::Provider("503".into()).is_transient());
    }

    #[test]
    fn test_duplicate_keeps_variant() {
        let err = TubeqaError::TranscriptUnavailable {
            video_id: "dQw4w9WgXcQ".into(),
            reason: "private video".into(),
        };
        match err.duplicate() {
            TubeqaError::TranscriptUnavailable { video_id, reason } => {
                assert_eq!(video_id, "dQw4w9WgXcQ");
                assert_eq!(reason, "private video");
            }
            other => panic!("unexpected variant: {other}"),
        }

        let io = TubeqaError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(matches!(io.duplicate(), TubeqaError::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
