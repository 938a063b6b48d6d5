//! Configuration settings for tubeqa.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcript: TranscriptSettings,
    pub transcription: TranscriptionSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub topics: TopicSettings,
    pub rag: RagSettings,
    pub cache: CacheSettings,
    pub network: NetworkSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Directory for downloaded audio and other scratch files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.tubeqa".to_string(),
            temp_dir: "/tmp/tubeqa".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Caption retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptSettings {
    /// Caption languages in order of preference.
    pub languages: Vec<String>,
    /// Prefer uploaded subtitles over automatic captions.
    pub prefer_manual: bool,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            prefer_manual: true,
        }
    }
}

/// Fallback transcription settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model to use.
    pub model: String,
    /// Duration in seconds for splitting long audio files.
    pub chunk_duration_seconds: u32,
    /// Maximum concurrent chunk uploads.
    pub max_concurrent_chunks: usize,
    /// Optional language hint passed to the transcription API.
    pub language: Option<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            chunk_duration_seconds: 600,
            max_concurrent_chunks: 3,
            language: None,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Number of chunk texts sent per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            batch_size: 64,
        }
    }
}

/// Content chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Maximum chunk duration in seconds.
    pub max_duration_seconds: f64,
    /// Silence between segments that closes a chunk early.
    pub pause_threshold_seconds: f64,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            max_duration_seconds: 60.0,
            pause_threshold_seconds: 2.5,
        }
    }
}

/// Topic segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    /// Fixed similarity threshold; adaptive when unset.
    pub similarity_threshold: Option<f32>,
    /// Minimum topic duration in seconds.
    pub min_topic_seconds: f64,
    /// Maximum topic duration in seconds.
    pub max_topic_seconds: f64,
    /// LLM model for topic titles.
    pub model: String,
    /// Maximum words kept from a generated title.
    pub title_max_words: usize,
    /// Length of the excerpt used when no title could be generated.
    pub excerpt_chars: usize,
    /// Concurrent title requests.
    pub max_concurrent_titles: usize,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: None,
            min_topic_seconds: 120.0,
            max_topic_seconds: 600.0,
            model: "gpt-4.1-nano".to_string(),
            title_max_words: 8,
            excerpt_chars: 60,
            max_concurrent_titles: 4,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// LLM model for response generation.
    pub model: String,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// Prior turns forwarded to the model.
    pub max_history_turns: usize,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in a generated answer.
    pub max_tokens: u32,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-nano".to_string(),
            top_k: 5,
            max_history_turns: 10,
            temperature: 0.7,
            max_tokens: 500,
        }
    }
}

/// Cache storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache provider (sqlite, memory).
    pub provider: String,
    /// Path to the SQLite database.
    pub sqlite_path: String,
    /// Keep at most this many videos, evicting the least recently used.
    pub max_entries: Option<usize>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            provider: "sqlite".to_string(),
            sqlite_path: "~/.tubeqa/cache.db".to_string(),
            max_entries: None,
        }
    }
}

/// Retry and timeout settings for capability calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Attempts per capability call, including the first.
    pub max_attempts: u32,
    /// First backoff delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Upper bound for a single backoff delay.
    pub backoff_max_ms: u64,
    /// Timeout for caption lookup and download.
    pub captions_timeout_secs: u64,
    /// Timeout for audio download.
    pub download_timeout_secs: u64,
    /// Timeout for transcribing a whole audio track.
    pub transcription_timeout_secs: u64,
    /// Timeout for one embedding request.
    pub embedding_timeout_secs: u64,
    /// Timeout for one completion request.
    pub completion_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            captions_timeout_secs: 60,
            download_timeout_secs: 900,
            transcription_timeout_secs: 1800,
            embedding_timeout_secs: 60,
            completion_timeout_secs: 120,
        }
    }
}

impl NetworkSettings {
    pub fn captions_timeout(&self) -> Duration {
        Duration::from_secs(self.captions_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription_timeout_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_secs(self.embedding_timeout_secs)
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TubeqaError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tubeqa")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.cache.sqlite_path)
    }

    /// Stable description of every setting that shapes cached artifacts.
    ///
    /// Two runs with the same fingerprint produce the same chunks, vectors and
    /// topic boundaries for a given transcript.
    pub fn pipeline_fingerprint(&self) -> String {
        let threshold = self
            .topics
            .similarity_threshold
            .map(|t| format!("{:.4}", t))
            .unwrap_or_else(|| "adaptive".to_string());

        format!(
            "chunk:{}c/{:.1}s/{:.2}p;{};topics:{}/{:.0}-{:.0}s",
            self.chunking.max_chars,
            self.chunking.max_duration_seconds,
            self.chunking.pause_threshold_seconds,
            self.embedding_signature(),
            threshold,
            self.topics.min_topic_seconds,
            self.topics.max_topic_seconds,
        )
    }

    /// The embedding part of the fingerprint. Vectors are only comparable
    /// when produced under the same signature.
    pub fn embedding_signature(&self) -> String {
        format!("embed:{}/{}", self.embedding.model, self.embedding.dimensions)
    }
}
