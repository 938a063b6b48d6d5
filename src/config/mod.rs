//! Configuration module for tubeqa.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts, TopicPrompts};
pub use settings::{
    CacheSettings, ChunkingSettings, EmbeddingSettings, GeneralSettings, NetworkSettings,
    PromptSettings, RagSettings, Settings, TopicSettings, TranscriptSettings,
    TranscriptionSettings,
};
