//! tubeqa - Question answering over YouTube videos
//!
//! Turns a YouTube video into a cached, searchable knowledge base: a
//! transcript, non-overlapping chunks with embeddings, and titled topic
//! blocks. Questions are answered from the most relevant chunks.
//!
//! # Architecture
//!
//! - `transcript` - Video ids, caption retrieval and the transcription fallback
//! - `audio` - Audio download and splitting
//! - `transcription` - Speech-to-text
//! - `chunking` - Time and size bounded chunks
//! - `embedding` - Embedding generation
//! - `index` - Per-video nearest-neighbour index
//! - `topics` - Topic segmentation and titles
//! - `cache` - Persistent per-video artifacts
//! - `rag` - Grounded question answering
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use tubeqa::config::Settings;
//! use tubeqa::orchestrator::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::new(Settings::load()?)?;
//!
//!     let result = pipeline.process("https://youtu.be/dQw4w9WgXcQ").await?;
//!     println!("Transcript has {} segments", result.num_segments);
//!
//!     for topic in pipeline.topics("dQw4w9WgXcQ").await? {
//!         println!("{:>8.1}s  {}", topic.start, topic.title);
//!     }
//!
//!     let answer = pipeline.search("What is the song about?", "dQw4w9WgXcQ", &[]).await?;
//!     println!("{}", answer.text);
//!
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod retry;
pub mod topics;
pub mod transcript;
pub mod transcription;

pub use error::{Result, TubeqaError};
