//! CLI module for tubeqa.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// tubeqa - Ask questions about YouTube videos
///
/// Fetches a video's transcript, splits it into topics and answers questions
/// grounded in what was actually said.
#[derive(Parser, Debug)]
#[command(name = "tubeqa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "TUBEQA_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, chunk, embed and segment a video
    Process {
        /// YouTube URL or 11-character video id
        input: String,

        /// Re-process even if the video is already cached
        #[arg(short, long)]
        force: bool,
    },

    /// Show the topic blocks of a processed video
    Topics {
        /// YouTube URL or video id
        video_id: String,
    },

    /// Ask a single question about a processed video
    Ask {
        /// YouTube URL or video id
        video_id: String,

        /// The question to ask
        question: String,

        /// LLM model to use for the answer
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Start an interactive conversation about a processed video
    Chat {
        /// YouTube URL or video id
        video_id: String,

        /// LLM model to use
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List processed videos
    List,

    /// Remove a processed video from the cache
    Remove {
        /// YouTube URL or video id
        video_id: String,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the current configuration to the config file
    Init,

    /// Show configuration file path
    Path,
}
