//! CLI output formatting utilities.

use crate::index::ScoredChunk;
use crate::transcript::{format_timestamp, VideoId};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one topic block line.
    pub fn topic(start: f64, title: &str, segments: usize) {
        println!(
            "  {} {}  {}",
            style(format_timestamp(start)).cyan(),
            style(title).bold(),
            style(format!("({} segments)", segments)).dim()
        );
    }

    /// Print a cached video summary.
    pub fn video_info(id: &VideoId, chunks: usize, topics: usize, duration: f64) {
        println!(
            "  {} {} ({} chunks, {} topics, {})",
            style("*").cyan(),
            style(id).bold(),
            chunks,
            topics,
            format_duration(duration)
        );
    }

    /// Print a source chunk with a link to the moment it was said.
    pub fn source(video_id: &VideoId, source: &ScoredChunk) {
        println!(
            "\n{} {} (score: {:.2})",
            style(">>").green(),
            style(source.chunk.time_range()).cyan(),
            source.score
        );
        println!("   {}", content_preview(&source.chunk.text, 200));
        println!("   {}", style(video_id.watch_url(Some(source.chunk.start))).dim());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Format duration in seconds to a human-readable string.
fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Truncate content with ellipsis, on a character boundary.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content,
    }
}
