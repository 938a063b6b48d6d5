//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let pipeline = Pipeline::new(settings)?;

    let videos = match pipeline.list().await {
        Ok(videos) => videos,
        Err(e) => {
            Output::error(&format!("Failed to list videos: {}", e));
            return Err(e.into());
        }
    };

    if videos.is_empty() {
        Output::info("No videos processed yet. Use 'tubeqa process <url>' to add one.");
        return Ok(());
    }

    Output::header(&format!("Processed Videos ({})", videos.len()));
    println!();

    for video in &videos {
        Output::video_info(
            &video.video_id,
            video.chunk_count,
            video.topic_count,
            video.duration_seconds,
        );
    }

    let total_chunks: usize = videos.iter().map(|v| v.chunk_count).sum();
    println!();
    Output::kv("Total videos", &videos.len().to_string());
    Output::kv("Total chunks", &total_chunks.to_string());

    Ok(())
}
