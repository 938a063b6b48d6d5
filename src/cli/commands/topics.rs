//! Topics command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::TubeqaError;
use crate::orchestrator::Pipeline;
use crate::transcript::format_timestamp;
use anyhow::Result;

/// Run the topics command.
pub async fn run_topics(video_id: &str, settings: Settings) -> Result<()> {
    let pipeline = Pipeline::new(settings)?;

    let topics = match pipeline.topics(video_id).await {
        Ok(topics) => topics,
        Err(e @ TubeqaError::VideoNotIndexed(_)) => {
            Output::error(&e.to_string());
            Output::info(&format!("Run 'tubeqa process {}' first.", video_id));
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    Output::header(&format!("Topics ({})", topics.len()));
    println!();
    for topic in &topics {
        Output::topic(topic.start, &topic.title, topic.segments.len());
    }

    if let Some(last) = topics.last() {
        println!();
        Output::kv("Ends at", &format_timestamp(last.end()));
    }

    Ok(())
}
