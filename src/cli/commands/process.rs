//! Process command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use crate::transcript::format_timestamp;
use anyhow::Result;
use tokio::sync::watch;

/// Run the process command. Ctrl+C abandons the ingestion without caching anything.
pub async fn run_process(input: &str, force: bool, settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Process) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let pipeline = Pipeline::new(settings)?;
    Output::info(&format!("Processing: {}", input));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let spinner = Output::spinner("Fetching transcript and building index...");
    let outcome = pipeline.process_with_cancel(input, force, cancel_rx).await;
    spinner.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            Output::error(&format!("Failed to process video: {}", e));
            return Err(e.into());
        }
    };

    if result.cached {
        Output::success(&format!(
            "{} was already processed ({} segments). Use --force to reprocess.",
            result.video_id, result.num_segments
        ));
    } else {
        Output::success(&format!(
            "Processed {} ({} segments)",
            result.video_id, result.num_segments
        ));
    }

    if let Some(last) = result.segments.last() {
        Output::kv("Duration", &format_timestamp(last.end()));
    }

    let topics = pipeline.topics(result.video_id.as_str()).await?;
    Output::header(&format!("Topics ({})", topics.len()));
    for topic in &topics {
        Output::topic(topic.start, &topic.title, topic.segments.len());
    }

    Ok(())
}
