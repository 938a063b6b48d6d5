//! Remove command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use anyhow::Result;

/// Run the remove command.
pub async fn run_remove(video_id: &str, settings: Settings) -> Result<()> {
    let pipeline = Pipeline::new(settings)?;

    match pipeline.remove(video_id).await {
        Ok(true) => Output::success(&format!("Removed {}", video_id)),
        Ok(false) => Output::warning(&format!("{} was not processed", video_id)),
        Err(e) => {
            Output::error(&format!("Failed to remove video: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
