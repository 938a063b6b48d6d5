//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use crate::transcript::VideoId;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    video_id: &str,
    question: &str,
    model: Option<String>,
    mut settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let id = VideoId::parse(video_id)?;
    if let Some(model) = model {
        settings.rag.model = model;
    }
    let pipeline = Pipeline::new(settings)?;

    let spinner = Output::spinner("Searching transcript...");
    let outcome = pipeline.search(question, id.as_str(), &[]).await;
    spinner.finish_and_clear();

    match outcome {
        Ok(answer) => {
            println!("\n{}\n", answer.text);

            if !answer.sources.is_empty() {
                Output::header("Sources");
                for source in &answer.sources {
                    Output::source(&id, source);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
