//! Interactive chat about one video.
//!
//! The session owns the conversation; every question is sent along with the
//! earlier turns.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Pipeline;
use crate::rag::ChatTurn;
use crate::transcript::VideoId;
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};

/// Run the interactive chat command.
pub async fn run_chat(video_id: &str, model: Option<String>, mut settings: Settings) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let id = VideoId::parse(video_id)?;
    if let Some(model) = model {
        settings.rag.model = model;
    }
    let pipeline = Pipeline::new(settings)?;

    // Fail early instead of on the first question.
    if !pipeline.cache().contains(&id).await? {
        Output::error(&format!("Video {} has not been processed yet", id));
        Output::info(&format!("Run 'tubeqa process {}' first.", id));
        return Ok(());
    }

    println!("\n{}", style(format!("tubeqa chat: {}", id)).bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );

    let mut history: Vec<ChatTurn> = Vec::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            history.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let spinner = Output::spinner("Thinking...");
        let outcome = pipeline.search(input, id.as_str(), &history).await;
        spinner.finish_and_clear();

        match outcome {
            Ok(answer) => {
                println!("\n{} {}\n", style("tubeqa:").cyan().bold(), answer.text);
                if let Some(best) = answer.sources.first() {
                    println!(
                        "{}\n",
                        style(format!("  see {}", id.watch_url(Some(best.chunk.start)))).dim()
                    );
                }
                let turn = ChatTurn::following(&history, input, answer.text);
                history.push(turn);
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}
