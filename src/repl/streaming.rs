//! Turn event printing for the REPL

use std::io::{self, Write};
use tokio::sync::mpsc;

use crate::chat::{Phase, TurnEvent};
use crate::render;
use crate::transcript::{Message, Role};

use super::colors;
use super::formatter::LineFormatter;

/// What the printer saw during one turn
#[derive(Debug, Default)]
pub struct PrintSummary {
    pub printed_text: bool,
}

/// Image links for a finished message, after the display rules
fn image_lines(role: Role, content: &str) -> Vec<String> {
    render::render(&Message::new(role, content))
        .images
        .iter()
        .map(|url| colors::image_link(url))
        .collect()
}

/// Print turn events until the sender side closes or `Done` arrives
pub async fn print_events(mut rx: mpsc::Receiver<TurnEvent>) -> PrintSummary {
    let mut summary = PrintSummary::default();
    let mut formatter = LineFormatter::new();
    let mut mid_line = false;

    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::Thinking { phase } => {
                if phase == Phase::Recommendation {
                    println!("{}", colors::status("  reviewing matches..."));
                }
            }
            TurnEvent::TextDelta { delta, .. } => {
                if !summary.printed_text {
                    println!();
                }
                summary.printed_text = true;
                let out = formatter.process(&delta);
                if !out.is_empty() {
                    print!("{}", out);
                    let _ = io::stdout().flush();
                }
                mid_line = !delta.ends_with('\n');
            }
            TurnEvent::Message { role, content, .. } => {
                let rest = formatter.flush();
                if !rest.is_empty() || mid_line {
                    println!("{}", rest);
                }
                for line in image_lines(role, &content) {
                    println!("{}", line);
                }
                println!();
                mid_line = false;
            }
            TurnEvent::SearchStarted { .. } => {}
            TurnEvent::SearchResults { count, .. } => {
                println!("{}", colors::status(&format!("  {} products found", count)));
            }
            TurnEvent::Notice { message } => {
                println!("{}", colors::warning(&format!("  {}", message)));
            }
            TurnEvent::Usage {
                input_tokens,
                output_tokens,
            } => {
                tracing::debug!(input_tokens, output_tokens, "usage");
                println!("{}", colors::tokens(input_tokens, output_tokens));
            }
            TurnEvent::Error { message } => {
                let rest = formatter.flush();
                if !rest.is_empty() {
                    println!("{}", rest);
                }
                eprintln!("{}", colors::error(&format!("Error: {}", message)));
            }
            TurnEvent::Done => break,
        }
    }

    summary
}
