//! Line-oriented terminal formatter for streamed replies
//!
//! Text is held until a line completes, then styled as a whole: fenced
//! blocks (the hits JSON, code) are dimmed and a trigger line is replaced by
//! a search banner. `image_url:` lines are dropped here; the finished message
//! is rendered once complete so the image rules see the whole reply.

use crate::trigger::TRIGGER_TOKEN;

use super::colors::{self, ansi};

pub struct LineFormatter {
    in_fence: bool,
    pending: String,
}

impl LineFormatter {
    pub fn new() -> Self {
        Self {
            in_fence: false,
            pending: String::new(),
        }
    }

    /// Feed a delta, returning styled output for every completed line
    pub fn process(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);

        let mut output = String::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if let Some(styled) = self.format_line(line.trim_end_matches('\n')) {
                output.push_str(&styled);
                output.push('\n');
            }
        }
        output
    }

    /// Emit whatever is left of an unterminated line
    pub fn flush(&mut self) -> String {
        if self.pending.is_empty() {
            return if self.in_fence {
                self.in_fence = false;
                ansi::RESET.to_string()
            } else {
                String::new()
            };
        }

        let line = std::mem::take(&mut self.pending);
        let mut output = self.format_line(&line).unwrap_or_default();
        if self.in_fence {
            self.in_fence = false;
            output.push_str(ansi::RESET);
        }
        output
    }

    /// Styled line, or `None` when the line is not shown
    fn format_line(&mut self, line: &str) -> Option<String> {
        let trimmed = line.trim_start();

        if trimmed.starts_with("```") {
            self.in_fence = !self.in_fence;
            return Some(if self.in_fence {
                format!("{}{}", ansi::DIM, line)
            } else {
                format!("{}{}", line, ansi::RESET)
            });
        }

        if self.in_fence {
            return Some(line.to_string());
        }

        if let Some((_, query)) = line.split_once(TRIGGER_TOKEN) {
            return Some(colors::search_banner(query.trim()));
        }

        if trimmed.starts_with("image_url:") {
            return None;
        }

        Some(line.to_string())
    }
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new()
    }
}
