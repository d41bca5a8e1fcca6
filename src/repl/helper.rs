//! Rustyline helper for REPL with tab completion and hints

use rustyline::completion::{Completer, Pair, FilenameCompleter};
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::borrow::Cow;

/// Slash commands for tab completion
pub const SLASH_COMMANDS: &[&str] = &[
    "/help",
    "/new",
    "/clear",
    "/image",
    "/system",
    "/history",
    "/status",
    "/version",
    "/quit",
    "/exit",
];

pub struct PalHelper {
    hinter: HistoryHinter,
    files: FilenameCompleter,
}

impl PalHelper {
    pub fn new() -> Self {
        Self {
            hinter: HistoryHinter::new(),
            files: FilenameCompleter::new(),
        }
    }
}

impl Default for PalHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for PalHelper {
    type Candidate = Pair;

    fn complete(&self, line: &str, pos: usize, ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<Pair>)> {
        // `/image <path>` completes file names
        if line.starts_with("/image ") && pos > "/image ".len() {
            return self.files.complete(line, pos, ctx);
        }

        if line.starts_with('/') && pos <= line.find(' ').unwrap_or(line.len()) {
            let prefix = line.split_whitespace().next().unwrap_or("");
            let matches: Vec<Pair> = SLASH_COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(prefix))
                .map(|cmd| Pair {
                    display: cmd.to_string(),
                    replacement: cmd.to_string(),
                })
                .collect();
            Ok((0, matches))
        } else {
            Ok((pos, vec![]))
        }
    }
}

impl Hinter for PalHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if line.starts_with('/') {
            None
        } else {
            self.hinter.hint(line, pos, ctx)
        }
    }
}

impl Highlighter for PalHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[2m{}\x1b[0m", hint))
    }
}

impl Validator for PalHelper {}

impl Helper for PalHelper {}
