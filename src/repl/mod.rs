//! Interactive REPL for PackagingPal
//!
//! Provides a readline-based interface with:
//! - Command history
//! - Multi-line input support
//! - Streaming replies with search progress
//! - Reference image and system prompt commands

pub mod colors;
mod formatter;
mod helper;
mod streaming;

use anyhow::Result;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::debug;

use crate::chat::{ChatSession, SessionFactory};
use crate::config::{ContinuationMode, config_dir};
use crate::image::ReferenceImage;
use crate::render;

use helper::PalHelper;

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    New,
    ImageSet(String),
    ImageStatus,
    ImageClear,
    SystemShow,
    SystemSet(String),
    SystemReset,
    History,
    Status,
    Version,
    Quit,
    Unknown(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let (command, arg) = match input.trim().split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (input.trim(), ""),
        };

        match (command, arg) {
            ("/help", _) => Command::Help,
            ("/new" | "/clear", _) => Command::New,
            ("/image", "") => Command::ImageStatus,
            ("/image", "clear") => Command::ImageClear,
            ("/image", path) => Command::ImageSet(path.trim_matches(&['"', '\''][..]).to_string()),
            ("/system", "") => Command::SystemShow,
            ("/system", "reset") => Command::SystemReset,
            ("/system", text) => Command::SystemSet(text.to_string()),
            ("/history", _) => Command::History,
            ("/status", _) => Command::Status,
            ("/version", _) => Command::Version,
            ("/quit" | "/exit", _) => Command::Quit,
            (other, _) => Command::Unknown(other.to_string()),
        }
    }
}

/// REPL state
pub struct Repl {
    editor: Editor<PalHelper, DefaultHistory>,
    session: ChatSession,
    history_path: PathBuf,
    start_time: Instant,
}

impl Repl {
    pub fn new(session: ChatSession) -> Result<Self> {
        let mut editor = Editor::new()?;
        editor.set_helper(Some(PalHelper::new()));

        Ok(Self {
            editor,
            session,
            history_path: config_dir().join("chat_history"),
            start_time: Instant::now(),
        })
    }

    fn load_history(&mut self) {
        if self.history_path.exists() {
            let _ = self.editor.load_history(&self.history_path);
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = self.editor.save_history(&self.history_path);
    }

    /// Run the REPL loop
    pub async fn run(&mut self) -> Result<()> {
        self.load_history();

        println!("Tell me what packaging you are looking for (Ctrl+D to exit, /help for commands)");
        println!("  Use \\\\ at end of line for multi-line input, or \"\"\" to start/end block");
        println!("  Press Ctrl+C to cancel a reply in progress");
        println!();

        loop {
            let Some(line) = self.read_input()? else {
                println!("Goodbye!");
                break;
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            self.editor.add_history_entry(&line)?;

            if trimmed.starts_with('/') {
                if !self.handle_command(Command::parse(trimmed)) {
                    println!("Goodbye!");
                    break;
                }
                continue;
            }

            self.process_turn(trimmed).await?;
        }

        self.save_history();
        Ok(())
    }

    /// Read input with multi-line support
    fn read_input(&mut self) -> Result<Option<String>> {
        let first_line = match self.editor.readline(">>> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                return Ok(Some(String::new()));
            }
            Err(ReadlineError::Eof) => return Ok(None),
            Err(err) => {
                eprintln!("Error: {:?}", err);
                return Ok(None);
            }
        };

        let trimmed = first_line.trim();
        if trimmed.starts_with("\"\"\"") {
            return self.read_block(trimmed);
        }
        if trimmed.ends_with('\\') {
            return self.read_continuation(trimmed);
        }
        Ok(Some(first_line))
    }

    /// Read a block delimited by """
    fn read_block(&mut self, first_line: &str) -> Result<Option<String>> {
        let mut lines = Vec::new();

        let after_open = first_line.strip_prefix("\"\"\"").unwrap_or("");
        if let Some(single) = after_open.strip_suffix("\"\"\"") {
            return Ok(Some(single.to_string()));
        }
        if !after_open.is_empty() {
            lines.push(after_open.to_string());
        }

        loop {
            match self.editor.readline("... ") {
                Ok(line) => {
                    if let Some(before_close) = line.trim_end().strip_suffix("\"\"\"") {
                        if !before_close.trim().is_empty() {
                            lines.push(before_close.to_string());
                        }
                        break;
                    }
                    lines.push(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C (cancelled multi-line)");
                    return Ok(Some(String::new()));
                }
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    return Ok(None);
                }
            }
        }

        Ok(Some(lines.join("\n")))
    }

    /// Read lines continued with a trailing backslash
    fn read_continuation(&mut self, first_line: &str) -> Result<Option<String>> {
        let mut lines = vec![first_line.strip_suffix('\\').unwrap_or(first_line).to_string()];

        loop {
            match self.editor.readline("... ") {
                Ok(line) => {
                    let trimmed = line.trim_end();
                    if let Some(part) = trimmed.strip_suffix('\\') {
                        lines.push(part.to_string());
                    } else {
                        lines.push(line);
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C (cancelled multi-line)");
                    return Ok(Some(String::new()));
                }
                Err(ReadlineError::Eof) => return Ok(None),
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    return Ok(None);
                }
            }
        }

        Ok(Some(lines.join("\n")))
    }

    /// Run one chat turn, printing events as they arrive
    async fn process_turn(&mut self, input: &str) -> Result<()> {
        let (tx, rx) = mpsc::channel(100);
        let printer = tokio::spawn(streaming::print_events(rx));

        let cancelled = tokio::select! {
            result = self.session.handle_turn(input, &tx) => {
                if let Err(e) = result {
                    debug!("turn ended with error: {:#}", e);
                }
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        };
        drop(tx);

        let summary = printer.await?;
        if cancelled {
            print!("{}", colors::ansi::RESET);
            if summary.printed_text {
                println!();
            }
            println!("\n  [cancelled]");
        }
        Ok(())
    }

    /// Handle a slash command; false means exit
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Help => print_help(),
            Command::New => {
                self.session.reset();
                println!("{}", colors::success("Started a new conversation."));
            }
            Command::ImageSet(path) => self.cmd_image_set(&path),
            Command::ImageStatus => match self.session.image() {
                Some(img) => println!("Reference image: {}", img.describe()),
                None => println!("No reference image. Use /image <path> to attach one."),
            },
            Command::ImageClear => {
                self.session.clear_image();
                println!("Reference image cleared.");
            }
            Command::SystemShow => {
                println!("{}", colors::header("System prompt:"));
                println!("{}", self.session.system_prompt());
            }
            Command::SystemSet(text) => {
                self.session.set_system_prompt(text);
                println!("{}", colors::success("System prompt updated for this session."));
            }
            Command::SystemReset => {
                self.session.reset_system_prompt();
                println!("System prompt reset to default.");
            }
            Command::History => self.cmd_history(),
            Command::Status => self.cmd_status(),
            Command::Version => {
                println!("PackagingPal v{}", env!("CARGO_PKG_VERSION"));
                println!("  Model: {}", self.session.model());
            }
            Command::Quit => return false,
            Command::Unknown(cmd) => {
                println!("Unknown command: {}. Try /help", cmd);
            }
        }
        true
    }

    fn cmd_image_set(&mut self, path: &str) {
        let expanded = expand_home(path);
        match ReferenceImage::from_path(&expanded) {
            Ok(img) => {
                println!("{}", colors::success(&format!("Reference image set: {}", img.describe())));
                self.session.set_image(img);
            }
            Err(e) => println!("{}", colors::error(&e.to_string())),
        }
    }

    fn cmd_history(&self) {
        let messages = self.session.transcript().messages();
        if messages.is_empty() {
            println!("No messages yet.");
            return;
        }

        for rendered in render::render_all(messages) {
            println!("{} {}", colors::role(rendered.role.as_str()), rendered.text);
            for url in &rendered.images {
                println!("{}", colors::image_link(url));
            }
            println!();
        }
    }

    fn cmd_status(&self) {
        let options = self.session.options();
        println!("Model:          {}", self.session.model());
        println!("Search:         {} (top_k {})", self.session.search_endpoint(), options.top_k);
        println!(
            "Continuation:   {}",
            match options.continuation {
                ContinuationMode::Transcript => "transcript",
                ContinuationMode::Chained => "chained",
            }
        );
        println!("Messages:       {}", self.session.transcript().len());
        println!(
            "Image:          {}",
            self.session
                .image()
                .map(|i| i.describe())
                .unwrap_or_else(|| "(none)".into())
        );
        println!("Last response:  {}", self.session.previous_response_id().unwrap_or("(none)"));
        println!("Uptime:         {}s", self.start_time.elapsed().as_secs());
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /help              - Show this help");
    println!("  /new, /clear       - Start a new conversation");
    println!("  /image <path>      - Attach a reference image (png/jpg)");
    println!("  /image             - Show the reference image");
    println!("  /image clear       - Remove the reference image");
    println!("  /system            - Show the system prompt");
    println!("  /system <text>     - Replace the system prompt for this session");
    println!("  /system reset      - Restore the default system prompt");
    println!("  /history           - Show the conversation");
    println!("  /status            - Show current state");
    println!("  /version           - Show version info");
    println!("  /quit              - Exit");
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None => Path::new(path).to_path_buf(),
    }
}

/// Run the REPL with a fresh session
pub async fn run(factory: SessionFactory, image: Option<ReferenceImage>) -> Result<()> {
    let mut session = factory.create();
    if let Some(img) = image {
        session.set_image(img);
    }

    let mut repl = Repl::new(session)?;
    repl.run().await
}
