//! ANSI color helpers for terminal output

/// ANSI escape codes
pub mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const MAGENTA: &str = "\x1b[35m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";
}

use ansi::*;

/// Search banner shown in place of a trigger line
pub fn search_banner(query: &str) -> String {
    format!("{}{}[searching catalogue: {}]{}", BOLD, CYAN, query, RESET)
}

/// Image link inside a recommendation
pub fn image_link(url: &str) -> String {
    format!("{}  image: {}{}", BLUE, url, RESET)
}

pub fn success(msg: &str) -> String {
    format!("{}{}{}", GREEN, msg, RESET)
}

pub fn error(msg: &str) -> String {
    format!("{}{}{}", RED, msg, RESET)
}

pub fn warning(msg: &str) -> String {
    format!("{}{}{}", YELLOW, msg, RESET)
}

/// Format a status/info message (gray)
pub fn status(msg: &str) -> String {
    format!("{}{}{}", GRAY, msg, RESET)
}

pub fn header(msg: &str) -> String {
    format!("{}{}{}", BOLD, msg, RESET)
}

/// Role label for /history
pub fn role(role: &str) -> String {
    let color = match role {
        "user" => MAGENTA,
        "assistant" => CYAN,
        _ => YELLOW,
    };
    format!("{}{}{}:{}", BOLD, color, role, RESET)
}

/// Format token usage
pub fn tokens(input: u32, output: u32) -> String {
    format!("{}[tokens: {} in / {} out]{}", DIM, input, output, RESET)
}

pub fn separator(width: usize) -> String {
    format!("{}{}{}", DIM, "─".repeat(width), RESET)
}

/// Startup banner row
pub fn banner_line(label: &str, value: &str) -> String {
    format!("{}{:<12}{} {}", DIM, label, RESET, value)
}
