//! Display shaping for transcript messages
//!
//! Assistant replies carry product images as `image_url: <url>` lines. The
//! front ends show those as pictures instead of text, except for Plastirey
//! products whose images may not be displayed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::transcript::{Message, Role};
use crate::trigger::strip_trigger_lines;

static IMAGE_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"image_url\s*:\s*(https?://\S+)").expect("valid image_url pattern"));

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank-line pattern"));

/// Supplier whose product images are withheld
const NO_IMAGE_SUPPLIER: &str = "plastirey";

/// A message ready for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMessage {
    pub role: Role,
    pub text: String,
    pub images: Vec<String>,
}

/// Shape one transcript message for display
pub fn render(message: &Message) -> RenderedMessage {
    if message.role != Role::Assistant {
        return RenderedMessage {
            role: message.role,
            text: message.content.clone(),
            images: Vec::new(),
        };
    }

    let urls: Vec<String> = IMAGE_URL_RE
        .captures_iter(&message.content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(&[')', ',', '.'][..]).to_string())
        .collect();

    let cleaned = IMAGE_URL_RE.replace_all(&message.content, "");
    let cleaned = strip_trigger_lines(&cleaned);
    let cleaned = BLANK_RUN_RE.replace_all(&cleaned, "\n\n").trim().to_string();

    let images = if message.content.to_lowercase().contains(NO_IMAGE_SUPPLIER) {
        Vec::new()
    } else {
        urls
    };

    RenderedMessage {
        role: message.role,
        text: cleaned,
        images,
    }
}

/// Shape a whole transcript
pub fn render_all(messages: &[Message]) -> Vec<RenderedMessage> {
    messages.iter().map(render).collect()
}
