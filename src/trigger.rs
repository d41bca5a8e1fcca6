//! Search trigger detection
//!
//! The model is told to emit `###SEARCH### <query>` on its own line once it
//! has enough requirements. Everything after the first token up to the end of
//! that line is the query sent to the product search endpoint.

/// Sentinel the model emits to request a product search
pub const TRIGGER_TOKEN: &str = "###SEARCH###";

/// A detected search request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTrigger {
    pub query: String,
}

impl SearchTrigger {
    /// A token with nothing after it carries no usable query
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }
}

/// Scan finished assistant text for the trigger token
pub fn detect(text: &str) -> Option<SearchTrigger> {
    let (_, rest) = text.split_once(TRIGGER_TOKEN)?;
    let query = rest.trim().lines().next().unwrap_or("").trim().to_string();
    Some(SearchTrigger { query })
}

/// Remove lines carrying the trigger token (display only; the transcript keeps them)
pub fn strip_trigger_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.contains(TRIGGER_TOKEN))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
