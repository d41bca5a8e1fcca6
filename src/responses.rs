//! OpenAI Responses API client
//!
//! Implements the subset of the Responses API PackagingPal needs:
//! - Role-tagged input messages with text and image parts
//! - The hosted `file_search` tool over a vector store
//! - Streaming SSE responses
//! - Conversation continuity via previous_response_id

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{PalError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Request to the Responses API
#[derive(Debug, Clone, Serialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub store: bool,
    pub stream: bool,
}

/// One role-tagged input message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputMessage {
    pub role: String,
    pub content: InputContent,
}

/// Message content is either a bare string or a list of typed parts
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputContent {
    Text(String),
    Parts(Vec<InputPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum InputPart {
    #[serde(rename = "input_text")]
    InputText { text: String },
    #[serde(rename = "input_image")]
    InputImage { image_url: String },
}

impl InputMessage {
    pub fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: InputContent::Text(text.into()),
        }
    }

    pub fn parts(role: &str, parts: Vec<InputPart>) -> Self {
        Self {
            role: role.to_string(),
            content: InputContent::Parts(parts),
        }
    }
}

/// Hosted tools (Responses API format)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Tool {
    #[serde(rename = "file_search")]
    FileSearch { vector_store_ids: Vec<String> },
}

impl Tool {
    pub fn file_search(vector_store_id: &str) -> Self {
        Tool::FileSearch {
            vector_store_ids: vec![vector_store_id.to_string()],
        }
    }
}

/// Response from the Responses API
#[derive(Debug, Clone, Deserialize)]
pub struct ResponsesResponse {
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
    pub usage: Option<Usage>,
}

/// Output item types (polymorphic)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum OutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        id: String,
        #[serde(default)]
        content: Vec<ContentItem>,
        #[serde(default)]
        role: String,
    },
    /// file_search_call, reasoning and anything newer
    #[serde(other)]
    Other,
}

/// Content item within a message
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "output_text")]
    OutputText { text: String },
    #[serde(rename = "refusal")]
    Refusal { refusal: String },
    #[serde(other)]
    Other,
}

/// Token usage
#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl OutputItem {
    /// Extract text content from a message
    pub fn text(&self) -> Option<String> {
        match self {
            OutputItem::Message { content, .. } => {
                let texts: Vec<&str> = content
                    .iter()
                    .filter_map(|c| match c {
                        ContentItem::OutputText { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join(""))
                }
            }
            OutputItem::Other => None,
        }
    }
}

impl ResponsesResponse {
    /// All assistant text in output order
    pub fn output_text(&self) -> String {
        self.output.iter().filter_map(OutputItem::text).collect()
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Streaming events from the Responses API
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Response id is known (arrives before any text)
    Created { id: String },
    /// Text delta - show this immediately
    TextDelta(String),
    /// Response completed with final data
    Done(ResponsesResponse),
    /// Error reported by the API mid-stream
    Error(String),
}

/// Incremental SSE decoder
///
/// Buffers raw bytes so a line split inside a multi-byte character is only
/// decoded once it is complete.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current_event: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every event it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();

            if line.is_empty() {
                // Blank line ends the event block
                self.current_event.clear();
            } else if let Some(name) = line.strip_prefix("event:") {
                self.current_event = name.trim().to_string();
            } else if let Some(data) = line.strip_prefix("data:") {
                if let Some(event) = parse_sse_event(&self.current_event, data.trim()) {
                    events.push(event);
                }
            }
        }
        events
    }
}

/// Parse SSE event data into a StreamEvent
fn parse_sse_event(event_type: &str, data: &str) -> Option<StreamEvent> {
    let parsed: serde_json::Value = serde_json::from_str(data).ok()?;

    // Some proxies drop the `event:` line; the payload repeats the type
    let event_type = if event_type.is_empty() {
        parsed.get("type")?.as_str()?.to_string()
    } else {
        event_type.to_string()
    };

    match event_type.as_str() {
        "response.created" => {
            let id = parsed.get("response")?.get("id")?.as_str()?;
            Some(StreamEvent::Created { id: id.to_string() })
        }
        "response.output_text.delta" => {
            let delta = parsed.get("delta")?.as_str()?;
            Some(StreamEvent::TextDelta(delta.to_string()))
        }
        "response.completed" => {
            let response = parsed.get("response")?;
            let resp: ResponsesResponse = serde_json::from_value(response.clone()).ok()?;
            Some(StreamEvent::Done(resp))
        }
        "response.failed" => {
            let message = parsed
                .pointer("/response/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("response failed");
            Some(StreamEvent::Error(message.to_string()))
        }
        "error" => {
            let message = parsed
                .get("message")
                .or_else(|| parsed.pointer("/error/message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            Some(StreamEvent::Error(message.to_string()))
        }
        _ => None,
    }
}

// ============================================================================
// Client
// ============================================================================

/// Responses API client
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Client {
    /// Create a new client against the public endpoint
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the client at another base URL (proxies, tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    /// Create a response (non-streaming)
    pub async fn create(&self, request: &ResponsesRequest) -> Result<ResponsesResponse> {
        let mut request = request.clone();
        request.stream = false;

        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(PalError::Api { status, body });
        }

        let text = response.text().await?;
        let result: ResponsesResponse = serde_json::from_str(&text).map_err(|e| {
            let preview: String = text.chars().take(500).collect();
            PalError::Stream(format!("JSON parse error: {}. Response preview: {}", e, preview))
        })?;

        Ok(result)
    }

    /// Create a streaming response
    pub async fn create_stream(
        &self,
        request: &ResponsesRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let mut request = request.clone();
        request.stream = true;

        debug!(model = %request.model, messages = request.input.len(), tools = request.tools.len(), "POST {}", self.url());

        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await?;
            return Err(PalError::Api { status, body });
        }

        let (tx, rx) = mpsc::channel(100);

        // Spawn task to process SSE stream
        let bytes_stream = response.bytes_stream();
        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            futures::pin_mut!(bytes_stream);

            while let Some(chunk_result) = bytes_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                };

                for event in decoder.push(&chunk) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
