//! Request and response bodies for the HTTP API

use serde::{Deserialize, Serialize};

use crate::image::ReferenceImage;
use crate::render::RenderedMessage;

/// Chat request from the browser
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

/// `?session_id=` on read endpoints
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// `discard` drops the session instead of clearing it
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub session_id: String,
    #[serde(default)]
    pub discard: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImageUpload {
    pub session_id: String,
    /// `data:image/png;base64,...`
    pub data_uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A missing prompt restores the default
#[derive(Debug, Deserialize)]
pub struct SystemPromptUpdate {
    pub session_id: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub model: String,
    pub search_endpoint: String,
    pub sessions: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageInfo {
    pub mime: String,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&ReferenceImage> for ImageInfo {
    fn from(img: &ReferenceImage) -> Self {
        Self {
            mime: img.mime().to_string(),
            size: img.size(),
            name: img.name().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub session_id: String,
    pub messages: Vec<RenderedMessage>,
    pub image: Option<ImageInfo>,
}

#[derive(Debug, Serialize)]
pub struct SystemPromptResponse {
    pub session_id: String,
    pub prompt: String,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub session_id: String,
    pub image: Option<ImageInfo>,
}
