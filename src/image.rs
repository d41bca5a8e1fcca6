//! Reference images
//!
//! A session may carry one uploaded packaging photo. It is sent to the model
//! inline as a `data:<mime>;base64,<payload>` URI.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::path::Path;

use crate::error::{PalError, Result};

/// Extensions accepted for upload
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg"];

/// An image ready to be attached to model input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    data_uri: String,
    mime: String,
    size: usize,
    name: Option<String>,
}

impl ReferenceImage {
    /// Encode raw bytes; a missing mime falls back to image/png
    pub fn from_bytes(bytes: &[u8], mime: Option<&str>) -> Result<Self> {
        let mime = mime.filter(|m| !m.is_empty()).unwrap_or("image/png");
        let mime = normalize_mime(mime);
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Err(PalError::Image(format!("unsupported type {}", mime)));
        }
        if bytes.is_empty() {
            return Err(PalError::Image("empty file".into()));
        }

        Ok(Self {
            data_uri: format!("data:{};base64,{}", mime, BASE64.encode(bytes)),
            mime,
            size: bytes.len(),
            name: None,
        })
    }

    /// Load a png/jpg/jpeg from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(PalError::Image(format!(
                "{} is not one of: {}",
                path.display(),
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let bytes = std::fs::read(path)?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let mut image = Self::from_bytes(&bytes, Some(mime.essence_str()))?;
        image.name = path.file_name().map(|n| n.to_string_lossy().to_string());
        Ok(image)
    }

    /// Accept a data URI produced by a browser FileReader
    pub fn from_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| PalError::Image("expected a data: URI".into()))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| PalError::Image("expected base64 encoding".into()))?;

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| PalError::Image(format!("bad base64: {}", e)))?;

        Self::from_bytes(&bytes, Some(mime))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Decoded size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Short human description, e.g. `swatch.png (image/png, 12.3 KB)`
    pub fn describe(&self) -> String {
        format!(
            "{} ({}, {:.1} KB)",
            self.name.as_deref().unwrap_or("upload"),
            self.mime,
            self.size as f64 / 1024.0
        )
    }
}

/// Browsers sometimes send image/jpg
fn normalize_mime(mime: &str) -> String {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    }
}
