//! External product search client
//!
//! The Impacked search service ranks packaging products for a free-text query.
//! Wire format: POST `{base}/search` with `{"query": ..., "top_k": ...}`,
//! answered by a JSON array of product records.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PalError, Result};

pub const DEFAULT_SEARCH_URL: &str = "https://freeform-search-impacked-19a53d14c347.herokuapp.com/api";
pub const DEFAULT_TIMEOUT_SECS: u64 = 25;

/// Numbered image columns checked after `image_url`
const NUMBERED_IMAGE_FIELDS: usize = 5;

/// Search request body
#[derive(Debug, Serialize)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub top_k: usize,
}

/// A product record as returned by the search service
///
/// Only the fields the assistant forwards are typed; everything else
/// (including the image columns, which vary per supplier feed) stays in `extra`.
/// Typed fields never reject a record: numbers become text, numeric strings
/// become scores, anything else is `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Product {
    /// First usable image for this product
    pub fn first_image(&self) -> Option<String> {
        let numbered = (1..=NUMBERED_IMAGE_FIELDS).map(|i| format!("image_url_{}", i));
        for key in std::iter::once("image_url".to_string()).chain(numbered) {
            if let Some(url) = self.extra.get(&key).and_then(Value::as_str) {
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }

        let first = match self.extra.get("image_urls")? {
            Value::Array(items) => match items.first()? {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            // Postgres array literal: "{url1,url2}"
            Value::String(s) => s.split(',').next()?.to_string(),
            _ => return None,
        };

        let trimmed = first.trim_matches(|c| c == '{' || c == '}' || c == ' ');
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Decode a search response, skipping entries that are not objects
pub fn parse_hits(body: Value) -> Result<Vec<Product>> {
    let Value::Array(items) = body else {
        return Err(PalError::Search("bad response body: expected a JSON array".into()));
    };

    let total = items.len();
    let hits: Vec<Product> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    if hits.len() < total {
        warn!(skipped = total - hits.len(), "skipped malformed search records");
    }
    Ok(hits)
}

/// Compact view of a hit handed to the recommendation turn
#[derive(Debug, Serialize)]
struct HitForModel<'a> {
    id: &'a Value,
    title: Option<&'a str>,
    supplier: Option<&'a str>,
    score: f64,
    image_url: Option<String>,
}

/// Serialize the top `k` hits for the model
pub fn hits_for_model(hits: &[Product], k: usize) -> String {
    let compact: Vec<HitForModel<'_>> = hits
        .iter()
        .take(k)
        .map(|p| HitForModel {
            id: &p.id,
            title: p.title.as_deref(),
            supplier: p.company_name.as_deref(),
            score: round3(p.score.unwrap_or(0.0)),
            image_url: p.first_image(),
        })
        .collect();

    serde_json::to_string(&compact).unwrap_or_else(|_| "[]".to_string())
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

/// Anything that can answer a product query
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>>;

    /// Endpoint description for status output
    fn endpoint(&self) -> String;
}

/// HTTP client for the external search endpoint
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait]
impl ProductSearch for SearchClient {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>> {
        let url = self.url();
        let payload = SearchRequest { query, top_k };
        debug!(%url, query, top_k, "POST product search");

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PalError::Search(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "product search status");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PalError::Search(format!("{} - {}", status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PalError::Search(format!("bad response body: {}", e)))?;
        let hits = parse_hits(body)?;

        debug!(hits = hits.len(), "product search hits");
        Ok(hits)
    }

    fn endpoint(&self) -> String {
        self.url()
    }
}
