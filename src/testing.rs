//! In-process fakes for the completion provider and product search

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::{PalError, Result};
use crate::provider::{CompletionRequest, Provider};
use crate::responses::{ContentItem, OutputItem, ResponsesResponse, StreamEvent, Usage};
use crate::search::{Product, ProductSearch};

/// Stream events for a completion that emits `deltas` and finishes as `id`
pub fn completion(id: &str, deltas: &[&str]) -> Vec<StreamEvent> {
    let text: String = deltas.concat();
    let mut events = vec![StreamEvent::Created { id: id.to_string() }];
    events.extend(deltas.iter().map(|d| StreamEvent::TextDelta(d.to_string())));
    events.push(StreamEvent::Done(ResponsesResponse {
        id: id.to_string(),
        model: "gpt-4.1".into(),
        output: vec![OutputItem::Message {
            id: format!("msg_{}", id),
            content: vec![ContentItem::OutputText { text }],
            role: "assistant".into(),
        }],
        usage: Some(Usage {
            input_tokens: 10,
            output_tokens: 5,
        }),
    }));
    events
}

/// Collect everything left on a channel
pub async fn drain<T>(mut rx: mpsc::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(e) = rx.recv().await {
        out.push(e);
    }
    out
}

/// Replays one scripted stream per request and records what it was sent
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn create_stream(&self, request: CompletionRequest) -> anyhow::Result<mpsc::Receiver<StreamEvent>> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted completion left"))?;

        let (tx, rx) = mpsc::channel(script.len().max(1));
        for event in script {
            let _ = tx.try_send(event);
        }
        Ok(rx)
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Search backend returning a fixed answer
pub struct StubSearch {
    result: std::result::Result<Vec<Product>, String>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl StubSearch {
    pub fn ok(hits: Vec<Product>) -> Self {
        Self {
            result: Ok(hits),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProductSearch for StubSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Product>> {
        self.queries.lock().unwrap().push((query.to_string(), top_k));
        self.result.clone().map_err(PalError::Search)
    }

    fn endpoint(&self) -> String {
        "stub://search".into()
    }
}
