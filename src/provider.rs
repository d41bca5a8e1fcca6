//! Completion provider abstraction
//!
//! The turn handler only needs "send this input, give me a token stream".
//! `OpenAiProvider` wraps the Responses API client; tests script their own.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::responses::{Client as ResponsesClient, InputMessage, ResponsesRequest, StreamEvent, Tool};

/// One completion call as the turn handler sees it
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub instructions: String,
    pub input: Vec<InputMessage>,
    pub previous_response_id: Option<String>,
    pub tools: Vec<Tool>,
    pub max_output_tokens: u32,
}

/// Unified provider trait for completion backends
#[async_trait]
pub trait Provider: Send + Sync {
    /// Create a streaming completion
    async fn create_stream(&self, request: CompletionRequest) -> Result<mpsc::Receiver<StreamEvent>>;

    /// Model id used for requests
    fn model(&self) -> &str;

    /// Get the provider name for logging
    fn name(&self) -> &'static str;
}

/// OpenAI provider using the Responses API
pub struct OpenAiProvider {
    client: ResponsesClient,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiProvider {
    pub fn new(client: ResponsesClient, model: String) -> Self {
        Self {
            client,
            model,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Convert a completion request into the wire format
    fn to_request(&self, request: CompletionRequest) -> ResponsesRequest {
        ResponsesRequest {
            model: self.model.clone(),
            input: request.input,
            instructions: Some(request.instructions).filter(|s| !s.trim().is_empty()),
            previous_response_id: request.previous_response_id,
            tools: request.tools,
            max_output_tokens: Some(request.max_output_tokens),
            temperature: self.temperature,
            store: true,
            stream: true,
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn create_stream(&self, request: CompletionRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let request = self.to_request(request);
        Ok(self.client.create_stream(&request).await?)
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
