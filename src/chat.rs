//! Chat turn handling
//!
//! One turn: append the user input, stream a conversational completion, scan
//! it for the search trigger and, when present, query the product search
//! endpoint and stream a second recommendation completion over the hits.
//! Progress is reported as `TurnEvent`s so the REPL and the SSE server can
//! render the same turn.

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{ContinuationMode, Settings};
use crate::error::PalError;
use crate::image::ReferenceImage;
use crate::prompt;
use crate::provider::{CompletionRequest, Provider};
use crate::responses::{InputMessage, InputPart, StreamEvent, Tool};
use crate::search::{self, Product, ProductSearch};
use crate::transcript::{self, Role, Transcript};
use crate::trigger;

/// Which completion of a turn an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Conversation,
    Recommendation,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Conversation => "conversation",
            Phase::Recommendation => "recommendation",
        }
    }
}

/// Progress of a turn, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A completion request is in flight
    Thinking { phase: Phase },
    /// Streaming text from the assistant
    TextDelta { phase: Phase, delta: String },
    /// A message was appended to the transcript
    Message {
        role: Role,
        content: String,
        phase: Phase,
    },
    SearchStarted { query: String },
    SearchResults { query: String, count: usize },
    /// Something the user should see that is not a model reply
    Notice { message: String },
    Usage { input_tokens: u32, output_tokens: u32 },
    Error { message: String },
    Done,
}

/// Knobs a session needs, split out of `Settings`
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub history_window: usize,
    pub top_k: usize,
    pub hits_for_model: usize,
    pub chat_max_output_tokens: u32,
    pub recommend_max_output_tokens: u32,
    pub vector_store_id: String,
    pub file_search_on_chat: bool,
    pub continuation: ContinuationMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_window: crate::config::DEFAULT_HISTORY_WINDOW,
            top_k: crate::config::DEFAULT_TOP_K,
            hits_for_model: crate::config::DEFAULT_HITS_FOR_MODEL,
            chat_max_output_tokens: crate::config::DEFAULT_CHAT_MAX_TOKENS,
            recommend_max_output_tokens: crate::config::DEFAULT_RECOMMEND_MAX_TOKENS,
            vector_store_id: crate::config::DEFAULT_VECTOR_STORE_ID.to_string(),
            file_search_on_chat: false,
            continuation: ContinuationMode::Transcript,
        }
    }
}

impl From<&Settings> for SessionOptions {
    fn from(s: &Settings) -> Self {
        Self {
            history_window: s.history_window,
            top_k: s.top_k,
            hits_for_model: s.hits_for_model,
            chat_max_output_tokens: s.chat_max_output_tokens,
            recommend_max_output_tokens: s.recommend_max_output_tokens,
            vector_store_id: s.vector_store_id.clone(),
            file_search_on_chat: s.file_search_on_chat,
            continuation: s.continuation,
        }
    }
}

/// What a finished turn produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutcome {
    pub reply: String,
    pub search_query: Option<String>,
    pub hits: usize,
    pub recommendation: Option<String>,
}

/// Shared backends and defaults every new session starts from
#[derive(Clone)]
pub struct SessionFactory {
    provider: Arc<dyn Provider>,
    search: Arc<dyn ProductSearch>,
    options: SessionOptions,
    system_prompt: String,
}

impl SessionFactory {
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Arc<dyn ProductSearch>,
        options: SessionOptions,
        system_prompt: String,
    ) -> Self {
        Self {
            provider,
            search,
            options,
            system_prompt,
        }
    }

    pub fn create(&self) -> ChatSession {
        ChatSession::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.search),
            self.options.clone(),
            self.system_prompt.clone(),
        )
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn search_endpoint(&self) -> String {
        self.search.endpoint()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

/// Per-session conversation state
pub struct ChatSession {
    provider: Arc<dyn Provider>,
    search: Arc<dyn ProductSearch>,
    options: SessionOptions,
    transcript: Transcript,
    image: Option<ReferenceImage>,
    system_prompt: String,
    default_prompt: String,
    previous_response_id: Option<String>,
}

impl ChatSession {
    pub fn new(
        provider: Arc<dyn Provider>,
        search: Arc<dyn ProductSearch>,
        options: SessionOptions,
        system_prompt: String,
    ) -> Self {
        Self {
            provider,
            search,
            options,
            transcript: Transcript::new(),
            image: None,
            default_prompt: system_prompt.clone(),
            system_prompt,
            previous_response_id: None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn search_endpoint(&self) -> String {
        self.search.endpoint()
    }

    pub fn image(&self) -> Option<&ReferenceImage> {
        self.image.as_ref()
    }

    pub fn set_image(&mut self, image: ReferenceImage) {
        info!(image = %image.describe(), "reference image set");
        self.image = Some(image);
    }

    pub fn clear_image(&mut self) {
        self.image = None;
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn reset_system_prompt(&mut self) {
        self.system_prompt = self.default_prompt.clone();
    }

    pub fn previous_response_id(&self) -> Option<&str> {
        self.previous_response_id.as_deref()
    }

    /// Start a new conversation; the edited system prompt survives
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.image = None;
        self.previous_response_id = None;
    }

    /// Run one chat turn
    ///
    /// Blank input is ignored. A failed completion leaves the user message in
    /// the transcript, emits `Error` and returns the error; search failures
    /// are reported as notices and the recommendation runs over zero hits.
    /// `Done` is always the last event.
    pub async fn handle_turn(
        &mut self,
        input: &str,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<TurnOutcome> {
        let result = self.run_turn(input, events).await;
        if let Err(e) = &result {
            warn!("turn failed: {:#}", e);
            emit(
                events,
                TurnEvent::Error {
                    message: format!("{:#}", e),
                },
            )
            .await;
        }
        emit(events, TurnEvent::Done).await;
        result
    }

    async fn run_turn(&mut self, input: &str, events: &mpsc::Sender<TurnEvent>) -> Result<TurnOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(TurnOutcome::default());
        }

        self.transcript.push(Role::User, input);

        let request = self.conversation_request(input);
        let reply = self.complete(request, Phase::Conversation, events).await?;
        self.append_assistant(&reply, Phase::Conversation, events).await;

        let found = trigger::detect(&reply);
        let mut outcome = TurnOutcome {
            reply,
            ..Default::default()
        };

        let Some(found) = found else {
            return Ok(outcome);
        };

        if found.is_empty() {
            warn!("search trigger without a query");
            emit(
                events,
                TurnEvent::Notice {
                    message: "The assistant asked for a search but gave no query.".into(),
                },
            )
            .await;
            return Ok(outcome);
        }

        debug!(query = %found.query, "search trigger");
        let hits = self.run_search(&found.query, events).await;
        outcome.search_query = Some(found.query);
        outcome.hits = hits.len();

        let request = self.recommendation_request(&hits);
        let recommendation = self.complete(request, Phase::Recommendation, events).await?;
        self.append_assistant(&recommendation, Phase::Recommendation, events)
            .await;
        outcome.recommendation = Some(recommendation);

        Ok(outcome)
    }

    fn conversation_request(&self, input: &str) -> CompletionRequest {
        let chained = match (self.options.continuation, &self.previous_response_id) {
            (ContinuationMode::Chained, Some(id)) => Some(id.clone()),
            _ => None,
        };

        let messages = if chained.is_some() {
            let message = match &self.image {
                Some(img) => transcript::with_image(Role::User.as_str(), input, img),
                None => InputMessage::text(Role::User.as_str(), input),
            };
            vec![message]
        } else {
            self.transcript
                .to_input(self.options.history_window, self.image.as_ref())
        };

        let tools = if self.options.file_search_on_chat {
            vec![Tool::file_search(&self.options.vector_store_id)]
        } else {
            Vec::new()
        };

        CompletionRequest {
            instructions: self.system_prompt.clone(),
            input: messages,
            previous_response_id: chained,
            tools,
            max_output_tokens: self.options.chat_max_output_tokens,
        }
    }

    fn recommendation_request(&self, hits: &[Product]) -> CompletionRequest {
        let hits_json = search::hits_for_model(hits, self.options.hits_for_model);
        let mut input = vec![InputMessage::text(
            Role::User.as_str(),
            prompt::hits_message(&hits_json),
        )];
        if let Some(img) = &self.image {
            input.push(InputMessage::parts(
                Role::User.as_str(),
                vec![InputPart::InputImage {
                    image_url: img.data_uri().to_string(),
                }],
            ));
        }

        let previous_response_id = match self.options.continuation {
            ContinuationMode::Chained => self.previous_response_id.clone(),
            ContinuationMode::Transcript => None,
        };

        CompletionRequest {
            instructions: self.system_prompt.clone(),
            input,
            previous_response_id,
            tools: vec![Tool::file_search(&self.options.vector_store_id)],
            max_output_tokens: self.options.recommend_max_output_tokens,
        }
    }

    async fn run_search(&mut self, query: &str, events: &mpsc::Sender<TurnEvent>) -> Vec<Product> {
        emit(
            events,
            TurnEvent::SearchStarted {
                query: query.to_string(),
            },
        )
        .await;

        match self.search.search(query, self.options.top_k).await {
            Ok(hits) => {
                info!(query, hits = hits.len(), "product search finished");
                emit(
                    events,
                    TurnEvent::SearchResults {
                        query: query.to_string(),
                        count: hits.len(),
                    },
                )
                .await;
                hits
            }
            Err(e) => {
                warn!("product search failed: {}", e);
                let message = e.to_string();
                self.transcript.push(Role::System, message.clone());
                emit(events, TurnEvent::Notice { message }).await;
                Vec::new()
            }
        }
    }

    async fn append_assistant(&mut self, text: &str, phase: Phase, events: &mpsc::Sender<TurnEvent>) {
        self.transcript.push(Role::Assistant, text);
        emit(
            events,
            TurnEvent::Message {
                role: Role::Assistant,
                content: text.to_string(),
                phase,
            },
        )
        .await;
    }

    /// Stream one completion, forwarding deltas
    async fn complete(
        &mut self,
        request: CompletionRequest,
        phase: Phase,
        events: &mpsc::Sender<TurnEvent>,
    ) -> Result<String> {
        emit(events, TurnEvent::Thinking { phase }).await;
        debug!(
            provider = self.provider.name(),
            phase = phase.as_str(),
            tools = request.tools.len(),
            "send"
        );

        let mut rx = self.provider.create_stream(request).await?;
        let mut text = String::new();
        let mut response_id: Option<String> = None;
        let mut finished = false;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Created { id } => {
                    response_id = Some(id);
                }
                StreamEvent::TextDelta(delta) => {
                    text.push_str(&delta);
                    emit(events, TurnEvent::TextDelta { phase, delta }).await;
                }
                StreamEvent::Done(response) => {
                    if text.is_empty() {
                        text = response.output_text();
                    }
                    if let Some(usage) = &response.usage {
                        emit(
                            events,
                            TurnEvent::Usage {
                                input_tokens: usage.input_tokens,
                                output_tokens: usage.output_tokens,
                            },
                        )
                        .await;
                    }
                    response_id = Some(response.id);
                    finished = true;
                    break;
                }
                StreamEvent::Error(e) => {
                    return Err(anyhow!(PalError::Stream(e)));
                }
            }
        }

        if !finished {
            if text.is_empty() {
                return Err(anyhow!(PalError::Stream(
                    "stream ended before the response completed".into()
                )));
            }
            warn!(phase = phase.as_str(), "stream ended without completion event, keeping partial text");
        }

        if response_id.is_some() {
            self.previous_response_id = response_id;
        }

        debug!(phase = phase.as_str(), chars = text.len(), "send finished");
        Ok(text)
    }
}

/// Forward an event; a viewer that went away does not abort the turn
async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    let _ = events.send(event).await;
}
