// tests/common/mod.rs
// Throwaway local servers standing in for the Responses API and the product
// search endpoint.

#![allow(dead_code)]

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serve `router` on an ephemeral port, returning `http://127.0.0.1:<port>`
pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

// ============================================================================
// Fake Responses API
// ============================================================================

#[derive(Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl Reply {
    pub fn sse(body: String) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/event-stream",
            body,
        }
    }

    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }
}

#[derive(Default)]
pub struct FakeOpenAi {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Value>>,
    auth: Mutex<Vec<String>>,
}

impl FakeOpenAi {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Default::default()
        })
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn auth_headers(&self) -> Vec<String> {
        self.auth.lock().unwrap().clone()
    }

    /// Start serving; returns the `/v1` base URL
    pub async fn start(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/v1/responses", post(responses_handler))
            .with_state(Arc::clone(self));
        format!("{}/v1", spawn(router).await)
    }
}

async fn responses_handler(State(fake): State<Arc<FakeOpenAi>>, headers: HeaderMap, body: String) -> Response {
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        fake.auth.lock().unwrap().push(auth.to_string());
    }
    fake.requests
        .lock()
        .unwrap()
        .push(serde_json::from_str(&body).unwrap_or(Value::Null));

    let reply = fake.replies.lock().unwrap().pop_front();
    match reply {
        Some(r) => (r.status, [(header::CONTENT_TYPE, r.content_type)], r.body).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no scripted reply").into_response(),
    }
}

/// A completed response object as the API returns it
pub fn response_object(id: &str, text: &str) -> Value {
    json!({
        "id": id,
        "object": "response",
        "model": "gpt-4.1",
        "status": "completed",
        "output": [
            { "type": "file_search_call", "id": "fs_1", "status": "completed" },
            {
                "type": "message",
                "id": format!("msg_{}", id),
                "role": "assistant",
                "content": [{ "type": "output_text", "text": text, "annotations": [] }]
            }
        ],
        "usage": { "input_tokens": 120, "output_tokens": 30, "total_tokens": 150 }
    })
}

/// SSE body for a streamed response emitting `deltas`
pub fn sse_body(id: &str, deltas: &[&str]) -> String {
    let text: String = deltas.concat();
    let mut out = String::new();
    push_event(
        &mut out,
        "response.created",
        json!({"type": "response.created", "response": {"id": id, "status": "in_progress"}}),
    );
    for d in deltas {
        push_event(
            &mut out,
            "response.output_text.delta",
            json!({"type": "response.output_text.delta", "item_id": "msg", "delta": d}),
        );
    }
    push_event(
        &mut out,
        "response.completed",
        json!({"type": "response.completed", "response": response_object(id, &text)}),
    );
    out
}

pub fn push_event(out: &mut String, name: &str, data: Value) {
    out.push_str(&format!("event: {}\ndata: {}\n\n", name, data));
}

// ============================================================================
// Fake product search
// ============================================================================

pub struct FakeSearch {
    status: StatusCode,
    body: Value,
    delay: Duration,
    requests: Mutex<Vec<Value>>,
}

impl FakeSearch {
    pub fn new(status: StatusCode, body: Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: StatusCode::OK,
            body: json!([]),
            delay,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// Start serving; returns the `/api` base URL
    pub async fn start(self: &Arc<Self>) -> String {
        let router = Router::new()
            .route("/api/search", post(search_handler))
            .with_state(Arc::clone(self));
        format!("{}/api", spawn(router).await)
    }
}

async fn search_handler(State(fake): State<Arc<FakeSearch>>, body: String) -> Response {
    fake.requests
        .lock()
        .unwrap()
        .push(serde_json::from_str(&body).unwrap_or(Value::Null));
    if !fake.delay.is_zero() {
        tokio::time::sleep(fake.delay).await;
    }
    (
        fake.status,
        [(header::CONTENT_TYPE, "application/json")],
        fake.body.to_string(),
    )
        .into_response()
}

/// A search hit shaped like the live endpoint's rows
pub fn product(id: i64, title: &str, company: &str, score: f64, image: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "company_name": company,
        "score": score,
        "description": "Cosmetic packaging",
        "image_url": "",
        "image_urls": format!("{{{}}}", image),
        "moq": 5000
    })
}
