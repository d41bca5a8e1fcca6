//! HTTP server for the browser chat
//!
//! Exposes chat sessions via REST/SSE endpoints:
//! - GET /api/status - Health check
//! - POST /api/chat/stream - SSE streaming chat turn
//! - GET /api/messages - Rendered transcript
//! - POST/DELETE /api/image - Reference image
//! - GET/PUT /api/system-prompt - Per-session system prompt
//! - POST /api/reset - New conversation (`"discard": true` drops the session)

mod handlers;
pub mod types;

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::{ChatSession, SessionFactory};

/// Request body cap; image uploads arrive as base64 data URIs
pub const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

/// Sessions idle this long are dropped on the next sweep
pub const SESSION_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on live sessions; the least recently used idle one goes first
pub const MAX_SESSIONS: usize = 256;

struct SessionEntry {
    session: Arc<Mutex<ChatSession>>,
    last_used: Instant,
}

impl SessionEntry {
    /// No handler or running turn holds the session
    fn is_idle(&self) -> bool {
        Arc::strong_count(&self.session) == 1
    }
}

/// In-memory chat sessions keyed by id, each behind its own lock
///
/// Every lookup refreshes the session's last-used time. Creating a session
/// sweeps idle entries past the TTL and evicts the least recently used idle
/// entry while the store is full.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    idle_ttl: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(SESSION_IDLE_TTL, MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.session.clone())
    }

    /// Look up a session, creating it when missing
    ///
    /// Without an id a fresh one is generated.
    pub async fn get_or_create(&self, id: Option<&str>, factory: &SessionFactory) -> (String, Arc<Mutex<ChatSession>>) {
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(&id) {
            entry.last_used = Instant::now();
            return (id, entry.session.clone());
        }

        self.sweep(&mut sessions);

        info!(session_id = %id, "new chat session");
        let session = Arc::new(Mutex::new(factory.create()));
        sessions.insert(
            id.clone(),
            SessionEntry {
                session: session.clone(),
                last_used: Instant::now(),
            },
        );
        (id, session)
    }

    /// Drop a session; true when it existed
    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(session_id = %id, "session dropped");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Make room for one more session
    fn sweep(&self, sessions: &mut HashMap<String, SessionEntry>) {
        let before = sessions.len();
        sessions.retain(|_, e| !e.is_idle() || e.last_used.elapsed() < self.idle_ttl);

        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .filter(|(_, e)| e.is_idle())
                .min_by_key(|(_, e)| e.last_used)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                // Every session is mid-turn
                None => break,
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "evicted chat sessions");
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub factory: SessionFactory,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(factory: SessionFactory) -> Self {
        Self::with_store(factory, SessionStore::new())
    }

    pub fn with_store(factory: SessionFactory, sessions: SessionStore) -> Self {
        Self {
            factory,
            sessions: Arc::new(sessions),
        }
    }
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/api/status", get(handlers::status_handler))
        .route("/api/chat/stream", post(handlers::chat_stream_handler))
        .route("/api/messages", get(handlers::messages_handler))
        .route(
            "/api/image",
            post(handlers::set_image_handler).delete(handlers::clear_image_handler),
        )
        .route(
            "/api/system-prompt",
            get(handlers::get_system_prompt_handler).put(handlers::put_system_prompt_handler),
        )
        .route("/api/reset", post(handlers::reset_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(port: u16, factory: SessionFactory) -> Result<()> {
    let app = create_router(AppState::new(factory));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::SessionOptions;
    use crate::testing::{ScriptedProvider, StubSearch, completion};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn factory(scripts: Vec<Vec<crate::responses::StreamEvent>>) -> SessionFactory {
        SessionFactory::new(
            Arc::new(ScriptedProvider::new(scripts)),
            Arc::new(StubSearch::ok(vec![])),
            SessionOptions::default(),
            "DEFAULT PROMPT".into(),
        )
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Data payloads of an SSE body
    async fn sse_events(response: axum::response::Response) -> Vec<Value> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .filter_map(|d| serde_json::from_str(d.trim()).ok())
            .collect()
    }

    #[tokio::test]
    async fn test_session_store_get_or_create() {
        let store = SessionStore::new();
        let f = factory(vec![]);

        let (id, a) = store.get_or_create(Some("abc"), &f).await;
        let (_, b) = store.get_or_create(Some("abc"), &f).await;
        assert_eq!(id, "abc");
        assert!(Arc::ptr_eq(&a, &b));

        let (generated, c) = store.get_or_create(None, &f).await;
        assert!(Uuid::parse_str(&generated).is_ok());
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(store.len().await, 2);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = SessionStore::with_limits(Duration::ZERO, 100);
        let f = factory(vec![]);

        let (first, _) = store.get_or_create(None, &f).await;
        for _ in 0..20 {
            store.get_or_create(None, &f).await;
        }
        assert_eq!(store.len().await, 1);
        assert!(store.get(&first).await.is_none());
    }

    #[tokio::test]
    async fn test_full_store_evicts_least_recently_used() {
        let store = SessionStore::with_limits(Duration::from_secs(3600), 3);
        let f = factory(vec![]);

        for id in ["a", "b", "c"] {
            store.get_or_create(Some(id), &f).await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        // Touch "a" so "b" is now the oldest
        assert!(store.get("a").await.is_some());

        store.get_or_create(Some("d"), &f).await;
        assert_eq!(store.len().await, 3);
        assert!(store.get("b").await.is_none());
        assert!(store.get("a").await.is_some());
        assert!(store.get("d").await.is_some());
    }

    #[tokio::test]
    async fn test_busy_session_is_not_evicted() {
        let store = SessionStore::with_limits(Duration::ZERO, 1);
        let f = factory(vec![]);

        let (_, held) = store.get_or_create(Some("busy"), &f).await;
        store.get_or_create(Some("other"), &f).await;
        assert_eq!(store.len().await, 2);
        assert!(Arc::ptr_eq(&store.get("busy").await.unwrap(), &held));
    }

    #[tokio::test]
    async fn test_anonymous_chats_stay_bounded() {
        let scripts = (0..50).map(|i| completion(&format!("r{}", i), &["hi"])).collect();
        let state = AppState::with_store(factory(scripts), SessionStore::with_limits(SESSION_IDLE_TTL, 8));
        let app = create_router(state.clone());

        for _ in 0..50 {
            let response = app
                .clone()
                .oneshot(json_request("POST", "/api/chat/stream", json!({"message": "hello"})))
                .await
                .unwrap();
            sse_events(response).await;
        }
        assert!(state.sessions.len().await <= 8);
    }

    #[tokio::test]
    async fn test_session_lock_serializes_turns() {
        let store = Arc::new(SessionStore::new());
        let f = factory(vec![]);
        let (_, session) = store.get_or_create(Some("s"), &f).await;

        let (tx, mut rx) = tokio::sync::mpsc::channel::<i32>(10);

        let s1 = session.clone();
        let tx1 = tx.clone();
        let t1 = tokio::spawn(async move {
            let _guard = s1.lock().await;
            tx1.send(1).await.unwrap();
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            tx1.send(3).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;

        let s2 = session.clone();
        let tx2 = tx.clone();
        let t2 = tokio::spawn(async move {
            let _guard = s2.lock().await;
            tx2.send(2).await.unwrap();
        });

        t1.await.unwrap();
        t2.await.unwrap();
        drop(tx);

        let mut order = Vec::new();
        while let Some(n) = rx.recv().await {
            order.push(n);
        }
        assert_eq!(order, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn test_status() {
        let app = create_router(AppState::new(factory(vec![])));
        let response = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "scripted");
        assert_eq!(body["search_endpoint"], "stub://search");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn test_index_page() {
        let app = create_router(AppState::new(factory(vec![])));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let page = String::from_utf8_lossy(&bytes);
        assert!(page.contains("PackagingPal"));
        assert!(page.contains("/api/system-prompt"));
    }

    #[tokio::test]
    async fn test_chat_stream_then_messages() {
        let state = AppState::new(factory(vec![completion("resp_1", &["Which ", "size?"])]));
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chat/stream",
                json!({"session_id": "s1", "message": "amber dropper"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = sse_events(response).await;
        assert_eq!(events[0], json!({"type": "session", "session_id": "s1"}));
        assert!(events.iter().any(|e| e["type"] == "text_delta" && e["delta"] == "size?"));
        assert!(events.iter().any(|e| e["type"] == "message" && e["content"] == "Which size?"));
        assert_eq!(events.last().unwrap()["type"], "done");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/messages?session_id=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(messages[1]["text"], "Which size?");
        assert!(body["image"].is_null());
    }

    #[tokio::test]
    async fn test_chat_without_session_id_generates_one() {
        let app = create_router(AppState::new(factory(vec![completion("r", &["hi"])])));
        let response = app
            .oneshot(json_request("POST", "/api/chat/stream", json!({"message": "hello"})))
            .await
            .unwrap();
        let events = sse_events(response).await;
        assert_eq!(events[0]["type"], "session");
        assert!(Uuid::parse_str(events[0]["session_id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = create_router(AppState::new(factory(vec![])));
        let response = app
            .oneshot(json_request("POST", "/api/chat/stream", json!({"message": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = create_router(AppState::new(factory(vec![])));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/messages?session_id=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request("POST", "/api/reset", json!({"session_id": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_image_upload_and_clear() {
        let app = create_router(AppState::new(factory(vec![])));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/image",
                json!({"session_id": "img", "data_uri": "data:image/jpeg;base64,AQID", "name": "ref.jpg"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["image"]["mime"], "image/jpeg");
        assert_eq!(body["image"]["size"], 3);
        assert_eq!(body["image"]["name"], "ref.jpg");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/image?session_id=img")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await["image"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_image_is_400() {
        let app = create_router(AppState::new(factory(vec![])));
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/image",
                json!({"session_id": "img", "data_uri": "data:image/gif;base64,AQID"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_system_prompt_edit_and_reset() {
        let app = create_router(AppState::new(factory(vec![])));

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/system-prompt",
                json!({"session_id": "p", "prompt": "Only recommend glass."}),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["prompt"], "Only recommend glass.");
        assert_eq!(body["is_default"], false);

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/system-prompt", json!({"session_id": "p"})))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["prompt"], "DEFAULT PROMPT");
        assert_eq!(body["is_default"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/system-prompt?session_id=p")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_json(response).await["prompt"], "DEFAULT PROMPT");
    }

    #[tokio::test]
    async fn test_reset_clears_transcript() {
        let state = AppState::new(factory(vec![completion("r", &["hi"])]));
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/chat/stream",
                json!({"session_id": "r1", "message": "hello"}),
            ))
            .await
            .unwrap();
        sse_events(response).await;

        let response = app
            .oneshot(json_request("POST", "/api/reset", json!({"session_id": "r1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let session = state.sessions.get("r1").await.unwrap();
        assert!(session.lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_reset_with_discard_drops_session() {
        let state = AppState::new(factory(vec![]));
        let app = create_router(state.clone());
        state.sessions.get_or_create(Some("gone"), &state.factory).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/reset",
                json!({"session_id": "gone", "discard": true}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.sessions.len().await, 0);

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/reset",
                json!({"session_id": "gone", "discard": true}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
