//! HTTP handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        Html, Json,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::chat::TurnEvent;
use crate::error::PalError;
use crate::image::ReferenceImage;
use crate::render;

use super::AppState;
use super::types::*;

type ApiError = (StatusCode, String);

const MAX_SESSION_ID_LEN: usize = 128;

fn unknown_session(id: &str) -> ApiError {
    (StatusCode::NOT_FOUND, format!("unknown session: {}", id))
}

fn pal_error(e: PalError) -> ApiError {
    if e.is_user_error() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

fn check_session_id(id: &str) -> Result<(), ApiError> {
    if id.trim().is_empty() || id.len() > MAX_SESSION_ID_LEN {
        return Err((StatusCode::BAD_REQUEST, "invalid session_id".into()));
    }
    Ok(())
}

pub async fn index_handler() -> Html<&'static str> {
    Html(include_str!("index.html"))
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        model: state.factory.model().to_string(),
        search_endpoint: state.factory.search_endpoint(),
        sessions: state.sessions.len().await,
    })
}

pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is empty".into()));
    }
    if let Some(id) = &request.session_id {
        check_session_id(id)?;
    }

    let (session_id, session) = state
        .sessions
        .get_or_create(request.session_id.as_deref(), &state.factory)
        .await;
    debug!(%session_id, "chat turn");

    let (tx, rx) = mpsc::channel::<TurnEvent>(100);

    // Turns within one session run one at a time
    tokio::spawn(async move {
        {
            let mut guard = session.lock().await;
            let _ = guard.handle_turn(&request.message, &tx).await;
        }
        // Release the session before the stream closes so it counts as idle
        drop(session);
        drop(tx);
    });

    let stream = async_stream::stream! {
        let opening = json!({ "type": "session", "session_id": session_id });
        yield Ok(Event::default().data(opening.to_string()));

        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().data(data));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn messages_handler(
    State(state): State<AppState>,
    Query(params): Query<SessionQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let session = state
        .sessions
        .get(&params.session_id)
        .await
        .ok_or_else(|| unknown_session(&params.session_id))?;
    let session = session.lock().await;

    Ok(Json(MessagesResponse {
        messages: render::render_all(session.transcript().messages()),
        image: session.image().map(ImageInfo::from),
        session_id: params.session_id,
    }))
}

pub async fn set_image_handler(
    State(state): State<AppState>,
    Json(upload): Json<ImageUpload>,
) -> Result<Json<ImageResponse>, ApiError> {
    check_session_id(&upload.session_id)?;

    let mut image = ReferenceImage::from_data_uri(&upload.data_uri).map_err(pal_error)?;
    if let Some(name) = upload.name {
        image = image.with_name(name);
    }
    let info = ImageInfo::from(&image);

    let (session_id, session) = state
        .sessions
        .get_or_create(Some(&upload.session_id), &state.factory)
        .await;
    session.lock().await.set_image(image);

    Ok(Json(ImageResponse {
        session_id,
        image: Some(info),
    }))
}

pub async fn clear_image_handler(
    State(state): State<AppState>,
    Query(params): Query<SessionQuery>,
) -> Result<Json<ImageResponse>, ApiError> {
    let session = state
        .sessions
        .get(&params.session_id)
        .await
        .ok_or_else(|| unknown_session(&params.session_id))?;
    session.lock().await.clear_image();

    Ok(Json(ImageResponse {
        session_id: params.session_id,
        image: None,
    }))
}

pub async fn get_system_prompt_handler(
    State(state): State<AppState>,
    Query(params): Query<SessionQuery>,
) -> Result<Json<SystemPromptResponse>, ApiError> {
    let session = state
        .sessions
        .get(&params.session_id)
        .await
        .ok_or_else(|| unknown_session(&params.session_id))?;
    let session = session.lock().await;
    let prompt = session.system_prompt().to_string();

    Ok(Json(SystemPromptResponse {
        is_default: prompt == state.factory.system_prompt(),
        prompt,
        session_id: params.session_id,
    }))
}

pub async fn put_system_prompt_handler(
    State(state): State<AppState>,
    Json(update): Json<SystemPromptUpdate>,
) -> Result<Json<SystemPromptResponse>, ApiError> {
    check_session_id(&update.session_id)?;

    let (session_id, session) = state
        .sessions
        .get_or_create(Some(&update.session_id), &state.factory)
        .await;
    let mut session = session.lock().await;

    match update.prompt.filter(|p| !p.trim().is_empty()) {
        Some(prompt) => {
            info!(%session_id, chars = prompt.len(), "system prompt replaced");
            session.set_system_prompt(prompt);
        }
        None => session.reset_system_prompt(),
    }
    let prompt = session.system_prompt().to_string();

    Ok(Json(SystemPromptResponse {
        is_default: prompt == state.factory.system_prompt(),
        prompt,
        session_id,
    }))
}

pub async fn reset_handler(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> Result<StatusCode, ApiError> {
    if request.discard {
        if !state.sessions.remove(&request.session_id).await {
            return Err(unknown_session(&request.session_id));
        }
        return Ok(StatusCode::NO_CONTENT);
    }

    let session = state
        .sessions
        .get(&request.session_id)
        .await
        .ok_or_else(|| unknown_session(&request.session_id))?;
    session.lock().await.reset();
    info!(session_id = %request.session_id, "session reset");
    Ok(StatusCode::NO_CONTENT)
}
