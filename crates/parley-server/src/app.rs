//! HTTP routes for the chat page.

use crate::session_cookie::BrowserSession;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, FromRef, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::Key;
use bytes::Bytes;
use parley_core::{ChatError, Orchestrator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../static/index.html");
const MODEL_ERROR: &str = "Model error. Try again.";
const UPLOAD_ERROR: &str = "Upload failed. Try again.";
const NO_FILE: &str = "No file uploaded";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    key: Key,
}

impl AppState {
    /// `secret` must be at least 32 bytes.
    pub fn new(orchestrator: Arc<Orchestrator>, secret: &str) -> Self {
        Self {
            orchestrator,
            key: Key::derive_from(secret.as_bytes()),
        }
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/upload", post(upload))
        .route("/clear", post(clear))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    response: String,
}

#[derive(Debug, Serialize)]
struct Success {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

async fn index(State(state): State<AppState>, session: BrowserSession) -> Response {
    if let Err(e) = state.orchestrator.ensure_session(session.id).await {
        tracing::error!("Failed to initialize session {}: {e}", session.id.short());
    }
    (session.jar, Html(INDEX_HTML)).into_response()
}

async fn chat(
    State(state): State<AppState>,
    session: BrowserSession,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let message = match request {
        Ok(Json(request)) => request.message,
        Err(rejection) => {
            tracing::debug!("Rejected chat body: {rejection}");
            let body = ChatReply {
                response: "Invalid request.".into(),
            };
            return (StatusCode::BAD_REQUEST, session.jar, Json(body)).into_response();
        }
    };

    let (status, response) = match state.orchestrator.handle_chat(session.id, &message).await {
        Ok(reply) => (StatusCode::OK, reply),
        Err(ChatError::EmptyMessage) => {
            (StatusCode::BAD_REQUEST, "Please enter a message.".to_string())
        }
        // Remote failures are already logged by the orchestrator.
        Err(ChatError::Remote(_)) => (StatusCode::INTERNAL_SERVER_ERROR, MODEL_ERROR.to_string()),
        Err(e) => {
            tracing::error!("Chat for session {} failed: {e}", session.id.short());
            (StatusCode::INTERNAL_SERVER_ERROR, MODEL_ERROR.to_string())
        }
    };
    (status, session.jar, Json(ChatReply { response })).into_response()
}

async fn upload(
    State(state): State<AppState>,
    session: BrowserSession,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!("Rejected upload body: {rejection}");
            return upload_error(session, StatusCode::BAD_REQUEST, NO_FILE);
        }
    };
    let (filename, data) = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => return upload_error(session, StatusCode::BAD_REQUEST, NO_FILE),
        Err(message) => return upload_error(session, StatusCode::BAD_REQUEST, &message),
    };

    match state
        .orchestrator
        .handle_upload(session.id, data, &filename)
        .await
    {
        Ok(ack) => {
            tracing::info!("Session {}: attached {}", session.id.short(), ack.filename);
            let body = Success {
                success: true,
                filename: Some(ack.filename),
            };
            (StatusCode::OK, session.jar, Json(body)).into_response()
        }
        Err(ChatError::InvalidUpload(message)) => {
            upload_error(session, StatusCode::BAD_REQUEST, &message)
        }
        Err(ChatError::Remote(_)) => upload_error(session, StatusCode::BAD_GATEWAY, UPLOAD_ERROR),
        Err(e) => {
            tracing::error!("Upload for session {} failed: {e}", session.id.short());
            upload_error(session, StatusCode::INTERNAL_SERVER_ERROR, UPLOAD_ERROR)
        }
    }
}

/// The `file` field's name and bytes, if the form has one.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<(String, Bytes)>, String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| e.body_text())? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(|e| e.body_text())?;
        return Ok(Some((filename, data)));
    }
    Ok(None)
}

fn upload_error(session: BrowserSession, status: StatusCode, message: &str) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
    };
    (status, session.jar, Json(body)).into_response()
}

async fn clear(State(state): State<AppState>, session: BrowserSession) -> Response {
    if let Err(e) = state.orchestrator.clear(session.id).await {
        tracing::error!("Failed to clear session {}: {e}", session.id.short());
        let body = ErrorBody {
            error: "Could not clear the conversation.".into(),
        };
        return (StatusCode::INTERNAL_SERVER_ERROR, session.jar, Json(body)).into_response();
    }
    let body = Success {
        success: true,
        filename: None,
    };
    (StatusCode::OK, session.jar, Json(body)).into_response()
}
