//! Chat HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/main - Resolve (or create) the caller's session and list its turns
//! - POST /api/ask  - Queue a user message on the caller's session
//!
//! Answers are not returned here; they stream to `/api/notifications`.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::{Form, FromRequest, Request, State};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use rickybot_core::session::ChatSessionEngine;
use rickybot_types::chat::ChatBlock;
use rickybot_types::session::SessionId;

use crate::http::error::AppError;
use crate::http::extractors::session::{RequiredSession, SessionCookie, session_cookie_header};
use crate::http::response::ApiResponse;
use crate::notification::responder;
use crate::state::AppState;

/// Fresh ids to try before giving up on session creation.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// Body of `POST /api/ask`, as a form or JSON.
#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(rename = "user-input", default)]
    pub user_input: String,
}

/// Accepts `application/json` or `application/x-www-form-urlencoded`.
pub struct AskInput(pub AskForm);

impl<S: Send + Sync> FromRequest<S> for AskInput {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(form) = Json::<AskForm>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            Ok(Self(form))
        } else {
            let Form(form) = Form::<AskForm>::from_request(req, state)
                .await
                .map_err(|e| AppError::Validation(e.body_text()))?;
            Ok(Self(form))
        }
    }
}

/// A session and its turns.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub chat_blocks: Vec<ChatBlock>,
}

#[derive(Debug, Serialize)]
pub struct AskAccepted {
    pub session_id: SessionId,
    pub queued: bool,
}

/// Register a new session under a fresh id, retrying on collision.
fn create_session(state: &AppState) -> Result<Arc<ChatSessionEngine>, AppError> {
    for _ in 0..MAX_CREATE_ATTEMPTS {
        let id = SessionId::new();
        match state
            .registry
            .add_session(id, responder(Arc::clone(&state.broker), id))
        {
            Ok(engine) => return Ok(engine),
            Err(e) => tracing::warn!(error = %e, "Session id collision, retrying"),
        }
    }
    Err(AppError::Internal(
        "could not allocate a session id".to_string(),
    ))
}

/// GET /api/main - Resolve the caller's session, creating one when needed.
pub async fn main_page(
    State(state): State<AppState>,
    SessionCookie(existing): SessionCookie,
) -> Result<Response, AppError> {
    let start = Instant::now();

    let (engine, set_cookie) = match existing.and_then(|id| state.registry.get_session(&id)) {
        Some(engine) => (engine, None),
        None => {
            let engine = create_session(&state)?;
            let signed = state.signer.sign_session(engine.session_id())?;
            (engine, Some(session_cookie_header(&signed)))
        }
    };

    let view = SessionView {
        session_id: engine.session_id(),
        chat_blocks: engine.chat_blocks(),
    };
    let mut response = Json(ApiResponse::success(view, start)).into_response();

    if let Some(cookie) = set_cookie {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))?;
        response.headers_mut().insert(SET_COOKIE, value);
    }
    Ok(response)
}

/// POST /api/ask - Queue `user-input` on the caller's session.
pub async fn ask(
    State(state): State<AppState>,
    RequiredSession(id): RequiredSession,
    AskInput(form): AskInput,
) -> Result<(StatusCode, Json<ApiResponse<AskAccepted>>), AppError> {
    let start = Instant::now();

    let engine = state
        .registry
        .get_session(&id)
        .ok_or(AppError::SessionNotFound(id))?;

    if form.user_input.trim().is_empty() {
        return Err(AppError::Validation("user-input must not be empty".to_string()));
    }

    engine.enqueue_message(form.user_input).inspect_err(|e| {
        tracing::warn!(session_id = %id, error = %e, "Enqueue rejected");
    })?;

    let accepted = AskAccepted {
        session_id: id,
        queued: true,
    };
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(accepted, start)),
    ))
}
