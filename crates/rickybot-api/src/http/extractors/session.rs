//! Session cookie extractors.
//!
//! The `chat-session-id` cookie carries a signed session id. Extraction
//! verifies the signature with the [`CookieSigner`](rickybot_infra::cookie::CookieSigner)
//! on [`AppState`]; a tampered or malformed cookie counts as absent.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::CookieJar;

use rickybot_infra::cookie::{COOKIE_MAX_AGE_SECS, COOKIE_NAME};
use rickybot_types::session::SessionId;

use crate::http::error::AppError;
use crate::state::AppState;

/// The verified session id, if the request carries one.
pub struct SessionCookie(pub Option<SessionId>);

impl FromRequestParts<AppState> for SessionCookie {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let id = jar
            .get(COOKIE_NAME)
            .and_then(|cookie| state.signer.verify_session(cookie.value()));
        Ok(Self(id))
    }
}

/// A verified session id. Rejects with 400 when the cookie is missing or invalid.
pub struct RequiredSession(pub SessionId);

impl FromRequestParts<AppState> for RequiredSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let SessionCookie(id) = match SessionCookie::from_request_parts(parts, state).await {
            Ok(cookie) => cookie,
            Err(never) => match never {},
        };
        id.map(Self).ok_or(AppError::MissingSession)
    }
}

/// `Set-Cookie` value for a freshly signed session token.
pub fn session_cookie_header(signed_value: &str) -> String {
    format!(
        "{COOKIE_NAME}={signed_value}; Path=/; Max-Age={COOKIE_MAX_AGE_SECS}; HttpOnly; Secure; SameSite=Lax"
    )
}
