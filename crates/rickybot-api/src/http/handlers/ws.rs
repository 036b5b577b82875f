//! WebSocket handler for live chat notifications.
//!
//! The `/api/notifications` endpoint upgrades an HTTP connection to a
//! WebSocket subscribed under the caller's session id. Every turn change of
//! that session arrives as a JSON text frame.
//!
//! The outbound half is driven by [`deliver`]: a subscriber that falls
//! behind is closed with 1008, and server shutdown closes with 1001. The
//! inbound half is only watched for disconnects; client frames are ignored.

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use rickybot_core::notify::{CloseReason, NotificationSink, deliver};
use rickybot_types::error::DeliveryError;
use rickybot_types::session::SessionId;

use crate::http::extractors::session::RequiredSession;
use crate::state::AppState;

/// Outbound half of a WebSocket as a notification sink.
struct WsSink {
    sender: SplitSink<WebSocket, Message>,
}

impl NotificationSink for WsSink {
    async fn send(&mut self, payload: Bytes) -> Result<(), DeliveryError> {
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| DeliveryError::Transport(format!("payload is not utf-8: {e}")))?;
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), DeliveryError> {
        let frame = CloseFrame {
            code: reason.code(),
            reason: reason.message().into(),
        };
        self.sender
            .send(Message::Close(Some(frame)))
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

/// Upgrade an HTTP request to a notification WebSocket.
///
/// Rejects with 400 before the upgrade when the session cookie is missing.
pub async fn notifications(
    State(state): State<AppState>,
    RequiredSession(id): RequiredSession,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: SessionId) {
    let (sender, mut receiver) = socket.split();
    let subscription = state.broker.subscribe(session_id);
    let subscriber_id = subscription.id();
    tracing::info!(session_id = %session_id, subscriber_id, "Notification socket connected");

    let peer_closed = CancellationToken::new();
    let reader = tokio::spawn({
        let peer_closed = peer_closed.clone();
        async move {
            while let Some(frame) = receiver.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            peer_closed.cancel();
        }
    });

    let mut sink = WsSink { sender };
    match deliver(subscription, &mut sink, state.write_timeout, peer_closed).await {
        Ok(end) => tracing::info!(
            session_id = %session_id,
            subscriber_id,
            ?end,
            "Notification socket closed"
        ),
        Err(e) => tracing::warn!(
            session_id = %session_id,
            subscriber_id,
            error = %e,
            "Notification socket failed"
        ),
    }

    reader.abort();
}
