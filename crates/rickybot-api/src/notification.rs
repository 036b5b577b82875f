//! Session-to-broker bridge.
//!
//! Every turn change reported by a session engine is rendered as a
//! [`ChatBlockNotification`] and published to that session's live
//! connections.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;

use rickybot_core::notify::NotificationBroker;
use rickybot_core::session::ResponseCallback;
use rickybot_types::chat::{ChatBlock, ChatBlockResponse};
use rickybot_types::session::SessionId;

/// Payload of one WebSocket text frame.
#[derive(Debug, Serialize)]
pub struct ChatBlockNotification<'a> {
    pub session_id: SessionId,
    /// `true` for the echo sent when the turn is created.
    pub is_new: bool,
    pub chat_block: &'a ChatBlock,
}

impl<'a> ChatBlockNotification<'a> {
    pub fn new(session_id: SessionId, response: &'a ChatBlockResponse) -> Self {
        Self {
            session_id,
            is_new: response.is_new,
            chat_block: &response.chat_block,
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Build the engine callback that publishes turn changes for `session_id`.
pub fn responder(broker: Arc<NotificationBroker>, session_id: SessionId) -> ResponseCallback {
    Arc::new(move |response: ChatBlockResponse| {
        let block = &response.chat_block;
        tracing::debug!(
            session_id = %session_id,
            is_new = response.is_new,
            completed = block.completed,
            failed = block.failed,
            assistant_len = block.assistant_message.len(),
            "Chat block update"
        );

        match ChatBlockNotification::new(session_id, &response).to_bytes() {
            Ok(payload) => {
                broker.publish(&session_id, payload);
            }
            Err(e) => tracing::error!(session_id = %session_id, error = %e, "Failed to encode notification"),
        }
    })
}
