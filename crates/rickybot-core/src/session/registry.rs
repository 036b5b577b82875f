//! Session registry: maps session identities to their engines.
//!
//! Backed by a `DashMap` so lookups from concurrent requests never contend on
//! a global lock. Creation goes through the entry API, which makes the
//! duplicate check and the insert a single step.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use rickybot_types::error::RegistryError;
use rickybot_types::session::SessionId;

use crate::agent::Agent;

use super::engine::{ChatSessionEngine, EngineConfig, ResponseCallback};

/// Owns every live session engine.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<ChatSessionEngine>>,
    agent: Arc<dyn Agent>,
    config: EngineConfig,
}

impl SessionRegistry {
    /// Create an empty registry. Every engine it creates shares `agent`.
    pub fn new(agent: Arc<dyn Agent>, config: EngineConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            agent,
            config,
        }
    }

    /// Create and store an engine for `id`.
    ///
    /// Fails with `AlreadyExists` if `id` is taken; the existing engine is
    /// left untouched and the caller should pick a fresh identity.
    pub fn add_session(
        &self,
        id: SessionId,
        responder: ResponseCallback,
    ) -> Result<Arc<ChatSessionEngine>, RegistryError> {
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                let engine = Arc::new(ChatSessionEngine::new(
                    id,
                    Arc::clone(&self.agent),
                    responder,
                    self.config.clone(),
                ));
                slot.insert(Arc::clone(&engine));
                info!(session_id = %id, "Session created");
                Ok(engine)
            }
        }
    }

    pub fn get_session(&self, id: &SessionId) -> Option<Arc<ChatSessionEngine>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove the engine for `id` and shut it down.
    pub fn remove_session(&self, id: &SessionId) -> Option<Arc<ChatSessionEngine>> {
        let (_, engine) = self.sessions.remove(id)?;
        engine.shutdown();
        info!(session_id = %id, "Session removed");
        Some(engine)
    }

    /// Remove every session with no pending turns that has been idle for at
    /// least `max_idle`. Returns the number removed.
    pub fn remove_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let engine = entry.value();
                !engine.has_pending_turns() && engine.idle_for() >= max_idle
            })
            .map(|entry| *entry.key())
            .collect();

        expired
            .iter()
            .filter(|id| self.remove_session(id).is_some())
            .count()
    }

    /// Shut down every engine. Used once at process teardown.
    pub fn shutdown(&self) {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
        info!(sessions = self.sessions.len(), "All sessions shut down");
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
