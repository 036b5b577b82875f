//! Application state wiring all services together.
//!
//! AppState holds the session registry, the notification broker, and the
//! cookie signer shared by every HTTP handler. The agent is pinned to the
//! concrete Ollama provider and tool executor chosen by configuration.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rickybot_core::agent::Agent;
use rickybot_core::agent::tool_loop::{ToolLoopAgent, ToolLoopConfig};
use rickybot_core::notify::NotificationBroker;
use rickybot_core::session::{EngineConfig, SessionRegistry};
use rickybot_core::tool::calculator::Calculator;
use rickybot_core::tool::executor::NoTools;
use rickybot_infra::cookie::CookieSigner;
use rickybot_infra::llm::ollama::OllamaProvider;
use rickybot_infra::tool::http::HttpToolExecutor;
use rickybot_types::config::RickybotConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub broker: Arc<NotificationBroker>,
    pub signer: Arc<CookieSigner>,
    /// Per-frame write deadline for live connections.
    pub write_timeout: Duration,
}

impl AppState {
    /// Build the production state: Ollama-backed agent and configured tools.
    pub fn init(config: &RickybotConfig) -> anyhow::Result<Self> {
        let agent = build_agent(config)?;
        let signer = CookieSigner::from_config(config.cookie_secret.as_deref());
        Ok(Self::new(agent, config, signer))
    }

    /// Assemble state around an existing agent.
    pub fn new(agent: Arc<dyn Agent>, config: &RickybotConfig, signer: CookieSigner) -> Self {
        let engine_config = EngineConfig {
            queue_capacity: config.session.queue_capacity,
            system_prompt: Some(config.agent.system_prompt.clone()).filter(|p| !p.is_empty()),
        };

        Self {
            registry: Arc::new(SessionRegistry::new(agent, engine_config)),
            broker: Arc::new(NotificationBroker::new(
                config.notifications.subscriber_buffer,
            )),
            signer: Arc::new(signer),
            write_timeout: Duration::from_millis(config.notifications.write_timeout_ms),
        }
    }
}

/// Construct the tool loop agent described by `config`.
///
/// - `tools.enabled = false`: no tools are advertised.
/// - empty `tools.base_url`: the calculator runs in-process.
/// - otherwise: tool calls are POSTed to `tools.base_url`.
pub fn build_agent(config: &RickybotConfig) -> anyhow::Result<Arc<dyn Agent>> {
    let provider = OllamaProvider::new(
        &config.agent.ollama_url,
        &config.agent.model,
        Duration::from_secs(config.agent.request_timeout_secs),
    )?;

    let loop_config = ToolLoopConfig {
        model: config.agent.model.clone(),
        system_prompt: config.agent.system_prompt.clone(),
        max_steps: config.agent.max_steps,
        message_window: config.agent.message_window,
    };

    let agent: Arc<dyn Agent> = if !config.tools.enabled {
        tracing::info!("Tool dispatch disabled");
        Arc::new(ToolLoopAgent::new(provider, NoTools, loop_config))
    } else if config.tools.base_url.is_empty() {
        tracing::info!("Using in-process calculator tools");
        Arc::new(ToolLoopAgent::new(provider, Calculator, loop_config))
    } else {
        tracing::info!(base_url = %config.tools.base_url, "Using remote tools");
        let tools = HttpToolExecutor::new(
            &config.tools.base_url,
            Duration::from_secs(config.tools.timeout_secs),
        )?;
        Arc::new(ToolLoopAgent::new(provider, tools, loop_config))
    };

    Ok(agent)
}

/// Periodically remove sessions idle for `max_idle` until `cancel` fires.
///
/// Returns `None` when `max_idle` is zero, which keeps sessions for the life
/// of the process.
pub fn spawn_session_expiry(
    registry: Arc<SessionRegistry>,
    max_idle: Duration,
    every: Duration,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if max_idle.is_zero() {
        tracing::info!("Session expiry disabled");
        return None;
    }

    let mut ticker = tokio::time::interval(every.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = registry.remove_idle(max_idle);
                    if removed > 0 {
                        tracing::info!(removed, remaining = registry.len(), "Expired idle sessions");
                    }
                }
            }
        }
    }))
}
