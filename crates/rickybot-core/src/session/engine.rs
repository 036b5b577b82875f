//! Session engine: one conversation's turn history and its processing worker.
//!
//! `enqueue_message` records a new turn synchronously and hands it to a
//! single background worker. The worker answers turns strictly in submission
//! order, one at a time, behind a processing gate that is separate from the
//! lock protecting the turn history, so readers never wait on a generation.
//!
//! Capacity is counted in semaphore permits: a permit is taken when a turn is
//! accepted and released only when its processing finishes, so queued plus
//! in-flight turns never exceed the configured capacity.
//!
//! A turn reaches the worker only after its `is_new` echo has been delivered,
//! so subscribers always see the echo before any backend activity.

use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rickybot_types::agent::{AgentEvent, AgentRequest};
use rickybot_types::chat::{ChatBlock, ChatBlockResponse};
use rickybot_types::error::SessionError;
use rickybot_types::llm::Message;
use rickybot_types::session::SessionId;

use crate::agent::Agent;

/// Invoked on every turn state change with a full snapshot of the turn.
pub type ResponseCallback = Arc<dyn Fn(ChatBlockResponse) + Send + Sync>;

/// Settings for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Turns accepted but not yet finished processing.
    pub queue_capacity: usize,
    /// Recorded on the opening turn of the conversation.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            system_prompt: None,
        }
    }
}

/// A turn waiting for the worker. Holds its capacity permit until dropped.
struct PendingTurn {
    index: usize,
    user_message: String,
    _permit: OwnedSemaphorePermit,
}

/// State shared between the engine handle and its worker task.
struct Shared {
    session_id: SessionId,
    blocks: RwLock<Vec<ChatBlock>>,
    gate: Mutex<()>,
    responder: ResponseCallback,
    last_active: StdMutex<Instant>,
}

/// Owns one conversation and serializes its generations.
pub struct ChatSessionEngine {
    shared: Arc<Shared>,
    tx: mpsc::Sender<PendingTurn>,
    permits: Arc<Semaphore>,
    capacity: usize,
    system_prompt: Option<String>,
    /// Held across reserve, record, echo, and hand-off so turns reach the
    /// worker in history order. `shutdown` takes it too.
    accepting: StdMutex<()>,
    shutdown: CancellationToken,
}

impl ChatSessionEngine {
    /// Create the engine and spawn its worker on the current tokio runtime.
    pub fn new(
        session_id: SessionId,
        agent: Arc<dyn Agent>,
        responder: ResponseCallback,
        config: EngineConfig,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared {
            session_id,
            blocks: RwLock::new(Vec::new()),
            gate: Mutex::new(()),
            responder,
            last_active: StdMutex::new(Instant::now()),
        });
        let shutdown = CancellationToken::new();

        tokio::spawn(run_worker(
            Arc::clone(&shared),
            agent,
            rx,
            shutdown.clone(),
        ));

        Self {
            shared,
            tx,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            system_prompt: config.system_prompt.filter(|p| !p.is_empty()),
            accepting: StdMutex::new(()),
            shutdown,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.shared.session_id
    }

    pub fn queue_capacity(&self) -> usize {
        self.capacity
    }

    /// Accept a user message without blocking.
    ///
    /// The new turn is visible in [`chat_blocks`](Self::chat_blocks) and has
    /// been echoed through the response callback by the time this returns.
    /// The worker cannot start on it until the echo callback has returned.
    pub fn enqueue_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let _accepting = self.accepting.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ShutDown);
        }

        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => SessionError::QueueFull {
                    capacity: self.capacity,
                },
                TryAcquireError::Closed => SessionError::ShutDown,
            })?;
        let slot = self.tx.try_reserve().map_err(|e| match e {
            TrySendError::Full(()) => SessionError::QueueFull {
                capacity: self.capacity,
            },
            TrySendError::Closed(()) => SessionError::ShutDown,
        })?;

        let text = text.into();
        let (index, snapshot) = {
            let mut blocks = self.shared.blocks.write().unwrap_or_else(PoisonError::into_inner);
            let mut block = ChatBlock::new(text.clone());
            if blocks.is_empty() {
                if let Some(prompt) = &self.system_prompt {
                    block = block.with_system_message(prompt.clone());
                }
            }
            blocks.push(block.clone());
            (blocks.len() - 1, block)
        };
        self.shared.touch();

        debug!(session_id = %self.shared.session_id, "Message enqueued");
        (self.shared.responder)(ChatBlockResponse {
            chat_block: snapshot,
            is_new: true,
        });

        slot.send(PendingTurn {
            index,
            user_message: text,
            _permit: permit,
        });
        Ok(())
    }

    /// Deep copy of every turn, in conversation order.
    pub fn chat_blocks(&self) -> Vec<ChatBlock> {
        self.shared
            .blocks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a generation is currently running.
    pub fn is_processing(&self) -> bool {
        self.shared.gate.try_lock().is_err()
    }

    /// Whether any accepted turn is still queued or running.
    pub fn has_pending_turns(&self) -> bool {
        self.permits.available_permits() < self.capacity
    }

    /// Time since a turn was last accepted or finished.
    pub fn idle_for(&self) -> Duration {
        self.shared
            .last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Stop accepting messages and stop the worker between turns.
    ///
    /// Idempotent and non-blocking. A generation already in flight runs to
    /// completion; queued turns are marked failed.
    pub fn shutdown(&self) {
        let _accepting = self.accepting.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.permits.close();
        info!(session_id = %self.shared.session_id, "Session shutdown requested");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for ChatSessionEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ChatSessionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSessionEngine")
            .field("session_id", &self.shared.session_id)
            .field("capacity", &self.capacity)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    agent: Arc<dyn Agent>,
    mut rx: mpsc::Receiver<PendingTurn>,
    shutdown: CancellationToken,
) {
    debug!(session_id = %shared.session_id, agent = agent.name(), "Session worker started");

    loop {
        let turn = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            turn = rx.recv() => match turn {
                Some(turn) => turn,
                None => break,
            },
        };

        let _gate = shared.gate.lock().await;
        shared.process_turn(agent.as_ref(), turn).await;
    }

    rx.close();
    while let Ok(turn) = rx.try_recv() {
        shared.update(turn.index, |block| block.mark_failed("session shut down"));
    }
    debug!(session_id = %shared.session_id, "Session worker stopped");
}

impl Shared {
    async fn process_turn(&self, agent: &dyn Agent, turn: PendingTurn) {
        let index = turn.index;
        let request = AgentRequest {
            history: self.history_before(index),
            user_message: turn.user_message,
        };

        let mut events = agent.generate(request);
        let mut finished = false;

        while let Some(event) = events.next().await {
            match event {
                Ok(AgentEvent::ContentDelta { text }) => {
                    self.update(index, |block| block.append_assistant(&text));
                }
                Ok(AgentEvent::ToolCallRequested { call }) => {
                    info!(
                        session_id = %self.session_id,
                        tool = %call.name,
                        arguments = %call.arguments,
                        "Tool call requested"
                    );
                }
                Ok(AgentEvent::ToolExecutionStarted { tool_name }) => {
                    debug!(session_id = %self.session_id, tool = %tool_name, "Tool execution started");
                }
                Ok(AgentEvent::ToolExecutionFinished { response }) => {
                    self.update(index, |block| block.push_tool_response(response));
                }
                Ok(AgentEvent::Completed { message }) => {
                    self.update(index, |block| block.mark_completed(Some(&message)));
                    finished = true;
                    break;
                }
                Err(err) => {
                    warn!(session_id = %self.session_id, error = %err, "Turn failed");
                    self.update(index, |block| block.mark_failed(&err));
                    finished = true;
                    break;
                }
            }
        }

        if !finished {
            warn!(session_id = %self.session_id, "Agent stream ended without completing");
            self.update(index, |block| {
                block.mark_failed("agent stream ended before completion")
            });
        }
        // Still holding the turn's capacity permit here.
        self.touch();
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Conversation preceding turn `index`, excluding failed turns.
    fn history_before(&self, index: usize) -> Vec<Message> {
        let blocks = self.blocks.read().unwrap_or_else(PoisonError::into_inner);
        blocks
            .iter()
            .take(index)
            .flat_map(ChatBlock::to_messages)
            .collect()
    }

    /// Apply `mutate` to turn `index` and notify when it reports a change.
    fn update<F>(&self, index: usize, mutate: F)
    where
        F: FnOnce(&mut ChatBlock) -> bool,
    {
        let snapshot = {
            let mut blocks = self.blocks.write().unwrap_or_else(PoisonError::into_inner);
            match blocks.get_mut(index) {
                Some(block) => {
                    if mutate(block) {
                        Some(block.clone())
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(chat_block) = snapshot {
            (self.responder)(ChatBlockResponse {
                chat_block,
                is_new: false,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rickybot_types::agent::AgentError;
    use rickybot_types::chat::ToolResponse;
    use rickybot_types::llm::{LlmError, MessageRole, ToolCall};

    use crate::agent::AgentStream;

    type Script = dyn Fn(usize, &AgentRequest) -> Vec<Result<AgentEvent, AgentError>> + Send + Sync;

    /// Agent double that replays scripted events and records concurrency.
    struct ScriptedAgent {
        script: Box<Script>,
        calls: AtomicUsize,
        requests: Arc<StdMutex<Vec<AgentRequest>>>,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        /// When set, each generation waits for one permit before emitting.
        release: Option<Arc<Semaphore>>,
    }

    impl ScriptedAgent {
        fn new<F>(script: F) -> Self
        where
            F: Fn(usize, &AgentRequest) -> Vec<Result<AgentEvent, AgentError>> + Send + Sync + 'static,
        {
            Self {
                script: Box::new(script),
                calls: AtomicUsize::new(0),
                requests: Arc::new(StdMutex::new(Vec::new())),
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
                release: None,
            }
        }

        fn stalled(mut self, release: Arc<Semaphore>) -> Self {
            self.release = Some(release);
            self
        }
    }

    struct ActiveGuard(Arc<AtomicUsize>);

    impl Drop for ActiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Agent for ScriptedAgent {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate(&self, request: AgentRequest) -> AgentStream {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let events = (self.script)(call, &request);
            self.requests.lock().unwrap().push(request);

            let active = Arc::clone(&self.active);
            let max_active = Arc::clone(&self.max_active);
            let release = self.release.clone();

            Box::pin(async_stream::stream! {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                // The engine drops the stream right after `Completed`.
                let _active = ActiveGuard(active);
                if let Some(release) = release {
                    release.acquire().await.unwrap().forget();
                }
                for event in events {
                    tokio::task::yield_now().await;
                    yield event;
                }
            })
        }
    }

    fn recorder() -> (ResponseCallback, Arc<StdMutex<Vec<ChatBlockResponse>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ResponseCallback = Arc::new(move |response| {
            sink.lock().unwrap().push(response);
        });
        (callback, seen)
    }

    fn answer(text: &str) -> Vec<Result<AgentEvent, AgentError>> {
        vec![
            Ok(AgentEvent::ContentDelta {
                text: text.to_string(),
            }),
            Ok(AgentEvent::Completed {
                message: text.to_string(),
            }),
        ]
    }

    fn engine_with(agent: ScriptedAgent, capacity: usize) -> (ChatSessionEngine, Arc<StdMutex<Vec<ChatBlockResponse>>>) {
        let (callback, seen) = recorder();
        let engine = ChatSessionEngine::new(
            SessionId::new(),
            Arc::new(agent),
            callback,
            EngineConfig {
                queue_capacity: capacity,
                system_prompt: None,
            },
        );
        (engine, seen)
    }

    async fn wait_for_terminal(engine: &ChatSessionEngine, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let blocks = engine.chat_blocks();
                if blocks.len() >= count && blocks.iter().all(ChatBlock::is_terminal) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("turns did not finish in time");
    }

    #[tokio::test]
    async fn simple_turn_completes() {
        let agent = ScriptedAgent::new(|_, _| answer("4"));
        let (engine, seen) = engine_with(agent, 16);

        engine.enqueue_message("2+2").unwrap();
        wait_for_terminal(&engine, 1).await;

        let blocks = engine.chat_blocks();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].user_message, "2+2");
        assert_eq!(blocks[0].assistant_message, "4");
        assert!(blocks[0].completed);
        assert!(!blocks[0].failed);

        let seen = seen.lock().unwrap();
        assert!(seen[0].is_new);
        assert!(seen[0].chat_block.assistant_message.is_empty());
        assert!(seen[1..].iter().all(|r| !r.is_new));
        assert!(seen.last().unwrap().chat_block.completed);
    }

    #[tokio::test]
    async fn new_turn_is_visible_when_enqueue_returns() {
        let release = Arc::new(Semaphore::new(0));
        let agent = ScriptedAgent::new(|_, _| answer("ok")).stalled(Arc::clone(&release));
        let (engine, seen) = engine_with(agent, 16);

        engine.enqueue_message("hello").unwrap();

        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert!(seen[0].is_new);
            assert_eq!(seen[0].chat_block.user_message, "hello");
        }
        let blocks = engine.chat_blocks();
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].is_terminal());

        release.add_permits(1);
        wait_for_terminal(&engine, 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn new_turn_is_echoed_before_any_backend_call() {
        for _ in 0..20 {
            let log = Arc::new(StdMutex::new(Vec::new()));

            let agent_log = Arc::clone(&log);
            let agent = ScriptedAgent::new(move |_, _| {
                agent_log.lock().unwrap().push("generate");
                answer("ok")
            });

            // A slow echo gives the worker thread every chance to jump ahead.
            let echo_log = Arc::clone(&log);
            let callback: ResponseCallback = Arc::new(move |response| {
                if response.is_new {
                    std::thread::sleep(Duration::from_millis(20));
                    echo_log.lock().unwrap().push("echo");
                }
            });
            let engine = ChatSessionEngine::new(
                SessionId::new(),
                Arc::new(agent),
                callback,
                EngineConfig::default(),
            );

            engine.enqueue_message("hello").unwrap();
            wait_for_terminal(&engine, 1).await;

            assert_eq!(*log.lock().unwrap(), vec!["echo", "generate"]);
        }
    }

    #[tokio::test]
    async fn pending_turns_tracked_until_finished() {
        let release = Arc::new(Semaphore::new(0));
        let agent = ScriptedAgent::new(|_, _| answer("ok")).stalled(Arc::clone(&release));
        let (engine, _seen) = engine_with(agent, 4);
        assert!(!engine.has_pending_turns());

        engine.enqueue_message("hi").unwrap();
        assert!(engine.has_pending_turns());
        assert!(engine.idle_for() < Duration::from_secs(5));

        release.add_permits(1);
        wait_for_terminal(&engine, 1).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.has_pending_turns() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn backend_error_marks_turn_failed() {
        let agent = ScriptedAgent::new(|_, _| {
            vec![Err(AgentError::Llm(LlmError::Provider {
                message: "timeout".to_string(),
            }))]
        });
        let (engine, seen) = engine_with(agent, 16);

        engine.enqueue_message("hi").unwrap();
        wait_for_terminal(&engine, 1).await;

        let block = &engine.chat_blocks()[0];
        assert!(block.failed);
        assert!(!block.completed);
        assert!(block.assistant_message.contains("timeout"));
        assert!(block.assistant_message.starts_with("Error: "));

        // One echo plus exactly one failure notification.
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stream_without_completion_fails_turn() {
        let agent = ScriptedAgent::new(|_, _| {
            vec![Ok(AgentEvent::ContentDelta {
                text: "half".to_string(),
            })]
        });
        let (engine, _seen) = engine_with(agent, 16);

        engine.enqueue_message("hi").unwrap();
        wait_for_terminal(&engine, 1).await;

        let block = &engine.chat_blocks()[0];
        assert!(block.failed);
        assert!(block.assistant_message.contains("ended before completion"));
    }

    #[tokio::test]
    async fn updates_carry_accumulated_text() {
        let agent = ScriptedAgent::new(|_, _| {
            vec![
                Ok(AgentEvent::ContentDelta {
                    text: "hel".to_string(),
                }),
                Ok(AgentEvent::ContentDelta {
                    text: "lo".to_string(),
                }),
                Ok(AgentEvent::Completed {
                    message: String::new(),
                }),
            ]
        });
        let (engine, seen) = engine_with(agent, 16);

        engine.enqueue_message("greet").unwrap();
        wait_for_terminal(&engine, 1).await;

        let texts: Vec<String> = seen
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.chat_block.assistant_message.clone())
            .collect();
        assert_eq!(texts, vec!["", "hel", "hello", "hello"]);
    }

    #[tokio::test]
    async fn tool_results_are_recorded_on_turn() {
        let agent = ScriptedAgent::new(|_, _| {
            let call = ToolCall {
                id: None,
                name: "calculator.add".to_string(),
                arguments: serde_json::json!({"a": 2, "b": 2}),
            };
            vec![
                Ok(AgentEvent::ToolCallRequested { call }),
                Ok(AgentEvent::ToolExecutionStarted {
                    tool_name: "calculator.add".to_string(),
                }),
                Ok(AgentEvent::ToolExecutionFinished {
                    response: ToolResponse {
                        call_id: None,
                        tool_name: "calculator.add".to_string(),
                        arguments: r#"{"a":2,"b":2}"#.to_string(),
                        content: "4.000000".to_string(),
                        is_error: false,
                    },
                }),
                Ok(AgentEvent::ContentDelta {
                    text: "4".to_string(),
                }),
                Ok(AgentEvent::Completed {
                    message: "4".to_string(),
                }),
            ]
        });
        let (engine, _seen) = engine_with(agent, 16);

        engine.enqueue_message("2+2").unwrap();
        wait_for_terminal(&engine, 1).await;

        let block = &engine.chat_blocks()[0];
        assert_eq!(block.tool_responses.len(), 1);
        assert_eq!(block.tool_responses[0].content, "4.000000");
        assert_eq!(block.assistant_message, "4");
        assert!(block.completed);
    }

    #[tokio::test]
    async fn turns_keep_submission_order() {
        let agent = ScriptedAgent::new(|_, request| answer(&format!("echo {}", request.user_message)));
        let requests = Arc::clone(&agent.requests);
        let (engine, _seen) = engine_with(agent, 16);

        for text in ["a", "b", "c", "d"] {
            engine.enqueue_message(text).unwrap();
        }
        wait_for_terminal(&engine, 4).await;

        let blocks = engine.chat_blocks();
        let users: Vec<&str> = blocks.iter().map(|b| b.user_message.as_str()).collect();
        assert_eq!(users, vec!["a", "b", "c", "d"]);
        for block in &blocks {
            assert_eq!(block.assistant_message, format!("echo {}", block.user_message));
        }

        let order: Vec<String> = requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.user_message.clone())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn queue_full_when_backend_stalled() {
        let release = Arc::new(Semaphore::new(0));
        let agent = ScriptedAgent::new(|_, request| answer(&request.user_message)).stalled(Arc::clone(&release));
        let (engine, _seen) = engine_with(agent, 2);

        engine.enqueue_message("first").unwrap();
        engine.enqueue_message("second").unwrap();
        assert_eq!(
            engine.enqueue_message("third"),
            Err(SessionError::QueueFull { capacity: 2 })
        );
        assert_eq!(engine.chat_blocks().len(), 2);

        release.add_permits(2);
        wait_for_terminal(&engine, 2).await;

        let blocks = engine.chat_blocks();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].assistant_message, "first");
        assert_eq!(blocks[1].assistant_message, "second");
        assert!(blocks.iter().all(|b| b.completed));

        // Capacity is available again once the backlog drains.
        engine.enqueue_message("fourth").unwrap();
        release.add_permits(1);
        wait_for_terminal(&engine, 3).await;
    }

    #[tokio::test]
    async fn back_to_back_enqueues_never_overlap() {
        let agent = ScriptedAgent::new(|_, _| {
            let mut events: Vec<_> = (0..5)
                .map(|i| {
                    Ok(AgentEvent::ContentDelta {
                        text: i.to_string(),
                    })
                })
                .collect();
            events.push(Ok(AgentEvent::Completed {
                message: String::new(),
            }));
            events
        });
        let max_active = Arc::clone(&agent.max_active);
        let (engine, _seen) = engine_with(agent, 16);

        for i in 0..8 {
            engine.enqueue_message(format!("m{i}")).unwrap();
        }
        wait_for_terminal(&engine, 8).await;

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert!(engine.chat_blocks().iter().all(|b| b.assistant_message == "01234"));
    }

    #[tokio::test]
    async fn history_skips_failed_turns() {
        let agent = ScriptedAgent::new(|call, request| match call {
            0 => vec![Err(AgentError::Other("boom".to_string()))],
            _ => answer(&format!("re: {}", request.user_message)),
        });
        let requests = Arc::clone(&agent.requests);
        let (engine, _seen) = engine_with(agent, 16);

        engine.enqueue_message("one").unwrap();
        engine.enqueue_message("two").unwrap();
        engine.enqueue_message("three").unwrap();
        wait_for_terminal(&engine, 3).await;

        let requests = requests.lock().unwrap();
        assert!(requests[0].history.is_empty());
        assert!(requests[1].history.is_empty());
        let third: Vec<(MessageRole, &str)> = requests[2]
            .history
            .iter()
            .map(|m| (m.role.clone(), m.content.as_str()))
            .collect();
        assert_eq!(
            third,
            vec![(MessageRole::User, "two"), (MessageRole::Assistant, "re: two")]
        );
    }

    #[tokio::test]
    async fn system_prompt_recorded_on_first_turn_only() {
        let (callback, _seen) = recorder();
        let engine = ChatSessionEngine::new(
            SessionId::new(),
            Arc::new(ScriptedAgent::new(|_, _| answer("ok"))),
            callback,
            EngineConfig {
                queue_capacity: 4,
                system_prompt: Some("be brief".to_string()),
            },
        );

        engine.enqueue_message("one").unwrap();
        engine.enqueue_message("two").unwrap();
        wait_for_terminal(&engine, 2).await;

        let blocks = engine.chat_blocks();
        assert_eq!(blocks[0].system_message.as_deref(), Some("be brief"));
        assert!(blocks[1].system_message.is_none());
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_rejects_new_messages() {
        let agent = ScriptedAgent::new(|_, _| answer("ok"));
        let (engine, _seen) = engine_with(agent, 4);

        engine.shutdown();
        engine.shutdown();
        assert!(engine.is_shut_down());
        assert_eq!(engine.enqueue_message("late"), Err(SessionError::ShutDown));
        assert!(engine.chat_blocks().is_empty());
    }

    #[tokio::test]
    async fn shutdown_lets_in_flight_turn_finish() {
        let release = Arc::new(Semaphore::new(0));
        let agent = ScriptedAgent::new(|_, request| answer(&request.user_message)).stalled(Arc::clone(&release));
        let (engine, _seen) = engine_with(agent, 4);

        engine.enqueue_message("running").unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !engine.is_processing() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        engine.enqueue_message("queued").unwrap();

        engine.shutdown();
        release.add_permits(2);
        wait_for_terminal(&engine, 2).await;

        let blocks = engine.chat_blocks();
        assert!(blocks[0].completed);
        assert_eq!(blocks[0].assistant_message, "running");
        assert!(blocks[1].failed);
        assert!(blocks[1].assistant_message.contains("shut down"));
        assert!(!engine.is_processing());
    }
}
