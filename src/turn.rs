// ABOUTME: Turn Coordinator: drives exactly one request/response turn over the event stream.
// ABOUTME: Listener registered before send; settles exactly once via an explicit phase enum.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::card::CardSession;
use crate::classifier::{Action, Classifier};
use crate::context::{OwnedMessages, OwnedSessions, SeenRequests};
use crate::interactive::{permission_card_payload, question_card_payload};
use crate::protocol::ServerEvent;
use crate::registry::{EventListener, ListenerRegistry};
use crate::subagent::SubagentTracker;
use crate::traits::{AgentApi, CardRenderer, ChatSink, Sleeper};
use crate::utils::{append_capped, extract_sync_text};

/// Reply sentinel for a turn that settles without accumulating any text.
pub const EMPTY_REPLY_PLACEHOLDER: &str = "(no reply)";

// =============================================================================
// Turn settlement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Pending,
    Resolved,
}

/// Single-transition settlement guard.
///
/// Every terminal path (idle, timeout fallback, request failure) funnels
/// through [`settle`](Self::settle); only the winner proceeds.
struct TurnState {
    phase: TurnPhase,
}

impl TurnState {
    fn new() -> Self {
        Self {
            phase: TurnPhase::Pending,
        }
    }

    /// Attempt the `Pending -> Resolved` transition. True only once.
    fn settle(&mut self) -> bool {
        if self.phase == TurnPhase::Pending {
            self.phase = TurnPhase::Resolved;
            true
        } else {
            false
        }
    }
}

/// Listener that forwards raw events into the turn's private channel.
struct ChannelListener {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[async_trait]
impl EventListener for ChannelListener {
    async fn on_event(&self, event: &ServerEvent) {
        // A closed receiver means the turn already settled; drop silently.
        let _ = self.tx.send(event.clone());
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct TurnConfig {
    /// How long to wait for the first stream event before falling back to
    /// the synchronous response body.
    pub first_event_timeout: Duration,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            first_event_timeout: Duration::from_secs(300),
        }
    }
}

/// Orchestrates one conversational turn against an agent session.
pub struct TurnCoordinator {
    registry: ListenerRegistry,
    api: Arc<dyn AgentApi>,
    chat: Arc<dyn ChatSink>,
    renderer: Arc<dyn CardRenderer>,
    tracker: SubagentTracker,
    owned_sessions: OwnedSessions,
    owned_messages: OwnedMessages,
    seen_requests: SeenRequests,
    sleeper: Arc<dyn Sleeper>,
    config: TurnConfig,
}

impl TurnCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: ListenerRegistry,
        api: Arc<dyn AgentApi>,
        chat: Arc<dyn ChatSink>,
        renderer: Arc<dyn CardRenderer>,
        tracker: SubagentTracker,
        owned_sessions: OwnedSessions,
        owned_messages: OwnedMessages,
        seen_requests: SeenRequests,
        sleeper: Arc<dyn Sleeper>,
        config: TurnConfig,
    ) -> Self {
        Self {
            registry,
            api,
            chat,
            renderer,
            tracker,
            owned_sessions,
            owned_messages,
            seen_requests,
            sleeper,
            config,
        }
    }

    /// Run one turn: send `prompt` into the session and resolve its reply.
    ///
    /// The event listener is registered before the send request goes out,
    /// closing the race where the first event beats the subscription.
    /// Resolution paths, all funneled through one settlement transition:
    /// `session.idle` (normal), first-event timeout (fallback to the sync
    /// response body), or a request failure before any event (the only
    /// path that returns an error).
    pub async fn run_turn(&self, session_id: &str, prompt: &str) -> Result<String> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener_id = self
            .registry
            .add(session_id, Arc::new(ChannelListener { tx }))
            .await;

        let mut state = TurnState::new();
        let mut classifier = Classifier::new(self.owned_sessions.clone());
        let mut card = CardSession::new(Arc::clone(&self.renderer));
        let mut buffer = String::new();
        let mut reasoning = String::new();
        let mut saw_event = false;
        let mut sync_body: Option<String> = None;
        let mut send_done = false;

        let api = Arc::clone(&self.api);
        let send_session = session_id.to_string();
        let send_prompt = prompt.to_string();
        let mut send_task =
            tokio::spawn(async move { api.send_message(&send_session, &send_prompt).await });

        let first_event_sleep = self.sleeper.sleep(self.config.first_event_timeout);
        tokio::pin!(first_event_sleep);

        info!(session = %session_id, "turn started");

        enum TurnExit {
            Reply(String),
            Timeout,
            Failed(anyhow::Error),
        }

        let exit: TurnExit = loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else {
                        break TurnExit::Failed(anyhow!("turn event channel closed unexpectedly"));
                    };
                    saw_event = true;
                    if let Some(message_id) = event.message_id() {
                        self.owned_messages.mark(message_id).await;
                    }
                    let Some(action) = classifier.classify(&event).await else {
                        continue;
                    };
                    if let Some(reply) = self
                        .handle_action(
                            &action,
                            &mut state,
                            &mut card,
                            &mut buffer,
                            &mut reasoning,
                        )
                        .await
                    {
                        break TurnExit::Reply(reply);
                    }
                }

                joined = &mut send_task, if !send_done => {
                    send_done = true;
                    let result = match joined {
                        Ok(inner) => inner,
                        Err(e) => Err(anyhow!(e).context("send task panicked")),
                    };
                    match result {
                        Ok(body) => sync_body = Some(body),
                        Err(e) if !saw_event => {
                            if state.settle() {
                                metrics::counter!("parley_turn_failures_total").increment(1);
                                break TurnExit::Failed(
                                    e.context("turn request failed before any event"),
                                );
                            }
                        }
                        Err(e) => {
                            // Long agent calls routinely outlive the HTTP
                            // request; the stream is now the source of truth.
                            debug!(session = %session_id, error = %e,
                                "request failed after first event, continuing on stream");
                        }
                    }
                }

                _ = &mut first_event_sleep, if !saw_event => {
                    if state.settle() {
                        metrics::counter!("parley_turn_timeouts_total").increment(1);
                        break TurnExit::Timeout;
                    }
                }
            }
        };

        if !send_done {
            send_task.abort();
        }

        let outcome: Result<String> = match exit {
            TurnExit::Reply(reply) => Ok(reply),
            TurnExit::Failed(e) => Err(e),
            TurnExit::Timeout => {
                // Whatever the triggering request returned synchronously is
                // the only text left to surface.
                warn!(session = %session_id, "no stream event before timeout, using sync response");
                Ok(sync_body
                    .as_deref()
                    .and_then(extract_sync_text)
                    .unwrap_or_else(|| EMPTY_REPLY_PLACEHOLDER.to_string()))
            }
        };
        self.registry.remove(session_id, listener_id).await;
        if let Err(e) = card.close(None).await {
            warn!(session = %session_id, error = %e, "card close failed");
        }
        metrics::counter!("parley_turns_settled_total").increment(1);
        info!(session = %session_id, ok = outcome.is_ok(), "turn settled");
        outcome
    }

    /// React to one classified action. Returns the final reply when the
    /// action settles the turn.
    async fn handle_action(
        &self,
        action: &Action,
        state: &mut TurnState,
        card: &mut CardSession,
        buffer: &mut String,
        reasoning: &mut String,
    ) -> Option<String> {
        match action {
            Action::TextDelta { text, .. } => {
                append_capped(buffer, text);
            }
            Action::ReasoningDelta { text, .. } => {
                // Accumulated for inspection only, never surfaced in the reply.
                append_capped(reasoning, text);
            }
            Action::ToolStateChange {
                session,
                tool,
                phase,
                title,
                ..
            } => {
                if let Err(e) = card.start().await {
                    warn!(session = %session, error = %e, "card create failed");
                }
                if card.is_started() {
                    if let Err(e) = card.set_tool_status(tool, *phase, title.as_deref()).await {
                        warn!(session = %session, tool = %tool, error = %e, "card update failed");
                    }
                }
            }
            Action::SubtaskDiscovered {
                session,
                description,
                agent,
                ..
            } => match self.tracker.on_subtask_discovered(action, 1).await {
                Ok(record) => {
                    let label = if description.is_empty() {
                        agent.as_str()
                    } else {
                        description.as_str()
                    };
                    let note = format!("🤖 Sub-agent started: {label}");
                    if let Err(e) = self.chat.send_text(&note).await {
                        warn!(session = %session, error = %e, "sub-agent notification failed");
                    }
                    if card.is_started() {
                        if let Err(e) = card.add_subtask_button(label, &record.id).await {
                            warn!(session = %session, error = %e, "sub-agent button failed");
                        }
                    }
                }
                Err(e) => warn!(session = %session, error = %e, "sub-agent tracking rejected"),
            },
            Action::SessionBusy { .. } => {}
            Action::SessionIdle { .. } => {
                if state.settle() {
                    let reply = if buffer.is_empty() {
                        EMPTY_REPLY_PLACEHOLDER.to_string()
                    } else {
                        buffer.clone()
                    };
                    return Some(reply);
                }
            }
            Action::QuestionAsked {
                session,
                request_id,
                questions,
            } => {
                if self.seen_requests.first_sighting(request_id).await {
                    let payload = question_card_payload(session, request_id, questions);
                    if let Err(e) = self.chat.send_card(payload).await {
                        warn!(session = %session, error = %e, "question card failed");
                    }
                }
            }
            Action::PermissionRequested {
                session,
                request_id,
                permission_type,
                title,
                metadata,
            } => {
                if self.seen_requests.first_sighting(request_id).await {
                    let payload = permission_card_payload(
                        session,
                        request_id,
                        permission_type,
                        title,
                        metadata,
                    );
                    if let Err(e) = self.chat.send_card(payload).await {
                        warn!(session = %session, error = %e, "permission card failed");
                    }
                }
            }
        }
        None
    }
}
