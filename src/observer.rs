// ABOUTME: Cross-Turn Observer: forwards session activity not caused by a local turn.
// ABOUTME: Buffers text per originating message id, flushes on idle, suppresses owned/busy traffic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::classifier::{Action, Classifier};
use crate::context::{BusySessions, OwnedMessages, OwnedSessions, SeenRequests};
use crate::interactive::{permission_card_payload, question_card_payload};
use crate::protocol::ServerEvent;
use crate::registry::{EventListener, ListenerId, ListenerRegistry};
use crate::traits::ChatSink;

/// Buffer key for deltas that arrive without a message id.
const UNKEYED: &str = "_unkeyed";

struct ObserverShared {
    chat: Arc<dyn ChatSink>,
    owned_messages: OwnedMessages,
    busy_sessions: BusySessions,
    seen_requests: SeenRequests,
    /// session id -> message id -> accumulated text
    buffers: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl ObserverShared {
    async fn drop_message_buffer(&self, session_id: &str, message_id: &str) {
        let mut buffers = self.buffers.lock().await;
        if let Some(per_message) = buffers.get_mut(session_id) {
            per_message.remove(message_id);
            if per_message.is_empty() {
                buffers.remove(session_id);
            }
        }
    }

    async fn flush_session(&self, session_id: &str) {
        let drained = {
            let mut buffers = self.buffers.lock().await;
            buffers.remove(session_id)
        };
        let Some(per_message) = drained else {
            return;
        };
        for (message_id, text) in per_message {
            if text.is_empty() {
                continue;
            }
            debug!(session = %session_id, message = %message_id, "forwarding external activity");
            metrics::counter!("parley_observer_flushes_total").increment(1);
            if let Err(e) = self.chat.send_text(&text).await {
                warn!(session = %session_id, error = %e, "external activity forward failed");
            }
        }
    }
}

/// Per-session listener registered by the observer.
struct ObserverListener {
    shared: Arc<ObserverShared>,
    classifier: Mutex<Classifier>,
}

#[async_trait]
impl EventListener for ObserverListener {
    async fn on_event(&self, event: &ServerEvent) {
        let session_id = event.session_id().to_string();

        // Messages attributed to a local turn never flow back out, and any
        // partial buffer they left behind is discarded.
        if let Some(message_id) = event.message_id() {
            if self.shared.owned_messages.contains(message_id).await {
                self.shared.drop_message_buffer(&session_id, message_id).await;
                return;
            }
        }

        let action = {
            let mut classifier = self.classifier.lock().await;
            classifier.classify(event).await
        };
        let Some(action) = action else {
            return;
        };

        match action {
            Action::TextDelta { text, .. } => {
                if self.shared.busy_sessions.contains(&session_id).await {
                    return;
                }
                let key = event.message_id().unwrap_or(UNKEYED).to_string();
                let mut buffers = self.shared.buffers.lock().await;
                buffers
                    .entry(session_id)
                    .or_default()
                    .entry(key)
                    .or_default()
                    .push_str(&text);
            }
            Action::SessionIdle { .. } => {
                if self.shared.busy_sessions.contains(&session_id).await {
                    return;
                }
                self.shared.flush_session(&session_id).await;
            }
            Action::QuestionAsked {
                session,
                request_id,
                questions,
            } => {
                if self.shared.seen_requests.first_sighting(&request_id).await {
                    let payload = question_card_payload(&session, &request_id, &questions);
                    if let Err(e) = self.shared.chat.send_card(payload).await {
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
                if self.shared.seen_requests.first_sighting(&request_id).await {
                    let payload = permission_card_payload(
                        &session,
                        &request_id,
                        &permission_type,
                        &title,
                        &metadata,
                    );
                    if let Err(e) = self.shared.chat.send_card(payload).await {
                        warn!(session = %session, error = %e, "permission card failed");
                    }
                }
            }
            // Tool, subtask, reasoning, and busy transitions belong to the
            // turn path; the observer only mirrors free-standing text.
            _ => {}
        }
    }
}

/// Long-lived watcher for activity a local Turn Coordinator did not cause.
pub struct CrossTurnObserver {
    registry: ListenerRegistry,
    owned_sessions: OwnedSessions,
    shared: Arc<ObserverShared>,
    registrations: Mutex<Vec<(String, ListenerId)>>,
}

impl CrossTurnObserver {
    pub fn new(
        registry: ListenerRegistry,
        chat: Arc<dyn ChatSink>,
        owned_sessions: OwnedSessions,
        owned_messages: OwnedMessages,
        busy_sessions: BusySessions,
        seen_requests: SeenRequests,
    ) -> Self {
        Self {
            registry,
            owned_sessions,
            shared: Arc::new(ObserverShared {
                chat,
                owned_messages,
                busy_sessions,
                seen_requests,
                buffers: Mutex::new(HashMap::new()),
            }),
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// Start watching a session.
    pub async fn observe(&self, session_id: &str) {
        let listener = Arc::new(ObserverListener {
            shared: Arc::clone(&self.shared),
            classifier: Mutex::new(Classifier::new(self.owned_sessions.clone())),
        });
        let id = self.registry.add(session_id, listener).await;
        self.registrations
            .lock()
            .await
            .push((session_id.to_string(), id));
        debug!(session = %session_id, "observer attached");
    }

    /// Attribute a message id to a local turn, excluding it from forwarding.
    pub async fn mark_owned(&self, message_id: &str) {
        self.shared.owned_messages.mark(message_id).await;
    }

    /// Suppress forwarding for a session while a local turn runs on it.
    pub async fn mark_session_busy(&self, session_id: &str) {
        self.shared.busy_sessions.mark(session_id).await;
    }

    /// Lift the busy suppression. Anything buffered during the busy window
    /// is stale turn residue and is discarded, not forwarded.
    pub async fn mark_session_free(&self, session_id: &str) {
        self.shared.busy_sessions.clear(session_id).await;
        self.shared.buffers.lock().await.remove(session_id);
    }

    /// Detach every listener this observer registered and clear all buffers.
    pub async fn stop(&self) {
        let registrations: Vec<(String, ListenerId)> =
            self.registrations.lock().await.drain(..).collect();
        for (session_id, id) in registrations {
            self.registry.remove(&session_id, id).await;
        }
        self.shared.buffers.lock().await.clear();
    }
}
