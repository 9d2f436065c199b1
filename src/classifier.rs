// ABOUTME: Turns raw agent-server events into a closed set of typed domain actions.
// ABOUTME: Applies the session-ownership filter and tracks reasoning part ids per instance.

use std::collections::HashSet;

use serde_json::Value;

use crate::context::OwnedSessions;
use crate::protocol::{Part, QuestionItem, ServerEvent};

// =============================================================================
// Domain Actions
// =============================================================================

/// Execution phase of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPhase {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolPhase {
    fn from_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A classified domain action. Every variant carries the session it belongs to.
#[derive(Debug, Clone)]
pub enum Action {
    TextDelta {
        session: String,
        text: String,
    },
    ReasoningDelta {
        session: String,
        text: String,
    },
    ToolStateChange {
        session: String,
        tool: String,
        phase: ToolPhase,
        /// Present only when the incoming state record carried it.
        input: Option<Value>,
        output: Option<String>,
        error: Option<String>,
        title: Option<String>,
    },
    SubtaskDiscovered {
        session: String,
        prompt: String,
        description: String,
        agent: String,
    },
    SessionBusy {
        session: String,
    },
    SessionIdle {
        session: String,
    },
    QuestionAsked {
        session: String,
        request_id: String,
        questions: Vec<QuestionItem>,
    },
    PermissionRequested {
        session: String,
        request_id: String,
        permission_type: String,
        title: String,
        metadata: Value,
    },
}

impl Action {
    pub fn session(&self) -> &str {
        match self {
            Self::TextDelta { session, .. }
            | Self::ReasoningDelta { session, .. }
            | Self::ToolStateChange { session, .. }
            | Self::SubtaskDiscovered { session, .. }
            | Self::SessionBusy { session }
            | Self::SessionIdle { session }
            | Self::QuestionAsked { session, .. }
            | Self::PermissionRequested { session, .. } => session,
        }
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Maps raw events to [`Action`]s, or rejects them.
///
/// Stateless except for the set of part ids known to be reasoning parts:
/// a `part.delta` shares its wire shape between text and reasoning, and is
/// only distinguishable by the part id its introducing `part.updated`
/// carried. One classifier instance per subscriber.
pub struct Classifier {
    owned: OwnedSessions,
    reasoning_parts: HashSet<String>,
}

impl Classifier {
    pub fn new(owned: OwnedSessions) -> Self {
        Self {
            owned,
            reasoning_parts: HashSet::new(),
        }
    }

    /// Classify one raw event. Malformed, unrecognized, or foreign-session
    /// input yields `None`, never an error.
    pub async fn classify(&mut self, event: &ServerEvent) -> Option<Action> {
        if !self.owned.contains(event.session_id()).await {
            return None;
        }

        match event {
            ServerEvent::PartUpdated(props) => {
                let session = props.session_id.clone();
                match &props.part {
                    Part::Text(text) => {
                        let body = text.text.as_deref().unwrap_or("");
                        if body.is_empty() {
                            return None;
                        }
                        Some(Action::TextDelta {
                            session,
                            text: body.to_string(),
                        })
                    }
                    Part::Reasoning(reasoning) => {
                        if let Some(id) = &reasoning.id {
                            self.reasoning_parts.insert(id.clone());
                        }
                        let body = reasoning.text.as_deref().unwrap_or("");
                        if body.is_empty() {
                            return None;
                        }
                        Some(Action::ReasoningDelta {
                            session,
                            text: body.to_string(),
                        })
                    }
                    Part::Tool(tool) => {
                        let name = tool.tool.clone()?;
                        let state = tool.state.as_ref()?;
                        let phase = ToolPhase::from_status(state.status.as_deref()?)?;
                        Some(Action::ToolStateChange {
                            session,
                            tool: name,
                            phase,
                            input: state.input.clone(),
                            output: state.output.clone(),
                            error: state.error.clone(),
                            title: state.title.clone(),
                        })
                    }
                    Part::Subtask(subtask) => Some(Action::SubtaskDiscovered {
                        session,
                        prompt: subtask.prompt.clone().unwrap_or_default(),
                        description: subtask.description.clone().unwrap_or_default(),
                        agent: subtask.agent.clone().unwrap_or_default(),
                    }),
                    Part::Other => None,
                }
            }

            ServerEvent::PartDelta(props) => {
                // Deltas for fields other than the text body are not surfaced.
                if let Some(field) = &props.field {
                    if field != "text" {
                        return None;
                    }
                }
                let delta = props.delta.as_deref().unwrap_or("");
                if delta.is_empty() {
                    return None;
                }
                let is_reasoning = props
                    .part_id
                    .as_deref()
                    .is_some_and(|id| self.reasoning_parts.contains(id));
                if is_reasoning {
                    Some(Action::ReasoningDelta {
                        session: props.session_id.clone(),
                        text: delta.to_string(),
                    })
                } else {
                    Some(Action::TextDelta {
                        session: props.session_id.clone(),
                        text: delta.to_string(),
                    })
                }
            }

            ServerEvent::SessionStatus(props) => {
                match props.status.as_ref().map(|s| s.kind()) {
                    Some("busy") => Some(Action::SessionBusy {
                        session: props.session_id.clone(),
                    }),
                    Some("idle") => Some(Action::SessionIdle {
                        session: props.session_id.clone(),
                    }),
                    // "retry" and any future status value produce no action.
                    _ => None,
                }
            }

            ServerEvent::SessionIdle(props) => Some(Action::SessionIdle {
                session: props.session_id.clone(),
            }),

            ServerEvent::QuestionAsked(props) => Some(Action::QuestionAsked {
                session: props.session_id.clone(),
                request_id: props.id.clone()?,
                questions: props.questions.clone(),
            }),

            ServerEvent::PermissionAsked(props) => {
                let permission_type = props.permission.clone()?;
                let title = props
                    .title
                    .clone()
                    .unwrap_or_else(|| permission_type.clone());
                Some(Action::PermissionRequested {
                    session: props.session_id.clone(),
                    request_id: props.id.clone()?,
                    permission_type,
                    title,
                    metadata: props.metadata.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        PartDeltaProps, PartUpdatedProps, SessionStatusProps, StatusValue, TextPart,
    };

    async fn owned(sessions: &[&str]) -> OwnedSessions {
        let owned = OwnedSessions::default();
        for s in sessions {
            owned.insert(s).await;
        }
        owned
    }

    fn delta_event(session: &str, part_id: &str, delta: &str) -> ServerEvent {
        ServerEvent::PartDelta(PartDeltaProps {
            session_id: session.to_string(),
            message_id: None,
            part_id: Some(part_id.to_string()),
            field: Some("text".to_string()),
            delta: Some(delta.to_string()),
        })
    }

    #[tokio::test]
    async fn test_delta_after_reasoning_part_is_reasoning() {
        let mut classifier = Classifier::new(owned(&["s1"]).await);

        let intro = ServerEvent::PartUpdated(PartUpdatedProps {
            session_id: "s1".to_string(),
            message_id: None,
            part: Part::Reasoning(TextPart {
                id: Some("part_r".to_string()),
                text: None,
            }),
        });
        // Introducing event carries no text yet: no action, but the id sticks.
        assert!(classifier.classify(&intro).await.is_none());

        let action = classifier
            .classify(&delta_event("s1", "part_r", "thinking"))
            .await
            .expect("action");
        assert!(matches!(action, Action::ReasoningDelta { .. }));

        let action = classifier
            .classify(&delta_event("s1", "part_t", "hello"))
            .await
            .expect("action");
        assert!(matches!(action, Action::TextDelta { .. }));
    }

    #[tokio::test]
    async fn test_empty_delta_is_noop() {
        let mut classifier = Classifier::new(owned(&["s1"]).await);
        assert!(classifier
            .classify(&delta_event("s1", "p", ""))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_foreign_session_yields_none() {
        let mut classifier = Classifier::new(owned(&["s1"]).await);
        assert!(classifier
            .classify(&delta_event("s2", "p", "hello"))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_retry_status_produces_no_action() {
        let mut classifier = Classifier::new(owned(&["s1"]).await);
        let event = ServerEvent::SessionStatus(SessionStatusProps {
            session_id: "s1".to_string(),
            status: Some(StatusValue::Plain("retry".to_string())),
        });
        assert!(classifier.classify(&event).await.is_none());
    }
}
