// ABOUTME: Wire types for the agent server's SSE event stream and REST payloads.
// ABOUTME: Mirrors the server's `{type, properties}` envelope with serde tagging.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// SSE Event Envelope
// =============================================================================

/// One event from the agent server's `/event` stream.
///
/// Parse raw frames with [`parse_event`]; event types this bridge does not
/// recognize (e.g. `file.edited`, `server.connected`) are dropped there so
/// a server upgrade cannot break the pump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "properties")]
pub enum ServerEvent {
    #[serde(rename = "message.part.updated")]
    PartUpdated(PartUpdatedProps),
    #[serde(rename = "message.part.delta")]
    PartDelta(PartDeltaProps),
    #[serde(rename = "session.status")]
    SessionStatus(SessionStatusProps),
    #[serde(rename = "session.idle")]
    SessionIdle(SessionIdleProps),
    #[serde(rename = "question.asked")]
    QuestionAsked(QuestionAskedProps),
    #[serde(rename = "permission.asked")]
    PermissionAsked(PermissionAskedProps),
}

/// Parse one SSE data payload into a [`ServerEvent`].
///
/// Returns `None` for unrecognized event types and for malformed payloads;
/// the stream never aborts on bad input.
pub fn parse_event(json: &str) -> Option<ServerEvent> {
    serde_json::from_str(json).ok()
}

impl ServerEvent {
    /// The session this event belongs to. Every recognized event carries one.
    pub fn session_id(&self) -> &str {
        match self {
            Self::PartUpdated(p) => &p.session_id,
            Self::PartDelta(p) => &p.session_id,
            Self::SessionStatus(p) => &p.session_id,
            Self::SessionIdle(p) => &p.session_id,
            Self::QuestionAsked(p) => &p.session_id,
            Self::PermissionAsked(p) => &p.session_id,
        }
    }

    /// The message this event belongs to, when it carries one.
    ///
    /// Used by the cross-turn observer to bucket streamed text by its
    /// originating message.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::PartUpdated(p) => p.message_id.as_deref(),
            Self::PartDelta(p) => p.message_id.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartUpdatedProps {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID", default)]
    pub message_id: Option<String>,
    pub part: Part,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartDeltaProps {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(rename = "messageID", default)]
    pub message_id: Option<String>,
    #[serde(rename = "partID", default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub delta: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatusProps {
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(default)]
    pub status: Option<StatusValue>,
}

/// The server emits status either as `{"type": "busy"}` or as a bare string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Tagged {
        #[serde(rename = "type")]
        kind: String,
    },
    Plain(String),
}

impl StatusValue {
    pub fn kind(&self) -> &str {
        match self {
            Self::Tagged { kind } => kind,
            Self::Plain(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionIdleProps {
    #[serde(rename = "sessionID")]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAskedProps {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(default)]
    pub questions: Vec<QuestionItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionItem {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub custom: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionAskedProps {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "sessionID")]
    pub session_id: String,
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
}

// =============================================================================
// Message Parts
// =============================================================================

/// Typed sub-object carried by a `message.part.updated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text(TextPart),
    #[serde(rename = "reasoning")]
    Reasoning(TextPart),
    #[serde(rename = "tool")]
    Tool(ToolPart),
    #[serde(rename = "subtask")]
    Subtask(SubtaskPart),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "callID", default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub state: Option<ToolStateRecord>,
}

/// Execution state of a tool call as reported by the server.
///
/// Field presence is state-dependent: `input` appears once the call is
/// running, `output`/`error` only on the states that carry them. The
/// classifier surfaces exactly what arrived and synthesizes nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStateRecord {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskPart {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent: Option<String>,
}

// =============================================================================
// REST Payloads
// =============================================================================

/// Entry from `GET /session/{id}/children`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildSessionInfo {
    pub id: String,
    #[serde(rename = "parentID", default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Entry from `GET /session/{id}/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub info: Option<MessageInfo>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}
