// ABOUTME: Capability seams between the bridge core and its collaborators.
// ABOUTME: Production impls live in agent_api; tests substitute recorders.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::{ChildSessionInfo, MessageRecord};

/// Outbound plain-text and card delivery to the chat platform.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<()>;
    async fn send_card(&self, payload: Value) -> Result<()>;
}

/// Streaming-card operations on the chat platform.
///
/// Callers thread a per-card monotonic `sequence` and an idempotency
/// `token` through every mutation so the platform can drop replays.
#[async_trait]
pub trait CardRenderer: Send + Sync {
    /// Create a streaming card from a schema payload, returning its id.
    async fn create_card(&self, schema: Value) -> Result<String>;

    async fn update_element(
        &self,
        card_id: &str,
        element_id: &str,
        content: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()>;

    async fn close_streaming(
        &self,
        card_id: &str,
        summary: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()>;
}

/// REST surface of the agent server used outside the event stream.
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Send a user message into a session. Resolves when the server has
    /// accepted the turn, returning the raw response body.
    async fn send_message(&self, session_id: &str, text: &str) -> Result<String>;

    async fn fetch_children(&self, session_id: &str) -> Result<Vec<ChildSessionInfo>>;

    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>>;
}

/// Injectable clock for anything that waits.
///
/// Lets tests drive backoff and timeout paths without wall-clock sleeps.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
