// ABOUTME: Shared recording mocks for integration tests
// ABOUTME: Hand-rolled call recorders behind the collaborator traits

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use parley::protocol::{ChildSessionInfo, MessageRecord};
use parley::traits::{AgentApi, CardRenderer, ChatSink, Sleeper};

// =============================================================================
// Chat sink
// =============================================================================

#[derive(Default)]
pub struct RecordingChatSink {
    pub texts: Mutex<Vec<String>>,
    pub cards: Mutex<Vec<Value>>,
}

#[async_trait]
impl ChatSink for RecordingChatSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.texts.lock().await.push(text.to_string());
        Ok(())
    }

    async fn send_card(&self, payload: Value) -> Result<()> {
        self.cards.lock().await.push(payload);
        Ok(())
    }
}

// =============================================================================
// Card renderer
// =============================================================================

#[derive(Debug, Clone)]
pub enum RenderCall {
    Create,
    Update {
        card_id: String,
        element_id: String,
        content: String,
        sequence: u64,
        token: String,
    },
    Close {
        card_id: String,
        summary: String,
        sequence: u64,
        token: String,
    },
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub calls: Mutex<Vec<RenderCall>>,
}

#[async_trait]
impl CardRenderer for RecordingRenderer {
    async fn create_card(&self, _schema: Value) -> Result<String> {
        self.calls.lock().await.push(RenderCall::Create);
        Ok("card_1".to_string())
    }

    async fn update_element(
        &self,
        card_id: &str,
        element_id: &str,
        content: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()> {
        self.calls.lock().await.push(RenderCall::Update {
            card_id: card_id.to_string(),
            element_id: element_id.to_string(),
            content: content.to_string(),
            sequence,
            token: token.to_string(),
        });
        Ok(())
    }

    async fn close_streaming(
        &self,
        card_id: &str,
        summary: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()> {
        self.calls.lock().await.push(RenderCall::Close {
            card_id: card_id.to_string(),
            summary: summary.to_string(),
            sequence,
            token: token.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Agent API
// =============================================================================

/// Scripted agent server: configurable send outcome, children script, and
/// transcript outcome, with call counting.
pub struct ScriptedAgentApi {
    /// Body returned by `send_message`; `None` means fail the send.
    pub send_body: Option<String>,
    /// When set, `send_message` blocks until notified before returning.
    pub send_gate: Option<Arc<Notify>>,
    /// One entry consumed per `fetch_children` call; empty list thereafter.
    pub children_script: Mutex<Vec<Vec<ChildSessionInfo>>>,
    pub children_calls: Mutex<u32>,
    /// `None` means fail the transcript fetch.
    pub messages: Option<Vec<MessageRecord>>,
}

impl Default for ScriptedAgentApi {
    fn default() -> Self {
        Self {
            send_body: Some("{}".to_string()),
            send_gate: None,
            children_script: Mutex::new(Vec::new()),
            children_calls: Mutex::new(0),
            messages: Some(Vec::new()),
        }
    }
}

#[async_trait]
impl AgentApi for ScriptedAgentApi {
    async fn send_message(&self, _session_id: &str, _text: &str) -> Result<String> {
        if let Some(gate) = &self.send_gate {
            gate.notified().await;
        }
        match &self.send_body {
            Some(body) => Ok(body.clone()),
            None => bail!("scripted send failure"),
        }
    }

    async fn fetch_children(&self, _session_id: &str) -> Result<Vec<ChildSessionInfo>> {
        *self.children_calls.lock().await += 1;
        let mut script = self.children_script.lock().await;
        if script.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(script.remove(0))
        }
    }

    async fn fetch_messages(&self, _session_id: &str) -> Result<Vec<MessageRecord>> {
        match &self.messages {
            Some(messages) => Ok(messages.clone()),
            None => bail!("scripted transcript failure"),
        }
    }
}

// =============================================================================
// Sleeper
// =============================================================================

/// Returns immediately, recording every requested duration.
#[derive(Default)]
pub struct InstantSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().await.push(duration);
    }
}
