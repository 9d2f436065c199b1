// ABOUTME: HTTP client for the agent server: REST calls plus the SSE event pump.
// ABOUTME: Also carries the thin outbound chat/card HTTP implementations.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::protocol::{parse_event, ChildSessionInfo, MessageRecord, ServerEvent};
use crate::registry::ListenerRegistry;
use crate::traits::{AgentApi, CardRenderer, ChatSink};

// =============================================================================
// SSE frame parsing
// =============================================================================

/// Incremental parser for SSE byte streams.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: String,
}

impl SseFrameParser {
    /// Feed arbitrary bytes and drain the events completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ServerEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(payload) = extract_data_payload(&frame) {
                if let Some(event) = parse_event(&payload) {
                    events.push(event);
                }
            }
        }

        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty()
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

// =============================================================================
// Agent server client
// =============================================================================

/// reqwest-backed [`AgentApi`] against the agent server's REST surface.
pub struct HttpAgentClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AgentApi for HttpAgentClient {
    async fn send_message(&self, session_id: &str, text: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url(&format!("/session/{session_id}/message")))
            .json(&json!({"parts": [{"type": "text", "text": text}]}))
            .send()
            .await
            .context("message send failed")?
            .error_for_status()
            .context("message send rejected")?;
        response.text().await.context("message response unreadable")
    }

    async fn fetch_children(&self, session_id: &str) -> Result<Vec<ChildSessionInfo>> {
        self.client
            .get(self.url(&format!("/session/{session_id}/children")))
            .send()
            .await
            .context("children fetch failed")?
            .error_for_status()
            .context("children fetch rejected")?
            .json()
            .await
            .context("children response unparseable")
    }

    async fn fetch_messages(&self, session_id: &str) -> Result<Vec<MessageRecord>> {
        self.client
            .get(self.url(&format!("/session/{session_id}/message")))
            .send()
            .await
            .context("transcript fetch failed")?
            .error_for_status()
            .context("transcript fetch rejected")?
            .json()
            .await
            .context("transcript response unparseable")
    }
}

/// Drive the long-lived `/event` subscription, dispatching every parsed
/// event through the registry. Reconnects with capped backoff until the
/// task is aborted.
pub async fn run_event_pump(base_url: &str, registry: ListenerRegistry) {
    let client = match reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "event pump could not build HTTP client");
            return;
        }
    };
    let url = format!("{}/event", base_url.trim_end_matches('/'));
    let mut backoff = Duration::from_secs(1);

    loop {
        info!(url = %url, "connecting to event stream");
        match client.get(&url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => {
                    backoff = Duration::from_secs(1);
                    let mut parser = SseFrameParser::default();
                    let mut stream = response.bytes_stream();
                    while let Some(chunk) = stream.next().await {
                        match chunk {
                            Ok(bytes) => {
                                for event in parser.feed(&bytes) {
                                    registry.dispatch(&event).await;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "event stream read error");
                                break;
                            }
                        }
                    }
                    debug!("event stream ended, reconnecting");
                }
                Err(e) => warn!(error = %e, "event stream rejected"),
            },
            Err(e) => warn!(error = %e, "event stream connect failed"),
        }

        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(Duration::from_secs(30));
    }
}

// =============================================================================
// Outbound chat surfaces
// =============================================================================

/// Webhook-style text/card delivery to the chat platform.
pub struct HttpChatSink {
    client: reqwest::Client,
    webhook_url: String,
}

impl HttpChatSink {
    pub fn new(webhook_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    async fn send_text(&self, text: &str) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&json!({"kind": "text", "text": text}))
            .send()
            .await
            .context("text send failed")?
            .error_for_status()
            .context("text send rejected")?;
        Ok(())
    }

    async fn send_card(&self, payload: Value) -> Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(&json!({"kind": "card", "card": payload}))
            .send()
            .await
            .context("card send failed")?
            .error_for_status()
            .context("card send rejected")?;
        Ok(())
    }
}

/// Streaming-card renderer over the card collaborator's REST surface.
pub struct HttpCardRenderer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCardRenderer {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CardRenderer for HttpCardRenderer {
    async fn create_card(&self, schema: Value) -> Result<String> {
        let body: Value = self
            .client
            .post(format!("{}/card", self.base_url))
            .json(&schema)
            .send()
            .await
            .context("card create failed")?
            .error_for_status()
            .context("card create rejected")?
            .json()
            .await
            .context("card create response unparseable")?;
        body.get("cardId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("card create response missing cardId")
    }

    async fn update_element(
        &self,
        card_id: &str,
        element_id: &str,
        content: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()> {
        self.client
            .put(format!("{}/card/{card_id}/element/{element_id}", self.base_url))
            .json(&json!({
                "content": content,
                "sequence": sequence,
                "token": token,
            }))
            .send()
            .await
            .context("card update failed")?
            .error_for_status()
            .context("card update rejected")?;
        Ok(())
    }

    async fn close_streaming(
        &self,
        card_id: &str,
        summary: &str,
        sequence: u64,
        token: &str,
    ) -> Result<()> {
        self.client
            .post(format!("{}/card/{card_id}/close", self.base_url))
            .json(&json!({
                "summary": summary,
                "sequence": sequence,
                "token": token,
            }))
            .send()
            .await
            .context("card close failed")?
            .error_for_status()
            .context("card close rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_frames_parse_incrementally() {
        let mut parser = SseFrameParser::default();
        let mut events = Vec::new();

        // A frame split across two chunks only completes on the blank line.
        events.extend(parser.feed(
            b"data: {\"type\":\"session.idle\",\"properties\":{\"sessionID\":\"s1\"}}",
        ));
        assert!(events.is_empty());
        events.extend(parser.feed(b"\n\n"));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id(), "s1");
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn test_sse_unrecognized_payloads_are_skipped() {
        let mut parser = SseFrameParser::default();
        let events = parser.feed(
            b": keepalive\n\ndata: {\"type\":\"server.connected\",\"properties\":{}}\n\ndata: not json\n\n",
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_sse_multiline_data_joined() {
        let mut parser = SseFrameParser::default();
        let events = parser.feed(
            b"data: {\"type\":\"session.idle\",\ndata: \"properties\":{\"sessionID\":\"s2\"}}\n\n",
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session_id(), "s2");
    }
}
