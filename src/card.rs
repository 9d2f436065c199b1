// ABOUTME: Incremental streaming-card session over a CardRenderer.
// ABOUTME: Owns the per-card sequence counter, idempotency tokens, and tool lines.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::debug;

use crate::classifier::ToolPhase;
use crate::traits::CardRenderer;

fn phase_icon(phase: ToolPhase) -> &'static str {
    match phase {
        ToolPhase::Pending => "⏳",
        ToolPhase::Running => "🔧",
        ToolPhase::Completed => "✅",
        ToolPhase::Error => "❌",
    }
}

/// One tool's display line inside the card body.
#[derive(Debug, Clone)]
struct ToolLine {
    name: String,
    phase: ToolPhase,
    title: Option<String>,
}

impl ToolLine {
    fn render(&self) -> String {
        match &self.title {
            Some(title) if !title.is_empty() => {
                format!("{} {} · {}", phase_icon(self.phase), self.name, title)
            }
            _ => format!("{} {}", phase_icon(self.phase), self.name),
        }
    }
}

/// Stateful handle on one streaming card.
///
/// The card is created lazily on [`start`](Self::start); every mutation
/// after that carries a strictly increasing sequence number and a token
/// of the form `{op}_{card_id}_{seq}` so replays are droppable downstream.
pub struct CardSession {
    renderer: Arc<dyn CardRenderer>,
    card_id: Option<String>,
    sequence: u64,
    tool_lines: Vec<ToolLine>,
    last_content: Option<String>,
    closed: bool,
}

impl CardSession {
    pub fn new(renderer: Arc<dyn CardRenderer>) -> Self {
        Self {
            renderer,
            card_id: None,
            sequence: 0,
            tool_lines: Vec::new(),
            last_content: None,
            closed: false,
        }
    }

    pub fn is_started(&self) -> bool {
        self.card_id.is_some()
    }

    pub fn tool_count(&self) -> usize {
        self.tool_lines.len()
    }

    fn token(op: &str, card_id: &str, seq: u64) -> String {
        format!("{op}_{card_id}_{seq}")
    }

    fn next_seq(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Create the card on the platform. Idempotent.
    pub async fn start(&mut self) -> Result<()> {
        if self.card_id.is_some() {
            return Ok(());
        }
        let schema = json!({
            "streaming": true,
            "elements": [
                {"id": "content", "kind": "markdown", "text": ""},
                {"id": "actions", "kind": "buttons", "buttons": []},
            ],
        });
        let card_id = self.renderer.create_card(schema).await?;
        debug!(card_id = %card_id, "streaming card created");
        self.card_id = Some(card_id);
        Ok(())
    }

    /// Record a tool's phase transition and push the refreshed body.
    ///
    /// A tool already shown is updated in place; a `None` title keeps the
    /// one previously shown rather than blanking it. Body pushes that would
    /// repeat the last rendered content are dropped.
    pub async fn set_tool_status(
        &mut self,
        tool: &str,
        phase: ToolPhase,
        title: Option<&str>,
    ) -> Result<()> {
        match self.tool_lines.iter_mut().find(|l| l.name == tool) {
            Some(line) => {
                line.phase = phase;
                if let Some(title) = title {
                    line.title = Some(title.to_string());
                }
            }
            None => self.tool_lines.push(ToolLine {
                name: tool.to_string(),
                phase,
                title: title.map(str::to_string),
            }),
        }
        let body = self
            .tool_lines
            .iter()
            .map(ToolLine::render)
            .collect::<Vec<_>>()
            .join("\n");
        self.push_content(&body).await
    }

    /// Add a button linking out to a sub-agent's detail view.
    pub async fn add_subtask_button(&mut self, label: &str, child_id: &str) -> Result<()> {
        let Some(card_id) = self.card_id.clone() else {
            return Ok(());
        };
        let seq = self.next_seq();
        let token = Self::token("upd", &card_id, seq);
        let payload = json!({"buttons": [{"label": label, "value": child_id}]});
        self.renderer
            .update_element(&card_id, "actions", &payload.to_string(), seq, &token)
            .await
    }

    /// Replace the card's content element, skipping no-op repeats.
    pub async fn push_content(&mut self, content: &str) -> Result<()> {
        let Some(card_id) = self.card_id.clone() else {
            return Ok(());
        };
        if self.last_content.as_deref() == Some(content) {
            return Ok(());
        }
        let seq = self.next_seq();
        let token = Self::token("upd", &card_id, seq);
        self.renderer
            .update_element(&card_id, "content", content, seq, &token)
            .await?;
        self.last_content = Some(content.to_string());
        Ok(())
    }

    /// Finish the card. Idempotent.
    ///
    /// With no final text, a summary is synthesized from the tool count.
    /// A final content push happens only when it differs from what the
    /// card already shows; the close itself is always sent.
    pub async fn close(&mut self, final_text: Option<&str>) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let Some(card_id) = self.card_id.clone() else {
            self.closed = true;
            return Ok(());
        };

        let summary = match final_text {
            Some(text) if !text.is_empty() => text.to_string(),
            _ if self.tool_lines.is_empty() => "Done".to_string(),
            _ => format!("✅ {} tool(s) used", self.tool_lines.len()),
        };

        if self.last_content.as_deref() != Some(summary.as_str()) {
            let seq = self.next_seq();
            let token = Self::token("upd", &card_id, seq);
            self.renderer
                .update_element(&card_id, "content", &summary, seq, &token)
                .await?;
            self.last_content = Some(summary.clone());
        }

        let seq = self.next_seq();
        let token = Self::token("cls", &card_id, seq);
        self.renderer
            .close_streaming(&card_id, &summary, seq, &token)
            .await?;
        self.closed = true;
        Ok(())
    }
}
