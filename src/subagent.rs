// ABOUTME: Tracks sub-agent sessions announced as subtask parts in a parent turn.
// ABOUTME: Resolves the child session id with bounded backoff polling.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classifier::Action;
use crate::protocol::Part;
use crate::traits::{AgentApi, Sleeper};

/// Lifecycle of a tracked sub-agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubagentStatus {
    /// Announced; the child session id is not yet known.
    Discovering,
    /// Child session resolved and observable.
    Active,
    /// Discovery exhausted its attempts. Terminal.
    Failed,
}

#[derive(Debug, Clone)]
pub struct TrackedSubagent {
    pub id: String,
    pub parent_session: String,
    pub child_session: Option<String>,
    pub prompt: String,
    pub description: String,
    pub agent: String,
    pub status: SubagentStatus,
    pub created_at: String,
}

/// One rendered line of a child session's transcript.
#[derive(Debug, Clone)]
pub struct TranscriptLine {
    pub role: String,
    pub text: String,
    pub tool_calls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Registry of announced sub-agents, keyed by tracker-assigned id.
#[derive(Clone)]
pub struct SubagentTracker {
    api: Arc<dyn AgentApi>,
    sleeper: Arc<dyn Sleeper>,
    config: DiscoveryConfig,
    records: Arc<Mutex<HashMap<String, TrackedSubagent>>>,
}

impl SubagentTracker {
    pub fn new(api: Arc<dyn AgentApi>, sleeper: Arc<dyn Sleeper>, config: DiscoveryConfig) -> Self {
        Self {
            api,
            sleeper,
            config,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a discovered subtask and start resolving its child session
    /// in the background.
    ///
    /// `depth` is the nesting level of the announcing session: 1 for a
    /// top-level session's subtask. Anything deeper is rejected here,
    /// before a record is created.
    pub async fn on_subtask_discovered(
        &self,
        action: &Action,
        depth: u32,
    ) -> Result<TrackedSubagent> {
        let Action::SubtaskDiscovered {
            session,
            prompt,
            description,
            agent,
        } = action
        else {
            bail!("not a subtask discovery action");
        };
        if depth > 1 {
            bail!("sub-agent nesting beyond depth 1 is not tracked (depth {depth})");
        }

        let record = TrackedSubagent {
            id: Uuid::new_v4().to_string(),
            parent_session: session.clone(),
            child_session: None,
            prompt: prompt.clone(),
            description: description.clone(),
            agent: agent.clone(),
            status: SubagentStatus::Discovering,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        self.records
            .lock()
            .await
            .insert(record.id.clone(), record.clone());
        metrics::counter!("parley_subagents_announced_total").increment(1);

        let tracker = self.clone();
        let record_id = record.id.clone();
        let parent = record.parent_session.clone();
        tokio::spawn(async move {
            tracker.poll_for_child(&record_id, &parent).await;
        });

        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<TrackedSubagent> {
        self.records.lock().await.get(id).cloned()
    }

    pub async fn for_parent(&self, parent_session: &str) -> Vec<TrackedSubagent> {
        self.records
            .lock()
            .await
            .values()
            .filter(|r| r.parent_session == parent_session)
            .cloned()
            .collect()
    }

    /// Fetch and flatten a child session's transcript.
    ///
    /// Fetch failures degrade to an empty transcript; the caller renders
    /// "no output yet" rather than an error.
    pub async fn get_child_messages(&self, child_session: &str, limit: usize) -> Vec<TranscriptLine> {
        let messages = match self.api.fetch_messages(child_session).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(child_session = %child_session, error = %e, "transcript fetch failed");
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        for message in messages {
            let role = message
                .info
                .as_ref()
                .and_then(|i| i.role.clone())
                .unwrap_or_else(|| "unknown".to_string());
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for part in &message.parts {
                match part {
                    Part::Text(t) => {
                        if let Some(body) = &t.text {
                            text.push_str(body);
                        }
                    }
                    Part::Tool(tool) => {
                        if let Some(name) = &tool.tool {
                            tool_calls.push(name.clone());
                        }
                    }
                    _ => {}
                }
            }
            if text.is_empty() && tool_calls.is_empty() {
                continue;
            }
            lines.push(TranscriptLine {
                role,
                text,
                tool_calls,
            });
        }
        if lines.len() > limit {
            let start = lines.len() - limit;
            lines.drain(..start);
        }
        lines
    }

    /// Resolve the child session id by polling the parent's children list.
    ///
    /// Linear backoff: attempt n waits `base_delay * n` before fetching.
    /// A child already claimed by another record is skipped so two
    /// same-turn subtasks resolve to distinct sessions.
    async fn poll_for_child(&self, record_id: &str, parent_session: &str) {
        for attempt in 1..=self.config.attempts {
            self.sleeper.sleep(self.config.base_delay * attempt).await;

            let children = match self.api.fetch_children(parent_session).await {
                Ok(children) => children,
                Err(e) => {
                    debug!(attempt, error = %e, "children fetch failed, retrying");
                    continue;
                }
            };

            let mut records = self.records.lock().await;
            let claimed: Vec<String> = records
                .values()
                .filter(|r| r.id != record_id)
                .filter_map(|r| r.child_session.clone())
                .collect();
            let unclaimed = children.iter().find(|c| !claimed.contains(&c.id));

            if let Some(child) = unclaimed {
                if let Some(record) = records.get_mut(record_id) {
                    record.child_session = Some(child.id.clone());
                    record.status = SubagentStatus::Active;
                }
                debug!(record_id = %record_id, child = %child.id, "sub-agent resolved");
                metrics::counter!("parley_subagents_resolved_total").increment(1);
                return;
            }
        }

        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(record_id) {
            record.status = SubagentStatus::Failed;
        }
        warn!(record_id = %record_id, parent = %parent_session, "sub-agent discovery exhausted");
        metrics::counter!("parley_subagents_failed_total").increment(1);
    }
}
