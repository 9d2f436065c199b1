// ABOUTME: Shared bridge-wide ownership and dedup sets with per-component contracts.
// ABOUTME: Replaces ambient globals with explicitly passed, documented handles.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maximum size of the interactive-request dedup set before it is cleared
/// to prevent unbounded growth.
const SEEN_REQUESTS_CAP: usize = 10_000;

/// Sessions this process is allowed to surface actions for.
///
/// Written by the caller that owns session lifecycle (the bin wiring);
/// read by every classifier instance for the ownership filter.
#[derive(Clone, Default)]
pub struct OwnedSessions {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl OwnedSessions {
    pub async fn insert(&self, session_id: &str) {
        self.inner.lock().await.insert(session_id.to_string());
    }

    pub async fn remove(&self, session_id: &str) {
        self.inner.lock().await.remove(session_id);
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.lock().await.contains(session_id)
    }
}

/// Sessions currently inside an active turn.
///
/// Written by the caller around each turn; read by the cross-turn observer
/// to suppress double-delivery of turn-driven output.
#[derive(Clone, Default)]
pub struct BusySessions {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl BusySessions {
    pub async fn mark(&self, session_id: &str) {
        self.inner.lock().await.insert(session_id.to_string());
    }

    /// Clear the busy mark. Returns true if the session was marked.
    pub async fn clear(&self, session_id: &str) -> bool {
        self.inner.lock().await.remove(session_id)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.lock().await.contains(session_id)
    }
}

/// Interactive request ids (questions, permissions) already rendered.
///
/// Written and read by both the turn coordinator and the observer so the
/// same prompt is never rendered twice, whichever path sees it first.
#[derive(Clone, Default)]
pub struct SeenRequests {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SeenRequests {
    /// Record a request id, returning true only on its first sighting.
    pub async fn first_sighting(&self, request_id: &str) -> bool {
        let mut seen = self.inner.lock().await;
        if seen.contains(request_id) {
            return false;
        }
        if seen.len() >= SEEN_REQUESTS_CAP {
            seen.clear();
        }
        seen.insert(request_id.to_string());
        true
    }
}

/// Message ids produced by turns this process drives.
///
/// Written by the caller when a turn observes its own assistant message;
/// read by the observer to avoid echoing a message back to the platform
/// it came from.
#[derive(Clone, Default)]
pub struct OwnedMessages {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl OwnedMessages {
    pub async fn mark(&self, message_id: &str) {
        self.inner.lock().await.insert(message_id.to_string());
    }

    pub async fn contains(&self, message_id: &str) -> bool {
        self.inner.lock().await.contains(message_id)
    }
}

/// Bundle of all shared sets, cloned cheaply into each component.
#[derive(Clone, Default)]
pub struct BridgeContext {
    pub owned_sessions: OwnedSessions,
    pub busy_sessions: BusySessions,
    pub seen_requests: SeenRequests,
    pub owned_messages: OwnedMessages,
}

impl BridgeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_owned_sessions_insert_remove() {
        let owned = OwnedSessions::default();
        assert!(!owned.contains("s1").await);
        owned.insert("s1").await;
        assert!(owned.contains("s1").await);
        owned.remove("s1").await;
        assert!(!owned.contains("s1").await);
    }

    #[tokio::test]
    async fn test_seen_requests_dedup() {
        let seen = SeenRequests::default();
        assert!(seen.first_sighting("req_1").await);
        assert!(!seen.first_sighting("req_1").await);
        assert!(seen.first_sighting("req_2").await);
    }

    #[tokio::test]
    async fn test_busy_clear_reports_prior_state() {
        let busy = BusySessions::default();
        assert!(!busy.clear("s1").await);
        busy.mark("s1").await;
        assert!(busy.contains("s1").await);
        assert!(busy.clear("s1").await);
        assert!(!busy.contains("s1").await);
    }
}
