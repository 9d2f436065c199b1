// ABOUTME: Session-keyed fan-out table routing raw server events to subscribers.
// ABOUTME: Pure data structure; registration order is delivery order, no policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::protocol::ServerEvent;

/// A subscriber to one session's raw event feed.
///
/// Each listener runs to completion against its own private state before
/// the next event is dispatched; listeners never share mutable state.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &ServerEvent);
}

/// Opaque handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[cfg(test)]
impl ListenerId {
    pub(crate) fn for_test(raw: u64) -> Self {
        Self(raw)
    }
}

/// Fan-out table: session id -> registered listeners.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<HashMap<String, Vec<(ListenerId, Arc<dyn EventListener>)>>>>,
    next_id: Arc<AtomicU64>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for a session, returning its removal handle.
    pub async fn add(&self, session_id: &str, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.lock().await;
        inner
            .entry(session_id.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove a registration. Unknown session or handle is a no-op.
    /// The session entry itself is dropped once its last listener is gone.
    pub async fn remove(&self, session_id: &str, id: ListenerId) {
        let mut inner = self.inner.lock().await;
        if let Some(listeners) = inner.get_mut(session_id) {
            listeners.retain(|(existing, _)| *existing != id);
            if listeners.is_empty() {
                inner.remove(session_id);
            }
        }
    }

    /// Deliver one event to every listener registered for its session.
    ///
    /// The listener list is snapshotted before dispatch so a callback that
    /// registers or removes listeners never deadlocks against the table.
    pub async fn dispatch(&self, event: &ServerEvent) {
        let listeners: Vec<Arc<dyn EventListener>> = {
            let inner = self.inner.lock().await;
            match inner.get(event.session_id()) {
                Some(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
                None => return,
            }
        };

        metrics::counter!("parley_events_dispatched_total").increment(1);

        for listener in listeners {
            listener.on_event(event).await;
        }
    }

    pub async fn listener_count(&self, session_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .get(session_id)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Whether any listener is registered for the session. An entry is
    /// never retained empty, so this doubles as the empty-set invariant.
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.inner.lock().await.contains_key(session_id)
    }
}
