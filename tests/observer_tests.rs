// ABOUTME: Integration tests for the Cross-Turn Observer
// ABOUTME: Owned-message exclusion, busy suppression, idle flushing, and teardown

mod common;

use std::sync::Arc;

use common::RecordingChatSink;
use parley::context::BridgeContext;
use parley::observer::CrossTurnObserver;
use parley::protocol::{parse_event, ServerEvent};
use parley::registry::ListenerRegistry;

struct Harness {
    registry: ListenerRegistry,
    chat: Arc<RecordingChatSink>,
    observer: CrossTurnObserver,
}

async fn harness() -> Harness {
    let registry = ListenerRegistry::new();
    let context = BridgeContext::new();
    context.owned_sessions.insert("s1").await;
    let chat = Arc::new(RecordingChatSink::default());
    let observer = CrossTurnObserver::new(
        registry.clone(),
        chat.clone(),
        context.owned_sessions.clone(),
        context.owned_messages.clone(),
        context.busy_sessions.clone(),
        context.seen_requests.clone(),
    );
    observer.observe("s1").await;
    Harness {
        registry,
        chat,
        observer,
    }
}

fn delta(session: &str, message: &str, text: &str) -> ServerEvent {
    parse_event(&format!(
        r#"{{"type":"message.part.delta","properties":{{"sessionID":"{session}","messageID":"{message}","partID":"p1","field":"text","delta":"{text}"}}}}"#
    ))
    .expect("parse")
}

fn idle(session: &str) -> ServerEvent {
    parse_event(&format!(
        r#"{{"type":"session.idle","properties":{{"sessionID":"{session}"}}}}"#
    ))
    .expect("parse")
}

#[tokio::test]
async fn test_external_activity_flushed_on_idle() {
    let h = harness().await;

    h.registry.dispatch(&delta("s1", "ext_1", "typed ")).await;
    h.registry.dispatch(&delta("s1", "ext_1", "locally")).await;
    h.registry.dispatch(&delta("s1", "ext_2", "other")).await;
    assert!(h.chat.texts.lock().await.is_empty());

    h.registry.dispatch(&idle("s1")).await;
    let mut texts = h.chat.texts.lock().await.clone();
    texts.sort();
    assert_eq!(texts, vec!["other".to_string(), "typed locally".to_string()]);

    // Buffers cleared: a second idle flushes nothing further.
    h.registry.dispatch(&idle("s1")).await;
    assert_eq!(h.chat.texts.lock().await.len(), 2);
}

#[tokio::test]
async fn test_owned_message_excluded_and_purged() {
    let h = harness().await;

    // Buffered before the message becomes attributed to a local turn.
    h.registry.dispatch(&delta("s1", "m_owned", "partial")).await;
    h.observer.mark_owned("m_owned").await;

    // The next owned event purges the stale buffer entry.
    h.registry.dispatch(&delta("s1", "m_owned", "more")).await;
    h.registry.dispatch(&idle("s1")).await;

    assert!(h.chat.texts.lock().await.is_empty());
}

#[tokio::test]
async fn test_busy_window_suppresses_and_discards() {
    let h = harness().await;

    h.registry.dispatch(&delta("s1", "ext_1", "before-busy")).await;
    h.observer.mark_session_busy("s1").await;

    // Ignored outright while busy.
    h.registry.dispatch(&delta("s1", "ext_2", "during-busy")).await;
    h.registry.dispatch(&idle("s1")).await;
    assert!(h.chat.texts.lock().await.is_empty());

    // Freeing discards the stale pre-free buffer; fresh activity flows.
    h.observer.mark_session_free("s1").await;
    h.registry.dispatch(&delta("s1", "ext_3", "after-free")).await;
    h.registry.dispatch(&idle("s1")).await;

    assert_eq!(*h.chat.texts.lock().await, vec!["after-free".to_string()]);
}

#[tokio::test]
async fn test_stop_detaches_listeners_and_clears_state() {
    let h = harness().await;

    h.registry.dispatch(&delta("s1", "ext_1", "pending")).await;
    h.observer.stop().await;
    assert!(!h.registry.has_session("s1").await);

    // Nothing buffered survives; dispatch after stop reaches nobody.
    h.registry.dispatch(&idle("s1")).await;
    assert!(h.chat.texts.lock().await.is_empty());
}

#[tokio::test]
async fn test_permission_prompt_rendered_once_across_paths() {
    let h = harness().await;

    let permission = parse_event(
        r#"{"type":"permission.asked","properties":{"id":"perm_1","sessionID":"s1",
            "permission":"bash","title":"Run shell command","metadata":{"command":"ls"}}}"#,
    )
    .expect("parse");
    h.registry.dispatch(&permission).await;
    h.registry.dispatch(&permission).await;

    let cards = h.chat.cards.lock().await;
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0]["kind"], "permission");
    assert_eq!(cards[0]["requestID"], "perm_1");
}
