// ABOUTME: Integration tests for event classification
// ABOUTME: Ownership filtering across all event kinds and tool-state field surfacing

use parley::classifier::{Action, Classifier, ToolPhase};
use parley::context::OwnedSessions;
use parley::protocol::parse_event;

async fn classifier_owning(sessions: &[&str]) -> Classifier {
    let owned = OwnedSessions::default();
    for session in sessions {
        owned.insert(session).await;
    }
    Classifier::new(owned)
}

// =============================================================================
// Ownership filter
// =============================================================================

#[tokio::test]
async fn test_foreign_session_rejected_for_every_event_kind() {
    let mut classifier = classifier_owning(&["mine"]).await;

    let raw_events = [
        r#"{"type":"message.part.updated","properties":{"sessionID":"theirs","part":{"type":"text","text":"hi"}}}"#,
        r#"{"type":"message.part.delta","properties":{"sessionID":"theirs","partID":"p1","field":"text","delta":"hi"}}"#,
        r#"{"type":"session.status","properties":{"sessionID":"theirs","status":{"type":"busy"}}}"#,
        r#"{"type":"session.idle","properties":{"sessionID":"theirs"}}"#,
        r#"{"type":"question.asked","properties":{"id":"q1","sessionID":"theirs","questions":[]}}"#,
        r#"{"type":"permission.asked","properties":{"id":"perm1","sessionID":"theirs","permission":"bash"}}"#,
    ];

    for raw in raw_events {
        let event = parse_event(raw).expect("parse");
        assert!(
            classifier.classify(&event).await.is_none(),
            "foreign event leaked: {raw}"
        );
    }
}

#[tokio::test]
async fn test_owned_session_passes_filter() {
    let mut classifier = classifier_owning(&["mine"]).await;
    let event = parse_event(
        r#"{"type":"message.part.delta","properties":{"sessionID":"mine","partID":"p1","field":"text","delta":"hi"}}"#,
    )
    .expect("parse");
    let action = classifier.classify(&event).await.expect("action");
    assert!(matches!(action, Action::TextDelta { .. }));
    assert_eq!(action.session(), "mine");
}

// =============================================================================
// Tool-state field asymmetry
// =============================================================================

#[tokio::test]
async fn test_bare_pending_tool_state_surfaces_no_extra_fields() {
    let mut classifier = classifier_owning(&["s1"]).await;
    let event = parse_event(
        r#"{"type":"message.part.updated","properties":{"sessionID":"s1","part":{
            "type":"tool","tool":"bash","state":{"status":"pending"}}}}"#,
    )
    .expect("parse");

    let action = classifier.classify(&event).await.expect("action");
    let Action::ToolStateChange {
        tool,
        phase,
        input,
        output,
        error,
        title,
        ..
    } = action
    else {
        panic!("wrong action");
    };
    assert_eq!(tool, "bash");
    assert_eq!(phase, ToolPhase::Pending);
    // Absent on the wire means absent in the action, not empty.
    assert!(input.is_none());
    assert!(output.is_none());
    assert!(error.is_none());
    assert!(title.is_none());
}

#[tokio::test]
async fn test_completed_tool_state_carries_what_arrived() {
    let mut classifier = classifier_owning(&["s1"]).await;
    let event = parse_event(
        r#"{"type":"message.part.updated","properties":{"sessionID":"s1","part":{
            "type":"tool","tool":"bash","state":{
                "status":"completed","input":{"command":"ls"},"output":"a.txt","title":"list files"}}}}"#,
    )
    .expect("parse");

    let action = classifier.classify(&event).await.expect("action");
    let Action::ToolStateChange {
        phase,
        input,
        output,
        error,
        title,
        ..
    } = action
    else {
        panic!("wrong action");
    };
    assert_eq!(phase, ToolPhase::Completed);
    assert_eq!(input.unwrap()["command"], "ls");
    assert_eq!(output.as_deref(), Some("a.txt"));
    assert!(error.is_none());
    assert_eq!(title.as_deref(), Some("list files"));
}

#[tokio::test]
async fn test_error_tool_state_surfaces_error_only() {
    let mut classifier = classifier_owning(&["s1"]).await;
    let event = parse_event(
        r#"{"type":"message.part.updated","properties":{"sessionID":"s1","part":{
            "type":"tool","tool":"bash","state":{"status":"error","error":"exit 1"}}}}"#,
    )
    .expect("parse");

    let action = classifier.classify(&event).await.expect("action");
    let Action::ToolStateChange {
        phase,
        output,
        error,
        ..
    } = action
    else {
        panic!("wrong action");
    };
    assert_eq!(phase, ToolPhase::Error);
    assert!(output.is_none());
    assert_eq!(error.as_deref(), Some("exit 1"));
}

#[tokio::test]
async fn test_tool_without_state_or_name_is_dropped() {
    let mut classifier = classifier_owning(&["s1"]).await;

    let no_state = parse_event(
        r#"{"type":"message.part.updated","properties":{"sessionID":"s1","part":{"type":"tool","tool":"bash"}}}"#,
    )
    .expect("parse");
    assert!(classifier.classify(&no_state).await.is_none());

    let no_name = parse_event(
        r#"{"type":"message.part.updated","properties":{"sessionID":"s1","part":{"type":"tool","state":{"status":"running"}}}}"#,
    )
    .expect("parse");
    assert!(classifier.classify(&no_name).await.is_none());
}
