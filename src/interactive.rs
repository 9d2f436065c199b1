// ABOUTME: Builds interactive card payloads for agent questions and permission prompts.
// ABOUTME: Payload shape is opaque JSON handed to the chat sink as-is.

use serde_json::{json, Value};

use crate::protocol::QuestionItem;

/// Card payload presenting the agent's question(s) with answer buttons.
pub fn question_card_payload(
    session_id: &str,
    request_id: &str,
    questions: &[QuestionItem],
) -> Value {
    let rendered: Vec<Value> = questions
        .iter()
        .map(|q| {
            let options: Vec<Value> = q
                .options
                .iter()
                .map(|o| {
                    json!({
                        "label": o.label,
                        "description": o.description,
                        "value": o.label,
                    })
                })
                .collect();
            json!({
                "header": q.header,
                "question": q.question,
                "options": options,
                "multiple": q.multiple,
                "allowCustom": q.custom,
            })
        })
        .collect();

    json!({
        "kind": "question",
        "requestID": request_id,
        "sessionID": session_id,
        "questions": rendered,
    })
}

/// Card payload presenting a permission prompt with allow/deny choices.
pub fn permission_card_payload(
    session_id: &str,
    request_id: &str,
    permission_type: &str,
    title: &str,
    metadata: &Value,
) -> Value {
    json!({
        "kind": "permission",
        "requestID": request_id,
        "sessionID": session_id,
        "permission": permission_type,
        "title": title,
        "metadata": metadata,
        "options": [
            {"label": "Allow once", "value": "once"},
            {"label": "Always allow", "value": "always"},
            {"label": "Deny", "value": "reject"},
        ],
    })
}
