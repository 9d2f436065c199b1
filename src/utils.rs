// ABOUTME: Small helpers shared across the turn and observer paths.
// ABOUTME: Capped text buffering and sync-response body extraction.

use serde_json::Value;

/// Maximum number of characters an accumulated turn buffer may hold.
pub const TEXT_BUFFER_CAP: usize = 102_400;

/// Suffix appended once a buffer hits the cap.
pub const TRUNCATION_MARKER: &str = "\n\n[output truncated]";

/// Append `delta` to `buffer`, enforcing the character cap.
///
/// Once truncated the buffer is frozen: further appends are dropped.
/// The cap counts characters, not bytes, so a multi-byte boundary can
/// never split a char.
pub fn append_capped(buffer: &mut String, delta: &str) {
    if buffer.ends_with(TRUNCATION_MARKER) {
        return;
    }
    let used = buffer.chars().count();
    if used >= TEXT_BUFFER_CAP {
        buffer.push_str(TRUNCATION_MARKER);
        return;
    }
    let room = TEXT_BUFFER_CAP - used;
    if delta.chars().count() <= room {
        buffer.push_str(delta);
    } else {
        buffer.extend(delta.chars().take(room));
        buffer.push_str(TRUNCATION_MARKER);
    }
}

/// Pull assistant text out of a synchronous message-send response body.
///
/// The server's sync response mirrors a transcript record: `{info, parts}`
/// with text parts under `parts[].text`. Used only on the first-event
/// timeout fallback path; anything unparseable yields `None`.
pub fn extract_sync_text(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let parts = value.get("parts")?.as_array()?;
    let mut text = String::new();
    for part in parts {
        if part.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(body) = part.get("text").and_then(Value::as_str) {
                text.push_str(body);
            }
        }
    }
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
