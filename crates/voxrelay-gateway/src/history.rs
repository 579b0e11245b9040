//! Decoding of `sessions_history` tool results into classified messages.

use chrono::DateTime;
use serde_json::Value;
use voxrelay_types::{HistoryMessage, MessageRules, Role};

/// Locates the message array in a tool result.
///
/// Gateways return it either directly (`result.messages`), under
/// `result.details.messages`, or JSON-encoded inside a text content part.
fn message_array(result: &Value) -> Option<Vec<Value>> {
    if let Some(messages) = result.get("messages").and_then(Value::as_array) {
        return Some(messages.clone());
    }
    if let Some(messages) = result.pointer("/details/messages").and_then(Value::as_array) {
        return Some(messages.clone());
    }
    if let Some(parts) = result.get("content").and_then(Value::as_array) {
        for part in parts {
            let Some(text) = part.get("text").and_then(Value::as_str) else {
                continue;
            };
            if let Ok(inner) = serde_json::from_str::<Value>(text) {
                if let Some(messages) = message_array(&inner) {
                    return Some(messages);
                }
            }
        }
    }
    None
}

/// Extracts the text of a message whose content is a string or an array of
/// typed parts. Non-text parts are ignored.
pub(crate) fn message_text(message: &Value) -> String {
    match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/// Reads the ordering marker: a millisecond timestamp given as a number or
/// an RFC 3339 string.
fn message_marker(message: &Value) -> Option<i64> {
    match message.get("timestamp")? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .parse::<i64>()
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.timestamp_millis())),
        _ => None,
    }
}

/// Decodes and classifies the messages of a history tool result, oldest
/// first. Entries without a timestamp fall back to their 1-based position.
pub fn parse_history(result: &Value, rules: &MessageRules) -> Vec<HistoryMessage> {
    let Some(messages) = message_array(result) else {
        return Vec::new();
    };

    messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let role = Role::from_gateway(
                message.get("role").and_then(Value::as_str).unwrap_or_default(),
            );
            let (kind, text) = rules.classify(role, &message_text(message));
            let timestamp = message_marker(message);
            HistoryMessage {
                role,
                kind,
                text,
                marker: timestamp.unwrap_or(index as i64 + 1),
                positional: timestamp.is_none(),
            }
        })
        .collect()
}

/// Renumbers positional markers in `current` so they continue the numbering
/// of `baseline`, an earlier read of the same session.
///
/// Positions are relative to the fetched window. Once the window is full,
/// every new exchange slides older entries out, and a new reply can land on
/// the position the previous reply held. The slide distance is the smallest
/// offset at which the baseline's tail lines up with the head of `current`.
/// Timestamped entries are left alone.
pub fn align_positions(baseline: &[HistoryMessage], current: &mut [HistoryMessage]) {
    if !current.iter().any(|m| m.positional) {
        return;
    }
    let slide = (0..=baseline.len())
        .find(|&offset| {
            let tail = &baseline[offset..];
            tail.len() <= current.len() && tail.iter().zip(current.iter()).all(|(a, b)| same_entry(a, b))
        })
        .unwrap_or(baseline.len());
    if slide == 0 {
        return;
    }
    for message in current.iter_mut().filter(|m| m.positional) {
        message.marker += slide as i64;
    }
}

fn same_entry(a: &HistoryMessage, b: &HistoryMessage) -> bool {
    a.role == b.role && a.kind == b.kind && a.text == b.text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use voxrelay_types::{AssistantSnapshot, MessageKind};

    #[test]
    fn parses_direct_message_array() {
        let result = json!({
            "messages": [
                { "role": "user", "content": "hi", "timestamp": 100 },
                { "role": "assistant", "content": [
                    { "type": "thinking", "thinking": "..." },
                    { "type": "text", "text": "Hello!" }
                ], "timestamp": 200 }
            ]
        });
        let history = parse_history(&result, &MessageRules::default());
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, MessageKind::Agent);
        assert_eq!(history[1].text, "Hello!");
        assert_eq!(history[1].marker, 200);
    }

    #[test]
    fn parses_details_and_text_wrapped_results() {
        let inner = json!({ "messages": [{ "role": "assistant", "content": "wrapped", "timestamp": 7 }] });
        let wrapped = json!({ "content": [{ "type": "text", "text": inner.to_string() }] });
        let history = parse_history(&wrapped, &MessageRules::default());
        assert_eq!(history[0].text, "wrapped");

        let details = json!({ "details": { "messages": [{ "role": "assistant", "content": "d" }] } });
        let history = parse_history(&details, &MessageRules::default());
        assert_eq!(history[0].text, "d");
        assert_eq!(history[0].marker, 1);
        assert!(history[0].positional);
    }

    #[test]
    fn rfc3339_timestamps_become_millis() {
        let result = json!({ "messages": [
            { "role": "assistant", "content": "a", "timestamp": "2025-01-01T00:00:01Z" }
        ]});
        let history = parse_history(&result, &MessageRules::default());
        assert_eq!(history[0].marker, 1_735_689_601_000);
    }

    #[test]
    fn unrecognised_shapes_yield_nothing() {
        assert!(parse_history(&json!("not json"), &MessageRules::default()).is_empty());
        assert!(parse_history(&json!({ "ok": true }), &MessageRules::default()).is_empty());
    }

    #[test]
    fn snapshot_skips_sentinels_and_echoes() {
        let result = json!({ "messages": [
            { "role": "assistant", "content": "Real answer", "timestamp": 1 },
            { "role": "assistant", "content": "⚡ Real answer", "timestamp": 2 },
            { "role": "assistant", "content": "HEARTBEAT_OK", "timestamp": 3 },
            { "role": "assistant", "content": "NO_REPLY", "timestamp": 4 },
            { "role": "assistant", "content": "MEDIA:/tmp/voice.ogg", "timestamp": 5 }
        ]});
        let history = parse_history(&result, &MessageRules::default());
        assert_eq!(
            AssistantSnapshot::latest(&history),
            AssistantSnapshot::new("Real answer", 1)
        );
    }

    fn untimed(entries: &[(&str, &str)]) -> Vec<HistoryMessage> {
        let messages: Vec<Value> = entries
            .iter()
            .map(|(role, text)| json!({ "role": role, "content": text }))
            .collect();
        parse_history(&json!({ "messages": messages }), &MessageRules::default())
    }

    #[test]
    fn full_window_slide_still_yields_a_newer_reply() {
        let before = untimed(&[
            ("user", "q1"),
            ("assistant", "a1"),
            ("user", "q2"),
            ("assistant", "Old reply"),
        ]);
        let mut after = untimed(&[
            ("user", "q2"),
            ("assistant", "Old reply"),
            ("user", "q3"),
            ("assistant", "New reply"),
        ]);
        let baseline = AssistantSnapshot::latest(&before);
        // Same position the old reply had.
        assert_eq!(AssistantSnapshot::latest(&after).marker, baseline.marker);

        align_positions(&before, &mut after);
        let latest = AssistantSnapshot::latest(&after);
        assert_eq!(latest, AssistantSnapshot::new("New reply", 6));
        assert!(latest.supersedes(&baseline));
    }

    #[test]
    fn slide_without_a_reply_keeps_the_old_marker() {
        let before = untimed(&[("user", "q1"), ("assistant", "a1"), ("user", "q2"), ("assistant", "Old")]);
        let mut after = untimed(&[("assistant", "a1"), ("user", "q2"), ("assistant", "Old"), ("user", "q3")]);
        align_positions(&before, &mut after);
        let latest = AssistantSnapshot::latest(&after);
        assert_eq!(latest, AssistantSnapshot::new("Old", 4));
        assert!(!latest.supersedes(&AssistantSnapshot::latest(&before)));
    }

    #[test]
    fn growing_window_and_timestamps_are_not_shifted() {
        let before = untimed(&[("user", "q1"), ("assistant", "a1")]);
        let mut after = untimed(&[("user", "q1"), ("assistant", "a1"), ("user", "q2"), ("assistant", "a2")]);
        align_positions(&before, &mut after);
        assert_eq!(after.iter().map(|m| m.marker).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let timed = json!({ "messages": [{ "role": "assistant", "content": "x", "timestamp": 50 }] });
        let mut timed = parse_history(&timed, &MessageRules::default());
        align_positions(&before, &mut timed);
        assert_eq!(timed[0].marker, 50);
        assert!(!timed[0].positional);
    }

    #[test]
    fn disjoint_window_counts_as_entirely_new() {
        let before = untimed(&[("user", "q1"), ("assistant", "a1")]);
        let mut after = untimed(&[("user", "q9"), ("assistant", "a9")]);
        align_positions(&before, &mut after);
        assert_eq!(AssistantSnapshot::latest(&after), AssistantSnapshot::new("a9", 4));
    }
}
