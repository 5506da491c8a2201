//! Sanitizing caller-supplied conversation history

use serde_json::Value;

use crate::types::{ChatTurn, Role};

/// Convert untrusted history into well-formed turns
///
/// Anything other than an array yields an empty history. Entries without
/// a known string `role` and a string `content` are dropped.
pub fn sanitize_history(raw: &Value) -> Vec<ChatTurn> {
    let Some(entries) = raw.as_array() else {
        if !raw.is_null() {
            tracing::debug!("history is not an array, starting empty");
        }
        return Vec::new();
    };

    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let turn = parse_turn(entry);
            if turn.is_none() {
                tracing::debug!(index, "dropping malformed history entry");
            }
            turn
        })
        .collect()
}

fn parse_turn(entry: &Value) -> Option<ChatTurn> {
    let role = match entry.get("role")?.as_str()? {
        "user" => Role::User,
        // "model" is the Gemini spelling
        "assistant" | "model" => Role::Assistant,
        "system" => Role::System,
        _ => return None,
    };
    let content = entry.get("content")?.as_str()?;

    Some(ChatTurn::new(role, content))
}
