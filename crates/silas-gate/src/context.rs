//! The JSON-shaped working context threaded through one `check_gates` call.

use serde_json::{Map, Value};

/// Token estimate heuristic shared across the workspace: `max(1, ceil(chars / 3.5))`.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as f64;
    ((chars / 3.5).ceil() as u32).max(1)
}

/// Pull the text a gate should evaluate: `response`, then `message`, then `text`.
#[must_use]
pub fn extract_text(context: &Map<String, Value>, extract_key: Option<&str>) -> String {
    if let Some(key) = extract_key {
        if let Some(Value::String(s)) = context.get(key) {
            return s.clone();
        }
    }
    for key in ["value", "message", "response", "text", "step_output"] {
        if let Some(Value::String(s)) = context.get(key) {
            return s.clone();
        }
    }
    String::new()
}

/// Merge a sanitized mutation into `context`: `tool_args` shallow-merges, others replace.
pub fn merge_mutation(context: &mut Map<String, Value>, mutation: &Map<String, Value>) {
    for (key, value) in mutation {
        if key == "tool_args" {
            if let Value::Object(incoming) = value {
                let existing = context.entry("tool_args").or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(existing_map) = existing {
                    for (k, v) in incoming {
                        existing_map.insert(k.clone(), v.clone());
                    }
                    continue;
                }
            }
        }
        context.insert(key.clone(), value.clone());
    }
}
