//! Observation masking: `tool_result` items older than
//! `mask_after_turns` are replaced with a stable placeholder. Idempotent —
//! applying it twice leaves an already-masked item untouched (R-2).

use silas_core::{ContextItem, ContextKind};

/// Mask `item` in place if it is a stale, unmasked `tool_result`. Returns
/// `true` if the item was mutated.
pub fn mask_if_stale(item: &mut ContextItem, current_turn: u64, mask_after_turns: u64) -> bool {
    if item.kind != ContextKind::ToolResult || item.masked {
        return false;
    }
    let age = current_turn.saturating_sub(item.turn_number);
    if age <= mask_after_turns {
        return false;
    }

    let original_tokens = item.tokens;
    item.content = placeholder(&item.source, original_tokens);
    item.original_tokens = Some(original_tokens);
    item.tokens = estimate_tokens(&item.content);
    item.masked = true;
    true
}

fn placeholder(source: &str, original_tokens: u32) -> String {
    format!("[Result of {source} — {original_tokens} tokens — see memory for details]")
}

/// Shared char-count token estimate heuristic: `max(1, ceil(chars / 3.5))`.
#[must_use]
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as f64;
    ((chars / 3.5).ceil() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn tool_result_item(turn: u64) -> ContextItem {
        ContextItem {
            ctx_id: Uuid::new_v4(),
            zone: silas_core::Zone::Workspace,
            content: "some tool output".into(),
            tokens: 10,
            created_at: Utc::now(),
            turn_number: turn,
            source: "bash".into(),
            taint: silas_core::Taint::Owner,
            kind: ContextKind::ToolResult,
            relevance: 0.5,
            pinned: false,
            masked: false,
            original_tokens: None,
        }
    }

    #[test]
    fn masks_when_older_than_threshold() {
        let mut item = tool_result_item(1);
        assert!(mask_if_stale(&mut item, 10, 5));
        assert!(item.masked);
        assert!(item.content.starts_with("[Result of bash"));
        assert_eq!(item.original_tokens, Some(10));
    }

    #[test]
    fn does_not_mask_when_recent() {
        let mut item = tool_result_item(9);
        assert!(!mask_if_stale(&mut item, 10, 5));
        assert!(!item.masked);
    }

    #[test]
    fn idempotent_second_call_is_noop() {
        let mut item = tool_result_item(1);
        assert!(mask_if_stale(&mut item, 10, 5));
        let content_after_first = item.content.clone();
        assert!(!mask_if_stale(&mut item, 10, 5));
        assert_eq!(item.content, content_after_first);
    }

    #[test]
    fn non_tool_result_items_are_never_masked() {
        let mut item = tool_result_item(1);
        item.kind = ContextKind::Message;
        assert!(!mask_if_stale(&mut item, 10, 5));
    }
}
