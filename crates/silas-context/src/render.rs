//! Rendering context items into the flat text block sent to the LLM.

use silas_core::{ContextItem, Zone};

/// Concatenate `items` (assumed already masked and evicted) in zone order
/// `system -> chronicle -> memory -> workspace`, one header/trailer-wrapped
/// block per item.
#[must_use]
pub fn render(items: &[ContextItem]) -> String {
    let mut blocks = Vec::new();
    for zone in Zone::RENDER_ORDER {
        for item in items.iter().filter(|i| i.zone == zone) {
            blocks.push(render_block(item));
        }
    }
    blocks.join("\n")
}

fn render_block(item: &ContextItem) -> String {
    format!(
        "--- {} | turn {} | {} ---\n{}\n--- end ---",
        item.zone.as_str(),
        item.turn_number,
        item.source,
        item.content
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use silas_core::{ContextKind, Taint};
    use uuid::Uuid;

    fn item(zone: Zone, turn: u64, source: &str, content: &str) -> ContextItem {
        ContextItem {
            ctx_id: Uuid::new_v4(),
            zone,
            content: content.into(),
            tokens: 1,
            created_at: Utc::now(),
            turn_number: turn,
            source: source.into(),
            taint: Taint::Owner,
            kind: ContextKind::Message,
            relevance: 0.5,
            pinned: false,
            masked: false,
            original_tokens: None,
        }
    }

    #[test]
    fn renders_in_zone_order() {
        let items = vec![
            item(Zone::Workspace, 1, "tool", "w"),
            item(Zone::System, 1, "sys", "s"),
            item(Zone::Chronicle, 1, "user", "c"),
        ];
        let out = render(&items);
        let sys_pos = out.find("sys").unwrap();
        let chron_pos = out.find("user").unwrap();
        let work_pos = out.find("tool").unwrap();
        assert!(sys_pos < chron_pos);
        assert!(chron_pos < work_pos);
    }

    #[test]
    fn render_is_idempotent_for_unchanged_state() {
        let items = vec![item(Zone::System, 1, "sys", "s")];
        assert_eq!(render(&items), render(&items));
    }
}
