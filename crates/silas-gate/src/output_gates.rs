//! Built-in output gates: `taint_ceiling`, `length_limit`,
//! `pii_marker`, plus the shared escalation policy for policy-lane blocks.

use crate::context::estimate_tokens;
use silas_core::{Escalation, Gate, GateAction, GateLane, GateResult, Taint};
use std::sync::OnceLock;

const DEFAULT_BLOCK_MESSAGE: &str = "I cannot share that";

fn email_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("static regex"))
}

fn phone_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"\b(?:\+?\d{1,2}[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)\d{3}[-.\s]?\d{4}\b").expect("static regex")
    })
}

fn api_key_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\bsk-[A-Za-z0-9]{16,}\b").expect("static regex"))
}

fn taint_rank(t: Taint) -> u8 {
    match t {
        Taint::Owner => 0,
        Taint::Auth => 1,
        Taint::External => 2,
    }
}

fn parse_taint(raw: &str) -> Option<Taint> {
    match raw.trim().to_lowercase().as_str() {
        "owner" => Some(Taint::Owner),
        "auth" => Some(Taint::Auth),
        "external" => Some(Taint::External),
        _ => None,
    }
}

fn taint_label(t: Taint) -> &'static str {
    match t {
        Taint::Owner => "owner",
        Taint::Auth => "auth",
        Taint::External => "external",
    }
}

fn continue_result(name: &str, reason: impl Into<String>) -> GateResult {
    GateResult { reason: reason.into(), ..GateResult::pass(name, GateLane::Policy) }
}

fn block_result(name: &str, reason: impl Into<String>) -> GateResult {
    GateResult { action: GateAction::Block, reason: reason.into(), ..GateResult::pass(name, GateLane::Policy) }
}

/// Blocks if `response_taint` exceeds the configured threshold (default `external`).
#[must_use]
pub fn taint_ceiling(gate: &Gate, response_taint: Taint) -> GateResult {
    let raw_threshold = gate
        .config
        .get("threshold")
        .or_else(|| gate.config.get("max_taint"))
        .or_else(|| gate.config.get("taint_ceiling"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or("external");
    let Some(threshold) = parse_taint(raw_threshold) else {
        return continue_result(&gate.name, format!("invalid taint threshold: '{raw_threshold}'"));
    };
    if taint_rank(response_taint) > taint_rank(threshold) {
        return block_result(
            &gate.name,
            format!("response taint {} exceeds threshold {}", taint_label(response_taint), taint_label(threshold)),
        );
    }
    continue_result(
        &gate.name,
        format!("response taint {} within threshold {}", taint_label(response_taint), taint_label(threshold)),
    )
}

/// `truncate` (default), `warn`, or `block` once `response_text` exceeds `max_tokens`.
#[must_use]
pub fn length_limit(gate: &Gate, response_text: &str) -> GateResult {
    let Some(max_tokens) = gate.config.get("max_tokens").and_then(serde_json::Value::as_u64).map(|v| v as u32) else {
        return continue_result(&gate.name, "invalid max_tokens");
    };
    if max_tokens == 0 {
        return continue_result(&gate.name, "invalid max_tokens");
    }
    let token_count = estimate_tokens(response_text);
    if token_count <= max_tokens {
        return continue_result(&gate.name, format!("response length {token_count} <= limit {max_tokens}"));
    }

    let mode = gate.config.get("mode").and_then(serde_json::Value::as_str).unwrap_or("truncate");
    match mode {
        "warn" => GateResult {
            flags: vec!["warn".into(), "length_exceeded".into()],
            ..continue_result(&gate.name, format!("response length {token_count} exceeds limit {max_tokens}"))
        },
        "block" => block_result(&gate.name, format!("response length {token_count} exceeds limit {max_tokens}")),
        _ => {
            let truncated = truncate_to_token_limit(response_text, max_tokens);
            let mut context = serde_json::Map::new();
            context.insert("response".to_string(), serde_json::Value::String(truncated));
            GateResult {
                flags: vec!["warn".into(), "length_exceeded".into(), "truncated".into()],
                modified_context: Some(context),
                ..continue_result(
                    &gate.name,
                    format!("response length {token_count} truncated to <= {max_tokens} tokens"),
                )
            }
        }
    }
}

fn truncate_to_token_limit(text: &str, max_tokens: u32) -> String {
    if estimate_tokens(text) <= max_tokens {
        return text.to_string();
    }
    let max_chars = ((max_tokens as f64 * 3.5) as usize).max(1);
    let mut truncated: String = text.chars().take(max_chars).collect();
    while !truncated.is_empty() && estimate_tokens(&truncated) > max_tokens {
        truncated.pop();
    }
    truncated
}

/// Flags (and, if explicitly escalated, blocks) on email/phone matches.
#[must_use]
pub fn pii_marker(gate: &Gate, response_text: &str) -> GateResult {
    let has_email = email_re().is_match(response_text);
    let has_phone = phone_re().is_match(response_text);
    if !has_email && !has_phone {
        return continue_result(&gate.name, "no PII marker detected");
    }

    let mut flags = vec!["warn".to_string(), "pii_detected".to_string()];
    let mut kinds = Vec::new();
    if has_email {
        flags.push("pii_email".into());
        kinds.push("email");
    }
    if has_phone {
        flags.push("pii_phone".into());
        kinds.push("phone");
    }
    let reason = format!("PII markers detected: {}", kinds.join(", "));

    if has_explicit_escalation(gate) {
        return GateResult { flags, ..block_result(&gate.name, reason) };
    }
    GateResult { flags, ..continue_result(&gate.name, reason) }
}

fn has_explicit_escalation(gate: &Gate) -> bool {
    !matches!(gate.on_block, Escalation::BlockWithMessage { message: None })
}

fn redact(text: &str) -> String {
    let redacted = email_re().replace_all(text, "[REDACTED_EMAIL]");
    let redacted = phone_re().replace_all(&redacted, "[REDACTED_PHONE]");
    api_key_re().replace_all(&redacted, "[REDACTED_KEY]").into_owned()
}

fn escalation_tag(escalation: &Escalation) -> &'static str {
    match escalation {
        Escalation::Redact => "redact",
        Escalation::RequireApproval => "require_approval",
        Escalation::LogAndPass => "log_and_pass",
        Escalation::BlockWithMessage { .. } => "block_with_message",
    }
}

/// Apply the resolved [`Escalation`] to a blocked policy-lane result.
#[must_use]
pub fn apply_escalation(escalation: &Escalation, result: GateResult, response_text: &str) -> GateResult {
    let mut flags = result.flags.clone();
    flags.push(format!("escalation:{}", escalation_tag(escalation)));
    flags.sort();
    flags.dedup();

    match escalation {
        Escalation::Redact => {
            let mut context = serde_json::Map::new();
            context.insert("response".to_string(), serde_json::Value::String(redact(response_text)));
            GateResult {
                action: GateAction::Continue,
                reason: format!("{} (redacted)", result.reason),
                flags,
                modified_context: Some(context),
                ..result
            }
        }
        Escalation::RequireApproval => {
            let mut context = serde_json::Map::new();
            context.insert("response".to_string(), serde_json::Value::String(DEFAULT_BLOCK_MESSAGE.to_string()));
            GateResult {
                action: GateAction::RequireApproval,
                reason: format!("{} (approval required)", result.reason),
                flags,
                modified_context: Some(context),
                ..result
            }
        }
        Escalation::LogAndPass => {
            flags.push("warn".to_string());
            flags.push("logged_violation".to_string());
            flags.sort();
            flags.dedup();
            GateResult { action: GateAction::Continue, reason: format!("{} (logged and passed)", result.reason), flags, ..result }
        }
        Escalation::BlockWithMessage { message } => {
            let msg = message.clone().unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_string());
            let mut context = serde_json::Map::new();
            context.insert("response".to_string(), serde_json::Value::String(msg));
            GateResult {
                action: GateAction::Block,
                reason: format!("{} (blocked)", result.reason),
                flags,
                modified_context: Some(context),
                ..result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_gate(check_type: &str) -> Gate {
        Gate {
            name: "g".into(),
            trigger: silas_core::GateTrigger::EveryAgentResponse,
            after_step: None,
            provider: silas_core::GateProviderKind::Custom,
            check_type: check_type.into(),
            check: String::new(),
            config: HashMap::new(),
            extract_key: None,
            allowed_values: Vec::new(),
            approval_values: Vec::new(),
            min_value: None,
            max_value: None,
            on_block: Escalation::default(),
            promote_to_policy: false,
        }
    }

    #[test]
    fn taint_ceiling_blocks_when_exceeded() {
        let mut gate = base_gate("taint_ceiling");
        gate.config.insert("threshold".into(), serde_json::json!("auth"));
        let out = taint_ceiling(&gate, Taint::External);
        assert_eq!(out.action, GateAction::Block);
    }

    #[test]
    fn pii_marker_flags_email_without_explicit_escalation() {
        let gate = base_gate("pii_marker");
        let out = pii_marker(&gate, "contact me at a@b.com");
        assert_eq!(out.action, GateAction::Continue);
        assert!(out.flags.contains(&"pii_email".to_string()));
    }

    #[test]
    fn length_limit_truncates_by_default() {
        let mut gate = base_gate("length_limit");
        gate.config.insert("max_tokens".into(), serde_json::json!(3));
        let out = length_limit(&gate, &"word ".repeat(50));
        assert!(out.flags.contains(&"truncated".to_string()));
        assert!(out.modified_context.is_some());
    }

    #[test]
    fn redact_escalation_masks_email() {
        let gate = base_gate("pii_marker");
        let blocked = block_result(&gate.name, "PII markers detected: email");
        let out = apply_escalation(&Escalation::Redact, blocked, "email me at a@b.com");
        assert_eq!(out.action, GateAction::Continue);
        assert!(out.flags.contains(&"escalation:redact".to_string()));
        let response = out.modified_context.unwrap()["response"].as_str().unwrap().to_string();
        assert!(response.contains("[REDACTED_EMAIL]"));
    }

    #[test]
    fn every_escalation_branch_records_its_flag() {
        let gate = base_gate("pii_marker");
        for (escalation, tag) in [
            (Escalation::Redact, "redact"),
            (Escalation::RequireApproval, "require_approval"),
            (Escalation::LogAndPass, "log_and_pass"),
            (Escalation::BlockWithMessage { message: None }, "block_with_message"),
        ] {
            let blocked = block_result(&gate.name, "PII markers detected: email");
            let out = apply_escalation(&escalation, blocked, "email me at a@b.com");
            assert!(out.flags.contains(&format!("escalation:{tag}")), "missing escalation flag for {tag}");
        }
    }
}
