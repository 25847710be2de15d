//! Deterministic predicate provider: `string_match`, `regex`, `length`,
//! `keyword`, and `numeric_range` checks against the working context.

use crate::context::{estimate_tokens, extract_text};
use silas_core::{Gate, GateAction, GateLane, GateProvider, GateResult};
use std::collections::HashSet;

/// In-process provider for `check_type in {string_match, regex, length,
/// length_limit, keyword, keywords, numeric_range}`.
#[derive(Debug, Default)]
pub struct PredicateProvider;

fn result(name: &str, action: GateAction, reason: impl Into<String>) -> GateResult {
    GateResult { action, reason: reason.into(), ..GateResult::pass(name, GateLane::Policy) }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase().replace(['-', ' '], "_")
}

impl PredicateProvider {
    fn string_match(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let map = context.as_object().cloned().unwrap_or_default();
        let value = extract_text(&map, gate.extract_key.as_deref());
        let case_sensitive = gate.config.get("case_sensitive").and_then(serde_json::Value::as_bool).unwrap_or(true);
        let compare = if case_sensitive { value.clone() } else { value.to_lowercase() };

        let allowed: HashSet<String> =
            gate.allowed_values.iter().map(|v| if case_sensitive { v.clone() } else { v.to_lowercase() }).collect();
        let approval: HashSet<String> =
            gate.approval_values.iter().map(|v| if case_sensitive { v.clone() } else { v.to_lowercase() }).collect();

        if allowed.contains(&compare) {
            return result(&gate.name, GateAction::Continue, format!("value '{value}' is allowed"));
        }
        if approval.contains(&compare) {
            return result(&gate.name, GateAction::RequireApproval, format!("value '{value}' requires approval"));
        }
        result(&gate.name, GateAction::Block, format!("value '{value}' is blocked"))
    }

    fn regex(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let map = context.as_object().cloned().unwrap_or_default();
        let pattern = gate
            .config
            .get("pattern")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| gate.check.clone());
        if pattern.is_empty() {
            return result(&gate.name, GateAction::Block, "regex pattern is required");
        }
        let compiled = match regex::RegexBuilder::new(&pattern)
            .case_insensitive(gate.config.get("ignore_case").and_then(serde_json::Value::as_bool).unwrap_or(false))
            .multi_line(gate.config.get("multiline").and_then(serde_json::Value::as_bool).unwrap_or(false))
            .build()
        {
            Ok(re) => re,
            Err(e) => return result(&gate.name, GateAction::Block, format!("invalid regex pattern: {e}")),
        };
        let value = extract_text(&map, gate.extract_key.as_deref());
        if compiled.is_match(&value) {
            result(&gate.name, GateAction::Continue, format!("value matched regex '{pattern}'"))
        } else {
            result(&gate.name, GateAction::Block, format!("value did not match regex '{pattern}'"))
        }
    }

    fn length(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let map = context.as_object().cloned().unwrap_or_default();
        let value = extract_text(&map, gate.extract_key.as_deref());
        let char_count = value.chars().count() as u32;
        let token_count = estimate_tokens(&value);

        let bound = |key: &str| gate.config.get(key).and_then(serde_json::Value::as_u64).map(|v| v as u32);
        if let Some(min) = bound("min_chars") {
            if char_count < min {
                return result(&gate.name, GateAction::Block, format!("length chars {char_count} < min_chars {min}"));
            }
        }
        if let Some(max) = bound("max_chars") {
            if char_count > max {
                return result(&gate.name, GateAction::Block, format!("length chars {char_count} > max_chars {max}"));
            }
        }
        if let Some(min) = bound("min_tokens") {
            if token_count < min {
                return result(&gate.name, GateAction::Block, format!("length tokens {token_count} < min_tokens {min}"));
            }
        }
        if let Some(max) = bound("max_tokens") {
            if token_count > max {
                return result(&gate.name, GateAction::Block, format!("length tokens {token_count} > max_tokens {max}"));
            }
        }
        result(&gate.name, GateAction::Continue, format!("length ok chars={char_count} tokens={token_count}"))
    }

    fn keyword(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let map = context.as_object().cloned().unwrap_or_default();
        let text = extract_text(&map, gate.extract_key.as_deref());
        let case_sensitive = gate.config.get("case_sensitive").and_then(serde_json::Value::as_bool).unwrap_or(false);
        let haystack = if case_sensitive { text.clone() } else { text.to_lowercase() };

        let list = |key: &str| -> Vec<String> {
            gate.config
                .get(key)
                .and_then(serde_json::Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        };
        let fold = |tokens: Vec<String>| -> Vec<String> {
            if case_sensitive { tokens } else { tokens.into_iter().map(|t| t.to_lowercase()).collect() }
        };
        let blocked = fold(list("blocked_keywords"));
        let required = fold(list("required_keywords"));

        let hits: Vec<&str> = blocked.iter().filter(|k| haystack.contains(k.as_str())).map(String::as_str).collect();
        if !hits.is_empty() {
            return result(&gate.name, GateAction::Block, format!("blocked keywords found: {}", hits.join(", ")));
        }
        let missing: Vec<&str> = required.iter().filter(|k| !haystack.contains(k.as_str())).map(String::as_str).collect();
        if !missing.is_empty() {
            return result(
                &gate.name,
                GateAction::RequireApproval,
                format!("required keywords missing: {}", missing.join(", ")),
            );
        }
        result(&gate.name, GateAction::Continue, "keyword checks passed")
    }

    fn numeric_range(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let map = context.as_object().cloned().unwrap_or_default();
        let raw = extract_text(&map, gate.extract_key.as_deref());
        let value: f64 = match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => return result(&gate.name, GateAction::Block, format!("value is not numeric: '{raw}'")),
        };
        if let (Some(min), Some(max)) = (gate.min_value, gate.max_value) {
            if value < min || value > max {
                return result(&gate.name, GateAction::Block, format!("value {value} outside [{min}, {max}]"));
            }
        }
        result(&gate.name, GateAction::Continue, format!("value {value} within range"))
    }
}

impl GateProvider for PredicateProvider {
    fn check(&self, gate: &Gate, context: &serde_json::Value) -> Result<GateResult, String> {
        let check_name = normalize(if gate.check.is_empty() { &gate.check_type } else { &gate.check });
        Ok(match check_name.as_str() {
            "string_match" => self.string_match(gate, context),
            "regex" => self.regex(gate, context),
            "length" | "length_limit" => self.length(gate, context),
            "keyword" | "keywords" => self.keyword(gate, context),
            "numeric_range" => self.numeric_range(gate, context),
            other => result(&gate.name, GateAction::Block, format!("unknown predicate check: {other}")),
        })
    }
}
