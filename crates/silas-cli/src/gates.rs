//! Translates [`GatesConfig`] into the built-in output [`Gate`]s the
//! orchestrator precompiles into every turn.

use silas_config::types::GatesConfig;
use silas_core::{Escalation, Gate, GateProviderKind, GateTrigger};
use std::collections::HashMap;

fn output_gate(name: &str, check_type: &str, config: HashMap<String, serde_json::Value>, on_block: Escalation) -> Gate {
    Gate {
        name: name.to_string(),
        trigger: GateTrigger::EveryAgentResponse,
        after_step: None,
        provider: GateProviderKind::Predicate,
        check_type: check_type.to_string(),
        check: String::new(),
        config,
        extract_key: None,
        allowed_values: Vec::new(),
        approval_values: Vec::new(),
        min_value: None,
        max_value: None,
        on_block,
        promote_to_policy: true,
    }
}

/// Build the three built-in output gates (`taint_ceiling`, `length_limit`,
/// `pii_marker`) from config. `pii_escalation` of `None` omits the PII gate
/// entirely rather than running it with a meaningless escalation.
#[must_use]
pub fn build_system_gates(cfg: &GatesConfig) -> Vec<Gate> {
    let mut gates = vec![
        output_gate(
            "taint_ceiling",
            "taint_ceiling",
            HashMap::from([("threshold".to_string(), serde_json::Value::String(cfg.taint_ceiling.clone()))]),
            Escalation::BlockWithMessage { message: None },
        ),
        output_gate(
            "length_limit",
            "length_limit",
            HashMap::from([
                ("max_tokens".to_string(), serde_json::json!(cfg.length_limit_tokens)),
                ("mode".to_string(), serde_json::Value::String(cfg.length_limit_mode.clone())),
            ]),
            Escalation::BlockWithMessage { message: None },
        ),
    ];

    if let Some(escalation) = cfg.pii_escalation.as_deref() {
        let on_block = match escalation {
            "redact" => Escalation::Redact,
            "require_approval" => Escalation::RequireApproval,
            "warn" => Escalation::LogAndPass,
            // Any other value (including "block") escalates to a hard block; the
            // message must be explicit or `pii_marker` treats it as unconfigured.
            _ => Escalation::BlockWithMessage { message: Some("I cannot share that".to_string()) },
        };
        gates.push(output_gate("pii_marker", "pii_marker", HashMap::new(), on_block));
    }

    gates
}
