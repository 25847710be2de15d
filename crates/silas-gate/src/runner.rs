//! The two-lane gate runner: precompilation, matching, evaluation, mutation
//! sanitization, and output-gate escalation.

use crate::context::merge_mutation;
use crate::output_gates;
use crate::registry::GateRegistry;
use silas_core::{Escalation, Gate, GateAction, GateLane, GateProvider, GateResult, GateTrigger, Taint, ALLOWED_MUTATION_KEYS};
use std::collections::HashMap;
use std::sync::Mutex;

/// Evaluates gates in two lanes, sanitizing policy-lane mutations and
/// coercing quality-lane verdicts to advisory-only.
pub struct GateRunner {
    registry: GateRegistry,
    escalation_overrides: HashMap<String, Escalation>,
    quality_log: Mutex<Vec<GateResult>>,
    rejected_mutations: Mutex<Vec<(String, String)>>,
}

impl GateRunner {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = GateRegistry::new();
        registry.register("predicate", Box::new(crate::predicate::PredicateProvider));
        GateRunner {
            registry,
            escalation_overrides: HashMap::new(),
            quality_log: Mutex::new(Vec::new()),
            rejected_mutations: Mutex::new(Vec::new()),
        }
    }

    /// Register an additional provider (script/llm/guardrails/custom), case-insensitive by `name`.
    pub fn register_provider(&mut self, name: impl Into<String>, provider: Box<dyn GateProvider>) {
        self.registry.register(name, provider);
    }

    /// Override the resolved escalation for a specific gate name, taking
    /// priority over that gate's own `on_block` field.
    pub fn set_escalation_override(&mut self, gate_name: impl Into<String>, escalation: Escalation) {
        self.escalation_overrides.insert(gate_name.into(), escalation);
    }

    #[must_use]
    pub fn quality_log(&self) -> Vec<GateResult> {
        self.quality_log.lock().expect("quality log mutex poisoned").clone()
    }

    #[must_use]
    pub fn rejected_mutations(&self) -> Vec<(String, String)> {
        self.rejected_mutations.lock().expect("rejected mutations mutex poisoned").clone()
    }

    /// Deep-copy merge: work-item gates appended after system gates.
    #[must_use]
    pub fn precompile_turn_gates(&self, system_gates: &[Gate], work_item_gates: &[Gate]) -> Vec<Gate> {
        let mut compiled: Vec<Gate> = system_gates.to_vec();
        compiled.extend(work_item_gates.iter().cloned());
        compiled
    }

    /// Identical merge used for execution-time (work-item step) gates.
    #[must_use]
    pub fn precompile_execution_gates(&self, system_gates: &[Gate], work_item_gates: &[Gate]) -> Vec<Gate> {
        self.precompile_turn_gates(system_gates, work_item_gates)
    }

    fn matching_gates<'a>(&self, gates: &'a [Gate], trigger: GateTrigger, step_index: Option<u32>) -> Vec<&'a Gate> {
        gates
            .iter()
            .filter(|g| {
                if g.trigger != trigger {
                    return false;
                }
                if trigger == GateTrigger::AfterStep {
                    return step_index.is_none_or(|idx| g.after_step == Some(idx));
                }
                true
            })
            .collect()
    }

    fn run_provider(&self, gate: &Gate, context: &serde_json::Value) -> GateResult {
        let provider_name = gate.check_type.to_lowercase();
        let Some(provider) = self.registry.get(&provider_name) else {
            return GateResult { action: GateAction::Block, reason: format!("no provider: {provider_name}"), ..GateResult::pass(gate.name.as_str(), GateLane::Policy) };
        };
        match provider.check(gate, context) {
            Ok(result) => result,
            Err(e) => GateResult {
                action: GateAction::Block,
                reason: format!("provider '{provider_name}' failed: {e}"),
                flags: vec!["provider_error".to_string()],
                ..GateResult::pass(gate.name.as_str(), GateLane::Policy)
            },
        }
    }

    fn normalize_policy(&self, gate: &Gate, mut result: GateResult) -> GateResult {
        if result.lane != GateLane::Policy {
            result.flags.push("lane_coerced_policy".to_string());
        }
        result.lane = GateLane::Policy;
        result.gate_name = gate.name.clone();
        result
    }

    fn normalize_quality(&self, gate: &Gate, result: GateResult) -> GateResult {
        let mut flags = result.flags;
        let mut reason = result.reason;
        if result.action != GateAction::Continue {
            flags.push("quality_lane_violation".to_string());
            reason = format!("{reason} (quality action overridden to continue)");
        }
        if result.modified_context.is_some() {
            flags.push("quality_mutation_ignored".to_string());
        }
        flags.sort();
        flags.dedup();
        GateResult {
            gate_name: gate.name.clone(),
            lane: GateLane::Quality,
            action: GateAction::Continue,
            reason,
            value: result.value,
            score: result.score,
            flags,
            modified_context: None,
        }
    }

    fn sanitize_mutation(&self, gate: &Gate, mut result: GateResult) -> (GateResult, Option<serde_json::Map<String, serde_json::Value>>) {
        let Some(mutation) = result.modified_context.take() else {
            return (result, None);
        };
        let mut allowed = serde_json::Map::new();
        for (key, value) in mutation {
            if ALLOWED_MUTATION_KEYS.contains(&key.as_str()) {
                allowed.insert(key, value);
            } else {
                self.rejected_mutations.lock().expect("rejected mutations mutex poisoned").push((gate.name.clone(), key.clone()));
                result.flags.push(format!("rejected_mutation:{key}"));
            }
        }
        let allowed = if allowed.is_empty() { None } else { Some(allowed) };
        result.modified_context = allowed.clone();
        (result, allowed)
    }

    /// Evaluate `gates` matching `trigger` against `context`: policy lane
    /// first (mutations merged as they apply), then quality lane (advisory
    /// only). Returns `(policy_results, quality_results, merged_context)`.
    pub fn check_gates(
        &self,
        gates: &[Gate],
        trigger: GateTrigger,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> (Vec<GateResult>, Vec<GateResult>, serde_json::Map<String, serde_json::Value>) {
        let matched = self.matching_gates(gates, trigger, None);
        let mut working_context = context.clone();

        let mut policy_results = Vec::new();
        for gate in matched.iter().filter(|g| g.lane() == GateLane::Policy) {
            let raw = self.run_provider(gate, &serde_json::Value::Object(working_context.clone()));
            let normalized = self.normalize_policy(gate, raw);
            let (sanitized, mutation) = self.sanitize_mutation(gate, normalized);
            if let Some(mutation) = &mutation {
                merge_mutation(&mut working_context, mutation);
            }
            policy_results.push(sanitized);
        }

        let mut quality_results = Vec::new();
        for gate in matched.iter().filter(|g| g.lane() == GateLane::Quality) {
            let raw = self.run_provider(gate, &serde_json::Value::Object(working_context.clone()));
            quality_results.push(self.normalize_quality(gate, raw));
        }

        self.quality_log.lock().expect("quality log mutex poisoned").extend(quality_results.clone());
        (policy_results, quality_results, working_context)
    }

    /// Specialization of `check_gates` that additionally filters by
    /// `after_step == step_index` and stamps `step_index` into the context.
    pub fn check_after_step(
        &self,
        gates: &[Gate],
        step_index: u32,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> (Vec<GateResult>, Vec<GateResult>, serde_json::Map<String, serde_json::Value>) {
        let matched = self.matching_gates(gates, GateTrigger::AfterStep, Some(step_index));
        let mut working_context = context.clone();
        working_context.insert("step_index".to_string(), serde_json::Value::from(step_index));

        let mut policy_results = Vec::new();
        for gate in matched.iter().filter(|g| g.lane() == GateLane::Policy) {
            let raw = self.run_provider(gate, &serde_json::Value::Object(working_context.clone()));
            let normalized = self.normalize_policy(gate, raw);
            let (sanitized, mutation) = self.sanitize_mutation(gate, normalized);
            if let Some(mutation) = &mutation {
                merge_mutation(&mut working_context, mutation);
            }
            policy_results.push(sanitized);
        }
        let mut quality_results = Vec::new();
        for gate in matched.iter().filter(|g| g.lane() == GateLane::Quality) {
            let raw = self.run_provider(gate, &serde_json::Value::Object(working_context.clone()));
            quality_results.push(self.normalize_quality(gate, raw));
        }
        self.quality_log.lock().expect("quality log mutex poisoned").extend(quality_results.clone());
        (policy_results, quality_results, working_context)
    }

    fn resolve_escalation(&self, gate: &Gate) -> Escalation {
        self.escalation_overrides.get(&gate.name).cloned().unwrap_or_else(|| gate.on_block.clone())
    }

    /// Built-in output-gate pipeline: `taint_ceiling`, `length_limit`,
    /// `pii_marker`, run over `response_text`, with policy-lane blocks
    /// escalated and quality-lane verdicts coerced to advisory.
    #[must_use]
    pub fn evaluate_output(&self, response_text: &str, response_taint: Taint, gates: &[Gate]) -> (String, Vec<GateResult>) {
        let mut working_response = response_text.to_string();
        let active: Vec<&Gate> = gates.iter().filter(|g| g.trigger == GateTrigger::EveryAgentResponse).collect();

        let mut policy_results = Vec::new();
        for gate in active.iter().filter(|g| g.lane() == GateLane::Policy) {
            let mut raw = self.evaluate_output_check(gate, &working_response, response_taint);
            if raw.action == GateAction::Block {
                let escalation = self.resolve_escalation(gate);
                raw = output_gates::apply_escalation(&escalation, raw, &working_response);
            }
            if raw.action == GateAction::Continue {
                if let Some(ctx) = &raw.modified_context {
                    if let Some(serde_json::Value::String(response)) = ctx.get("response") {
                        working_response = response.clone();
                    }
                }
            }
            policy_results.push(raw);
        }

        let mut quality_results = Vec::new();
        for gate in active.iter().filter(|g| g.lane() == GateLane::Quality) {
            let raw = self.evaluate_output_check(gate, &working_response, response_taint);
            quality_results.push(self.normalize_quality(gate, raw));
        }

        self.quality_log.lock().expect("quality log mutex poisoned").extend(quality_results.clone());
        policy_results.extend(quality_results);
        (working_response, policy_results)
    }

    fn evaluate_output_check(&self, gate: &Gate, response_text: &str, response_taint: Taint) -> GateResult {
        match gate.check_type.to_lowercase().as_str() {
            "taint_ceiling" => output_gates::taint_ceiling(gate, response_taint),
            "length_limit" => output_gates::length_limit(gate, response_text),
            "pii_marker" => output_gates::pii_marker(gate, response_text),
            other => GateResult {
                flags: vec!["warn".to_string(), "unknown_output_gate".to_string()],
                reason: format!("unknown output gate check: {other}"),
                ..GateResult::pass(gate.name.as_str(), GateLane::Policy)
            },
        }
    }
}

impl Default for GateRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn gate(name: &str, trigger: GateTrigger, check_type: &str) -> Gate {
        Gate {
            name: name.into(),
            trigger,
            after_step: None,
            provider: silas_core::GateProviderKind::Predicate,
            check_type: check_type.into(),
            check: String::new(),
            config: Map::new(),
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
    fn blocked_length_gate_escalates_to_configured_message() {
        let runner = GateRunner::new();
        let mut g = gate("len", GateTrigger::EveryAgentResponse, "length_limit");
        g.config.insert("max_tokens".into(), serde_json::json!(1));
        g.config.insert("mode".into(), serde_json::json!("block"));
        g.on_block = Escalation::BlockWithMessage { message: Some("too long".to_string()) };
        let (response, results) = runner.evaluate_output("word ".repeat(50).as_str(), Taint::Owner, &[g]);
        assert_eq!(response, "too long");
        assert_eq!(results[0].action, GateAction::Block);
    }

    #[test]
    fn quality_lane_gate_never_blocks() {
        let mut registry = Map::new();
        registry.insert("blocked".to_string(), serde_json::json!(["x"]));
        let runner = GateRunner::new();
        let mut g = gate("kw", GateTrigger::EveryUserMessage, "keyword");
        g.config.insert("blocked_keywords".into(), serde_json::json!(["forbidden"]));
        g.provider = silas_core::GateProviderKind::Llm;
        let mut context = serde_json::Map::new();
        context.insert("message".to_string(), serde_json::Value::String("this has a forbidden word".to_string()));
        let (_, quality, _) = runner.check_gates(&[g], GateTrigger::EveryUserMessage, &context);
        assert_eq!(quality[0].action, GateAction::Continue);
        assert!(quality[0].flags.contains(&"quality_lane_violation".to_string()));
    }

    #[test]
    fn unknown_mutation_key_is_rejected_and_flagged() {
        let runner = GateRunner::new();
        let mut g = gate("pred", GateTrigger::EveryUserMessage, "string_match");
        g.allowed_values = vec!["ok".to_string()];
        let mut context = serde_json::Map::new();
        context.insert("message".to_string(), serde_json::Value::String("not ok".to_string()));
        let (policy, _, _) = runner.check_gates(&[g], GateTrigger::EveryUserMessage, &context);
        assert_eq!(policy[0].action, GateAction::Block);
    }
}
